//! Agent-to-agent client over HTTP JSON-RPC.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{AgentCard, TargetAgent, TargetReply};
use crate::config::TransportConfig;
use crate::error::TransportError;

/// Well-known location of the agent card, relative to the base URL.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

/// Strips trailing slashes and any `/to_agent/...` routing suffix.
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    match url.split_once("/to_agent/") {
        Some((base, _)) => base.trim_end_matches('/').to_string(),
        None => url.to_string(),
    }
}

pub struct A2aClient {
    /// Endpoint messages are posted to, routing path included.
    rpc_url: String,
    /// Base URL the agent card is served from.
    base_url: String,
    http_client: Client,
}

impl A2aClient {
    pub fn new(url: &str, transport: &TransportConfig) -> Self {
        let http_client = Client::builder()
            .timeout(transport.timeout())
            .connect_timeout(transport.connect_timeout())
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            rpc_url: url.trim().trim_end_matches('/').to_string(),
            base_url: normalize_base_url(url),
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn card_url(&self) -> String {
        format!("{}{}", self.base_url, AGENT_CARD_PATH)
    }

    /// Polls the agent card until it is served.
    pub async fn wait_ready(
        &self,
        attempts: u32,
        interval: Duration,
    ) -> Result<AgentCard, TransportError> {
        for attempt in 1..=attempts {
            match self.agent_card().await {
                Ok(card) => {
                    info!(agent = %card.name, attempt, "Target agent is ready");
                    return Ok(card);
                }
                Err(e) => {
                    debug!(attempt, attempts, error = %e, "Agent card not available yet");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(TransportError::NotReady {
            url: self.base_url.clone(),
            attempts,
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        Err(TransportError::Status {
            code: status.as_u16(),
            message,
        })
    }
}

/// JSON-RPC `message/send` request for one text turn.
pub fn send_request(text: &str, context_id: Option<&str>) -> Value {
    let mut message = json!({
        "kind": "message",
        "role": "user",
        "messageId": Uuid::new_v4().simple().to_string(),
        "parts": [{"kind": "text", "text": text}],
    });
    if let (Some(context_id), Some(object)) = (context_id, message.as_object_mut()) {
        object.insert("contextId".to_string(), Value::String(context_id.to_string()));
    }
    json!({
        "jsonrpc": "2.0",
        "id": Uuid::new_v4().simple().to_string(),
        "method": "message/send",
        "params": {"message": message},
    })
}

fn text_parts(parts: Option<&Value>) -> Vec<String> {
    parts
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string_field(object: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Reads a JSON-RPC reply whose result is either a message or a task.
pub fn parse_send_reply(reply: &Value) -> Result<TargetReply, TransportError> {
    if let Some(error) = reply.get("error") {
        return Err(TransportError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
            message: string_field(error, &["message"]).unwrap_or_default(),
        });
    }

    let result = reply
        .get("result")
        .filter(|r| r.is_object())
        .ok_or_else(|| TransportError::MalformedReply("missing 'result' object".to_string()))?;

    let mut texts = text_parts(result.get("parts"));
    if let Some(status_message) = result.get("status").and_then(|s| s.get("message")) {
        texts.extend(text_parts(status_message.get("parts")));
    }
    if let Some(artifacts) = result.get("artifacts").and_then(Value::as_array) {
        for artifact in artifacts {
            texts.extend(text_parts(artifact.get("parts")));
        }
    }
    if texts.is_empty() {
        if let Some(text) = string_field(result, &["text"]) {
            texts.push(text);
        }
    }

    let cost = result
        .get("metadata")
        .and_then(|m| m.get("cost"))
        .and_then(Value::as_f64);

    Ok(TargetReply {
        text: texts.join("\n"),
        context_id: string_field(result, &["contextId", "context_id"]),
        cost,
    })
}

#[async_trait]
impl TargetAgent for A2aClient {
    async fn send_message(
        &self,
        text: &str,
        context_id: Option<&str>,
    ) -> Result<TargetReply, TransportError> {
        let request = send_request(text, context_id);
        let response = self
            .http_client
            .post(&self.rpc_url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let reply: Value = response
            .json()
            .await
            .map_err(|e| TransportError::MalformedReply(e.to_string()))?;
        parse_send_reply(&reply)
    }

    async fn agent_card(&self) -> Result<AgentCard, TransportError> {
        let response = self
            .http_client
            .get(self.card_url())
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;
        let response = Self::check_status(response).await?;

        response
            .json::<AgentCard>()
            .await
            .map_err(|e| TransportError::MalformedReply(format!("invalid agent card: {}", e)))
    }
}
