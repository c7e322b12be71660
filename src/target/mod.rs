//! Transport to the agent under evaluation.
//!
//! The driver only needs [`TargetAgent`]; [`A2aClient`] implements it over
//! agent-to-agent JSON-RPC. Retries, if any, belong to the transport.

pub mod a2a;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

pub use a2a::{normalize_base_url, parse_send_reply, A2aClient, AGENT_CARD_PATH};

/// One reply from the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReply {
    pub text: String,
    /// Conversation id assigned by the target, if it reported one.
    pub context_id: Option<String>,
    /// Cost the target reported for producing this reply.
    pub cost: Option<f64>,
}

impl TargetReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context_id: None,
            cost: None,
        }
    }

    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Self-description published by an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<Value>,
}

#[async_trait]
pub trait TargetAgent: Send + Sync {
    /// Sends one user turn. `context_id` is `None` on the first turn.
    async fn send_message(
        &self,
        text: &str,
        context_id: Option<&str>,
    ) -> Result<TargetReply, TransportError>;

    async fn agent_card(&self) -> Result<AgentCard, TransportError>;
}
