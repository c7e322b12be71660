//! Per-instance evaluation boundary and the ordered batch runner.

use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::record::EvaluationRecord;
use crate::config::{BenchConfig, JudgeConfig};
use crate::driver::ConversationDriver;
use crate::error::{ConfigError, LlmError};
use crate::extraction::extract;
use crate::llm::LiteLlmClient;
use crate::metrics::MetricsCollector;
use crate::scoring::{LlmJudge, NeutralJudge, RubricJudge, ScoringEngine};
use crate::target::TargetAgent;
use crate::task::TaskInstance;

/// The configured judge: an LLM rubric judge, or neutral scores when judging
/// is disabled.
pub fn judge_from_config(config: &JudgeConfig) -> Result<Arc<dyn RubricJudge>, LlmError> {
    if !config.enabled {
        return Ok(Arc::new(NeutralJudge));
    }
    let client = LiteLlmClient::from_config(config)?;
    Ok(Arc::new(LlmJudge::from_config(Arc::new(client), config)))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs task instances through the driver and the scoring engine.
///
/// Every instance yields exactly one [`EvaluationRecord`]; transport errors,
/// protocol violations and panics become failed records instead of aborting
/// the batch.
pub struct Evaluator {
    driver: ConversationDriver,
    scoring: ScoringEngine,
    model_name: String,
    concurrency: usize,
    metrics: MetricsCollector,
}

impl Evaluator {
    pub fn new(driver: ConversationDriver, scoring: ScoringEngine, model_name: impl Into<String>) -> Self {
        Self {
            driver,
            scoring,
            model_name: model_name.into(),
            concurrency: 1,
            metrics: MetricsCollector::new(),
        }
    }

    /// Builds the driver and scoring engine from configuration.
    pub fn from_config(
        config: &BenchConfig,
        judge: Arc<dyn RubricJudge>,
        model_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let driver = ConversationDriver::from_config(config)?;
        let scoring = ScoringEngine::from_config(config, judge);
        Ok(Self::new(driver, scoring, model_name).with_concurrency(config.concurrency))
    }

    /// Instances evaluated at once. Results keep input order regardless.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn evaluate_inner(
        &self,
        target: &dyn TargetAgent,
        task: &TaskInstance,
    ) -> EvaluationRecord {
        match self.driver.run(target, task).await {
            Ok(outcome) => {
                let scores = self.scoring.score(task, &outcome.final_response).await;
                EvaluationRecord::new(task, &self.model_name, outcome.final_response.clone(), scores)
                    .with_driver(outcome.summary())
            }
            Err(e) => {
                warn!(task = %task.id, error = %e, "Instance failed");
                EvaluationRecord::failed(task, &self.model_name, e.to_string())
            }
        }
    }

    /// Evaluates one instance. Never fails.
    pub async fn evaluate(&self, target: &dyn TargetAgent, task: &TaskInstance) -> EvaluationRecord {
        let started = Instant::now();
        let record = match AssertUnwindSafe(self.evaluate_inner(target, task))
            .catch_unwind()
            .await
        {
            Ok(record) => record,
            Err(payload) => {
                let message = format!("internal fault: {}", panic_message(payload));
                warn!(task = %task.id, error = %message, "Instance panicked");
                EvaluationRecord::failed(task, &self.model_name, message)
            }
        };
        self.finish(task, &record, started);
        record
    }

    /// Evaluates `tasks` with bounded concurrency, returning records in
    /// input order.
    pub async fn evaluate_batch(
        &self,
        target: &dyn TargetAgent,
        tasks: &[TaskInstance],
    ) -> Vec<EvaluationRecord> {
        info!(
            instances = tasks.len(),
            concurrency = self.concurrency,
            model = %self.model_name,
            "Starting evaluation batch"
        );
        futures::stream::iter(tasks.iter().map(|task| self.evaluate(target, task)))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Extracts and scores a reply recorded elsewhere, without a conversation.
    pub async fn score_response(
        &self,
        task: &TaskInstance,
        response: &str,
        model_name: Option<&str>,
    ) -> EvaluationRecord {
        let started = Instant::now();
        let model = model_name.unwrap_or(&self.model_name);
        let outcome = AssertUnwindSafe(async {
            let parsed = extract(response, task.kind, task.num_options());
            let scores = self.scoring.score(task, &parsed).await;
            EvaluationRecord::new(task, model, parsed, scores)
        })
        .catch_unwind()
        .await;
        let record = outcome.unwrap_or_else(|payload| {
            EvaluationRecord::failed(
                task,
                model,
                format!("internal fault: {}", panic_message(payload)),
            )
        });
        self.finish(task, &record, started);
        record
    }

    fn finish(&self, task: &TaskInstance, record: &EvaluationRecord, started: Instant) {
        let status = match (record.error(), record.success()) {
            (_, true) => "success",
            (None, false) => "failure",
            (Some(_), false) => "error",
        };
        let level = task.kind.level().to_string();
        self.metrics.record_instance(
            status,
            &level,
            &record.model_name,
            started.elapsed().as_secs_f64(),
        );
        info!(
            task = %task.id,
            kind = %task.kind,
            status,
            success = record.success(),
            "Instance evaluated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::target::{AgentCard, TargetReply};
    use crate::task::TaskKind;
    use async_trait::async_trait;

    /// Answers by prompt content: panics or fails for marked tasks.
    struct KeywordTarget;

    #[async_trait]
    impl TargetAgent for KeywordTarget {
        async fn send_message(
            &self,
            text: &str,
            _context_id: Option<&str>,
        ) -> Result<TargetReply, TransportError> {
            if text.contains("PANIC") {
                panic!("target double exploded");
            }
            if text.contains("OFFLINE") {
                return Err(TransportError::RequestFailed("connection refused".to_string()));
            }
            Ok(TargetReply::new("After checking, the correct answer is Option 2."))
        }

        async fn agent_card(&self) -> Result<AgentCard, TransportError> {
            Ok(AgentCard::default())
        }
    }

    fn evaluator() -> Evaluator {
        let config = BenchConfig::default();
        Evaluator::from_config(&config, Arc::new(NeutralJudge), "test-model")
            .unwrap()
            .with_concurrency(3)
    }

    fn choice(id: &str, prompt: &str) -> TaskInstance {
        TaskInstance::new(id, TaskKind::MultipleChoice, prompt).with_options(
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            1,
        )
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_isolates_faults() {
        let tasks = vec![
            choice("a-1", "Which one?"),
            choice("a-2", "OFFLINE question"),
            choice("a-3", "PANIC question"),
            choice("a-4", "Which other one?"),
        ];
        let records = evaluator().evaluate_batch(&KeywordTarget, &tasks).await;

        let ids: Vec<&str> = records.iter().map(|r| r.task_instance_id.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "a-2", "a-3", "a-4"]);

        assert!(records[0].success());
        assert_eq!(records[0].scores.get("correctness"), Some(1.0));
        assert!(records[0].driver.is_some());

        assert!(!records[1].success());
        assert!(records[1].error().unwrap().contains("connection refused"));

        assert!(!records[2].success());
        assert!(records[2].error().unwrap().contains("target double exploded"));

        assert!(records[3].success());
    }

    #[tokio::test]
    async fn test_score_response_offline() {
        let task = TaskInstance::new("b-1", TaskKind::Calculation, "Deflection?")
            .with_gold_value(0.0015);
        let record = evaluator()
            .score_response(&task, "...the deflection is 0.0015 m.", Some("other"))
            .await;

        assert_eq!(record.model_name, "other");
        assert!(record.driver.is_none());
        assert!(record.scores.get("correctness").unwrap() >= 0.99);
        assert!(record.success());
    }

    #[test]
    fn test_disabled_judge_is_neutral() {
        let config = JudgeConfig {
            enabled: false,
            ..JudgeConfig::default()
        };
        assert!(judge_from_config(&config).is_ok());

        let unreachable = JudgeConfig::default();
        assert!(matches!(
            judge_from_config(&unreachable),
            Err(LlmError::MissingApiBase)
        ));
    }
}
