//! One evaluation row per (task instance, model).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::DriverSummary;
use crate::extraction::{ExtractionStrategy, ParsedAnswer, ParsedResponse};
use crate::scoring::ScoreSet;
use crate::task::{TaskInstance, TaskKind};

/// Result of evaluating one task instance against one model.
///
/// Immutable once built; a failed instance is still a record, with the
/// failure in `scores.error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: Uuid,
    pub task_instance_id: String,
    pub task_id: String,
    pub kind: TaskKind,
    pub model_name: String,
    pub response: ParsedResponse,
    /// Absent for offline scoring of recorded replies and for instances that
    /// failed before the conversation finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverSummary>,
    pub scores: ScoreSet,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationRecord {
    pub fn new(
        task: &TaskInstance,
        model_name: impl Into<String>,
        response: ParsedResponse,
        scores: ScoreSet,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_instance_id: task.id.clone(),
            task_id: task.family().to_string(),
            kind: task.kind,
            model_name: model_name.into(),
            response,
            driver: None,
            scores,
            timestamp: Utc::now(),
        }
    }

    /// A failed-but-present record for an instance that could not finish.
    pub fn failed(task: &TaskInstance, model_name: impl Into<String>, error: impl Into<String>) -> Self {
        let response = ParsedResponse::new(
            String::new(),
            ParsedAnswer::empty(task.kind),
            ExtractionStrategy::Fallback,
        );
        Self::new(task, model_name, response, ScoreSet::failed(task.kind, error))
    }

    pub fn with_driver(mut self, summary: DriverSummary) -> Self {
        self.driver = Some(summary);
        self
    }

    pub fn success(&self) -> bool {
        self.scores.success()
    }

    pub fn error(&self) -> Option<&str> {
        self.scores.error()
    }
}
