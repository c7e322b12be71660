//! Per-instance conversation state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::DriverError;
use crate::sandbox::SandboxExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Evaluator,
    Target,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
}

/// History and execution namespace of one task attempt.
///
/// Created empty for each task instance and dropped when it finishes. The
/// context id is fixed by the first reply that carries one.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    context_id: Option<String>,
    history: Vec<Utterance>,
    sandbox: SandboxExecutor,
}

impl ConversationSession {
    pub fn new(sandbox_timeout: Duration) -> Self {
        Self {
            context_id: None,
            history: Vec::new(),
            sandbox: SandboxExecutor::new(sandbox_timeout),
        }
    }

    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    /// Records the context id reported with a reply.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::ContextChanged` when a different id was already
    /// bound. A reply without an id keeps the current binding.
    pub fn bind_context(&mut self, reported: Option<&str>) -> Result<(), DriverError> {
        match (&self.context_id, reported) {
            (_, None) => Ok(()),
            (None, Some(id)) => {
                self.context_id = Some(id.to_string());
                Ok(())
            }
            (Some(bound), Some(id)) if bound == id => Ok(()),
            (Some(bound), Some(id)) => Err(DriverError::ContextChanged {
                expected: bound.clone(),
                actual: id.to_string(),
            }),
        }
    }

    pub fn record(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.history.push(Utterance {
            speaker,
            text: text.into(),
        });
    }

    pub fn history(&self) -> &[Utterance] {
        &self.history
    }

    pub fn into_history(self) -> Vec<Utterance> {
        self.history
    }

    pub fn sandbox(&self) -> &SandboxExecutor {
        &self.sandbox
    }

    pub fn sandbox_mut(&mut self) -> &mut SandboxExecutor {
        &mut self.sandbox
    }

    /// Forgets the context id, the history and every sandbox variable.
    pub fn reset(&mut self) {
        self.context_id = None;
        self.history.clear();
        self.sandbox.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_context_binding() {
        let mut session = ConversationSession::new(Duration::from_secs(1));
        assert!(session.bind_context(None).is_ok());
        assert_eq!(session.context_id(), None);

        session.bind_context(Some("ctx-1")).unwrap();
        session.bind_context(Some("ctx-1")).unwrap();
        session.bind_context(None).unwrap();
        assert_eq!(session.context_id(), Some("ctx-1"));

        let err = session.bind_context(Some("ctx-2")).unwrap_err();
        assert!(matches!(
            err,
            DriverError::ContextChanged { ref expected, ref actual }
                if expected == "ctx-1" && actual == "ctx-2"
        ));
    }

    #[test]
    fn test_reset_clears_namespace_and_history() {
        let mut session = ConversationSession::new(Duration::from_secs(1));
        session.bind_context(Some("ctx")).unwrap();
        session.record(Speaker::Evaluator, "hi");
        session
            .sandbox_mut()
            .execute("span = 2.5", &Map::new(), None);
        assert!(session.sandbox().variable("span").is_some());

        session.reset();
        assert!(session.history().is_empty());
        assert_eq!(session.context_id(), None);
        assert!(session.sandbox().variable("span").is_none());
        assert!(session.sandbox().variable("math").is_some());
    }
}
