//! Immutable per-evaluation score mapping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::success::is_success;
use crate::task::TaskKind;

/// Named criteria in `[0, 1]` with the derived success flag.
///
/// Serialises flat: every criterion is a top-level key next to `success`
/// and, when grading partly failed, `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    #[serde(flatten)]
    scores: BTreeMap<String, f64>,
    /// Unbounded measurements such as absolute error; not criteria.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    diagnostics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    success: bool,
}

impl ScoreSet {
    /// Builds a score set and derives `success` with the tier's predicate.
    ///
    /// Criteria are clamped into `[0, 1]`; NaN becomes 0. Non-finite
    /// diagnostics are dropped.
    pub fn new(
        kind: TaskKind,
        scores: BTreeMap<String, f64>,
        diagnostics: BTreeMap<String, f64>,
        error: Option<String>,
    ) -> Self {
        let scores: BTreeMap<String, f64> = scores
            .into_iter()
            .map(|(name, value)| {
                let value = if value.is_nan() {
                    0.0
                } else {
                    value.clamp(0.0, 1.0)
                };
                (name, value)
            })
            .collect();
        let diagnostics = diagnostics
            .into_iter()
            .filter(|(_, value)| value.is_finite())
            .collect();
        let success = is_success(kind, &scores);
        Self {
            scores,
            diagnostics,
            error,
            success,
        }
    }

    /// A score set for an instance that could not be graded at all.
    pub fn failed(kind: TaskKind, error: impl Into<String>) -> Self {
        Self::new(kind, BTreeMap::new(), BTreeMap::new(), Some(error.into()))
    }

    pub fn get(&self, criterion: &str) -> Option<f64> {
        self.scores.get(criterion).copied()
    }

    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    pub fn diagnostics(&self) -> &BTreeMap<String, f64> {
        &self.diagnostics
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Value of a criterion for aggregation; `success` reads as 0 or 1.
    pub fn value(&self, criterion: &str) -> Option<f64> {
        if criterion == "success" {
            return Some(if self.success { 1.0 } else { 0.0 });
        }
        self.get(criterion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_scores_are_clamped() {
        let set = ScoreSet::new(
            TaskKind::MultipleChoice,
            scores(&[("correctness", 1.4), ("overall", f64::NAN), ("x", -0.2)]),
            BTreeMap::new(),
            None,
        );
        assert_eq!(set.get("correctness"), Some(1.0));
        assert_eq!(set.get("overall"), Some(0.0));
        assert_eq!(set.get("x"), Some(0.0));
        assert!(set.success());
    }

    #[test]
    fn test_serialization_is_flat() {
        let mut diagnostics = BTreeMap::new();
        diagnostics.insert("absolute_error".to_string(), 0.5);
        diagnostics.insert("relative_error".to_string(), f64::INFINITY);
        let set = ScoreSet::new(
            TaskKind::Calculation,
            scores(&[("correctness", 0.0)]),
            diagnostics,
            Some("judge: timeout".to_string()),
        );

        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(
            value,
            json!({
                "correctness": 0.0,
                "diagnostics": {"absolute_error": 0.5},
                "error": "judge: timeout",
                "success": false
            })
        );

        let back: ScoreSet = serde_json::from_value(value).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_failed_set_has_error_and_no_success() {
        let set = ScoreSet::failed(TaskKind::Design, "Protocol violation");
        assert!(!set.success());
        assert_eq!(set.error(), Some("Protocol violation"));
        assert_eq!(set.value("success"), Some(0.0));
        assert_eq!(set.value("overall"), None);
    }
}
