//! Per-tier success predicates.
//!
//! Each predicate is an OR of a quantitative path and a judged path.
//! Missing criteria read as 0.

use std::collections::BTreeMap;

use crate::task::TaskKind;

/// Judged criteria that must all reach 0.6 for the single-design fallback path.
pub const DESIGN_CRITERIA: [&str; 4] = [
    "technical_accuracy",
    "safety_constraint_awareness",
    "reasoning_quality",
    "engineering_judgment",
];

/// Judged criteria that must all reach 0.6 for the multi-step fallback path.
pub const MULTI_STEP_CRITERIA: [&str; 4] = [
    "technical_accuracy",
    "system_integration",
    "constraint_satisfaction",
    "reasoning_quality",
];

pub fn is_success(kind: TaskKind, scores: &BTreeMap<String, f64>) -> bool {
    let score = |name: &str| scores.get(name).copied().unwrap_or(0.0);

    match kind {
        TaskKind::MultipleChoice => {
            score("correctness") > 0.5
                || score("overall") > 0.7
                || score("technical_accuracy") > 0.7
        }
        TaskKind::Calculation => {
            (score("correctness") > 0.9 && score("value_tolerance") == 1.0)
                || score("judge_overall") > 0.6
                || score("correctness") > 0.5
        }
        TaskKind::Design => design_success(&score, &DESIGN_CRITERIA),
        TaskKind::MultiStepDesign => design_success(&score, &MULTI_STEP_CRITERIA),
    }
}

fn design_success(score: &dyn Fn(&str) -> f64, criteria: &[&str]) -> bool {
    let overall = score("overall");
    overall > 0.7 || (overall >= 0.6 && criteria.iter().all(|c| score(c) >= 0.6))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_multiple_choice_paths() {
        let kind = TaskKind::MultipleChoice;
        assert!(is_success(kind, &scores(&[("correctness", 1.0)])));
        assert!(!is_success(kind, &scores(&[("correctness", 0.5)])));
        assert!(is_success(kind, &scores(&[("correctness", 0.0), ("overall", 0.8)])));
        assert!(is_success(kind, &scores(&[("technical_accuracy", 0.71)])));
        assert!(!is_success(kind, &scores(&[("overall", 0.7), ("technical_accuracy", 0.7)])));
    }

    #[test]
    fn test_calculation_paths() {
        let kind = TaskKind::Calculation;
        assert!(is_success(
            kind,
            &scores(&[("correctness", 1.0), ("value_tolerance", 1.0)])
        ));
        assert!(is_success(kind, &scores(&[("correctness", 0.6)])));
        assert!(!is_success(kind, &scores(&[("correctness", 0.5)])));
        assert!(is_success(kind, &scores(&[("judge_overall", 0.8)])));
        assert!(!is_success(
            kind,
            &scores(&[("judge_overall", 0.6), ("overall", 1.0)])
        ));
    }

    #[test]
    fn test_design_all_criteria_path() {
        let kind = TaskKind::Design;
        let mut passing = scores(&[
            ("overall", 0.6),
            ("technical_accuracy", 0.6),
            ("safety_constraint_awareness", 0.8),
            ("reasoning_quality", 0.6),
            ("engineering_judgment", 0.6),
        ]);
        assert!(is_success(kind, &passing));

        passing.insert("safety_constraint_awareness".to_string(), 0.4);
        assert!(!is_success(kind, &passing));

        passing.insert("overall".to_string(), 0.8);
        assert!(is_success(kind, &passing));
    }

    #[test]
    fn test_multi_step_uses_its_own_criteria() {
        let kind = TaskKind::MultiStepDesign;
        let design_only = scores(&[
            ("overall", 0.6),
            ("technical_accuracy", 0.6),
            ("safety_constraint_awareness", 0.6),
            ("reasoning_quality", 0.6),
            ("engineering_judgment", 0.6),
        ]);
        assert!(!is_success(kind, &design_only));

        let multi = scores(&[
            ("overall", 0.6),
            ("technical_accuracy", 0.6),
            ("system_integration", 0.6),
            ("constraint_satisfaction", 0.6),
            ("reasoning_quality", 0.6),
        ]);
        assert!(is_success(kind, &multi));
    }
}
