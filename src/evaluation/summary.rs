//! Statistics over evaluation records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::record::EvaluationRecord;
use crate::statistics::{
    aggregate_groups, group_scores, AggregateStat, Bootstrap, GroupKey, SignificanceTest,
};

/// Criterion aggregated when none is given.
pub const DEFAULT_CRITERION: &str = "success";

/// Scores of `criterion` grouped by (task, model). Records lacking the
/// criterion are left out.
pub fn criterion_groups(
    records: &[EvaluationRecord],
    criterion: &str,
) -> BTreeMap<GroupKey, Vec<f64>> {
    group_scores(records.iter().filter_map(|record| {
        record
            .scores
            .value(criterion)
            .map(|score| (GroupKey::new(&record.task_id, &record.model_name), score))
    }))
}

/// One [`AggregateStat`] per (task, model).
pub fn aggregate_records(
    records: &[EvaluationRecord],
    criterion: &str,
    bootstrap: &Bootstrap,
) -> BTreeMap<GroupKey, AggregateStat> {
    aggregate_groups(&criterion_groups(records, criterion), bootstrap)
}

fn model_scores(records: &[EvaluationRecord], criterion: &str, model: &str) -> Vec<f64> {
    records
        .iter()
        .filter(|record| record.model_name == model)
        .filter_map(|record| record.scores.value(criterion))
        .collect()
}

/// Two-sample bootstrap of `first` against `second` over all their records.
pub fn compare_models(
    records: &[EvaluationRecord],
    criterion: &str,
    first: &str,
    second: &str,
    bootstrap: &Bootstrap,
) -> SignificanceTest {
    bootstrap.compare(
        &model_scores(records, criterion, first),
        &model_scores(records, criterion, second),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
    pub total: usize,
    pub succeeded: usize,
    pub errored: usize,
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Records whose scores carry an error.
    pub errored: usize,
    pub success_rate: f64,
    pub total_cost: f64,
    pub mean_turns: f64,
    pub by_kind: BTreeMap<String, KindSummary>,
}

impl RunSummary {
    pub fn from_records(records: &[EvaluationRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        let mut turns = Vec::new();

        for record in records {
            let entry = summary
                .by_kind
                .entry(record.kind.as_str().to_string())
                .or_default();
            entry.total += 1;
            if record.success() {
                summary.succeeded += 1;
                entry.succeeded += 1;
            }
            if record.error().is_some() {
                summary.errored += 1;
                entry.errored += 1;
            }
            if let Some(driver) = &record.driver {
                summary.total_cost += driver.cost;
                turns.push(driver.turns as f64);
            }
        }

        if summary.total > 0 {
            summary.success_rate = summary.succeeded as f64 / summary.total as f64;
        }
        if !turns.is_empty() {
            summary.mean_turns = turns.iter().sum::<f64>() / turns.len() as f64;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{ExtractionStrategy, ParsedAnswer, ParsedResponse};
    use crate::scoring::ScoreSet;
    use crate::task::{TaskInstance, TaskKind};

    fn record(task_id: &str, model: &str, correctness: f64) -> EvaluationRecord {
        let task = TaskInstance::new(format!("{}-x", task_id), TaskKind::MultipleChoice, "p")
            .with_task_id(task_id);
        let scores = ScoreSet::new(
            TaskKind::MultipleChoice,
            [("correctness".to_string(), correctness)].into_iter().collect(),
            BTreeMap::new(),
            None,
        );
        let response = ParsedResponse::new(
            "",
            ParsedAnswer::MultipleChoice {
                selected_option: None,
            },
            ExtractionStrategy::Fallback,
        );
        EvaluationRecord::new(&task, model, response, scores)
    }

    #[test]
    fn test_groups_by_task_and_model() {
        let records = vec![
            record("a-1", "m1", 1.0),
            record("a-1", "m1", 0.0),
            record("a-1", "m2", 1.0),
            record("a-2", "m1", 1.0),
        ];
        let stats = aggregate_records(&records, "correctness", &Bootstrap::default().with_seed(3));

        assert_eq!(stats.len(), 3);
        let first = stats[&GroupKey::new("a-1", "m1")];
        assert_eq!(first.n, 2);
        assert!((first.mean - 0.5).abs() < 1e-12);

        let success = aggregate_records(&records, DEFAULT_CRITERION, &Bootstrap::default().with_seed(3));
        assert_eq!(success[&GroupKey::new("a-1", "m2")].mean, 1.0);
        assert!(aggregate_records(&records, "judge_overall", &Bootstrap::default()).is_empty());
    }

    #[test]
    fn test_compare_models() {
        let mut records = Vec::new();
        for _ in 0..20 {
            records.push(record("a-1", "strong", 1.0));
            records.push(record("a-1", "weak", 0.0));
        }
        let test = compare_models(
            &records,
            "correctness",
            "strong",
            "weak",
            &Bootstrap::default().with_seed(11),
        );
        assert!(test.significant);
        assert_eq!(test.observed_diff, 1.0);

        let missing = compare_models(&records, "correctness", "strong", "absent", &Bootstrap::default());
        assert!(!missing.significant);
    }

    #[test]
    fn test_run_summary_counts() {
        let task = TaskInstance::new("b-1", TaskKind::Calculation, "p");
        let records = vec![
            record("a-1", "m", 1.0),
            record("a-1", "m", 0.0),
            EvaluationRecord::failed(&task, "m", "Transport failure"),
        ];
        let summary = RunSummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.errored, 1);
        assert!((summary.success_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.by_kind["calculation"].errored, 1);
        assert_eq!(summary.by_kind["multiple_choice"].total, 2);
        assert_eq!(RunSummary::from_records(&[]).success_rate, 0.0);
    }
}
