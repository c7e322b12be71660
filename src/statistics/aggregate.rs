//! Aggregate statistics over groups of scores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::bootstrap::{mean, std_dev, Bootstrap};

/// Summary of one score collection. Recomputed, never updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateStat {
    pub mean: f64,
    pub std: f64,
    pub n: usize,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
}

impl AggregateStat {
    /// Summarises `scores`; an empty slice gives all zeros.
    pub fn from_scores(scores: &[f64], bootstrap: &Bootstrap) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let ci = bootstrap.interval(scores);
        Self {
            mean: mean(scores),
            std: std_dev(scores),
            n: scores.len(),
            ci_lower: ci.lower,
            ci_upper: ci.upper,
            min: scores.iter().copied().fold(f64::INFINITY, f64::min),
            max: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Aggregation key: task family and model under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub task_id: String,
    pub model: String,
}

impl GroupKey {
    pub fn new(task_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.task_id, self.model)
    }
}

/// Collects keyed scores into groups, keeping input order within each group.
pub fn group_scores<I>(items: I) -> BTreeMap<GroupKey, Vec<f64>>
where
    I: IntoIterator<Item = (GroupKey, f64)>,
{
    let mut groups: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for (key, score) in items {
        groups.entry(key).or_default().push(score);
    }
    groups
}

/// One [`AggregateStat`] per group.
pub fn aggregate_groups(
    groups: &BTreeMap<GroupKey, Vec<f64>>,
    bootstrap: &Bootstrap,
) -> BTreeMap<GroupKey, AggregateStat> {
    groups
        .iter()
        .map(|(key, scores)| (key.clone(), AggregateStat::from_scores(scores, bootstrap)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_stat_fields() {
        let stat = AggregateStat::from_scores(&[0.0, 0.5, 1.0], &Bootstrap::default().with_seed(9));
        assert_eq!(stat.n, 3);
        assert!((stat.mean - 0.5).abs() < 1e-12);
        assert_eq!(stat.min, 0.0);
        assert_eq!(stat.max, 1.0);
        assert!(stat.ci_lower <= stat.mean && stat.mean <= stat.ci_upper);
        assert!(stat.std > 0.0);
    }

    #[test]
    fn test_empty_aggregate_is_zeroed() {
        let stat = AggregateStat::from_scores(&[], &Bootstrap::default());
        assert_eq!(stat, AggregateStat::default());
    }

    #[test]
    fn test_grouping_by_task_and_model() {
        let groups = group_scores(vec![
            (GroupKey::new("beams", "model-a"), 1.0),
            (GroupKey::new("beams", "model-b"), 0.0),
            (GroupKey::new("beams", "model-a"), 0.0),
            (GroupKey::new("gears", "model-a"), 1.0),
        ]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&GroupKey::new("beams", "model-a")], vec![1.0, 0.0]);

        let stats = aggregate_groups(&groups, &Bootstrap::default().with_seed(1));
        assert_eq!(stats[&GroupKey::new("beams", "model-a")].n, 2);
        assert_eq!(stats[&GroupKey::new("gears", "model-a")].mean, 1.0);
    }
}
