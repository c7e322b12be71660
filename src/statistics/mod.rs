//! Statistics Aggregator.
//!
//! Bootstrap confidence intervals over score collections, a two-sample
//! bootstrap for comparing models, and per-(task, model) aggregates. Inputs
//! are read-only; every call returns fresh values.

pub mod aggregate;
pub mod bootstrap;

pub use aggregate::{aggregate_groups, group_scores, AggregateStat, GroupKey};
pub use bootstrap::{
    bootstrap, mean, percentile, std_dev, Bootstrap, ConfidenceInterval, SignificanceTest,
};
