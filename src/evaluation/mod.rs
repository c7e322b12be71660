//! Evaluation runs: driver, extraction and scoring per instance, collected
//! into records that are reported as JSONL and aggregated by (task, model).
//!
//! An instance always produces a record. Anything that goes wrong inside it
//! (transport failure, protocol violation, panic) is recorded in the score
//! set's `error` instead of aborting the batch.

pub mod record;
pub mod report;
pub mod runner;
pub mod summary;

pub use record::EvaluationRecord;
pub use report::{
    append_records, parse_lines, read_records, read_responses, write_records, RecordedResponse,
};
pub use runner::{judge_from_config, Evaluator};
pub use summary::{
    aggregate_records, compare_models, criterion_groups, KindSummary, RunSummary,
    DEFAULT_CRITERION,
};
