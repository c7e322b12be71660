//! mecheval: evaluation engine for AI agents on mechanical engineering tasks.
//!
//! A target agent is driven through a multi-turn tool-use conversation, its
//! free-form replies are turned into typed answers, numeric claims are
//! re-computed in a restricted sandbox, and deterministic and judged scores
//! are folded into a per-tier success decision with bootstrap statistics on
//! top.

// Core modules
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod evaluation;
pub mod extraction;
pub mod llm;
pub mod metrics;
pub mod sandbox;
pub mod scoring;
pub mod statistics;
pub mod target;
pub mod task;
pub mod utils;

// Re-export commonly used types
pub use config::BenchConfig;
pub use error::{ConfigError, DriverError, LlmError, ReportError, TaskError, TransportError};
pub use evaluation::{EvaluationRecord, Evaluator};
pub use task::{TaskInstance, TaskKind};
