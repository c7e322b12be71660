//! Prometheus-based monitoring for evaluation runs.
//!
//! # Example
//!
//! ```ignore
//! use mecheval::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//! let collector = MetricsCollector::new();
//! collector.record_instance("success", "C", "agent-1", 42.0);
//! std::fs::write("metrics.prom", export_metrics())?;
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    FORMAT_FAILURES_TOTAL, INSTANCES_TOTAL, INSTANCE_DURATION, JUDGE_REQUESTS_TOTAL, REGISTRY,
    SANDBOX_EXECUTIONS_TOTAL, SUCCESS_SCORE, TURNS,
};
