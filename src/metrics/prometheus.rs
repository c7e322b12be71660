//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by mecheval and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all mecheval metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of evaluated instances, labeled by status, level, and model.
pub static INSTANCES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Wall-clock duration of one evaluation instance in seconds, labeled by level.
pub static INSTANCE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Replies that fell through every extraction strategy, labeled by level.
pub static FORMAT_FAILURES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Turns spent per instance, labeled by level.
pub static TURNS: OnceLock<HistogramVec> = OnceLock::new();

/// Judge calls, labeled by status.
pub static JUDGE_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Sandbox executions, labeled by outcome (ok/error/timeout).
pub static SANDBOX_EXECUTIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Distribution of per-instance success (0 or 1) and reward signals.
pub static SUCCESS_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Repeated calls are harmless: the first set of
/// statics wins.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let instances_total = CounterVec::new(
        Opts::new("mecheval_instances_total", "Total number of evaluated instances"),
        &["status", "level", "model"],
    )?;

    let instance_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "mecheval_instance_duration_seconds",
            "Evaluation instance duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["level"],
    )?;

    let format_failures_total = CounterVec::new(
        Opts::new(
            "mecheval_format_failures_total",
            "Target replies that no extraction strategy could parse",
        ),
        &["level"],
    )?;

    let turns = HistogramVec::new(
        prometheus::HistogramOpts::new("mecheval_turns", "Turns spent per instance")
            .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 30.0]),
        &["level"],
    )?;

    let judge_requests_total = CounterVec::new(
        Opts::new("mecheval_judge_requests_total", "Total rubric judge calls"),
        &["status"],
    )?;

    let sandbox_executions_total = CounterVec::new(
        Opts::new(
            "mecheval_sandbox_executions_total",
            "Total sandbox executions",
        ),
        &["outcome"],
    )?;

    let success_score = Histogram::with_opts(
        prometheus::HistogramOpts::new("mecheval_success_score", "Distribution of instance success")
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
    )?;

    registry.register(Box::new(instances_total.clone()))?;
    registry.register(Box::new(instance_duration.clone()))?;
    registry.register(Box::new(format_failures_total.clone()))?;
    registry.register(Box::new(turns.clone()))?;
    registry.register(Box::new(judge_requests_total.clone()))?;
    registry.register(Box::new(sandbox_executions_total.clone()))?;
    registry.register(Box::new(success_score.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = INSTANCES_TOTAL.set(instances_total);
    let _ = INSTANCE_DURATION.set(instance_duration);
    let _ = FORMAT_FAILURES_TOTAL.set(format_failures_total);
    let _ = TURNS.set(turns);
    let _ = JUDGE_REQUESTS_TOTAL.set(judge_requests_total);
    let _ = SANDBOX_EXECUTIONS_TOTAL.set(sandbox_executions_total);
    let _ = SUCCESS_SCORE.set(success_score);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line instead when the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
