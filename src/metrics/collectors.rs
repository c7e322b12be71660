//! High-level recording interface over the raw Prometheus metrics.

use super::prometheus::{
    FORMAT_FAILURES_TOTAL, INSTANCES_TOTAL, INSTANCE_DURATION, JUDGE_REQUESTS_TOTAL,
    SANDBOX_EXECUTIONS_TOTAL, SUCCESS_SCORE, TURNS,
};

/// Metrics collector for recording evaluation metrics.
///
/// Every method is a no-op when `init_metrics()` has not been called, so
/// library users that never export metrics pay nothing.
///
/// # Example
///
/// ```ignore
/// use mecheval::metrics::{MetricsCollector, init_metrics};
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.record_instance("success", "B", "my-agent", 12.5);
/// collector.record_turns("B", 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one finished evaluation instance.
    ///
    /// * `status` - "success", "failure" or "error"
    /// * `level` - task level letter (A-D)
    /// * `model` - name of the evaluated target
    pub fn record_instance(&self, status: &str, level: &str, model: &str, duration_secs: f64) {
        if let Some(instances_total) = INSTANCES_TOTAL.get() {
            instances_total
                .with_label_values(&[status, level, model])
                .inc();
        }

        if let Some(instance_duration) = INSTANCE_DURATION.get() {
            instance_duration
                .with_label_values(&[level])
                .observe(duration_secs);
        }

        tracing::trace!(
            status = status,
            level = level,
            model = model,
            duration_secs = duration_secs,
            "Recorded instance metric"
        );
    }

    pub fn record_format_failures(&self, level: &str, count: u32) {
        if count == 0 {
            return;
        }
        if let Some(format_failures) = FORMAT_FAILURES_TOTAL.get() {
            format_failures
                .with_label_values(&[level])
                .inc_by(count as f64);
        }

        tracing::trace!(level = level, count = count, "Recorded format failures");
    }

    pub fn record_turns(&self, level: &str, turns: u32) {
        if let Some(turn_histogram) = TURNS.get() {
            turn_histogram
                .with_label_values(&[level])
                .observe(turns as f64);
        }

        tracing::trace!(level = level, turns = turns, "Recorded turn count");
    }

    pub fn record_judge_request(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        if let Some(judge_requests) = JUDGE_REQUESTS_TOTAL.get() {
            judge_requests.with_label_values(&[status]).inc();
        }

        tracing::trace!(status = status, "Recorded judge request metric");
    }

    /// * `outcome` - "ok", "error" or "timeout"
    pub fn record_sandbox_execution(&self, outcome: &str) {
        if let Some(sandbox_executions) = SANDBOX_EXECUTIONS_TOTAL.get() {
            sandbox_executions.with_label_values(&[outcome]).inc();
        }

        tracing::trace!(outcome = outcome, "Recorded sandbox execution");
    }

    pub fn record_success(&self, success: bool) {
        if let Some(success_score) = SUCCESS_SCORE.get() {
            success_score.observe(if success { 1.0 } else { 0.0 });
        }
    }
}
