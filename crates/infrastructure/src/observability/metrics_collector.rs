//! Metrics collector for the arithmetic task scheduler
//!
//! Handles are registered against whatever global recorder is installed
//! (the Prometheus exporter in production, a no-op recorder otherwise).

use metrics::{counter, histogram, Counter, Histogram};
use tracing::debug;

/// Metrics collector for scheduling, dispatch and execution
#[derive(Clone)]
pub struct MetricsCollector {
    schedules_considered_total: Counter,
    batch_duration: Histogram,
    dispatch_failures_total: Counter,
    task_retries_total: Counter,
    tasks_reconciled_total: Counter,
    task_execution_duration: Histogram,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            schedules_considered_total: counter!("arith_schedules_considered_total"),
            batch_duration: histogram!("arith_batch_duration_seconds"),
            dispatch_failures_total: counter!("arith_dispatch_failures_total"),
            task_retries_total: counter!("arith_task_retries_total"),
            tasks_reconciled_total: counter!("arith_tasks_reconciled_total"),
            task_execution_duration: histogram!("arith_task_execution_duration_seconds"),
        }
    }

    /// Record one committed schedule batch
    pub fn record_schedule_batch(&self, considered: usize, created: usize, duration_seconds: f64) {
        self.schedules_considered_total.increment(considered as u64);
        self.batch_duration.record(duration_seconds);
        self.record_tasks_created("schedule", created);

        debug!(
            considered = considered,
            created = created,
            duration_seconds = duration_seconds,
            "Schedule batch metrics recorded"
        );
    }

    /// `source` is `api` or `schedule`
    pub fn record_tasks_created(&self, source: &'static str, count: usize) {
        counter!("arith_tasks_created_total", "source" => source).increment(count as u64);
    }

    pub fn record_task_execution(&self, status: &'static str, duration_seconds: f64) {
        counter!("arith_task_executions_total", "status" => status).increment(1);
        self.task_execution_duration.record(duration_seconds);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures_total.increment(1);
    }

    pub fn record_task_retry(&self) {
        self.task_retries_total.increment(1);
    }

    pub fn record_tasks_reconciled(&self, count: usize) {
        self.tasks_reconciled_total.increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_a_no_op() {
        let metrics = MetricsCollector::new();
        metrics.record_schedule_batch(3, 2, 0.01);
        metrics.record_tasks_created("api", 1);
        metrics.record_task_execution("SUCCESS", 0.002);
        metrics.record_dispatch_failure();
        metrics.record_task_retry();
        metrics.record_tasks_reconciled(4);
    }
}
