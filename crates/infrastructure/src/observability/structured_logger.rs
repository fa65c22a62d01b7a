//! Structured logging utilities
//!
//! Event-tagged log lines for the task lifecycle.

use tracing::{error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_created(task_id: i64, priority: u8, task_schedule_id: Option<i64>) {
        info!(
            event = "task_created",
            task.id = task_id,
            task.priority = priority,
            task.schedule_id = ?task_schedule_id,
            "Task created"
        );
    }

    pub fn log_schedule_batch_committed(considered: usize, created: usize, duration_ms: u128) {
        info!(
            event = "schedule_batch_committed",
            batch.considered = considered,
            batch.created = created,
            batch.duration_ms = duration_ms as u64,
            "Processed {} schedules and created {} tasks.",
            considered,
            created
        );
    }

    pub fn log_dispatch_failed(task_count: usize, error: &str) {
        warn!(
            event = "dispatch_failed",
            dispatch.count = task_count,
            error.message = error,
            "Tasks committed but not enqueued, reconciler will retry"
        );
    }

    pub fn log_task_execution_start(task_id: i64, worker_id: &str, attempt: u32) {
        info!(
            event = "task_execution_start",
            task.id = task_id,
            worker.id = worker_id,
            dispatch.attempt = attempt,
            "Task execution started"
        );
    }

    pub fn log_task_execution_complete(task_id: i64, status: &str, duration_ms: u64) {
        info!(
            event = "task_execution_complete",
            task.id = task_id,
            task.status = status,
            execution.duration_ms = duration_ms,
            "Task execution completed"
        );
    }

    pub fn log_task_retry_scheduled(task_id: i64, attempt: u32, delay_ms: u64, error: &str) {
        warn!(
            event = "task_retry_scheduled",
            task.id = task_id,
            dispatch.attempt = attempt,
            retry.delay_ms = delay_ms,
            error.message = error,
            "Task execution failed on infrastructure error, retry scheduled"
        );
    }

    pub fn log_task_abandoned(task_id: i64, attempts: u32, error: &str) {
        error!(
            event = "task_abandoned",
            task.id = task_id,
            dispatch.attempts = attempts,
            error.message = error,
            "Task abandoned after exhausting retries"
        );
    }
}
