use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use arith_core::SchedulerResult;
use arith_domain::{DispatchQueue, Task, TaskRepository};
use arith_infrastructure::MetricsCollector;

/// 补偿投递
///
/// 任务行已提交但入队失败（或进程在两者之间崩溃）时，任务会一直停在 PENDING。
/// 这里周期性地领取超过宽限期仍未执行的任务并重新入队；重复投递由执行端的状态检查吸收。
pub struct PendingTaskReconciler {
    tasks: Arc<dyn TaskRepository>,
    queue: Arc<dyn DispatchQueue>,
    grace_period: Duration,
    batch_limit: i64,
    metrics: Arc<MetricsCollector>,
}

impl PendingTaskReconciler {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        queue: Arc<dyn DispatchQueue>,
        grace_period: Duration,
        batch_limit: i64,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            tasks,
            queue,
            grace_period,
            batch_limit,
            metrics,
        }
    }

    pub async fn reconcile(&self) -> SchedulerResult<usize> {
        self.reconcile_at(Utc::now()).await
    }

    /// 返回重新入队的任务数
    #[instrument(skip(self))]
    pub async fn reconcile_at(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let cutoff = now - self.grace_period;
        let stale = self
            .tasks
            .claim_stale_pending(cutoff, now, self.batch_limit)
            .await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let count = stale.len();
        if let Err(e) = self
            .queue
            .enqueue_batch(stale.iter().map(Task::dispatch).collect())
            .await
        {
            self.metrics.record_dispatch_failure();
            warn!(error = %e, count, "补偿投递入队失败，下个周期重试");
            return Err(e);
        }

        self.metrics.record_tasks_reconciled(count);
        info!(count, "滞留的PENDING任务已重新入队");
        Ok(count)
    }
}
