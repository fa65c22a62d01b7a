use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{debug, info, instrument, warn};

use arith_core::SchedulerResult;
use arith_domain::{
    DispatchQueue, DueCheckChain, NewTask, PriorityResolver, ScheduleBatch, ScheduleBatchStore,
    TaskDispatch,
};
use arith_infrastructure::{MetricsCollector, StructuredLogger};

pub const DEFAULT_BATCH_LIMIT: i64 = 100;

/// 一次批量调度的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub schedules_considered: usize,
    pub tasks_created: usize,
    /// 提交后交给投递队列的任务
    pub dispatches: Vec<TaskDispatch>,
}

/// 批量调度器
///
/// 在一个事务中锁定到期计划、创建任务并递减剩余次数；事务提交后才把新任务入队。
pub struct BatchScheduler {
    store: Arc<dyn ScheduleBatchStore>,
    queue: Arc<dyn DispatchQueue>,
    priority: Arc<dyn PriorityResolver>,
    due_checks: DueCheckChain,
    batch_limit: i64,
    metrics: Arc<MetricsCollector>,
}

impl BatchScheduler {
    pub fn new(
        store: Arc<dyn ScheduleBatchStore>,
        queue: Arc<dyn DispatchQueue>,
        priority: Arc<dyn PriorityResolver>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            queue,
            priority,
            due_checks: DueCheckChain::standard(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            metrics,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: i64) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    pub fn with_due_checks(mut self, due_checks: DueCheckChain) -> Self {
        self.due_checks = due_checks;
        self
    }

    pub fn batch_limit(&self) -> i64 {
        self.batch_limit
    }

    pub async fn process_due_schedules(&self) -> SchedulerResult<BatchReport> {
        self.process_due_schedules_at(Utc::now()).await
    }

    /// 以 `now` 作为当前时间处理一批计划
    ///
    /// 任何一步失败都会回滚整个批次，计划的剩余次数和检查时间保持不变。
    #[instrument(skip(self), fields(batch_limit = self.batch_limit))]
    pub async fn process_due_schedules_at(&self, now: DateTime<Utc>) -> SchedulerResult<BatchReport> {
        let started = Instant::now();
        let mut batch = self.store.begin().await?;

        let report = match self.fill_batch(batch.as_mut(), now).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "批量调度失败，回滚事务");
                if let Err(rollback_err) = batch.rollback().await {
                    warn!(error = %rollback_err, "回滚批量调度事务失败");
                }
                return Err(e);
            }
        };

        if !report.dispatches.is_empty() {
            let queue = Arc::clone(&self.queue);
            let metrics = Arc::clone(&self.metrics);
            let dispatches = report.dispatches.clone();
            batch.on_commit(Box::new(move || {
                async move {
                    let count = dispatches.len();
                    if let Err(e) = queue.enqueue_batch(dispatches).await {
                        metrics.record_dispatch_failure();
                        StructuredLogger::log_dispatch_failed(count, &e.to_string());
                    }
                }
                .boxed()
            }));
        }

        batch.commit().await?;

        let elapsed = started.elapsed();
        self.metrics.record_schedule_batch(
            report.schedules_considered,
            report.tasks_created,
            elapsed.as_secs_f64(),
        );
        StructuredLogger::log_schedule_batch_committed(
            report.schedules_considered,
            report.tasks_created,
            elapsed.as_millis(),
        );
        Ok(report)
    }

    async fn fill_batch(
        &self,
        batch: &mut dyn ScheduleBatch,
        now: DateTime<Utc>,
    ) -> SchedulerResult<BatchReport> {
        let schedules = batch.lock_due_schedules(self.batch_limit).await?;
        let mut report = BatchReport {
            schedules_considered: schedules.len(),
            ..BatchReport::default()
        };

        for schedule in &schedules {
            let id = schedule.task_schedule_id;
            let last_task = batch.latest_task(id).await?;

            if !self.due_checks.is_due_at(schedule, last_task.as_ref(), now) {
                batch.touch(id, now).await?;
                debug!(task_schedule_id = id, "计划未到期");
                continue;
            }

            let priority = self.priority.resolve(schedule.priority);
            let task = batch
                .insert_task(
                    &NewTask::new(schedule.operation.clone(), priority)
                        .for_schedule(id)
                        .created_at(now),
                )
                .await?;
            batch.consume_run(id, now).await?;

            StructuredLogger::log_task_created(task.task_id, task.priority, task.task_schedule_id);
            report.dispatches.push(task.dispatch());
        }

        report.tasks_created = report.dispatches.len();
        if report.schedules_considered > 0 {
            info!(
                considered = report.schedules_considered,
                created = report.tasks_created,
                "批量调度已完成评估"
            );
        }
        Ok(report)
    }
}
