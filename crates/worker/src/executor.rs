use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use arith_core::SchedulerResult;
use arith_domain::operation::{evaluate_operation, OperationError};
use arith_domain::{TaskDispatch, TaskOutcome, TaskRepository, TaskStatus};
use arith_infrastructure::{MetricsCollector, StructuredLogger};

/// 终态写入失败时的重试次数
const MAX_PERSIST_ATTEMPTS: u32 = 3;

/// 一次执行的结果，全部视为已处理（消息可以确认）
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// 任务在排队期间被删除
    Missing,
    /// 任务不处于可执行状态，重复投递
    AlreadyHandled(TaskStatus),
    Succeeded(f64),
    Failed(String),
}

/// 任务执行状态机：PENDING → STARTED → SUCCESS | ERROR
pub struct TaskExecutor {
    tasks: Arc<dyn TaskRepository>,
    worker_id: String,
    execution_timeout: Duration,
    processing_delay: Duration,
    metrics: Arc<MetricsCollector>,
}

impl TaskExecutor {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        worker_id: impl Into<String>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            tasks,
            worker_id: worker_id.into(),
            execution_timeout: Duration::from_secs(30),
            processing_delay: Duration::ZERO,
            metrics,
        }
    }

    pub fn with_execution_timeout(mut self, execution_timeout: Duration) -> Self {
        self.execution_timeout = execution_timeout;
        self
    }

    pub fn with_processing_delay(mut self, processing_delay: Duration) -> Self {
        self.processing_delay = processing_delay;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 执行一条投递
    ///
    /// 只有 PENDING 任务会被计算。例外是重投（`attempt > 0`）时遇到的 STARTED：
    /// 上一次执行在写回终态前失败，这里接着完成它。
    /// 返回 `Err` 表示存储不可用，调用方按重试策略重投。
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn execute(&self, dispatch: TaskDispatch) -> SchedulerResult<ExecutionOutcome> {
        let task_id = dispatch.task_id;
        let Some(task) = self.tasks.find_by_id(task_id).await? else {
            info!(task_id, "任务已不存在，跳过执行");
            return Ok(ExecutionOutcome::Missing);
        };

        match task.status {
            TaskStatus::Pending => {
                if !self.tasks.mark_started(task_id).await? {
                    return self.current_state(task_id).await;
                }
            }
            TaskStatus::Started if dispatch.attempt > 0 => {
                warn!(task_id, attempt = dispatch.attempt, "恢复上次未写回结果的任务");
            }
            status => {
                debug!(task_id, status = %status, "任务已被处理，忽略重复投递");
                return Ok(ExecutionOutcome::AlreadyHandled(status));
            }
        }

        StructuredLogger::log_task_execution_start(task_id, &self.worker_id, dispatch.attempt);
        let started = Instant::now();

        let outcome = match tokio::time::timeout(self.execution_timeout, self.compute(&task.operation))
            .await
        {
            Ok(Ok(value)) => TaskOutcome::Success(value),
            Ok(Err(e)) => TaskOutcome::Error(e.to_string()),
            Err(_) => TaskOutcome::Error(format!(
                "execution timed out after {}s",
                self.execution_timeout.as_secs_f64()
            )),
        };

        self.persist(task_id, &outcome).await?;

        let elapsed = started.elapsed();
        let status = outcome.status();
        self.metrics
            .record_task_execution(status.as_str(), elapsed.as_secs_f64());
        StructuredLogger::log_task_execution_complete(
            task_id,
            status.as_str(),
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        );

        Ok(match outcome {
            TaskOutcome::Success(value) => ExecutionOutcome::Succeeded(value),
            TaskOutcome::Error(cause) => ExecutionOutcome::Failed(cause),
        })
    }

    async fn compute(&self, operation: &str) -> Result<f64, OperationError> {
        if !self.processing_delay.is_zero() {
            tokio::time::sleep(self.processing_delay).await;
        }
        evaluate_operation(operation)
    }

    /// 写回终态，失败时指数退避重试
    async fn persist(&self, task_id: i64, outcome: &TaskOutcome) -> SchedulerResult<()> {
        let mut attempt = 0;
        loop {
            match self.tasks.finish(task_id, outcome).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    warn!(task_id, "任务状态已被其他执行者更新，结果未写入");
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_PERSIST_ATTEMPTS || !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(
                        task_id,
                        attempt,
                        error = %e,
                        "写入任务结果失败 (重试 {}/{})",
                        attempt,
                        MAX_PERSIST_ATTEMPTS
                    );
                    tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                }
            }
        }
    }

    async fn current_state(&self, task_id: i64) -> SchedulerResult<ExecutionOutcome> {
        Ok(match self.tasks.find_by_id(task_id).await? {
            None => ExecutionOutcome::Missing,
            Some(task) => {
                debug!(task_id, status = %task.status, "任务已被其他执行者领取");
                ExecutionOutcome::AlreadyHandled(task.status)
            }
        })
    }
}
