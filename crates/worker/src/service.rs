use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use arith_core::{SchedulerError, SchedulerResult};
use arith_domain::{Delivery, DispatchConsumer, DispatchQueue};
use arith_infrastructure::{MetricsCollector, StructuredLogger};

use crate::executor::{ExecutionOutcome, TaskExecutor};
use crate::retry::RetryPolicy;

/// 接收消息失败后的等待时间
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    consumer: Arc<dyn DispatchConsumer>,
    queue: Arc<dyn DispatchQueue>,
    executor: Arc<TaskExecutor>,
    max_concurrent_tasks: usize,
    retry_policy: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl WorkerServiceBuilder {
    pub fn new(
        consumer: Arc<dyn DispatchConsumer>,
        queue: Arc<dyn DispatchQueue>,
        executor: Arc<TaskExecutor>,
    ) -> Self {
        Self {
            consumer,
            queue,
            executor,
            max_concurrent_tasks: 4,
            retry_policy: RetryPolicy::default(),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// 设置最大并发任务数
    pub fn max_concurrent_tasks(mut self, max_concurrent_tasks: usize) -> Self {
        self.max_concurrent_tasks = max_concurrent_tasks.max(1);
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> WorkerService {
        WorkerService {
            consumer: self.consumer,
            queue: self.queue,
            executor: self.executor,
            max_concurrent_tasks: self.max_concurrent_tasks,
            permits: Arc::new(Semaphore::new(self.max_concurrent_tasks)),
            retry_policy: self.retry_policy,
            metrics: self.metrics,
        }
    }
}

/// Worker服务
///
/// 从投递队列取消息，最多同时执行 `max_concurrent_tasks` 个任务。
/// 执行结束（包括任务已删除或已处理）后确认消息；存储不可用时
/// 按退避策略以 `attempt + 1` 重新入队，超过次数后放弃。
#[derive(Clone)]
pub struct WorkerService {
    consumer: Arc<dyn DispatchConsumer>,
    queue: Arc<dyn DispatchQueue>,
    executor: Arc<TaskExecutor>,
    max_concurrent_tasks: usize,
    permits: Arc<Semaphore>,
    retry_policy: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl WorkerService {
    pub fn builder(
        consumer: Arc<dyn DispatchConsumer>,
        queue: Arc<dyn DispatchQueue>,
        executor: Arc<TaskExecutor>,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(consumer, queue, executor)
    }

    pub fn worker_id(&self) -> &str {
        self.executor.worker_id()
    }

    /// 正在执行的任务数
    pub fn running_tasks(&self) -> usize {
        self.max_concurrent_tasks - self.permits.available_permits()
    }

    /// 消费循环，收到关闭信号或队列关闭后等待在途任务结束再返回
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> SchedulerResult<()> {
        info!(
            worker_id = self.worker_id(),
            max_concurrent_tasks = self.max_concurrent_tasks,
            "Worker服务已启动"
        );

        loop {
            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => permit
                    .map_err(|e| SchedulerError::Internal(format!("并发许可已关闭: {e}")))?,
                _ = shutdown_rx.recv() => break,
            };

            let received = tokio::select! {
                received = self.consumer.receive() => received,
                _ = shutdown_rx.recv() => break,
            };

            match received {
                Ok(Some(delivery)) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.handle_delivery(delivery).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    info!(worker_id = self.worker_id(), "投递队列已关闭");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "接收任务消息失败");
                    drop(permit);
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
        }

        self.drain().await;
        info!(worker_id = self.worker_id(), "Worker服务已停止");
        Ok(())
    }

    async fn drain(&self) {
        let total = u32::try_from(self.max_concurrent_tasks).unwrap_or(u32::MAX);
        if let Ok(all) = self.permits.acquire_many(total).await {
            drop(all);
        }
    }

    /// 处理一条消息并确认
    pub async fn handle_delivery(&self, delivery: Delivery) {
        let dispatch = delivery.dispatch;

        let settle = match self.executor.execute(dispatch).await {
            Ok(outcome) => {
                if let ExecutionOutcome::Failed(cause) = &outcome {
                    debug!(task_id = dispatch.task_id, cause = %cause, "任务执行结果为ERROR");
                }
                delivery.ack().await
            }
            Err(e) if e.is_retryable() && self.retry_policy.should_retry(dispatch.attempt) => {
                let delay = self.retry_policy.delay_for(dispatch.attempt);
                self.metrics.record_task_retry();
                StructuredLogger::log_task_retry_scheduled(
                    dispatch.task_id,
                    dispatch.attempt + 1,
                    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    &e.to_string(),
                );
                tokio::time::sleep(delay).await;

                match self.queue.enqueue(dispatch.next_attempt()).await {
                    Ok(()) => delivery.ack().await,
                    Err(enqueue_err) => {
                        warn!(
                            task_id = dispatch.task_id,
                            error = %enqueue_err,
                            "重新入队失败，退回原消息"
                        );
                        delivery.nack(true).await
                    }
                }
            }
            Err(e) => {
                StructuredLogger::log_task_abandoned(
                    dispatch.task_id,
                    dispatch.attempt + 1,
                    &e.to_string(),
                );
                delivery.ack().await
            }
        };

        if let Err(e) = settle {
            error!(task_id = dispatch.task_id, error = %e, "确认任务消息失败");
        }
    }
}
