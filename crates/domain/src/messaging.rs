//! 任务投递队列抽象

use async_trait::async_trait;
use tracing::warn;

use crate::entities::TaskDispatch;
use arith_core::SchedulerResult;

/// 生产端：提交 (task_id, priority)，至少投递一次
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    async fn enqueue(&self, dispatch: TaskDispatch) -> SchedulerResult<()>;

    /// 逐条提交，单条失败不影响其余条目，返回第一个错误
    async fn enqueue_batch(&self, dispatches: Vec<TaskDispatch>) -> SchedulerResult<()> {
        let mut first_error = None;
        for dispatch in dispatches {
            if let Err(e) = self.enqueue(dispatch).await {
                warn!(task_id = dispatch.task_id, error = %e, "任务入队失败");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 消费端：阻塞等待下一条消息，队列关闭时返回 `None`
#[async_trait]
pub trait DispatchConsumer: Send + Sync {
    async fn receive(&self) -> SchedulerResult<Option<Delivery>>;
}

/// 消息确认
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(self: Box<Self>) -> SchedulerResult<()>;

    async fn nack(self: Box<Self>, requeue: bool) -> SchedulerResult<()>;
}

/// 一条待处理的消息
pub struct Delivery {
    pub dispatch: TaskDispatch,
    acknowledger: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(dispatch: TaskDispatch, acknowledger: Box<dyn Acknowledger>) -> Self {
        Self {
            dispatch,
            acknowledger,
        }
    }

    pub async fn ack(self) -> SchedulerResult<()> {
        self.acknowledger.ack().await
    }

    pub async fn nack(self, requeue: bool) -> SchedulerResult<()> {
        self.acknowledger.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}
