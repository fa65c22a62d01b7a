use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

use arith_core::{SchedulerError, SchedulerResult};
use arith_domain::{Acknowledger, Delivery, DispatchConsumer, DispatchQueue, TaskDispatch};

/// 内存优先级队列
///
/// 高优先级先出队，同优先级按入队顺序。消息在确认前不会丢失：
/// `nack(requeue = true)` 会把它放回队列。仅在单进程部署与测试中使用。
#[derive(Debug, Clone, Default)]
pub struct InMemoryDispatchQueue {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    heap: Mutex<BinaryHeap<QueuedDispatch>>,
    notify: Notify,
    sequence: AtomicU64,
    closed: AtomicBool,
    in_flight: AtomicU64,
}

#[derive(Debug, PartialEq, Eq)]
struct QueuedDispatch {
    dispatch: TaskDispatch,
    sequence: u64,
}

impl Ord for QueuedDispatch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dispatch
            .priority
            .cmp(&other.dispatch.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedDispatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Inner {
    fn heap(&self) -> MutexGuard<'_, BinaryHeap<QueuedDispatch>> {
        match self.heap.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn push(&self, dispatch: TaskDispatch) {
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap().push(QueuedDispatch { dispatch, sequence });
        self.notify.notify_one();
    }
}

impl InMemoryDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 等待中的消息数
    pub fn len(&self) -> usize {
        self.inner.heap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已出队但尚未确认的消息数
    pub fn in_flight(&self) -> u64 {
        self.inner.in_flight.load(AtomicOrdering::SeqCst)
    }

    /// 按出队顺序返回当前排队的消息，不改变队列
    pub fn snapshot(&self) -> Vec<TaskDispatch> {
        let mut items: Vec<_> = self
            .inner
            .heap()
            .iter()
            .map(|q| (q.dispatch.priority, q.sequence, q.dispatch))
            .collect();
        items.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        items.into_iter().map(|(_, _, d)| d).collect()
    }

    /// 立即取出一条消息，队列为空时返回 `None`
    pub fn try_receive(&self) -> Option<Delivery> {
        let queued = self.inner.heap().pop()?;
        self.inner.in_flight.fetch_add(1, AtomicOrdering::SeqCst);
        Some(Delivery::new(
            queued.dispatch,
            Box::new(InMemoryAcknowledger {
                inner: Arc::clone(&self.inner),
                dispatch: queued.dispatch,
            }),
        ))
    }

    /// 关闭后入队失败，消费者取完剩余消息后收到 `None`
    pub fn close(&self) {
        self.inner.closed.store(true, AtomicOrdering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl DispatchQueue for InMemoryDispatchQueue {
    async fn enqueue(&self, dispatch: TaskDispatch) -> SchedulerResult<()> {
        if self.is_closed() {
            return Err(SchedulerError::MessageQueue("内存队列已关闭".to_string()));
        }
        self.inner.push(dispatch);
        debug!(
            task_id = dispatch.task_id,
            priority = dispatch.priority,
            attempt = dispatch.attempt,
            "Dispatch enqueued in memory"
        );
        Ok(())
    }
}

#[async_trait]
impl DispatchConsumer for InMemoryDispatchQueue {
    async fn receive(&self) -> SchedulerResult<Option<Delivery>> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_receive() {
                return Ok(Some(delivery));
            }
            if self.is_closed() {
                return Ok(None);
            }
            notified.await;
        }
    }
}

struct InMemoryAcknowledger {
    inner: Arc<Inner>,
    dispatch: TaskDispatch,
}

#[async_trait]
impl Acknowledger for InMemoryAcknowledger {
    async fn ack(self: Box<Self>) -> SchedulerResult<()> {
        self.inner.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> SchedulerResult<()> {
        self.inner.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
        if requeue {
            self.inner.push(self.dispatch);
        }
        Ok(())
    }
}
