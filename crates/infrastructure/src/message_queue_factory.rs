use std::sync::Arc;
use tracing::{debug, info};

use arith_core::{MessageQueueConfig, MessageQueueType, SchedulerResult};
use arith_domain::{DispatchConsumer, DispatchQueue};

use crate::{InMemoryDispatchQueue, RabbitMqDispatchQueue};

/// 同一队列的生产端与消费端
#[derive(Clone)]
pub struct DispatchChannels {
    pub queue: Arc<dyn DispatchQueue>,
    pub consumer: Arc<dyn DispatchConsumer>,
}

impl DispatchChannels {
    pub fn in_memory(queue: InMemoryDispatchQueue) -> Self {
        Self {
            queue: Arc::new(queue.clone()),
            consumer: Arc::new(queue),
        }
    }
}

pub struct MessageQueueFactory;

impl MessageQueueFactory {
    /// 按配置创建投递队列
    ///
    /// `consumer_tag` 和 `prefetch_count` 只对 RabbitMQ 有意义。
    pub async fn create(
        config: &MessageQueueConfig,
        consumer_tag: &str,
        prefetch_count: u16,
    ) -> SchedulerResult<DispatchChannels> {
        debug!("Creating dispatch queue with type: {:?}", config.r#type);

        match config.r#type {
            MessageQueueType::InMemory => {
                info!("Initializing in-memory dispatch queue");
                Ok(DispatchChannels::in_memory(InMemoryDispatchQueue::new()))
            }
            MessageQueueType::Rabbitmq => {
                info!("Initializing RabbitMQ dispatch queue");
                let rabbitmq = Arc::new(
                    RabbitMqDispatchQueue::new(config.clone(), consumer_tag, prefetch_count)
                        .await?,
                );
                Ok(DispatchChannels {
                    queue: rabbitmq.clone(),
                    consumer: rabbitmq,
                })
            }
        }
    }
}
