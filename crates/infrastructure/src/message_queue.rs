use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    acker::Acker,
    message::Delivery as AmqpDelivery,
    options::*,
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, Queue,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use arith_core::{MessageQueueConfig, SchedulerError, SchedulerResult};
use arith_domain::{Acknowledger, Delivery, DispatchConsumer, DispatchQueue, TaskDispatch};

/// RabbitMQ任务投递队列
///
/// 队列声明了 `x-max-priority`，消息携带任务优先级；发布使用publisher confirm，
/// 消费端手动确认，未确认的消息在连接断开后由broker重新投递。
pub struct RabbitMqDispatchQueue {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    consumer: Mutex<Option<Consumer>>,
    config: MessageQueueConfig,
    consumer_tag: String,
    prefetch_count: u16,
}

impl RabbitMqDispatchQueue {
    /// 创建新的RabbitMQ队列实例
    pub async fn new(
        config: MessageQueueConfig,
        consumer_tag: impl Into<String>,
        prefetch_count: u16,
    ) -> SchedulerResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("创建通道失败: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("启用发布确认失败: {e}")))?;

        info!("成功连接到RabbitMQ，任务队列: {}", config.task_queue);

        let queue = Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
            consumer: Mutex::new(None),
            config,
            consumer_tag: consumer_tag.into(),
            prefetch_count: prefetch_count.max(1),
        };

        queue.declare_task_queue().await?;
        Ok(queue)
    }

    /// 声明持久化的优先级队列
    async fn declare_task_queue(&self) -> SchedulerResult<Queue> {
        let channel = self.channel.lock().await;

        let mut arguments = FieldTable::default();
        arguments.insert(
            "x-max-priority".into(),
            AMQPValue::LongInt(i32::from(self.config.max_priority)),
        );

        let queue = channel
            .queue_declare(
                &self.config.task_queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                arguments,
            )
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!(
                    "声明队列 {} 失败: {e}",
                    self.config.task_queue
                ))
            })?;

        debug!("队列 {} 声明成功", self.config.task_queue);
        Ok(queue)
    }

    async fn create_consumer(&self) -> SchedulerResult<Consumer> {
        let channel = self.channel.lock().await;
        channel
            .basic_qos(self.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("设置预取数量失败: {e}")))?;

        let consumer = channel
            .basic_consume(
                &self.config.task_queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("创建消费者失败: {e}")))?;

        debug!(
            "为队列 {} 创建消费者: {}",
            self.config.task_queue, self.consumer_tag
        );
        Ok(consumer)
    }

    /// 获取连接状态
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// 关闭连接
    pub async fn close(&self) -> SchedulerResult<()> {
        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}

#[async_trait]
impl DispatchQueue for RabbitMqDispatchQueue {
    async fn enqueue(&self, dispatch: TaskDispatch) -> SchedulerResult<()> {
        let payload = serde_json::to_vec(&dispatch)
            .map_err(|e| SchedulerError::Serialization(format!("序列化任务消息失败: {e}")))?;

        let channel = self.channel.lock().await;
        let confirm = channel
            .basic_publish(
                "",
                &self.config.task_queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_priority(dispatch.priority)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!(
                    "发布任务 {} 到队列 {} 失败: {e}",
                    dispatch.task_id, self.config.task_queue
                ))
            })?;

        let confirmation = confirm
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("消息发布确认失败: {e}")))?;
        if confirmation.is_nack() {
            return Err(SchedulerError::MessageQueue(format!(
                "broker拒绝了任务 {} 的消息",
                dispatch.task_id
            )));
        }

        debug!(
            task_id = dispatch.task_id,
            priority = dispatch.priority,
            "任务消息已发布"
        );
        Ok(())
    }
}

#[async_trait]
impl DispatchConsumer for RabbitMqDispatchQueue {
    async fn receive(&self) -> SchedulerResult<Option<Delivery>> {
        let mut guard = self.consumer.lock().await;
        if guard.is_none() {
            *guard = Some(self.create_consumer().await?);
        }

        loop {
            let next = match guard.as_mut() {
                Some(consumer) => consumer.next().await,
                None => return Ok(None),
            };
            let delivery: AmqpDelivery = match next {
                None => return Ok(None),
                Some(Err(e)) => {
                    *guard = None;
                    return Err(SchedulerError::MessageQueue(format!("接收消息失败: {e}")));
                }
                Some(Ok(delivery)) => delivery,
            };

            match serde_json::from_slice::<TaskDispatch>(&delivery.data) {
                Ok(dispatch) => {
                    return Ok(Some(Delivery::new(
                        dispatch,
                        Box::new(RabbitMqAcknowledger {
                            acker: delivery.acker,
                        }),
                    )));
                }
                Err(e) => {
                    warn!(error = %e, "无法解析的任务消息，直接丢弃");
                    delivery
                        .acker
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await
                        .map_err(|e| SchedulerError::MessageQueue(format!("拒绝消息失败: {e}")))?;
                }
            }
        }
    }
}

struct RabbitMqAcknowledger {
    acker: Acker,
}

#[async_trait]
impl Acknowledger for RabbitMqAcknowledger {
    async fn ack(self: Box<Self>) -> SchedulerResult<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| SchedulerError::MessageQueue(format!("确认消息失败: {e}")))
    }

    async fn nack(self: Box<Self>, requeue: bool) -> SchedulerResult<()> {
        self.acker
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|e| SchedulerError::MessageQueue(format!("拒绝消息失败: {e}")))
    }
}
