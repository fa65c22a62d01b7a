//! 基础设施层：数据库存储、任务投递队列与可观测性。

pub mod database;
pub mod in_memory_queue;
pub mod message_queue;
pub mod message_queue_factory;
pub mod observability;

pub use database::*;
pub use in_memory_queue::InMemoryDispatchQueue;
pub use message_queue::RabbitMqDispatchQueue;
pub use message_queue_factory::{DispatchChannels, MessageQueueFactory};
pub use observability::{MetricsCollector, StructuredLogger};
