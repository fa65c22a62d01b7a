//! 执行端：消费投递队列，计算任务并写回结果。

pub mod executor;
pub mod retry;
pub mod service;

pub use executor::{ExecutionOutcome, TaskExecutor};
pub use retry::RetryPolicy;
pub use service::{WorkerService, WorkerServiceBuilder};
