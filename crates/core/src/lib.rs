//! 算术任务调度系统的核心公共组件：错误类型、配置模型与日志初始化。

pub mod config;
pub mod errors;
pub mod logging;

pub use config::models::{
    ApiConfig, AppConfig, DatabaseConfig, DispatcherConfig, MessageQueueConfig,
    MessageQueueType, ObservabilityConfig, WorkerConfig,
};
pub use errors::{SchedulerError, SchedulerResult};
