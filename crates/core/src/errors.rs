use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("任务计划未找到: {id}")]
    TaskScheduleNotFound { id: i64 },

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("任务 {id} 当前状态为 {status}，只有 PENDING 状态的任务可以删除")]
    TaskNotDeletable { id: i64, status: String },

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// 基础设施类错误可以通过重新投递恢复，业务类错误不可以
    pub fn is_retryable(&self) -> bool {
        match self {
            SchedulerError::Database(e) => !matches!(e, sqlx::Error::RowNotFound),
            SchedulerError::DatabaseOperation(_) | SchedulerError::MessageQueue(_) => true,
            SchedulerError::TaskNotFound { .. }
            | SchedulerError::TaskScheduleNotFound { .. }
            | SchedulerError::Validation(_)
            | SchedulerError::TaskNotDeletable { .. }
            | SchedulerError::Serialization(_)
            | SchedulerError::Configuration(_)
            | SchedulerError::Internal(_) => false,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SchedulerError::Validation(message.into())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}
