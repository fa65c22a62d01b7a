use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use arith_core::SchedulerError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("服务不可用: {0}")]
    Unavailable(String),

    #[error("请求处理超时")]
    Timeout,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str, Vec<String>) {
        match self {
            ApiError::Scheduler(SchedulerError::TaskNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("任务 ID {id} 不存在"),
                "TASK_NOT_FOUND",
                vec!["请检查任务ID是否正确".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::TaskScheduleNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("任务计划 ID {id} 不存在"),
                "TASK_SCHEDULE_NOT_FOUND",
                vec!["请检查任务计划ID是否正确".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::Validation(msg)) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
                "VALIDATION_ERROR",
                vec![
                    "operation 必须形如 1+2 或 1.5+2.25".to_string(),
                    "priority 必须是 0 到 9 的整数，或者不填".to_string(),
                ],
            ),
            ApiError::Scheduler(err @ SchedulerError::TaskNotDeletable { .. }) => (
                StatusCode::BAD_REQUEST,
                err.to_string(),
                "TASK_NOT_DELETABLE",
                vec!["任务开始执行后不能删除".to_string()],
            ),
            ApiError::Scheduler(
                SchedulerError::Database(_)
                | SchedulerError::DatabaseOperation(_)
                | SchedulerError::MessageQueue(_),
            ) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "存储或队列暂不可用".to_string(),
                "SERVICE_UNAVAILABLE",
                vec![
                    "请稍后重试".to_string(),
                    "查看 GET /health 检查系统状态".to_string(),
                ],
            ),
            ApiError::Scheduler(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec!["系统遇到内部错误，请稍后重试".to_string()],
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
                "BAD_REQUEST",
                vec!["请检查JSON格式及字段类型是否正确".to_string()],
            ),
            ApiError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg.clone(),
                "SERVICE_UNAVAILABLE",
                vec!["请稍后重试".to_string()],
            ),
            ApiError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                "请求处理超时".to_string(),
                "REQUEST_TIMEOUT",
                vec!["请稍后重试".to_string()],
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error_type, suggestions) = self.parts();
        if status.is_server_error() {
            error!(error = %self, "请求处理失败");
        }

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
