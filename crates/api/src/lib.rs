//! # Arith API
//!
//! 算术任务与任务计划的 REST 接口，基于 Axum。
//!
//! ## API 端点
//!
//! - `GET /health` - 健康检查（存储不可用时返回 503）
//! - `POST /api/tasks` - 创建任务
//! - `POST /api/tasks/batch` - 批量创建任务，全部成功或全部失败
//! - `GET /api/tasks/{id}` - 获取任务
//! - `DELETE /api/tasks/{id}` - 删除 PENDING 任务
//! - `POST /api/task-schedules` - 创建任务计划
//! - `GET /api/task-schedules/{id}` - 获取任务计划及其任务
//! - `DELETE /api/task-schedules/{id}` - 删除任务计划

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::time::Duration;

use arith_core::ApiConfig;
use axum::Router;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use routes::{create_routes, AppState};

/// 带中间件的完整应用
pub fn create_app(state: AppState, config: &ApiConfig) -> Router {
    let timeout = Duration::from_secs(config.request_timeout_seconds);
    let mut app = create_routes(state)
        .layer(axum::middleware::from_fn_with_state(
            timeout,
            middleware::request_timeout,
        ))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(middleware::trace_layer());

    if config.cors_enabled {
        app = app.layer(middleware::cors_layer(&config.cors_origins));
    }
    app
}
