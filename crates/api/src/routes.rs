use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use arith_domain::{TaskScheduleService, TaskService};

use crate::handlers::{
    health::health_check,
    task_schedules::{create_task_schedule, delete_task_schedule, get_task_schedule},
    tasks::{create_task, create_tasks_batch, delete_task, get_task},
};

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub task_service: Arc<TaskService>,
    pub task_schedule_service: Arc<TaskScheduleService>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/batch", post(create_tasks_batch))
        .route("/api/tasks/{id}", get(get_task).delete(delete_task))
        .route("/api/task-schedules", post(create_task_schedule))
        .route(
            "/api/task-schedules/{id}",
            get(get_task_schedule).delete(delete_task_schedule),
        )
        .with_state(state)
}
