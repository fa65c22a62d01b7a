use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::IntoResponse,
    Json,
};

use arith_domain::TaskDraft;

use crate::{
    error::ApiResult,
    response::{accepted, no_content, success},
    routes::AppState,
};

/// 创建任务
pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<TaskDraft>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(draft) = payload?;
    let task = state.task_service.create_task(draft).await?;
    Ok(accepted(task, "任务已受理"))
}

/// 批量创建任务，任何一项无效则全部不创建
pub async fn create_tasks_batch(
    State(state): State<AppState>,
    payload: Result<Json<Vec<TaskDraft>>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(drafts) = payload?;
    let tasks = state.task_service.create_tasks(drafts).await?;
    let message = format!("已受理 {} 个任务", tasks.len());
    Ok(accepted(tasks, message))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let task = state.task_service.get_task(id).await?;
    Ok(success(task))
}

/// 删除任务，仅限 PENDING
pub async fn delete_task(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    state.task_service.delete_task(id).await?;
    Ok(no_content())
}
