use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::IntoResponse,
    Json,
};

use arith_domain::TaskScheduleDraft;

use crate::{
    error::ApiResult,
    response::{accepted, no_content, success},
    routes::AppState,
};

/// 创建任务计划
pub async fn create_task_schedule(
    State(state): State<AppState>,
    payload: Result<Json<TaskScheduleDraft>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(draft) = payload?;
    let schedule = state.task_schedule_service.create_schedule(draft).await?;
    Ok(accepted(schedule, "任务计划已创建"))
}

/// 获取任务计划及其已创建的任务
pub async fn get_task_schedule(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let detail = state.task_schedule_service.get_schedule(id).await?;
    Ok(success(detail))
}

/// 删除任务计划，其任务保留并解除关联
pub async fn delete_task_schedule(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    state.task_schedule_service.delete_schedule(id).await?;
    Ok(no_content())
}
