use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{error::ApiError, routes::AppState};

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .task_service
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("数据库不可用: {e}")))?;

    Ok(Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "arith-scheduler",
        "version": env!("CARGO_PKG_VERSION")
    })))
}
