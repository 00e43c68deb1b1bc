//! Runtime handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use quay_types::RuntimeStatus;

/// Start the active release
pub async fn start_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Json<RuntimeStatus>> {
    Ok(Json(state.engine.start_service(&service).await?))
}

/// Stop the running process
pub async fn stop_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Json<RuntimeStatus>> {
    Ok(Json(state.engine.stop_service(&service).await?))
}

/// Restart the running process in place
pub async fn restart_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Json<RuntimeStatus>> {
    Ok(Json(state.engine.restart_service(&service).await?))
}

/// Live status from the supervisor
pub async fn service_status(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Json<RuntimeStatus>> {
    Ok(Json(state.engine.service_status(&service).await?))
}
