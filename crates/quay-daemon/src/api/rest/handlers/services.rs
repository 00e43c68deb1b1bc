//! Service management handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use quay_types::{EnvPayload, ServiceView};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Create service request
#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Replace environment request
#[derive(Debug, Deserialize)]
pub struct UpdateEnvRequest {
    pub env: BTreeMap<String, String>,
}

/// List all services with status and active release
pub async fn list_services(State(state): State<AppState>) -> Json<Vec<ServiceView>> {
    Json(state.engine.services().await)
}

/// Create a new service
pub async fn create_service(
    State(state): State<AppState>,
    Json(req): Json<CreateServiceRequest>,
) -> ApiResult<(StatusCode, Json<ServiceView>)> {
    let view = state.engine.create_service(&req.name, req.env).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Get a specific service
pub async fn get_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Json<ServiceView>> {
    Ok(Json(state.engine.service(&service).await?))
}

/// Replace a service's environment
pub async fn update_env(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(req): Json<UpdateEnvRequest>,
) -> ApiResult<Json<EnvPayload>> {
    let env = state.engine.update_env(&service, req.env).await?;
    Ok(Json(EnvPayload { env }))
}
