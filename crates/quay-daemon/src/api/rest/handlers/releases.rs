//! Release management handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use quay_types::{Release, ReleaseId};
use serde::Serialize;

/// Multipart field carrying the bundle
const PACKAGE_FIELD: &str = "package";

const GZIP_CONTENT_TYPES: &[&str] = &["application/gzip", "application/x-gzip"];
const BUNDLE_EXTENSIONS: &[&str] = &[".tgz", ".tar.gz"];

/// Activate release response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateReleaseResponse {
    pub active_release_id: ReleaseId,
}

/// Delete release response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReleaseResponse {
    pub deleted_release_id: String,
    pub active_release_id: Option<ReleaseId>,
}

/// List releases in upload order
pub async fn list_releases(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Json<Vec<Release>>> {
    Ok(Json(state.engine.list_releases(&service).await?))
}

/// Upload a bundle as a new, active release
pub async fn upload_release(
    State(state): State<AppState>,
    Path(service): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Release>)> {
    // Unknown services fail before the upload is read
    state.engine.service(&service).await?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(PACKAGE_FIELD) {
            continue;
        }

        if !is_bundle(field.content_type(), field.file_name()) {
            return Err(ApiError::BadRequest(
                "only .tgz / .tar.gz bundles are accepted".to_string(),
            ));
        }

        let bytes = field.bytes().await.map_err(multipart_error)?;
        let release = state.engine.add_release(&service, bytes.to_vec()).await?;
        return Ok((StatusCode::CREATED, Json(release)));
    }

    Err(ApiError::BadRequest(format!(
        "missing multipart field '{}'",
        PACKAGE_FIELD
    )))
}

/// Make a release active
pub async fn activate_release(
    State(state): State<AppState>,
    Path((service, release)): Path<(String, String)>,
) -> ApiResult<Json<ActivateReleaseResponse>> {
    let active_release_id = state.engine.activate_release(&service, &release).await?;
    Ok(Json(ActivateReleaseResponse { active_release_id }))
}

/// Delete a release and its bundle
pub async fn delete_release(
    State(state): State<AppState>,
    Path((service, release)): Path<(String, String)>,
) -> ApiResult<Json<DeleteReleaseResponse>> {
    let active_release_id = state.engine.delete_release(&service, &release).await?;
    Ok(Json(DeleteReleaseResponse {
        deleted_release_id: release,
        active_release_id,
    }))
}

fn is_bundle(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    let gzip_type = content_type
        .map(|ct| GZIP_CONTENT_TYPES.iter().any(|t| ct.eq_ignore_ascii_case(t)))
        .unwrap_or(false);
    let bundle_name = file_name
        .map(|name| {
            let name = name.to_ascii_lowercase();
            BUNDLE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
        })
        .unwrap_or(false);
    gzip_type || bundle_name
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
