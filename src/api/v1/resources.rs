//! Resource upload endpoint

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiError, CreateResourceRequest, CreateResourceResponse, Json};

/// Header naming the uploading user, stored as the resource owner
pub const OWNER_HEADER: &str = "x-user-id";

/// POST /v1/resources
pub async fn create_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateResourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let resource_id = state
        .resource_store
        .create_resource(&request.content, owner)
        .await
        .map_err(|e| ApiError::from(e).with_param("content"))?;

    info!(resource_id = %resource_id, owner = ?owner, "Resource created");

    Ok((
        StatusCode::CREATED,
        Json(CreateResourceResponse {
            resource_id: resource_id.to_string(),
        }),
    ))
}
