use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};

use crate::auth::UserProfile;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::storage::ObjectMeta;
use crate::state::AppState;

/// Objects are namespaced by the caller's home organization:
/// `/api/objects/files/report.pdf` for a user in org 10 is stored as `files/10/report.pdf`.
fn scoped_key(state: &AppState, user: &UserProfile, bucket: &str, key: &str) -> Result<String, ApiError> {
    if !state.config.storage.buckets.iter().any(|b| b == bucket) {
        return Err(ApiError::not_found(format!("Unknown bucket: {}", bucket)));
    }
    Ok(format!("{}/{}", user.org_id, key))
}

/// PUT /api/objects/:bucket/*key - raw body upload
pub async fn upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Extension(user): Extension<UserProfile>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ObjectMeta> {
    let key = scoped_key(&state, &user, &bucket, &key)?;
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());

    let meta = state.objects.put(&bucket, &key, &body, content_type).await?;
    tracing::info!("User {} stored {}/{} ({} bytes)", user.username, bucket, key, meta.size);
    Ok(ApiResponse::with_status(meta, StatusCode::CREATED).with_msg("uploaded"))
}

/// GET /api/objects/:bucket/*key - object bytes with their stored content type
pub async fn download(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Extension(user): Extension<UserProfile>,
) -> Result<Response, ApiError> {
    let key = scoped_key(&state, &user, &bucket, &key)?;
    let object = state.objects.get(&bucket, &key).await?;
    let content_type = object
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], object.bytes).into_response())
}

/// DELETE /api/objects/:bucket/*key
pub async fn remove(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Extension(user): Extension<UserProfile>,
) -> ApiResult<bool> {
    let key = scoped_key(&state, &user, &bucket, &key)?;
    if !state.objects.remove(&bucket, &key).await? {
        return Err(ApiError::not_found(format!("Object not found: {}/{}", bucket, key)));
    }
    Ok(ApiResponse::success(true).with_msg("deleted"))
}
