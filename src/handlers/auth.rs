use axum::{extract::State, Extension};

use crate::auth::UserProfile;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET /api/auth/whoami
pub async fn whoami(Extension(user): Extension<UserProfile>) -> ApiResult<UserProfile> {
    Ok(ApiResponse::success(user))
}

/// POST /api/auth/logout - drops the cached session, invalidating every token for the user
pub async fn logout(State(state): State<AppState>, Extension(user): Extension<UserProfile>) -> ApiResult<bool> {
    let closed = state.sessions.close(&user).await?;
    tracing::info!("User {} (org {}) logged out", user.id, user.org_id);
    Ok(ApiResponse::success(closed).with_msg("logged out"))
}
