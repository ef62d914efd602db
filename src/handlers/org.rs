use axum::{
    extract::{Path, State},
    Extension,
};

use crate::auth::UserProfile;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::org::{AncestorPath, OrgId};
use crate::state::AppState;

/// GET /api/org/:id/path - root-to-node chain for an organization the caller can see
pub async fn ancestor_path(
    State(state): State<AppState>,
    Path(id): Path<OrgId>,
    Extension(user): Extension<UserProfile>,
) -> ApiResult<AncestorPath> {
    let scope = state.resolver.access_scope(user.org_id).await?;
    if !scope.permits(id) {
        return Err(ApiError::forbidden("Organization is outside your scope"));
    }
    Ok(ApiResponse::success(state.resolver.ancestor_path(id).await?))
}
