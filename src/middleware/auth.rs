use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Resolves the bearer token to a cached [`UserProfile`] and injects it into
/// the request extensions.
///
/// [`UserProfile`]: crate::auth::UserProfile
pub async fn require_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&headers).map_err(ApiError::unauthorized)?;
    let user = state.sessions.resolve(&token).await?;

    tracing::debug!("Authenticated user {} (org {})", user.id, user.org_id);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Token from `Authorization: Bearer ...`, falling back to a bare `token` header.
pub fn extract_token(headers: &HeaderMap) -> Result<String, String> {
    if let Some(auth_header) = headers.get("authorization") {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| "Invalid Authorization header format".to_string())?;

        return match auth_str.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            Some(_) => Err("Empty token".to_string()),
            None => Err("Authorization header must use Bearer token format".to_string()),
        };
    }

    match headers.get("token").and_then(|v| v.to_str().ok()) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err("Missing Authorization header".to_string()),
    }
}
