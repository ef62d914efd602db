// HTTP API Error Types
use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::{SessionError, TokenError};
use crate::cache::CacheError;
use crate::database::{MutationError, StoreError};
use crate::filter::FilterError;
use crate::org::ResolverError;
use crate::storage::StorageError;

/// HTTP API error with its status code and a client-safe message
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),
    PartialAuthorization { missing_count: u64 },

    // 404 Not Found
    NotFound(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::PartialAuthorization { .. } => 403,
            ApiError::NotFound(_) => 404,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::ValidationError { message, .. } => message.clone(),
            ApiError::InvalidJson(msg) => msg.clone(),
            ApiError::Unauthorized(msg) => msg.clone(),
            ApiError::Forbidden(msg) => msg.clone(),
            ApiError::PartialAuthorization { missing_count } => {
                format!("No permission for {} rows", missing_count)
            }
            ApiError::NotFound(msg) => msg.clone(),
            ApiError::InternalServerError(msg) => msg.clone(),
            ApiError::ServiceUnavailable(msg) => msg.clone(),
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "code": self.status_code(),
            "msg": self.message(),
            "success": false
        });

        match self {
            ApiError::ValidationError {
                field_errors: Some(field_errors),
                ..
            } => {
                response["fieldErrors"] = json!(field_errors);
            }
            ApiError::PartialAuthorization { missing_count } => {
                response["missingCount"] = json!(missing_count);
            }
            _ => {}
        }

        response
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

fn field_error(field: String, problem: impl Into<String>) -> Option<HashMap<String, String>> {
    Some(HashMap::from([(field, problem.into())]))
}

// Convert domain error types to ApiError
impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::InvalidField(field) => {
                ApiError::validation_error("Invalid field name", field_error(field, "Not a valid identifier"))
            }
            FilterError::UnsupportedFilter { field, reason } => {
                ApiError::validation_error("Unsupported filter value", field_error(field, reason))
            }
            FilterError::InvalidSortDirection { field, value } => ApiError::validation_error(
                "Invalid sort direction",
                field_error(field, format!("Expected 1, -1, asc or desc, got {}", value)),
            ),
            FilterError::InvalidPagination(msg) => ApiError::validation_error(msg, None),
            FilterError::InvalidRequest(msg) => ApiError::validation_error(msg, None),
            FilterError::JsonError(e) => ApiError::invalid_json(e.to_string()),
            FilterError::InvalidBaseQuery(msg) => {
                // Base queries are server-side; a bad one is our bug
                tracing::error!("Invalid base query: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Sqlx(sqlx::Error::PoolTimedOut)
            | StoreError::Sqlx(sqlx::Error::PoolClosed)
            | StoreError::Sqlx(sqlx::Error::Io(_)) => {
                tracing::error!("Database connection error: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            StoreError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
            other => {
                tracing::error!("Database error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<ResolverError> for ApiError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::Unavailable(source) => {
                tracing::error!("Organization hierarchy lookup failed: {}", source);
                ApiError::internal_server_error("Organization hierarchy lookup failed")
            }
        }
    }
}

impl From<MutationError> for ApiError {
    fn from(err: MutationError) -> Self {
        match err {
            MutationError::Unauthorized => ApiError::unauthorized("No accessible organizations"),
            MutationError::PartialAuthorization { missing_count, .. } => {
                ApiError::PartialAuthorization { missing_count }
            }
            MutationError::InvalidIdentifier(name) => {
                ApiError::validation_error("Invalid field name", field_error(name, "Not a valid identifier"))
            }
            MutationError::EmptyAssignments => ApiError::bad_request("Nothing to update"),
            MutationError::Resolver(e) => e.into(),
            MutationError::Store(e) => e.into(),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        tracing::error!("Cache error: {}", err);
        ApiError::service_unavailable("Cache temporarily unavailable")
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken => ApiError::unauthorized("Invalid token"),
            TokenError::ExpiredToken => ApiError::unauthorized("Token expired"),
            other => {
                tracing::error!("Token codec error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Token(e) => e.into(),
            SessionError::NotFound => ApiError::unauthorized("Session expired, please log in again"),
            SessionError::Cache(e) => e.into(),
            SessionError::Encode(e) => {
                tracing::error!("Session encoding error: {}", e);
                ApiError::internal_server_error("Failed to format response")
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidBucket(name) => ApiError::bad_request(format!("Invalid bucket name: {}", name)),
            StorageError::InvalidKey(key) => ApiError::bad_request(format!("Invalid object key: {}", key)),
            StorageError::NotFound { bucket, key } => ApiError::not_found(format!("Object not found: {}/{}", bucket, key)),
            other => {
                tracing::error!("Object storage error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::invalid_json(err.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
