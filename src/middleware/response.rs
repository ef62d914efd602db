use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

/// Wrapper for API responses that adds the success envelope:
/// `{ code, msg, success: true, data, total? }`
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub total: Option<u64>,
    pub msg: Option<String>,
    pub status_code: Option<StatusCode>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self {
            data,
            total: None,
            msg: None,
            status_code: None, // Default to 200 OK
        }
    }

    /// One page of a list together with the unpaginated total
    pub fn page(data: T, total: u64) -> Self {
        Self {
            total: Some(total),
            ..Self::success(data)
        }
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    /// Create an API response with custom status code
    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self {
            status_code: Some(status_code),
            ..Self::success(data)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "code": 500,
                        "msg": "Failed to serialize response data",
                        "success": false
                    })),
                )
                    .into_response();
            }
        };

        let mut envelope = json!({
            "code": status.as_u16(),
            "msg": self.msg.as_deref().unwrap_or("success"),
            "success": true,
            "data": data_value
        });
        if let Some(total) = self.total {
            envelope["total"] = json!(total);
        }

        (status, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
