pub mod auth;
pub mod response;

pub use auth::{extract_token, require_user};
pub use response::{ApiResponse, ApiResult};
