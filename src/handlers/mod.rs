// Public routes (banner, health) and protected /api routes behind require_user

pub mod auth;
pub mod find;
pub mod health;
pub mod objects;
pub mod org;

use axum::{
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::SecurityConfig;
use crate::middleware::require_user;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.security);

    let protected = Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/org/:id/path", get(org::ancestor_path))
        .route("/api/:resource/find", post(find::find))
        .route("/api/:resource/delete", delete(find::delete))
        .route(
            "/api/objects/:bucket/*key",
            put(objects::upload).get(objects::download).delete(objects::remove),
        )
        .route_layer(from_fn_with_state(state.clone(), require_user));

    let app = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .merge(protected)
        .layer(cors);

    let app = if state.config.api.enable_request_logging {
        app.layer(TraceLayer::new_for_http())
    } else {
        app
    };
    app.with_state(state)
}

fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    if !config.enable_cors {
        return CorsLayer::new();
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}
