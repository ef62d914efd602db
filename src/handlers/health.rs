use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");
    let resources: Vec<&str> = state.resources.names().collect();

    Json(json!({
        "code": 200,
        "msg": "success",
        "success": true,
        "data": {
            "name": "OrgScope API",
            "version": version,
            "description": "Organization-scoped list, filter and delete endpoints",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/api/auth/whoami, /api/auth/logout (protected)",
                "find": "/api/:resource/find (protected)",
                "delete": "/api/:resource/delete (protected)",
                "org": "/api/org/:id/path (protected)",
                "objects": "/api/objects/:bucket/*key (protected)",
            },
            "resources": resources,
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    let mut databases = serde_json::Map::new();
    let mut healthy = true;
    for (name, store) in state.stores.iter() {
        let status = match store.ping().await {
            Ok(()) => "ok".to_string(),
            Err(e) => {
                tracing::error!("Health check failed for database {}: {}", name, e);
                healthy = false;
                "unavailable".to_string()
            }
        };
        databases.insert(name.clone(), Value::String(status));
    }

    let cache = match state.cache.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::error!("Health check failed for cache: {}", e);
            healthy = false;
            "unavailable"
        }
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "code": status.as_u16(),
            "msg": if healthy { "ok" } else { "degraded" },
            "success": healthy,
            "data": {
                "timestamp": now,
                "databases": databases,
                "cache": cache,
            }
        })),
    )
}
