use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use orgscope_api::cache::{CacheStore, MemoryCache, RedisCache};
use orgscope_api::config::AppConfig;
use orgscope_api::database::{DatabaseManager, RelationalStore, StoreError};
use orgscope_api::handlers;
use orgscope_api::state::AppState;
use orgscope_api::storage::{LocalObjectStore, ObjectStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, REDIS_URL, etc.
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.api.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::info!("Starting OrgScope API in {:?} mode", config.environment);
    if config.is_development() {
        tracing::warn!("Development profile: tokens are signed with the development secret unless JWT_SECRET is set");
    }

    let databases = DatabaseManager::open(&config.database).context("opening database pools")?;
    let stores: BTreeMap<String, Arc<dyn RelationalStore>> = databases
        .names()
        .map(|name| databases.store(name).map(|s| (name.to_string(), s)))
        .collect::<Result<_, StoreError>>()?;
    if let Err(e) = databases.health_check().await {
        tracing::warn!("Database not reachable at startup, pools will retry on demand: {}", e);
    }

    let cache: Arc<dyn CacheStore> = match config.cache.redis_url.as_deref() {
        Some(url) => Arc::new(RedisCache::open(url).await.context("connecting to redis")?),
        None => {
            tracing::warn!("REDIS_URL not set, using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };

    let objects = LocalObjectStore::new(&config.storage.root_dir);
    for bucket in &config.storage.buckets {
        objects.ensure_bucket(bucket).await.with_context(|| format!("creating bucket {}", bucket))?;
    }
    let objects: Arc<dyn ObjectStore> = Arc::new(objects);

    let port = config.api.port;
    let state = AppState::build(config, stores, cache, objects)?;
    let app = handlers::router(state);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("OrgScope API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server")?;

    databases.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
