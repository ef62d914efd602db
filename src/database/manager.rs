use sqlx::mysql::MySqlPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::store::{MySqlStore, RelationalStore, StoreError};
use crate::config::DatabaseConfig;

/// Connection pools for every configured logical database.
///
/// Built once at startup and handed to the services that need it. Pools
/// connect lazily, so opening does not require the server to be reachable.
pub struct DatabaseManager {
    stores: HashMap<String, Arc<MySqlStore>>,
}

impl DatabaseManager {
    pub fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let base = config
            .url
            .as_deref()
            .ok_or(StoreError::ConfigMissing("DATABASE_URL"))?;

        let slow_query_threshold = config
            .enable_slow_query_warning
            .then(|| Duration::from_millis(config.slow_query_threshold_ms));

        let mut stores = HashMap::new();
        for (name, schema) in &config.schemas {
            if !Self::is_valid_db_name(schema) {
                return Err(StoreError::UnknownDatabase(schema.clone()));
            }
            let connection_string = Self::build_connection_string(base, schema)?;
            let pool = MySqlPoolOptions::new()
                .min_connections(config.min_connections)
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(config.connection_timeout))
                .connect_lazy(&connection_string)?;

            let store = MySqlStore::new(name.clone(), pool).slow_query_threshold(slow_query_threshold);
            stores.insert(name.clone(), Arc::new(store));
            info!("Created database pool for: {} ({})", name, schema);
        }

        Ok(Self { stores })
    }

    /// Store handle for a logical database name.
    pub fn store(&self, name: &str) -> Result<Arc<dyn RelationalStore>, StoreError> {
        self.stores
            .get(name)
            .map(|s| s.clone() as Arc<dyn RelationalStore>)
            .ok_or_else(|| StoreError::UnknownDatabase(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// Pings every pool
    pub async fn health_check(&self) -> Result<(), StoreError> {
        for store in self.stores.values() {
            store.ping().await?;
        }
        Ok(())
    }

    /// Close every pool (e.g., on shutdown)
    pub async fn close(&self) {
        for (name, store) in &self.stores {
            store.pool().close().await;
            info!("Closed database pool: {}", name);
        }
    }

    fn build_connection_string(base: &str, database_name: &str) -> Result<String, StoreError> {
        let mut url = url::Url::parse(base).map_err(|_| StoreError::InvalidDatabaseUrl)?;
        // Replace the path with the schema name (ensure leading slash)
        url.set_path(&format!("/{}", database_name));
        Ok(url.into())
    }

    fn is_valid_db_name(name: &str) -> bool {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}
