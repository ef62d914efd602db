use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;

use crate::auth::{SessionStore, TokenCodec};
use crate::cache::CacheStore;
use crate::config::{AppConfig, SYSTEM_DB};
use crate::database::{Executor, RelationalStore};
use crate::error::ApiError;
use crate::org::{HierarchyConfig, OrgResolver};
use crate::resources::ResourceRegistry;
use crate::storage::ObjectStore;

/// Service handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Arc<BTreeMap<String, Arc<dyn RelationalStore>>>,
    pub executors: Arc<BTreeMap<String, Executor>>,
    pub resolver: Arc<OrgResolver>,
    pub cache: Arc<dyn CacheStore>,
    pub sessions: Arc<SessionStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub resources: Arc<ResourceRegistry>,
}

impl AppState {
    /// The organization table is read from the `system` store.
    pub fn build(
        config: AppConfig,
        stores: BTreeMap<String, Arc<dyn RelationalStore>>,
        cache: Arc<dyn CacheStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> anyhow::Result<Self> {
        let system = stores
            .get(SYSTEM_DB)
            .cloned()
            .with_context(|| format!("no '{}' database configured", SYSTEM_DB))?;

        let resolver = Arc::new(OrgResolver::new(
            system,
            cache.clone(),
            HierarchyConfig::from(&config.hierarchy),
        )?);

        let executors = stores
            .iter()
            .map(|(name, store)| (name.clone(), Executor::new(store.clone(), resolver.clone())))
            .collect();

        let codec = Arc::new(TokenCodec::from_config(&config.security)?);
        let sessions = Arc::new(SessionStore::new(cache.clone(), codec));
        let resources = Arc::new(ResourceRegistry::standard(&config.filter)?);

        for resource in resources.names().filter_map(|n| resources.get(n)) {
            if !stores.contains_key(resource.database) {
                anyhow::bail!("resource '{}' needs database '{}'", resource.name, resource.database);
            }
        }

        Ok(Self {
            config: Arc::new(config),
            stores: Arc::new(stores),
            executors: Arc::new(executors),
            resolver,
            cache,
            sessions,
            objects,
            resources,
        })
    }

    pub fn executor(&self, database: &str) -> Result<&Executor, ApiError> {
        self.executors.get(database).ok_or_else(|| {
            tracing::error!("No executor for database {}", database);
            ApiError::internal_server_error("An error occurred while processing your request")
        })
    }
}
