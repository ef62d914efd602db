//! Organization hierarchy lookups with cache-aside storage.
//!
//! Both lookups run as a single recursive CTE against the org table. Cache
//! failures are logged and treated as misses; only the store path can fail a
//! call.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::scope::{value_as_org_id, AccessScope, OrgId, OrgNode, ROOT_ORG_ID};
use crate::cache::{jittered_ttl, CacheError, CacheStore};
use crate::config::HierarchySettings;
use crate::database::store::{RelationalStore, StoreError};
use crate::filter::naming::is_qualified_identifier;

pub const DESCENDANTS_PREFIX: &str = "descendants:";
pub const ANCESTORS_PREFIX: &str = "ancestors:";

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("organization hierarchy unavailable")]
    Unavailable(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct HierarchyConfig {
    pub org_table: String,
    pub descendants_ttl: Duration,
    pub descendants_jitter: Range<i64>,
    pub ancestors_ttl: Duration,
    pub ancestors_jitter: Range<i64>,
    pub max_depth: u32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            org_table: "sys_org".to_string(),
            descendants_ttl: Duration::from_secs(3600),
            descendants_jitter: 0..300,
            ancestors_ttl: Duration::from_secs(1800),
            ancestors_jitter: -300..301,
            max_depth: 10,
        }
    }
}

impl From<&HierarchySettings> for HierarchyConfig {
    fn from(settings: &HierarchySettings) -> Self {
        Self {
            org_table: settings.org_table.clone(),
            descendants_ttl: Duration::from_secs(settings.descendants_ttl_secs),
            descendants_jitter: settings.descendants_jitter_secs.0..settings.descendants_jitter_secs.1,
            ancestors_ttl: Duration::from_secs(settings.ancestors_ttl_secs),
            ancestors_jitter: settings.ancestors_jitter_secs.0..settings.ancestors_jitter_secs.1,
            max_depth: settings.max_depth,
        }
    }
}

/// Root-to-leaf chain for display. `ids` always starts with `"0"`; the
/// root has no entry in `names`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorPath {
    pub names: Vec<String>,
    pub ids: Vec<String>,
}

impl AncestorPath {
    fn root() -> Self {
        Self {
            names: Vec::new(),
            ids: vec![ROOT_ORG_ID.to_string()],
        }
    }
}

pub struct OrgResolver {
    store: Arc<dyn RelationalStore>,
    cache: Arc<dyn CacheStore>,
    config: HierarchyConfig,
    descendants_sql: String,
    ancestors_sql: String,
}

impl OrgResolver {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        cache: Arc<dyn CacheStore>,
        config: HierarchyConfig,
    ) -> Result<Self, StoreError> {
        if !is_qualified_identifier(&config.org_table) {
            return Err(StoreError::QueryError(format!(
                "invalid org table name: {}",
                config.org_table
            )));
        }
        let descendants_sql = descendants_query(&config.org_table);
        let ancestors_sql = ancestors_query(&config.org_table);
        Ok(Self {
            store,
            cache,
            config,
            descendants_sql,
            ancestors_sql,
        })
    }

    /// `org_id` plus every organization below it. Unknown ids resolve to an
    /// empty set, which is not cached.
    pub async fn descendant_ids(&self, org_id: OrgId) -> Result<BTreeSet<OrgId>, ResolverError> {
        let key = descendants_key(org_id);

        match self.cache.set_members(&key).await {
            Ok(members) if !members.is_empty() => match parse_members(&members) {
                Some(ids) => {
                    debug!("Descendant cache hit for org {}", org_id);
                    return Ok(ids);
                }
                None => {
                    warn!("Undecodable descendant cache entry {}, reloading", key);
                    if let Err(e) = self.cache.delete(&key).await {
                        warn!("Could not drop cache entry {}: {}", key, e);
                    }
                }
            },
            Ok(_) => {}
            Err(e) => warn!("Descendant cache read failed for {}: {}", key, e),
        }

        info!("Descendant cache miss for org {}", org_id);
        let rows = self
            .store
            .query_all(&self.descendants_sql, &[Value::from(org_id)])
            .await?;
        let ids: BTreeSet<OrgId> = rows
            .iter()
            .filter_map(|row| row.get("id").and_then(value_as_org_id))
            .collect();

        if !ids.is_empty() {
            let members: Vec<String> = ids.iter().map(ToString::to_string).collect();
            let ttl = jittered_ttl(self.config.descendants_ttl, self.config.descendants_jitter.clone());
            if let Err(e) = self.cache.set_add(&key, &members, ttl).await {
                warn!("Descendant cache write failed for {}: {}", key, e);
                // A half-applied write may have left the set without an expiry
                if let Err(e) = self.cache.delete(&key).await {
                    warn!("Could not drop cache entry {}: {}", key, e);
                }
            }
        }

        Ok(ids)
    }

    /// Chain from the root down to `org_id`, bounded by the configured depth.
    pub async fn ancestor_path(&self, org_id: OrgId) -> Result<AncestorPath, ResolverError> {
        let key = ancestors_key(org_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<AncestorPath>(&raw) {
                Ok(path) => {
                    debug!("Ancestor cache hit for org {}", org_id);
                    return Ok(path);
                }
                Err(e) => warn!("Undecodable ancestor cache entry {}: {}", key, e),
            },
            Ok(None) => {}
            Err(e) => warn!("Ancestor cache read failed for {}: {}", key, e),
        }

        info!("Ancestor cache miss for org {}", org_id);
        let rows = self
            .store
            .query_all(
                &self.ancestors_sql,
                &[Value::from(org_id), Value::from(self.config.max_depth)],
            )
            .await?;

        let mut path = AncestorPath::root();
        for node in rows.iter().filter_map(OrgNode::from_row) {
            if node.id == ROOT_ORG_ID {
                continue;
            }
            path.names.push(node.name);
            path.ids.push(node.id.to_string());
        }

        let ttl = jittered_ttl(self.config.ancestors_ttl, self.config.ancestors_jitter.clone());
        match serde_json::to_string(&path) {
            Ok(raw) => {
                if let Err(e) = self.cache.set_ex(&key, &raw, ttl).await {
                    warn!("Ancestor cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Could not encode ancestor path for {}: {}", key, e),
        }

        Ok(path)
    }

    /// The root identity is unrestricted; everyone else sees their subtree.
    pub async fn access_scope(&self, home_org_id: OrgId) -> Result<AccessScope, ResolverError> {
        if home_org_id == ROOT_ORG_ID {
            return Ok(AccessScope::Unrestricted);
        }
        Ok(AccessScope::restricted(self.descendant_ids(home_org_id).await?))
    }

    /// Drops both cache entries for one organization. Failures are logged.
    pub async fn invalidate(&self, org_id: OrgId) {
        for key in [descendants_key(org_id), ancestors_key(org_id)] {
            if let Err(e) = self.cache.delete(&key).await {
                warn!("Cache invalidation failed for {}: {}", key, e);
            }
        }
    }

    /// Removes every cached hierarchy entry and returns how many were removed.
    pub async fn invalidate_all(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for prefix in [DESCENDANTS_PREFIX, ANCESTORS_PREFIX] {
            removed += self.cache.delete_matching(&format!("{}*", prefix)).await?;
        }
        if removed > 0 {
            info!("Cleared {} organization cache entries", removed);
        } else {
            debug!("No organization cache entries to clear");
        }
        Ok(removed)
    }
}

pub fn descendants_key(org_id: OrgId) -> String {
    format!("{}{}", DESCENDANTS_PREFIX, org_id)
}

pub fn ancestors_key(org_id: OrgId) -> String {
    format!("{}{}", ANCESTORS_PREFIX, org_id)
}

fn parse_members(members: &[String]) -> Option<BTreeSet<OrgId>> {
    members.iter().map(|m| m.parse().ok()).collect()
}

// UNION (not UNION ALL) stops revisiting nodes if the data contains a cycle.
fn descendants_query(table: &str) -> String {
    format!(
        "WITH RECURSIVE org_tree AS (\
         SELECT id FROM {table} WHERE id = ? \
         UNION \
         SELECT child.id FROM {table} child INNER JOIN org_tree parent ON child.org_id = parent.id\
         ) SELECT id FROM org_tree"
    )
}

fn ancestors_query(table: &str) -> String {
    format!(
        "WITH RECURSIVE org_path AS (\
         SELECT id, name, org_id, 1 AS depth FROM {table} WHERE id = ? \
         UNION ALL \
         SELECT p.id, p.name, p.org_id, c.depth + 1 FROM {table} p INNER JOIN org_path c ON p.id = c.org_id \
         WHERE c.org_id <> 0 AND c.depth < ?\
         ) SELECT id, name, org_id, depth FROM org_path ORDER BY depth DESC"
    )
}
