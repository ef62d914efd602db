use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheError, CacheStore};

#[derive(Clone, Debug)]
enum CachedValue {
    Text(String),
    Set(BTreeSet<String>),
}

#[derive(Clone, Debug)]
struct CacheEntry {
    value: CachedValue,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local cache used when no Redis URL is configured.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                CachedValue::Text(s) => Ok(Some(s.clone())),
                CachedValue::Set(_) => Err(CacheError::Command(format!("{} holds a set", key))),
            },
            _ => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        purge_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: CachedValue::Text(value.to_string()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).map_or(false, |e| e.is_live(now)))
    }

    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        purge_expired(&mut entries, now);
        let entry = entries.entry(key.to_string()).or_insert_with(|| CacheEntry {
            value: CachedValue::Set(BTreeSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            CachedValue::Set(set) => {
                set.extend(members.iter().cloned());
                entry.expires_at = Some(now + ttl);
                Ok(())
            }
            CachedValue::Text(_) => Err(CacheError::Command(format!("{} holds a string", key))),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                CachedValue::Set(set) => Ok(set.iter().cloned().collect()),
                CachedValue::Text(_) => Err(CacheError::Command(format!("{} holds a string", key))),
            },
            _ => Ok(vec![]),
        }
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let mut removed_live = 0;
        entries.retain(|key, entry| {
            if glob_match(pattern, key) {
                if entry.is_live(now) {
                    removed_live += 1;
                }
                false
            } else {
                true
            }
        });
        tracing::debug!("Pattern {} removed {} of {} cache entries", pattern, removed_live, before);
        Ok(removed_live)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Expired entries are dropped on every write so the map stays bounded by
/// the live key count.
fn purge_expired(entries: &mut HashMap<String, CacheEntry>, now: Instant) {
    entries.retain(|_, entry| entry.is_live(now));
}

/// Redis-style glob with `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
