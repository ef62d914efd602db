//! Cache store collaborator.
//!
//! String values with expiry, string sets, and pattern deletion. Callers on
//! request paths treat every [`CacheError`] as a miss.

pub mod memory;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            CacheError::Unavailable(err.to_string())
        } else {
            CacheError::Command(err.to_string())
        }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Adds `members` and resets the key's expiry to `ttl` in one atomic step.
    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> Result<(), CacheError>;

    /// Empty when the key does not exist.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError>;

    /// Deletes every key matching a glob pattern (`*`, `?`); returns the count.
    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// `base` plus a uniform random offset drawn from `jitter` seconds,
/// never shorter than one second.
pub fn jittered_ttl(base: Duration, jitter: std::ops::Range<i64>) -> Duration {
    let offset = if jitter.is_empty() {
        0
    } else {
        rand::thread_rng().gen_range(jitter)
    };
    let secs = (base.as_secs() as i64).saturating_add(offset).max(1);
    Duration::from_secs(secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_window() {
        for _ in 0..200 {
            let ttl = jittered_ttl(Duration::from_secs(3600), 0..300);
            assert!(ttl >= Duration::from_secs(3600));
            assert!(ttl < Duration::from_secs(3900));
        }
        for _ in 0..200 {
            let ttl = jittered_ttl(Duration::from_secs(1800), -300..301);
            assert!(ttl >= Duration::from_secs(1500));
            assert!(ttl <= Duration::from_secs(2100));
        }
    }

    #[test]
    fn empty_jitter_returns_base() {
        assert_eq!(jittered_ttl(Duration::from_secs(60), 0..0), Duration::from_secs(60));
    }

    #[test]
    fn never_below_one_second() {
        assert_eq!(jittered_ttl(Duration::from_secs(0), -10..-5), Duration::from_secs(1));
    }
}
