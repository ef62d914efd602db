use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::info;

use super::{CacheError, CacheStore};

const SCAN_BATCH: usize = 500;

/// Redis-backed cache over a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let manager = ConnectionManager::new(client).await?;
        info!("Connected Redis cache");
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

/// Redis expiries are whole seconds; anything shorter rounds up to one.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// `MULTI / SADD / EXPIRE / EXEC`, so a set never exists without its expiry.
fn add_with_expiry(key: &str, members: &[String], ttl: Duration) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SADD")
        .arg(key)
        .arg(members)
        .ignore()
        .cmd("EXPIRE")
        .arg(key)
        .arg(ttl_secs(ttl))
        .ignore();
    pipe
}

fn scan_page(cursor: u64, pattern: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("SCAN");
    cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(SCAN_BATCH);
    cmd
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn();
        Ok(redis::cmd("GET").arg(key).query_async::<_, Option<String>>(&mut conn).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn set_add(&self, key: &str, members: &[String], ttl: Duration) -> Result<(), CacheError> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        add_with_expiry(key, members, ttl).query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn();
        Ok(redis::cmd("SMEMBERS").arg(key).query_async::<_, Vec<String>>(&mut conn).await?)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = scan_page(cursor, pattern).query_async(&mut conn).await?;
            if !keys.is_empty() {
                let deleted: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += deleted.max(0) as usize;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
