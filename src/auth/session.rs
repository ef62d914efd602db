//! Cached user profiles keyed by organization and user id.
//!
//! A verified token is not enough on its own: the profile must still be in
//! the cache. Logging out drops it, which invalidates every token issued for
//! that user.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use super::{TokenCodec, TokenError};
use crate::cache::{CacheError, CacheStore};
use crate::org::OrgId;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Session not found")]
    NotFound,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

/// Known profile fields plus whatever else the login flow stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub org_id: OrgId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub org_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub fn session_key(org_id: OrgId, user_id: &str) -> String {
    format!("session:{}_{}", org_id, user_id)
}

pub struct SessionStore {
    cache: Arc<dyn CacheStore>,
    codec: Arc<TokenCodec>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn CacheStore>, codec: Arc<TokenCodec>) -> Self {
        Self { cache, codec }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Caches the profile for the token lifetime and returns a new token.
    pub async fn open(&self, profile: &UserProfile) -> Result<String, SessionError> {
        let claims = self
            .codec
            .claims(profile.id.to_string(), profile.org_id, profile.name.clone());
        let token = self.codec.issue(&claims)?;

        let ttl = self.codec.expiry().to_std().unwrap_or_default();
        let key = session_key(profile.org_id, &claims.sub);
        self.cache
            .set_ex(&key, &serde_json::to_string(profile)?, ttl)
            .await?;
        Ok(token)
    }

    /// Cache failures count as a missing session.
    pub async fn resolve(&self, token: &str) -> Result<UserProfile, SessionError> {
        let claims = self.codec.verify(token)?;
        let key = session_key(claims.org_id, &claims.sub);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).map_err(|e| {
                warn!("Undecodable session {}: {}", key, e);
                SessionError::NotFound
            }),
            Ok(None) => Err(SessionError::NotFound),
            Err(e) => {
                warn!("Session lookup failed for {}: {}", key, e);
                Err(SessionError::NotFound)
            }
        }
    }

    /// Returns whether a session was dropped.
    pub async fn close(&self, profile: &UserProfile) -> Result<bool, SessionError> {
        let key = session_key(profile.org_id, &profile.id.to_string());
        Ok(self.cache.delete(&key).await?)
    }
}
