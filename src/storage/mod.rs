//! Object store collaborator: byte objects addressed by `(bucket, key)`.

pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid bucket name: {0}")]
    InvalidBucket(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Metadata(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub size: u64,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates the bucket if it does not exist yet.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Overwrites any existing object under the same key.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<ObjectMeta, StorageError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError>;

    /// Returns whether an object was removed.
    async fn remove(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;
}

/// Lowercase letters, digits and `-`, 3 to 63 characters.
pub fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    let ok = (3..=63).contains(&bucket.len())
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidBucket(bucket.to_string()))
    }
}

pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let ok = !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key.split('/').all(|segment| !segment.is_empty() && segment != ".." && segment != ".");
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_names() {
        assert!(validate_bucket("files").is_ok());
        assert!(validate_bucket("user-avatars-2").is_ok());
        assert!(validate_bucket("ab").is_err());
        assert!(validate_bucket("Files").is_err());
        assert!(validate_bucket("a_b_c").is_err());
        assert!(validate_bucket(&"a".repeat(64)).is_err());
    }

    #[test]
    fn object_keys() {
        assert!(validate_key("a.png").is_ok());
        assert!(validate_key("2024/01/a.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("../secret").is_err());
        assert!(validate_key("a/../../b").is_err());
        assert!(validate_key("a//b").is_err());
    }
}
