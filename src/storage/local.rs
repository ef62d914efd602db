use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use super::{validate_bucket, validate_key, ObjectMeta, ObjectStore, StorageError, StoredObject};

const META_DIR: &str = ".meta";

/// Filesystem-backed object store. Objects live at `{root}/{bucket}/{key}`;
/// metadata sidecars live under `{root}/.meta/{bucket}/{key}.json`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        Ok(self.root.join(bucket).join(key))
    }

    fn meta_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(bucket).join(format!("{}.json", key))
    }

    fn not_found(bucket: &str, key: &str) -> StorageError {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        fs::create_dir_all(self.root.join(bucket)).await?;
        info!("Object bucket ready: {}", bucket);
        Ok(())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<ObjectMeta, StorageError> {
        let path = self.object_path(bucket, key)?;
        if !fs::try_exists(self.root.join(bucket)).await? {
            return Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: String::new(),
            });
        }
        ensure_parent(&path).await?;
        fs::write(&path, bytes).await?;

        let meta = ObjectMeta {
            size: bytes.len() as u64,
            content_type: content_type.map(str::to_string),
        };
        let meta_path = self.meta_path(bucket, key);
        ensure_parent(&meta_path).await?;
        fs::write(&meta_path, serde_json::to_vec(&meta)?).await?;

        debug!("Stored {}/{} ({} bytes)", bucket, key, meta.size);
        Ok(meta)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let path = self.object_path(bucket, key)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Self::not_found(bucket, key)),
            Err(e) => return Err(e.into()),
        };

        let content_type = match fs::read(self.meta_path(bucket, key)).await {
            Ok(raw) => serde_json::from_slice::<ObjectMeta>(&raw)?.content_type,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(StoredObject {
            size: bytes.len() as u64,
            bytes,
            content_type,
        })
    }

    async fn remove(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(bucket, key)?;
        let removed = match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        match fs::remove_file(self.meta_path(bucket, key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(removed)
    }
}
