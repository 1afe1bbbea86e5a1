//! Filesystem storage backend.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{sharded_key, Namespace, StorageDriver, StorageError};

/// Stores blobs under `<base>/<namespace>/aa/bb/cc/<hash>`.
pub struct FileDriver {
    base: PathBuf,
}

impl FileDriver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        FileDriver { base: base.into() }
    }

    fn path_for(&self, hash: &str, namespace: Namespace) -> PathBuf {
        self.base.join(sharded_key(hash, namespace))
    }
}

#[async_trait]
impl StorageDriver for FileDriver {
    async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.base).await?;
        Ok(())
    }

    async fn read(&self, hash: &str, namespace: Namespace) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(hash, namespace);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write(
        &self,
        buf: &[u8],
        hash: &str,
        namespace: Namespace,
    ) -> Result<(), StorageError> {
        let path = self.path_for(hash, namespace);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, buf).await?;
        Ok(())
    }
}

impl FileDriver {
    /// Base directory this driver writes under.
    pub fn base(&self) -> &Path {
        &self.base
    }
}
