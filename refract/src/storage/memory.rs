//! In-memory storage backend.
//!
//! Backs tests and ephemeral deployments. Uses the same sharded key strings
//! as the other backends so key construction stays covered either way.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{sharded_key, Namespace, StorageDriver, StorageError};

#[derive(Default)]
pub struct MemoryDriver {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs across all namespaces.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn read(&self, hash: &str, namespace: Namespace) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .get(&sharded_key(hash, namespace))
            .map(|entry| entry.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn write(
        &self,
        buf: &[u8],
        hash: &str,
        namespace: Namespace,
    ) -> Result<(), StorageError> {
        self.blobs.insert(sharded_key(hash, namespace), buf.to_vec());
        Ok(())
    }
}
