//! Content-addressable blob storage.
//!
//! A driver is a pure key-value store: namespace plus hash is the full key,
//! and the driver knows nothing about image semantics. Keys are sharded into
//! three 2-character prefix segments (`derived/ab/cd/ef/<hash>`) so
//! filesystem backends never pile millions of entries into one directory;
//! object-store backends map the same key string onto bucket objects.
//!
//! Cache population is advisory: [`submit_write`] spawns the write and only
//! logs failures, so a broken backend degrades throughput, never responses.

mod filesystem;
mod memory;

pub use filesystem::FileDriver;
pub use memory::MemoryDriver;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Logical partition of the key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Original bytes downloaded from an origin.
    Source,
    /// Transformed output.
    Derived,
    /// Caller-submitted originals.
    Upload,
}

impl Namespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Source => "source/",
            Namespace::Derived => "derived/",
            Namespace::Upload => "upload/",
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    /// The key has no value: a cache miss, not a failure.
    #[error("object not found")]
    NotFound,
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound)
    }
}

/// Blob store contract consumed by the pipeline.
///
/// Writes under a given `(hash, namespace)` are idempotent: the same input
/// always produces the same bytes, so concurrent duplicate writes are
/// harmless and no write-side locking exists.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Establishes backend connectivity. Idempotent; called at least once
    /// before first use.
    async fn init(&self) -> Result<(), StorageError>;

    /// Reads the blob under `(hash, namespace)`. [`StorageError::NotFound`]
    /// is a miss; callers treat any error as "must recompute".
    async fn read(&self, hash: &str, namespace: Namespace) -> Result<Vec<u8>, StorageError>;

    /// Writes `buf` under `(hash, namespace)`.
    async fn write(&self, buf: &[u8], hash: &str, namespace: Namespace)
        -> Result<(), StorageError>;
}

/// Fire-and-forget cache population: spawns the write and logs failures at
/// `warn`. Callers must not await completion or assume success.
pub fn submit_write(
    driver: Arc<dyn StorageDriver>,
    buf: Vec<u8>,
    hash: String,
    namespace: Namespace,
) {
    tokio::spawn(async move {
        if let Err(error) = driver.write(&buf, &hash, namespace).await {
            tracing::warn!(%hash, namespace = namespace.prefix(), %error, "cache write failed");
        }
    });
}

/// Full storage key for `(hash, namespace)`: the namespace prefix, three
/// 2-character shard segments, then the hash itself. Hashes shorter than six
/// characters shard as far as they reach.
pub fn sharded_key(hash: &str, namespace: Namespace) -> String {
    let mut key = String::with_capacity(namespace.prefix().len() + hash.len() + 9);
    key.push_str(namespace.prefix());
    for segment in 0..3 {
        let start = segment * 2;
        if start + 2 > hash.len() {
            break;
        }
        key.push_str(&hash[start..start + 2]);
        key.push('/');
    }
    key.push_str(hash);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharded_key_layout() {
        assert_eq!(
            sharded_key("abcdef0123", Namespace::Derived),
            "derived/ab/cd/ef/abcdef0123"
        );
        assert_eq!(
            sharded_key("abcdef0123", Namespace::Source),
            "source/ab/cd/ef/abcdef0123"
        );
    }

    #[test]
    fn sharded_key_short_hash() {
        assert_eq!(sharded_key("abc", Namespace::Upload), "upload/ab/abc");
        assert_eq!(sharded_key("a", Namespace::Upload), "upload/a");
    }

    #[tokio::test]
    async fn submit_write_is_best_effort() {
        // A driver whose writes always fail must not panic the task.
        struct Broken;
        #[async_trait]
        impl StorageDriver for Broken {
            async fn init(&self) -> Result<(), StorageError> {
                Ok(())
            }
            async fn read(&self, _: &str, _: Namespace) -> Result<Vec<u8>, StorageError> {
                Err(StorageError::NotFound)
            }
            async fn write(&self, _: &[u8], _: &str, _: Namespace) -> Result<(), StorageError> {
                Err(StorageError::Backend("down".to_string()))
            }
        }
        submit_write(
            Arc::new(Broken),
            b"bytes".to_vec(),
            "hash".to_string(),
            Namespace::Derived,
        );
        tokio::task::yield_now().await;
    }
}
