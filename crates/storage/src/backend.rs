//! Storage backend trait definition
//!
//! Defines the async byte-level interface that checkpoint readers and
//! writers are built on.

use async_trait::async_trait;
use bytes::Bytes;
use runtime_core::Result;

/// Async trait for storage media
///
/// Implementors provide read, write and listing of binary data,
/// supporting both local filesystem and remote storage (S3, etc.).
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Short name used in logs (e.g. "local", "s3")
    fn name(&self) -> &'static str;

    /// Read data from the given path
    ///
    /// # Arguments
    /// * `path` - Relative path within the storage backend
    ///
    /// # Errors
    /// Returns error if path doesn't exist or read fails
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write data to the given path
    ///
    /// Creates parent directories if they don't exist.
    /// Uses atomic writes where possible (write to temp, then rename).
    ///
    /// # Returns
    /// Number of bytes written
    async fn write(&self, path: &str, data: Bytes) -> Result<u64>;

    /// List all paths under a given prefix
    ///
    /// # Arguments
    /// * `prefix` - Path prefix to filter by (e.g., "shards/")
    ///
    /// # Returns
    /// Vector of paths matching the prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
