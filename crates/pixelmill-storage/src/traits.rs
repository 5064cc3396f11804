//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must
//! implement. The orchestration core only ever reads and writes whole
//! objects by key; keys are assumed strongly consistent after `put_object`
//! returns.

use async_trait::async_trait;
use pixelmill_core::StorageBackend;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) must implement this trait so
/// the orchestration core can work with any backend without coupling to
/// implementation details.
///
/// **Key format:** `sources/{id}.{ext}` for uploads, `derived/{fingerprint}.{ext}`
/// for derived artifacts. See [`crate::keys`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write an object at the given key, returning its public URL.
    async fn put_object(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Read the full object at the given key.
    async fn get_object(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Delete the object at the given key. Deleting a missing key is not an error.
    async fn delete_object(&self, storage_key: &str) -> StorageResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Get the size in bytes of an object, if it exists.
    async fn content_length(&self, storage_key: &str) -> StorageResult<u64>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
