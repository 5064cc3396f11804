//! Storage backend construction from configuration.

use std::sync::Arc;

use pixelmill_core::{Config, StorageBackend};

use crate::traits::{Storage, StorageError, StorageResult};

/// Build the configured storage backend.
///
/// Defaults to local storage when no backend is configured, matching
/// `Config::validate`'s expectations.
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let backend = config.storage_backend.unwrap_or(StorageBackend::Local);

    match backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET is not set".to_string()))?;
            let region = config
                .s3_region
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_REGION is not set".to_string()))?;

            let storage = crate::s3::S3Storage::new(bucket, region, config.s3_endpoint.clone()).await?;
            tracing::info!(backend = %StorageBackend::S3, "Storage backend initialized");
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 backend requested but the storage-s3 feature is not enabled".to_string(),
        )),
        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH is not set".to_string())
            })?;
            let base_url = config.local_storage_base_url.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_BASE_URL is not set".to_string())
            })?;

            let storage = crate::local::LocalStorage::new(path, base_url).await?;
            tracing::info!(backend = %StorageBackend::Local, "Storage backend initialized");
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local backend requested but the storage-local feature is not enabled".to_string(),
        )),
    }
}
