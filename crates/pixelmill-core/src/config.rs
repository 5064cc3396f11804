//! Configuration module
//!
//! Environment-driven configuration for the orchestration core and the
//! worker process: pipeline ceilings, dispatch threshold, cache bounds,
//! retry policy, worker pool sizing, and the storage/database collaborators.

use std::env;

use crate::models::pipeline::PipelineLimits;
use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Application configuration for the transformation core.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Pipeline ceilings
    pub max_pipeline_len: usize,
    pub max_pixel_dim: u32,
    pub max_source_size_bytes: usize,
    // Dispatch routing
    pub sync_cost_threshold: u64,
    /// Hard ceiling on estimated pipeline cost, sync or async.
    pub cost_budget: u64,
    // Artifact cache bounds
    pub cache_max_entries: usize,
    pub cache_max_bytes: u64,
    // Job retry policy
    pub job_max_attempts: i32,
    pub retry_backoff_base_secs: u64,
    pub retry_backoff_cap_secs: u64,
    pub job_liveness_timeout_secs: i64,
    pub reap_interval_secs: u64,
    // Worker pool
    pub worker_pool_size: usize,
    pub poll_interval_ms: u64,
    // Storage configuration
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const MAX_PIPELINE_LEN: usize = 16;
        const MAX_PIXEL_DIM: u32 = 8192;
        const MAX_SOURCE_SIZE_MB: usize = 10;
        // Pixel-steps budget below which a request may run on the caller's thread.
        const SYNC_COST_THRESHOLD: u64 = 4_000_000;
        const COST_BUDGET: u64 = 2_000_000_000;
        const CACHE_MAX_ENTRIES: usize = 1024;
        const CACHE_MAX_MB: u64 = 512;
        const JOB_MAX_ATTEMPTS: i32 = 3;
        const RETRY_BACKOFF_BASE_SECS: u64 = 2;
        const RETRY_BACKOFF_CAP_SECS: u64 = 300;
        const JOB_LIVENESS_TIMEOUT_SECS: i64 = 600;
        const REAP_INTERVAL_SECS: u64 = 60;
        const WORKER_POOL_SIZE: usize = 4;
        const POLL_INTERVAL_MS: u64 = 1000;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let storage_backend =
            env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|s| match s.to_lowercase().as_str() {
                    "s3" => Some(StorageBackend::S3),
                    "local" => Some(StorageBackend::Local),
                    _ => None,
                });

        let config = Config {
            environment,
            database_url: env::var("PIXELMILL_DATABASE_URL")
                .or_else(|_| env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("PIXELMILL_DATABASE_URL or DATABASE_URL must be set")
                })?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            max_pipeline_len: env::var("MAX_PIPELINE_LEN")
                .unwrap_or_else(|_| MAX_PIPELINE_LEN.to_string())
                .parse()
                .unwrap_or(MAX_PIPELINE_LEN),
            max_pixel_dim: env::var("MAX_PIXEL_DIM")
                .unwrap_or_else(|_| MAX_PIXEL_DIM.to_string())
                .parse()
                .unwrap_or(MAX_PIXEL_DIM),
            max_source_size_bytes: env::var("MAX_SOURCE_SIZE_MB")
                .unwrap_or_else(|_| MAX_SOURCE_SIZE_MB.to_string())
                .parse::<usize>()
                .unwrap_or(MAX_SOURCE_SIZE_MB)
                * 1024
                * 1024,
            sync_cost_threshold: env::var("SYNC_COST_THRESHOLD")
                .unwrap_or_else(|_| SYNC_COST_THRESHOLD.to_string())
                .parse()
                .unwrap_or(SYNC_COST_THRESHOLD),
            cost_budget: env::var("COST_BUDGET")
                .unwrap_or_else(|_| COST_BUDGET.to_string())
                .parse()
                .unwrap_or(COST_BUDGET),
            cache_max_entries: env::var("CACHE_MAX_ENTRIES")
                .unwrap_or_else(|_| CACHE_MAX_ENTRIES.to_string())
                .parse()
                .unwrap_or(CACHE_MAX_ENTRIES),
            cache_max_bytes: env::var("CACHE_MAX_MB")
                .unwrap_or_else(|_| CACHE_MAX_MB.to_string())
                .parse::<u64>()
                .unwrap_or(CACHE_MAX_MB)
                * 1024
                * 1024,
            job_max_attempts: env::var("JOB_MAX_ATTEMPTS")
                .unwrap_or_else(|_| JOB_MAX_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(JOB_MAX_ATTEMPTS),
            retry_backoff_base_secs: env::var("RETRY_BACKOFF_BASE_SECS")
                .unwrap_or_else(|_| RETRY_BACKOFF_BASE_SECS.to_string())
                .parse()
                .unwrap_or(RETRY_BACKOFF_BASE_SECS),
            retry_backoff_cap_secs: env::var("RETRY_BACKOFF_CAP_SECS")
                .unwrap_or_else(|_| RETRY_BACKOFF_CAP_SECS.to_string())
                .parse()
                .unwrap_or(RETRY_BACKOFF_CAP_SECS),
            job_liveness_timeout_secs: env::var("JOB_LIVENESS_TIMEOUT_SECS")
                .unwrap_or_else(|_| JOB_LIVENESS_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(JOB_LIVENESS_TIMEOUT_SECS),
            reap_interval_secs: env::var("REAP_INTERVAL_SECS")
                .unwrap_or_else(|_| REAP_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(REAP_INTERVAL_SECS),
            worker_pool_size: env::var("WORKER_POOL_SIZE")
                .unwrap_or_else(|_| WORKER_POOL_SIZE.to_string())
                .parse()
                .unwrap_or(WORKER_POOL_SIZE),
            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .unwrap_or_else(|_| POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(POLL_INTERVAL_MS),
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok().or_else(|| env::var("AWS_REGION").ok()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://") && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "PIXELMILL_DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.max_pipeline_len == 0 {
            return Err(anyhow::anyhow!("MAX_PIPELINE_LEN must be greater than 0"));
        }
        if self.max_pixel_dim == 0 {
            return Err(anyhow::anyhow!("MAX_PIXEL_DIM must be greater than 0"));
        }
        if self.worker_pool_size == 0 {
            return Err(anyhow::anyhow!("WORKER_POOL_SIZE must be greater than 0"));
        }
        if self.job_max_attempts < 1 {
            return Err(anyhow::anyhow!("JOB_MAX_ATTEMPTS must be at least 1"));
        }
        if self.retry_backoff_cap_secs < self.retry_backoff_base_secs {
            return Err(anyhow::anyhow!(
                "RETRY_BACKOFF_CAP_SECS must not be smaller than RETRY_BACKOFF_BASE_SECS"
            ));
        }

        let backend = self.storage_backend.unwrap_or(StorageBackend::Local);
        match backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn pipeline_limits(&self) -> PipelineLimits {
        PipelineLimits {
            max_pipeline_len: self.max_pipeline_len,
            max_pixel_dim: self.max_pixel_dim,
        }
    }
}
