//! Pixelmill worker daemon.
//!
//! Wires configuration, telemetry, the database pool, the storage backend
//! and the transformation service together, then runs the job queue until
//! interrupted. Queue and broker connection state is created here at process
//! start and torn down on shutdown; nothing in the core reads it as an
//! ambient singleton.

use std::sync::Arc;

use anyhow::Result;
use pixelmill_core::Config;
use pixelmill_db::JobRepository;
use pixelmill_services::TransformationService;
use pixelmill_worker::{JobHandlerContext, JobQueue, JobQueueConfig};

// Use mimalloc as the global allocator for better performance and lower
// fragmentation, especially when running on musl-based systems inside
// containers.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    pixelmill_services::telemetry::init_telemetry()
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let pool = pixelmill_services::setup::setup_database(&config).await?;
    let storage = pixelmill_storage::create_storage(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize storage: {}", e))?;

    let service = Arc::new(TransformationService::new(&config, pool.clone(), storage));
    let handler: Arc<dyn JobHandlerContext> = service.clone();

    let queue = JobQueue::new(
        JobRepository::new(pool.clone()),
        JobQueueConfig {
            max_workers: config.worker_pool_size,
            poll_interval_ms: config.poll_interval_ms,
            retry_backoff_base_secs: config.retry_backoff_base_secs,
            retry_backoff_cap_secs: config.retry_backoff_cap_secs,
            liveness_timeout_secs: config.job_liveness_timeout_secs,
            reap_interval_secs: config.reap_interval_secs,
        },
        Arc::downgrade(&handler),
        Some(pool),
    );

    tracing::info!(
        environment = %config.environment,
        workers = config.worker_pool_size,
        "pixelmilld started"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown signal received");
    queue.shutdown().await;

    Ok(())
}
