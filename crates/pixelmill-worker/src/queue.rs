//! Job queue: worker pool, LISTEN/NOTIFY or polling, retry, and reaping.
//!
//! Shutdown: [`JobQueue::shutdown`] signals the pool to stop claiming; it
//! does not wait for in-flight jobs. The stale-job reaper covers the case
//! where a worker dies mid-job: a running job past its liveness deadline is
//! returned to the retry path, never left orphaned.

use anyhow::{Context, Result};
use rand::Rng;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use pixelmill_core::models::Job;
use pixelmill_db::{JobRepository, JOB_NOTIFY_CHANNEL};

use crate::context::JobHandlerContext;

/// Computes backoff for a given attempt number: exponential on the
/// configured base, capped, with full jitter in `[delay/2, delay]` so a
/// burst of failures against a shared dependency does not retry in
/// lockstep.
pub(crate) fn compute_retry_backoff(attempt: i32, base_secs: u64, cap_secs: u64) -> chrono::Duration {
    let attempt = attempt.max(1) as u32;
    let uncapped = base_secs
        .max(1)
        .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1).min(32)));
    let delay = uncapped.min(cap_secs.max(1));
    let low = (delay / 2).max(1);
    let secs = rand::rng().random_range(low..=delay);
    chrono::Duration::seconds(secs as i64)
}

#[derive(Clone)]
pub struct JobQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub retry_backoff_base_secs: u64,
    pub retry_backoff_cap_secs: u64,
    /// A running job older than this is presumed orphaned by a dead worker.
    pub liveness_timeout_secs: i64,
    /// Interval in seconds between runs of the stale job reaper. 0 = disabled.
    pub reap_interval_secs: u64,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            retry_backoff_base_secs: 2,
            retry_backoff_cap_secs: 300,
            liveness_timeout_secs: 600,
            reap_interval_secs: 60,
        }
    }
}

pub struct JobQueue {
    repository: JobRepository,
    config: JobQueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl JobQueue {
    /// Create a new JobQueue with a weak reference to the execution context.
    ///
    /// If `pool` is `Some`, the worker uses PostgreSQL LISTEN/NOTIFY to wake
    /// immediately when jobs are enqueued, in addition to polling at
    /// `poll_interval_ms`. If `pool` is `None`, only polling is used.
    pub fn new(
        repository: JobRepository,
        config: JobQueueConfig,
        context: Weak<dyn JobHandlerContext>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let repo_clone = repository.clone();
        let config_clone = config.clone();

        tokio::spawn(async move {
            Self::worker_pool(repo_clone, config_clone, context, shutdown_rx, pool).await;
        });

        Self {
            repository,
            config,
            shutdown_tx,
        }
    }

    async fn worker_pool(
        repository: JobRepository,
        config: JobQueueConfig,
        context: Weak<dyn JobHandlerContext>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            "Job queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Channel to wake the main loop when LISTEN receives a NOTIFY.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(JOB_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        // Spawn stale job reaper (if interval > 0)
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.reap_interval_secs > 0 {
            let repo_for_reaper = repository.clone();
            let reap_interval = Duration::from_secs(config.reap_interval_secs);
            let liveness_timeout = config.liveness_timeout_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = repo_for_reaper.reap_stale_running(liveness_timeout).await {
                                tracing::error!(error = %e, "Stale job reaper failed");
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job queue worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&repository, &config, &semaphore, &context).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&repository, &config, &semaphore, &context).await;
                }
            }
        }

        tracing::info!("Job queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        repository: &JobRepository,
        config: &JobQueueConfig,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn JobHandlerContext>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match repository.claim_next_job().await {
            Ok(Some(job)) => {
                let repo = repository.clone();
                let config = config.clone();
                let ctx = context.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_claimed_job(job, repo, config, ctx).await {
                        tracing::error!(error = %e, "Job processing failed");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim job from queue");
            }
        }
    }

    #[tracing::instrument(skip(job, repository, config, context), fields(job.id = %job.id, job.attempt = job.attempt_count))]
    async fn process_claimed_job(
        job: Job,
        repository: JobRepository,
        config: JobQueueConfig,
        context: Weak<dyn JobHandlerContext>,
    ) -> Result<()> {
        // Cancellation requested while the job waited: honor it before doing
        // any work. Once the pipeline runs, the job completes normally and
        // no partially-written artifact is ever visible.
        if job.cancel_requested {
            tracing::info!(job_id = %job.id, "Cancellation honored before execution");
            repository.mark_failed(job.id, "cancelled").await?;
            return Ok(());
        }

        let ctx = context
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("JobHandlerContext was dropped, cannot process job"))?;

        let timeout_duration = Duration::from_secs(job_timeout_secs(config.liveness_timeout_secs));

        let result = tokio::time::timeout(timeout_duration, ctx.execute_job(&job)).await;

        match result {
            Ok(Ok(artifact_id)) => {
                // Best-effort cancellation for running jobs: the pipeline ran
                // to completion (so no partially-written artifact exists) and
                // the flag is honored now. The derived artifact stays cached;
                // only the job outcome records the cancellation.
                let cancel_requested = repository
                    .get_job(job.id)
                    .await
                    .unwrap_or(None)
                    .map(|j| j.cancel_requested)
                    .unwrap_or(false);
                if cancel_requested {
                    tracing::info!(job_id = %job.id, "Cancellation honored after execution");
                    repository.mark_failed(job.id, "cancelled").await?;
                    return Ok(());
                }

                repository
                    .mark_succeeded(job.id, artifact_id)
                    .await
                    .context("Failed to mark job as succeeded")?;
                Ok(())
            }
            Ok(Err(job_error)) => {
                tracing::error!(
                    job_id = %job.id,
                    error = %job_error,
                    attempt = job.attempt_count,
                    max_attempts = job.max_attempts,
                    recoverable = job_error.is_recoverable(),
                    "Job execution failed"
                );

                if !job_error.is_recoverable() {
                    repository
                        .mark_failed(job.id, &job_error.to_string())
                        .await
                        .context("Failed to mark job as failed")?;
                    return Err(job_error.into_inner());
                }

                if job.can_retry() {
                    let backoff = compute_retry_backoff(
                        job.attempt_count,
                        config.retry_backoff_base_secs,
                        config.retry_backoff_cap_secs,
                    );
                    repository
                        .schedule_retry(job.id, backoff, &job_error.to_string())
                        .await
                        .context("Failed to schedule job retry")?;
                    Ok(())
                } else {
                    repository
                        .mark_failed(job.id, &job_error.to_string())
                        .await
                        .context("Failed to mark job as failed")?;
                    Err(job_error.into_inner())
                }
            }
            Err(_) => {
                tracing::error!(
                    job_id = %job.id,
                    timeout_seconds = config.liveness_timeout_secs,
                    "Job execution timed out"
                );
                if job.can_retry() {
                    let backoff = compute_retry_backoff(
                        job.attempt_count,
                        config.retry_backoff_base_secs,
                        config.retry_backoff_cap_secs,
                    );
                    repository
                        .schedule_retry(job.id, backoff, "execution timed out")
                        .await?;
                    Ok(())
                } else {
                    repository.mark_failed(job.id, "execution timed out").await?;
                    Err(anyhow::anyhow!("Job execution timed out"))
                }
            }
        }
    }

    /// Signals the worker pool to stop claiming new jobs and exit the main
    /// loop. Returns immediately; already-spawned job handlers run to
    /// completion or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }

    pub fn repository(&self) -> &JobRepository {
        &self.repository
    }
}

fn job_timeout_secs(liveness_timeout_secs: i64) -> u64 {
    if liveness_timeout_secs > 0 {
        liveness_timeout_secs as u64
    } else {
        3600
    }
}

impl Clone for JobQueue {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}
