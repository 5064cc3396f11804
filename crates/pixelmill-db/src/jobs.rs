//! Job repository: creation, claiming, and every state-machine transition.
//!
//! All transitions are conditional updates so they stay correct under
//! concurrent workers and at-least-once queue delivery: claiming uses
//! `FOR UPDATE SKIP LOCKED`, success writes the result reference in the same
//! UPDATE as the state flip, and cancellation only fires from states where
//! it is allowed.

use anyhow::{Context, Result};
use chrono::Duration;
use pixelmill_core::models::{Job, OutputFormat};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Channel name for PostgreSQL LISTEN/NOTIFY when a new job is created.
pub const JOB_NOTIFY_CHANNEL: &str = "pixelmill_new_job";

const JOB_COLUMNS: &str = r#"
    id,
    owner_id,
    source_image_id,
    operations,
    output_format,
    status,
    attempt_count,
    max_attempts,
    scheduled_at,
    started_at,
    completed_at,
    last_error,
    result_artifact_id,
    cancel_requested,
    created_at,
    updated_at
"#;

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a new job and notify listening workers.
    ///
    /// `operations` is the request exactly as submitted (pre-canonicalization)
    /// so the audit trail reflects what the caller asked for.
    #[tracing::instrument(skip(self, operations))]
    pub async fn create_job(
        &self,
        owner_id: Uuid,
        source_image_id: Uuid,
        operations: serde_json::Value,
        output_format: OutputFormat,
        max_attempts: i32,
    ) -> Result<Job> {
        let job: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            INSERT INTO jobs (owner_id, source_image_id, operations, output_format, max_attempts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(owner_id)
        .bind(source_image_id)
        .bind(operations)
        .bind(output_format.to_string())
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create job")?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(JOB_NOTIFY_CHANNEL)
            .bind(job.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to notify workers of new job")?;

        tracing::info!(
            job_id = %job.id,
            source_image_id = %source_image_id,
            "Job enqueued"
        );

        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let job = sqlx::query_as::<Postgres, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job")?;

        Ok(job)
    }

    /// Atomically claim the next runnable job.
    ///
    /// Runnable means pending, or retrying with its backoff elapsed — the
    /// `retrying → pending` edge of the state machine is observable as "a
    /// retrying job whose scheduled_at has passed becomes claimable".
    ///
    /// `FOR UPDATE SKIP LOCKED` makes the claim exclusive under concurrent
    /// workers, and flipping the status inside the same transaction makes
    /// re-delivered notifications for an already-running or terminal job a
    /// no-op (the row no longer matches the claimable predicate).
    ///
    /// The attempt counter increments at claim time: attempt_count is the
    /// number of executions started.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next_job(&self) -> Result<Option<Job>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let job: Option<Job> = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status IN ('pending', 'retrying')
                AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch next job")?;

        if let Some(job) = job {
            let claimed: Job = sqlx::query_as::<Postgres, Job>(&format!(
                r#"
                UPDATE jobs
                SET status = 'running',
                    attempt_count = attempt_count + 1,
                    started_at = NOW(),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {JOB_COLUMNS}
                "#
            ))
            .bind(job.id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to mark job as running")?;

            tx.commit().await.context("Failed to commit claim")?;

            tracing::debug!(
                job_id = %claimed.id,
                attempt = claimed.attempt_count,
                "Job claimed"
            );

            Ok(Some(claimed))
        } else {
            tx.rollback().await.ok();
            Ok(None)
        }
    }

    /// Record success. The result artifact reference is set in the same
    /// UPDATE as the terminal transition: there is no window where the job
    /// is succeeded without a result.
    #[tracing::instrument(skip(self))]
    pub async fn mark_succeeded(&self, job_id: Uuid, result_artifact_id: Uuid) -> Result<Job> {
        let job: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                result_artifact_id = $2,
                last_error = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(result_artifact_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job as succeeded")?;

        tracing::info!(
            job_id = %job_id,
            result_artifact_id = %result_artifact_id,
            attempts = job.attempt_count,
            "Job succeeded"
        );

        Ok(job)
    }

    /// Record a terminal failure, keeping the last error for diagnostics.
    #[tracing::instrument(skip(self, last_error))]
    pub async fn mark_failed(&self, job_id: Uuid, last_error: &str) -> Result<Job> {
        let job: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'failed',
                last_error = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(last_error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job as failed")?;

        tracing::error!(
            job_id = %job_id,
            attempts = job.attempt_count,
            last_error = %last_error,
            "Job failed"
        );

        Ok(job)
    }

    /// Move a running job to `retrying`, scheduled `backoff` from now.
    #[tracing::instrument(skip(self, last_error))]
    pub async fn schedule_retry(
        &self,
        job_id: Uuid,
        backoff: Duration,
        last_error: &str,
    ) -> Result<Job> {
        let job: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'retrying',
                last_error = $2,
                scheduled_at = NOW() + $3 * INTERVAL '1 second',
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(last_error)
        .bind(backoff.num_seconds())
        .fetch_one(&self.pool)
        .await
        .context("Failed to schedule job retry")?;

        tracing::info!(
            job_id = %job_id,
            attempt = job.attempt_count,
            backoff_seconds = backoff.num_seconds(),
            "Job retry scheduled"
        );

        Ok(job)
    }

    /// Cancel a job that has not been claimed yet.
    ///
    /// Pending (or backoff-waiting) jobs move straight to terminal `failed`
    /// with reason `cancelled`. A running job cannot be stopped mid-pipeline;
    /// instead the cancel flag is set and the worker honors it at its next
    /// check. Terminal jobs are left untouched. Returns the job as it is
    /// after the call, or None if it does not exist or is not owned by
    /// `owner_id`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: Uuid, owner_id: Uuid) -> Result<Option<Job>> {
        let cancelled: Option<Job> = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'failed',
                last_error = 'cancelled',
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND status IN ('pending', 'retrying')
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to cancel job")?;

        if let Some(job) = cancelled {
            tracing::info!(job_id = %job_id, "Job cancelled before claim");
            return Ok(Some(job));
        }

        // Not cancellable directly; flag a running job for best-effort cancel.
        let flagged: Option<Job> = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE jobs
            SET cancel_requested = TRUE,
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND status = 'running'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to flag job for cancellation")?;

        if flagged.is_some() {
            tracing::info!(job_id = %job_id, "Cancellation requested for running job");
            return Ok(flagged);
        }

        // Terminal or not found; report current state if visible to the owner.
        let current = sqlx::query_as::<Postgres, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND owner_id = $2"
        ))
        .bind(job_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job after cancel attempt")?;

        Ok(current)
    }

    /// Return jobs stuck in `running` past their liveness deadline to the
    /// retry path, or fail them if their attempts are exhausted. Run
    /// periodically by the reaper; a worker crash is indistinguishable from
    /// a hang, so both are treated as a retryable failure.
    #[tracing::instrument(skip(self))]
    pub async fn reap_stale_running(&self, liveness_timeout_secs: i64) -> Result<u64> {
        let exhausted = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                last_error = 'worker liveness timeout',
                completed_at = NOW(),
                updated_at = NOW()
            WHERE status = 'running'
                AND started_at < NOW() - $1 * INTERVAL '1 second'
                AND attempt_count >= max_attempts
            "#,
        )
        .bind(liveness_timeout_secs)
        .execute(&self.pool)
        .await
        .context("Failed to fail exhausted stale jobs")?
        .rows_affected();

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'retrying',
                last_error = 'worker liveness timeout',
                scheduled_at = NOW(),
                updated_at = NOW()
            WHERE status = 'running'
                AND started_at < NOW() - $1 * INTERVAL '1 second'
            "#,
        )
        .bind(liveness_timeout_secs)
        .execute(&self.pool)
        .await
        .context("Failed to requeue stale jobs")?
        .rows_affected();

        if exhausted > 0 || requeued > 0 {
            tracing::warn!(
                requeued = requeued,
                failed = exhausted,
                "Reaped stale running jobs"
            );
        }

        Ok(exhausted + requeued)
    }
}
