//! Asynchronous transformation jobs
//!
//! A job tracks one queued transformation request through the state machine
//! `pending → running → {succeeded, failed}` with bounded retry via
//! `retrying`. Terminal states are final and durable; all transitions happen
//! through the job repository's conditional updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::operation::OutputFormat;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_status", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Retrying => write!(f, "retrying"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "retrying" => Ok(JobStatus::Retrying),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// One asynchronous transformation request.
///
/// `operations` holds the request as submitted (pre-canonicalization) for
/// audit; workers rebuild and re-canonicalize the pipeline from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub source_image_id: Uuid,
    pub operations: serde_json::Value,
    pub output_format: OutputFormat,
    pub status: JobStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub result_artifact_id: Option<Uuid>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Job {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Job {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            source_image_id: row.get("source_image_id"),
            operations: row.get("operations"),
            output_format: row.get::<String, _>("output_format").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse output_format: {}", e).into())
            })?,
            status: row.get("status"),
            attempt_count: row.get("attempt_count"),
            max_attempts: row.get("max_attempts"),
            scheduled_at: row.get("scheduled_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            last_error: row.get("last_error"),
            result_artifact_id: row.get("result_artifact_id"),
            cancel_requested: row.get("cancel_requested"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

impl Job {
    /// A job is claimable when it is waiting and its backoff (if any) elapsed.
    pub fn is_ready_to_run(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Retrying)
            && self.scheduled_at <= Utc::now()
    }

    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Handle returned to a caller whose request was routed to the async path.
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub status: JobStatus,
}

impl From<&Job> for JobHandle {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
        }
    }
}

/// Status report exposed through `get_job_status`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    pub id: Uuid,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub result_artifact_id: Option<Uuid>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobStatusReport {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            attempts: job.attempt_count,
            max_attempts: job.max_attempts,
            result_artifact_id: job.result_artifact_id,
            last_error: job.last_error,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}
