//! Job execution context.
//!
//! The queue holds a `Weak` reference to the context so shutdown ordering is
//! never cyclic: when the owning service drops, in-flight dispatches fail
//! gracefully instead of keeping the process alive.

use async_trait::async_trait;
use pixelmill_core::models::Job;
use pixelmill_core::JobError;
use uuid::Uuid;

/// Executes one claimed job end to end.
///
/// Implementations download the source, run the transformation engine
/// through the artifact cache, persist the result, and return the derived
/// artifact id. Errors carry their retry classification via [`JobError`].
#[async_trait]
pub trait JobHandlerContext: Send + Sync {
    async fn execute_job(&self, job: &Job) -> Result<Uuid, JobError>;
}
