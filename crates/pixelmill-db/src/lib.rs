//! Pixelmill DB
//!
//! Metadata-store collaborator: sqlx/Postgres repositories for source
//! images, derived artifacts, and jobs. The job repository owns every state
//! transition of the job state machine; workers and the orchestration
//! service never update job rows directly.

pub mod artifacts;
pub mod jobs;
pub mod sources;

pub use artifacts::ArtifactRepository;
pub use jobs::{JobRepository, JOB_NOTIFY_CHANNEL};
pub use sources::SourceImageRepository;
