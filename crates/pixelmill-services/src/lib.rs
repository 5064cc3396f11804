//! Pixelmill Services
//!
//! The orchestration layer: the dispatch router, the transformation service
//! facade (`submit_transformation` / `get_job_status` / `cancel_job`), and
//! process wiring for the worker daemon.

pub mod context;
pub mod router;
pub mod setup;
pub mod telemetry;
pub mod transform;

pub use context::RequestContext;
pub use router::{DispatchRouter, ExecutionPath};
pub use transform::{SubmitError, SubmitOutcome, TransformationService};
