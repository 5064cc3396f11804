//! Pixelmill Worker
//!
//! Job manager: a fixed-size worker pool that claims jobs from the metadata
//! store, runs the transformation through a [`JobHandlerContext`], and
//! applies the bounded-retry policy with exponential backoff and jitter.

pub mod context;
pub mod queue;

pub use context::JobHandlerContext;
pub use queue::{JobQueue, JobQueueConfig};
