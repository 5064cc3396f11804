//! Pixelmill Core Library
//!
//! This crate provides the domain models, error types, configuration, and
//! fingerprinting that are shared across all Pixelmill components: operation
//! specifications, the pipeline builder and canonicalizer, source/derived
//! image records, and the asynchronous job model.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod job_error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use error::{TransformError, ValidationError};
pub use fingerprint::{content_hash, fingerprint, FingerprintKey};
pub use job_error::{JobError, JobResultExt};
pub use storage_types::StorageBackend;
