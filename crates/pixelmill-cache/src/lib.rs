//! Pixelmill Cache
//!
//! Derived-artifact cache: an LRU index from fingerprint to artifact
//! reference, bounded by entry count and total bytes, with process-wide
//! single-flight computation per key.

pub mod artifact_cache;

pub use artifact_cache::{ArtifactCache, ArtifactCacheConfig};
