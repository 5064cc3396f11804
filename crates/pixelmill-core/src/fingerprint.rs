//! Derived-artifact fingerprinting
//!
//! A fingerprint is the cache key for a derived artifact: sha-256 over the
//! source content hash, the canonical pipeline encoding, and the output
//! format. Collision resistance is a correctness property here, not an
//! optimization — two requests that hash alike are served the same bytes.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::operation::OutputFormat;
use crate::models::pipeline::Pipeline;

/// Domain-separation prefix so fingerprints can never collide with plain
/// content hashes.
const FINGERPRINT_DOMAIN: &[u8] = b"pixelmill.fingerprint.v1";

/// Cache key for one (source, canonical pipeline, output format) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FingerprintKey(String);

impl FingerprintKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rehydrate a key from its stored hex form (e.g. a database row).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }
}

impl Display for FingerprintKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Content identity of raw uploaded bytes (sha-256, hex).
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Derive the deterministic cache key for a transformation request.
///
/// Equal inputs always produce equal keys; any difference in operation
/// order, parameter values, or output format produces a different key.
pub fn fingerprint(
    source_content_hash: &str,
    pipeline: &Pipeline,
    output_format: OutputFormat,
) -> FingerprintKey {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    hasher.update(source_content_hash.as_bytes());
    hasher.update(pipeline.canonical_bytes());
    hasher.update([output_format.tag()]);
    FingerprintKey(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::operation::{OperationSpec, StretchMode};
    use crate::models::pipeline::{PipelineBuilder, PipelineLimits};

    fn build(ops: Vec<OperationSpec>) -> Pipeline {
        PipelineBuilder::new(PipelineLimits::default()).build(ops).unwrap()
    }

    fn resize(w: u32, h: u32) -> OperationSpec {
        OperationSpec::Resize {
            width: Some(w),
            height: Some(h),
            mode: StretchMode::On,
        }
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let hash = content_hash(b"hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(content_hash(b"hello"), hash);
        assert_ne!(content_hash(b"hello!"), hash);
    }

    #[test]
    fn test_equal_inputs_equal_keys() {
        let a = fingerprint("abc123", &build(vec![resize(400, 300)]), OutputFormat::Png);
        let b = fingerprint("abc123", &build(vec![resize(400, 300)]), OutputFormat::Png);
        assert_eq!(a, b);
    }

    #[test]
    fn test_operation_order_changes_key() {
        let crop = OperationSpec::Crop {
            x: 10,
            y: 10,
            width: 100,
            height: 100,
        };
        let rotate = OperationSpec::Rotate { degrees: 90 };

        let rotate_then_crop = fingerprint(
            "abc123",
            &build(vec![rotate.clone(), crop.clone()]),
            OutputFormat::Png,
        );
        let crop_then_rotate = fingerprint("abc123", &build(vec![crop, rotate]), OutputFormat::Png);
        assert_ne!(rotate_then_crop, crop_then_rotate);
    }

    #[test]
    fn test_parameter_value_changes_key() {
        let a = fingerprint("abc123", &build(vec![resize(400, 300)]), OutputFormat::Png);
        let b = fingerprint("abc123", &build(vec![resize(400, 301)]), OutputFormat::Png);
        assert_ne!(a, b);
    }

    #[test]
    fn test_output_format_changes_key() {
        let pipeline = build(vec![resize(400, 300)]);
        let png = fingerprint("abc123", &pipeline, OutputFormat::Png);
        let jpeg = fingerprint("abc123", &pipeline, OutputFormat::Jpeg);
        assert_ne!(png, jpeg);
    }

    #[test]
    fn test_source_hash_changes_key() {
        let pipeline = build(vec![resize(400, 300)]);
        let a = fingerprint("source-a", &pipeline, OutputFormat::Png);
        let b = fingerprint("source-b", &pipeline, OutputFormat::Png);
        assert_ne!(a, b);
    }

    #[test]
    fn test_redundant_pipeline_hashes_like_collapsed_form() {
        let collapsed = fingerprint("abc123", &build(vec![resize(400, 300)]), OutputFormat::Png);
        let redundant = fingerprint(
            "abc123",
            &build(vec![resize(800, 600), resize(400, 300)]),
            OutputFormat::Png,
        );
        assert_eq!(collapsed, redundant);
    }
}
