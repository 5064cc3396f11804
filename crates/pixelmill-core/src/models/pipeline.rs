//! Pipeline construction and canonicalization
//!
//! A [`Pipeline`] is an ordered, validated, canonical sequence of operation
//! specs. Order is semantically significant (rotate-then-crop is not
//! crop-then-rotate), so canonicalization only collapses adjacent operations
//! that are mathematically equivalent to a single one. The canonical byte
//! encoding feeds the fingerprint engine and must stay a pure function of the
//! operation sequence.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::operation::{
    FilterKind, OperationLimits, OperationSpec, OutputFormat, WatermarkPosition,
};

/// Version byte prefixed to the canonical encoding. Bump when the encoding
/// changes so stale fingerprints can never alias new ones.
const CANONICAL_ENCODING_VERSION: u8 = 1;

/// Limits applied while building pipelines, taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct PipelineLimits {
    pub max_pipeline_len: usize,
    pub max_pixel_dim: u32,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_pipeline_len: 16,
            max_pixel_dim: 8192,
        }
    }
}

/// Canonical, validated operation sequence.
///
/// Only [`PipelineBuilder::build`] constructs these, so holding a `Pipeline`
/// is proof the operations passed validation and are in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    ops: Vec<OperationSpec>,
}

impl Pipeline {
    pub fn operations(&self) -> &[OperationSpec] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when canonicalization reduced the input to the identity
    /// transformation (e.g. flip followed by flip). The engine still decodes
    /// and re-encodes in that case.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The format of the last `ConvertFormat` operation, if any. It overrides
    /// the requested output format at encode time.
    pub fn format_override(&self) -> Option<OutputFormat> {
        self.ops.iter().rev().find_map(|op| match op {
            OperationSpec::ConvertFormat { format } => Some(*format),
            _ => None,
        })
    }

    /// The quality of the last `Compress` operation, if any. Consumed by the
    /// encoder, not by pixel operators.
    pub fn encode_quality(&self) -> Option<u8> {
        self.ops.iter().rev().find_map(|op| match op {
            OperationSpec::Compress { quality } => Some(*quality),
            _ => None,
        })
    }

    /// Stable byte encoding of the canonical sequence, used for hashing.
    ///
    /// Field-tagged, little-endian integers, float bit patterns; no
    /// environmental state participates.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.ops.len() * 16);
        buf.push(CANONICAL_ENCODING_VERSION);
        for op in &self.ops {
            encode_operation(op, &mut buf);
        }
        buf
    }
}

fn encode_optional_u32(value: Option<u32>, buf: &mut Vec<u8>) {
    match value {
        Some(v) => {
            buf.push(1);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        None => buf.push(0),
    }
}

fn encode_operation(op: &OperationSpec, buf: &mut Vec<u8>) {
    match op {
        OperationSpec::Resize { width, height, mode } => {
            buf.push(0x01);
            encode_optional_u32(*width, buf);
            encode_optional_u32(*height, buf);
            buf.push(mode.tag());
        }
        OperationSpec::Crop { x, y, width, height } => {
            buf.push(0x02);
            for v in [x, y, width, height] {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        OperationSpec::Rotate { degrees } => {
            buf.push(0x03);
            buf.extend_from_slice(&degrees.to_le_bytes());
        }
        OperationSpec::Watermark {
            watermark_id,
            position,
            opacity,
        } => {
            buf.push(0x04);
            buf.extend_from_slice(watermark_id.as_bytes());
            match position {
                WatermarkPosition::TopLeft => buf.push(0),
                WatermarkPosition::TopRight => buf.push(1),
                WatermarkPosition::BottomLeft => buf.push(2),
                WatermarkPosition::BottomRight => buf.push(3),
                WatermarkPosition::Center => buf.push(4),
                WatermarkPosition::Custom { x, y } => {
                    buf.push(5);
                    buf.extend_from_slice(&x.to_le_bytes());
                    buf.extend_from_slice(&y.to_le_bytes());
                }
            }
            buf.extend_from_slice(&opacity.to_bits().to_le_bytes());
        }
        OperationSpec::Flip => buf.push(0x05),
        OperationSpec::Mirror => buf.push(0x06),
        OperationSpec::Compress { quality } => {
            buf.push(0x07);
            buf.push(*quality);
        }
        OperationSpec::ConvertFormat { format } => {
            buf.push(0x08);
            buf.push(format.tag());
        }
        OperationSpec::Filter { filter } => {
            buf.push(0x09);
            match filter {
                FilterKind::Grayscale => buf.push(0),
                FilterKind::Sepia => buf.push(1),
                FilterKind::Invert => buf.push(2),
                FilterKind::Blur { sigma } => {
                    buf.push(3);
                    buf.extend_from_slice(&sigma.to_bits().to_le_bytes());
                }
            }
        }
    }
}

/// Validates and canonicalizes raw operation lists into [`Pipeline`]s.
#[derive(Debug, Clone, Copy)]
pub struct PipelineBuilder {
    limits: PipelineLimits,
}

impl PipelineBuilder {
    pub fn new(limits: PipelineLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &PipelineLimits {
        &self.limits
    }

    /// Validate each operation, then collapse adjacent redundant operations.
    ///
    /// Canonicalization is an optimization, never a semantic change: two
    /// consecutive resizes keep only the final effective one, consecutive
    /// rotations sum mod 360, paired flips/mirrors cancel, and consecutive
    /// format/compress settings keep the last.
    pub fn build(&self, raw_operations: Vec<OperationSpec>) -> Result<Pipeline, ValidationError> {
        if raw_operations.is_empty() {
            return Err(ValidationError::for_pipeline(
                "operations",
                "at least one operation is required",
            ));
        }

        let op_limits = OperationLimits {
            max_pixel_dim: self.limits.max_pixel_dim,
        };
        for op in &raw_operations {
            op.validate(&op_limits)?;
        }

        let ops = canonicalize(raw_operations);

        if ops.len() > self.limits.max_pipeline_len {
            return Err(ValidationError::for_pipeline(
                "operations",
                format!(
                    "pipeline exceeds maximum length of {} operations",
                    self.limits.max_pipeline_len
                ),
            ));
        }

        Ok(Pipeline { ops })
    }
}

enum Merge {
    Push,
    ReplaceLast,
    PopLast,
    SetRotation(u16),
}

fn canonicalize(raw: Vec<OperationSpec>) -> Vec<OperationSpec> {
    let mut out: Vec<OperationSpec> = Vec::with_capacity(raw.len());

    for op in raw {
        // A zero-degree rotation is the identity; never enters canonical form.
        if matches!(op, OperationSpec::Rotate { degrees: 0 }) {
            continue;
        }

        let decision = match (out.last(), &op) {
            (Some(OperationSpec::Resize { .. }), OperationSpec::Resize { .. }) => Merge::ReplaceLast,
            (Some(OperationSpec::Rotate { degrees: prev }), OperationSpec::Rotate { degrees }) => {
                let combined = (prev + degrees) % 360;
                if combined == 0 {
                    Merge::PopLast
                } else {
                    Merge::SetRotation(combined)
                }
            }
            (Some(OperationSpec::Flip), OperationSpec::Flip) => Merge::PopLast,
            (Some(OperationSpec::Mirror), OperationSpec::Mirror) => Merge::PopLast,
            (Some(OperationSpec::ConvertFormat { .. }), OperationSpec::ConvertFormat { .. }) => {
                Merge::ReplaceLast
            }
            (Some(OperationSpec::Compress { .. }), OperationSpec::Compress { .. }) => {
                Merge::ReplaceLast
            }
            _ => Merge::Push,
        };

        match decision {
            Merge::Push => out.push(op),
            Merge::ReplaceLast => {
                out.pop();
                out.push(op);
            }
            Merge::PopLast => {
                out.pop();
            }
            Merge::SetRotation(degrees) => {
                out.pop();
                out.push(OperationSpec::Rotate { degrees });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::operation::StretchMode;

    fn builder() -> PipelineBuilder {
        PipelineBuilder::new(PipelineLimits::default())
    }

    fn resize(w: u32, h: u32) -> OperationSpec {
        OperationSpec::Resize {
            width: Some(w),
            height: Some(h),
            mode: StretchMode::On,
        }
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = builder().build(vec![]).unwrap_err();
        assert_eq!(err.kind, None);
        assert_eq!(err.field, "operations");
    }

    #[test]
    fn test_invalid_operation_rejected_before_canonicalization() {
        let err = builder()
            .build(vec![OperationSpec::Rotate { degrees: 450 }])
            .unwrap_err();
        assert_eq!(err.field, "degrees");
    }

    #[test]
    fn test_over_long_pipeline_rejected() {
        let b = PipelineBuilder::new(PipelineLimits {
            max_pipeline_len: 2,
            max_pixel_dim: 8192,
        });
        let ops = vec![resize(100, 100), OperationSpec::Flip, OperationSpec::Mirror];
        let err = b.build(ops).unwrap_err();
        assert_eq!(err.field, "operations");
        assert!(err.reason.contains("maximum length"));
    }

    #[test]
    fn test_consecutive_resizes_collapse_to_last() {
        let pipeline = builder()
            .build(vec![resize(800, 600), resize(400, 300)])
            .unwrap();
        assert_eq!(pipeline.operations(), &[resize(400, 300)]);
    }

    #[test]
    fn test_consecutive_rotations_sum_mod_360() {
        let pipeline = builder()
            .build(vec![
                OperationSpec::Rotate { degrees: 90 },
                OperationSpec::Rotate { degrees: 90 },
            ])
            .unwrap();
        assert_eq!(pipeline.operations(), &[OperationSpec::Rotate { degrees: 180 }]);

        let pipeline = builder()
            .build(vec![
                OperationSpec::Rotate { degrees: 270 },
                OperationSpec::Rotate { degrees: 90 },
            ])
            .unwrap();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_paired_flips_cancel() {
        let pipeline = builder()
            .build(vec![OperationSpec::Flip, OperationSpec::Flip])
            .unwrap();
        assert!(pipeline.is_empty());

        // Cancellation exposes new adjacency: 90 / flip flip / 270 collapses away.
        let pipeline = builder()
            .build(vec![
                OperationSpec::Rotate { degrees: 90 },
                OperationSpec::Flip,
                OperationSpec::Flip,
                OperationSpec::Rotate { degrees: 270 },
            ])
            .unwrap();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_non_adjacent_operations_not_collapsed() {
        let ops = vec![resize(800, 600), OperationSpec::Flip, resize(400, 300)];
        let pipeline = builder().build(ops.clone()).unwrap();
        assert_eq!(pipeline.operations(), &ops[..]);
    }

    #[test]
    fn test_consecutive_format_conversions_keep_last() {
        let pipeline = builder()
            .build(vec![
                OperationSpec::ConvertFormat {
                    format: OutputFormat::Png,
                },
                OperationSpec::ConvertFormat {
                    format: OutputFormat::Webp,
                },
            ])
            .unwrap();
        assert_eq!(
            pipeline.operations(),
            &[OperationSpec::ConvertFormat {
                format: OutputFormat::Webp
            }]
        );
        assert_eq!(pipeline.format_override(), Some(OutputFormat::Webp));
    }

    #[test]
    fn test_encode_quality_takes_last_compress() {
        let pipeline = builder()
            .build(vec![
                OperationSpec::Compress { quality: 40 },
                resize(100, 100),
                OperationSpec::Compress { quality: 80 },
            ])
            .unwrap();
        assert_eq!(pipeline.encode_quality(), Some(80));
    }

    #[test]
    fn test_canonical_bytes_stable_and_order_sensitive() {
        let a = builder()
            .build(vec![OperationSpec::Rotate { degrees: 90 }, resize(400, 300)])
            .unwrap();
        let b = builder()
            .build(vec![OperationSpec::Rotate { degrees: 90 }, resize(400, 300)])
            .unwrap();
        let c = builder()
            .build(vec![resize(400, 300), OperationSpec::Rotate { degrees: 90 }])
            .unwrap();

        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
        assert_ne!(a.canonical_bytes(), c.canonical_bytes());
    }

    #[test]
    fn test_collapsed_forms_encode_identically() {
        let collapsed = builder().build(vec![resize(400, 300)]).unwrap();
        let redundant = builder()
            .build(vec![resize(800, 600), resize(400, 300)])
            .unwrap();
        assert_eq!(collapsed.canonical_bytes(), redundant.canonical_bytes());

        let rotated = builder()
            .build(vec![OperationSpec::Rotate { degrees: 180 }])
            .unwrap();
        let summed = builder()
            .build(vec![
                OperationSpec::Rotate { degrees: 90 },
                OperationSpec::Rotate { degrees: 90 },
            ])
            .unwrap();
        assert_eq!(rotated.canonical_bytes(), summed.canonical_bytes());
    }

    #[test]
    fn test_zero_rotation_dropped() {
        let pipeline = builder()
            .build(vec![OperationSpec::Rotate { degrees: 0 }, resize(100, 100)])
            .unwrap();
        assert_eq!(pipeline.operations(), &[resize(100, 100)]);
    }
}
