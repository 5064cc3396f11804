//! Transformation engine
//!
//! Applies a canonical pipeline to source bytes, strictly in sequence: the
//! in-memory image produced by operation *i* is the input of operation
//! *i + 1*. Canonicalization already fixed the order, so no reordering
//! happens here.
//!
//! The engine is a pure function of its inputs — same source bytes, same
//! pipeline, same output format yield byte-identical output for pinned
//! library versions. Resource ceilings are enforced before any pixel work:
//! the preflight walks the declared dimension flow and rejects pipelines
//! whose intermediate or final dimensions exceed the configured maximum, or
//! whose estimated cost exceeds the budget.

use std::collections::HashMap;

use bytes::Bytes;
use image::GenericImageView;
use pixelmill_core::models::{OperationKind, OperationSpec, OutputFormat, Pipeline};
use pixelmill_core::TransformError;
use uuid::Uuid;

use crate::encode::{self, DEFAULT_QUALITY};
use crate::operator::OperatorRegistry;
use crate::ops::crop::check_crop_bounds;
use crate::ops::resize::ImageResize;

/// Resource ceilings enforced before execution.
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    /// Maximum width/height any intermediate or final image may have.
    pub max_pixel_dim: u32,
    /// Maximum estimated cost (pixels touched across all operations).
    pub cost_budget: u64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_pixel_dim: 8192,
            cost_budget: 2_000_000_000,
        }
    }
}

/// Byte inputs beyond the source image itself: watermark images referenced
/// by the pipeline, prefetched by the orchestration layer.
#[derive(Debug, Default)]
pub struct ExecutionInputs {
    pub watermarks: HashMap<Uuid, Bytes>,
}

/// Result of applying a pipeline.
#[derive(Debug, Clone)]
pub struct DerivedImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl DerivedImage {
    pub fn content_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Outcome of the preflight dimension walk.
#[derive(Debug, Clone, Copy)]
pub struct CostEstimate {
    /// Sum over operations of the pixel count each must process.
    pub total_cost: u64,
    pub final_width: u32,
    pub final_height: u32,
}

pub struct TransformationEngine {
    registry: OperatorRegistry,
    limits: EngineLimits,
}

impl TransformationEngine {
    pub fn new(registry: OperatorRegistry, limits: EngineLimits) -> Self {
        Self { registry, limits }
    }

    pub fn with_defaults(limits: EngineLimits) -> Self {
        Self::new(OperatorRegistry::with_defaults(), limits)
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// Walk the declared dimension flow without touching pixels.
    ///
    /// Rejects dimension-ceiling violations and crop boxes that fall outside
    /// the image, and accumulates the cost estimate used by the dispatch
    /// router. The walk is exact for dimensions (each operation's output
    /// size is computable from its parameters), so a pipeline that passes
    /// preflight cannot blow past the ceiling mid-execution.
    pub fn preflight(
        &self,
        source_width: u32,
        source_height: u32,
        pipeline: &Pipeline,
    ) -> Result<CostEstimate, TransformError> {
        let mut width = source_width;
        let mut height = source_height;
        let mut total_cost: u64 = 0;

        self.check_dims(width, height)?;

        for op in pipeline.operations() {
            // Every operation processes the pixels entering it.
            total_cost = total_cost.saturating_add(width as u64 * height as u64);

            match op {
                OperationSpec::Resize {
                    width: w,
                    height: h,
                    mode,
                } => {
                    let (nw, nh) = ImageResize::projected_dimensions(width, height, *w, *h, *mode);
                    width = nw;
                    height = nh;
                }
                OperationSpec::Crop {
                    x,
                    y,
                    width: w,
                    height: h,
                } => {
                    check_crop_bounds(width, height, *x, *y, *w, *h)?;
                    width = *w;
                    height = *h;
                }
                OperationSpec::Rotate { degrees } => {
                    if *degrees == 90 || *degrees == 270 {
                        std::mem::swap(&mut width, &mut height);
                    }
                }
                _ => {}
            }

            self.check_dims(width, height)?;
        }

        if total_cost > self.limits.cost_budget {
            return Err(TransformError::ResourceExceeded(format!(
                "estimated cost {} exceeds budget {}",
                total_cost, self.limits.cost_budget
            )));
        }

        Ok(CostEstimate {
            total_cost,
            final_width: width,
            final_height: height,
        })
    }

    fn check_dims(&self, width: u32, height: u32) -> Result<(), TransformError> {
        if width > self.limits.max_pixel_dim || height > self.limits.max_pixel_dim {
            return Err(TransformError::ResourceExceeded(format!(
                "dimensions {}x{} exceed maximum of {} pixels per side",
                width, height, self.limits.max_pixel_dim
            )));
        }
        Ok(())
    }

    /// Apply the pipeline to source bytes and encode the result.
    ///
    /// `Compress` and `ConvertFormat` never reach an operator: they are
    /// encode settings, consumed after the pixel walk (a trailing
    /// convert_format overrides the requested output format).
    pub fn apply(
        &self,
        source: &[u8],
        pipeline: &Pipeline,
        output_format: OutputFormat,
        inputs: &ExecutionInputs,
    ) -> Result<DerivedImage, TransformError> {
        let cursor = std::io::Cursor::new(source);
        let mut img = image::ImageReader::new(cursor)
            .with_guessed_format()
            .map_err(|e| TransformError::DecodeFailure(e.to_string()))?
            .decode()
            .map_err(|e| TransformError::DecodeFailure(e.to_string()))?;

        let (source_width, source_height) = img.dimensions();
        self.preflight(source_width, source_height, pipeline)?;

        for op in pipeline.operations() {
            let kind = op.kind();
            if matches!(kind, OperationKind::Compress | OperationKind::ConvertFormat) {
                continue;
            }

            let operator = self.registry.get(kind).ok_or_else(|| {
                TransformError::UnsupportedOperation(format!("no operator registered for {}", kind))
            })?;

            tracing::debug!(operation = %kind, "Applying operation");
            img = operator.apply(img, op, inputs)?;
        }

        let format = pipeline.format_override().unwrap_or(output_format);
        let quality = pipeline.encode_quality().unwrap_or(DEFAULT_QUALITY);
        let (width, height) = img.dimensions();

        let bytes = encode::encode(&img, format, quality)?;

        Ok(DerivedImage {
            bytes,
            width,
            height,
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use pixelmill_core::models::{PipelineBuilder, PipelineLimits, StretchMode};

    fn engine() -> TransformationEngine {
        TransformationEngine::with_defaults(EngineLimits::default())
    }

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

    /// 80x60 PNG with distinct quadrant colors, so orientation-sensitive
    /// transforms produce observably different outputs.
    fn quadrant_png() -> Vec<u8> {
        let mut raw = RgbaImage::new(80, 60);
        for (x, y, pixel) in raw.enumerate_pixels_mut() {
            *pixel = match (x < 40, y < 30) {
                (true, true) => Rgba([255, 0, 0, 255]),
                (false, true) => Rgba([0, 255, 0, 255]),
                (true, false) => Rgba([0, 0, 255, 255]),
                (false, false) => Rgba([255, 255, 0, 255]),
            };
        }
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        raw.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        buffer
    }

    #[test]
    fn test_apply_is_deterministic() {
        let source = quadrant_png();
        let pipeline = build(vec![resize(40, 30), OperationSpec::Rotate { degrees: 90 }]);

        let a = engine()
            .apply(&source, &pipeline, OutputFormat::Png, &ExecutionInputs::default())
            .unwrap();
        let b = engine()
            .apply(&source, &pipeline, OutputFormat::Png, &ExecutionInputs::default())
            .unwrap();

        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_operation_order_changes_output() {
        let source = quadrant_png();
        let crop = OperationSpec::Crop {
            x: 0,
            y: 0,
            width: 30,
            height: 30,
        };
        let rotate = OperationSpec::Rotate { degrees: 90 };

        let rotate_then_crop = engine()
            .apply(
                &source,
                &build(vec![rotate.clone(), crop.clone()]),
                OutputFormat::Png,
                &ExecutionInputs::default(),
            )
            .unwrap();
        let crop_then_rotate = engine()
            .apply(
                &source,
                &build(vec![crop, rotate]),
                OutputFormat::Png,
                &ExecutionInputs::default(),
            )
            .unwrap();

        assert_ne!(rotate_then_crop.bytes, crop_then_rotate.bytes);
    }

    #[test]
    fn test_resize_and_convert_scenario() {
        // The canonical example: resize then convert to PNG.
        let source = quadrant_png();
        let pipeline = build(vec![
            resize(40, 30),
            OperationSpec::ConvertFormat {
                format: OutputFormat::Png,
            },
        ]);

        let derived = engine()
            .apply(&source, &pipeline, OutputFormat::Jpeg, &ExecutionInputs::default())
            .unwrap();

        assert_eq!(derived.width, 40);
        assert_eq!(derived.height, 30);
        // Trailing convert_format overrides the requested jpeg.
        assert_eq!(derived.format, OutputFormat::Png);
        assert_eq!(image::guess_format(&derived.bytes).unwrap(), image::ImageFormat::Png);
    }

    #[test]
    fn test_decode_failure_classified() {
        let err = engine()
            .apply(
                b"definitely not an image",
                &build(vec![resize(10, 10)]),
                OutputFormat::Png,
                &ExecutionInputs::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TransformError::DecodeFailure(_)));
    }

    #[test]
    fn test_dimension_ceiling_enforced() {
        let engine = TransformationEngine::with_defaults(EngineLimits {
            max_pixel_dim: 64,
            cost_budget: u64::MAX,
        });
        let err = engine
            .apply(
                &quadrant_png(),
                &build(vec![resize(100, 100)]),
                OutputFormat::Png,
                &ExecutionInputs::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TransformError::ResourceExceeded(_)));
    }

    #[test]
    fn test_cost_budget_enforced() {
        let engine = TransformationEngine::with_defaults(EngineLimits {
            max_pixel_dim: 8192,
            cost_budget: 100,
        });
        let err = engine
            .apply(
                &quadrant_png(),
                &build(vec![resize(40, 30)]),
                OutputFormat::Png,
                &ExecutionInputs::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TransformError::ResourceExceeded(_)));
    }

    #[test]
    fn test_unregistered_kind_is_unsupported() {
        let engine = TransformationEngine::new(OperatorRegistry::new(), EngineLimits::default());
        let err = engine
            .apply(
                &quadrant_png(),
                &build(vec![resize(40, 30)]),
                OutputFormat::Png,
                &ExecutionInputs::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_crop_out_of_bounds_rejected_in_preflight() {
        let err = engine()
            .apply(
                &quadrant_png(),
                &build(vec![OperationSpec::Crop {
                    x: 70,
                    y: 0,
                    width: 30,
                    height: 30,
                }]),
                OutputFormat::Png,
                &ExecutionInputs::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameters(_)));
    }

    #[test]
    fn test_preflight_tracks_rotation_swaps() {
        let estimate = engine()
            .preflight(80, 60, &build(vec![OperationSpec::Rotate { degrees: 90 }]))
            .unwrap();
        assert_eq!((estimate.final_width, estimate.final_height), (60, 80));
    }

    #[test]
    fn test_preflight_cost_accumulates_per_operation() {
        let one_op = engine().preflight(80, 60, &build(vec![OperationSpec::Flip])).unwrap();
        let two_ops = engine()
            .preflight(80, 60, &build(vec![OperationSpec::Flip, OperationSpec::Mirror]))
            .unwrap();
        assert_eq!(one_op.total_cost, 80 * 60);
        assert_eq!(two_ops.total_cost, 2 * 80 * 60);
    }

    #[test]
    fn test_identity_pipeline_reencodes() {
        // flip + flip cancels to the identity; the engine still re-encodes.
        let source = quadrant_png();
        let pipeline = build(vec![OperationSpec::Flip, OperationSpec::Flip]);
        let derived = engine()
            .apply(&source, &pipeline, OutputFormat::Jpeg, &ExecutionInputs::default())
            .unwrap();
        assert_eq!(derived.format, OutputFormat::Jpeg);
        assert_eq!((derived.width, derived.height), (80, 60));
    }
}
