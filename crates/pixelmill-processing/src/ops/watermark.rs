//! Watermark operation
//!
//! Overlays a referenced watermark image at the requested position with the
//! requested opacity. The watermark bytes are part of [`ExecutionInputs`] —
//! prefetched by the orchestration layer — so applying stays a pure function
//! of byte inputs. A watermark larger than the target is scaled down to fit;
//! it is never upscaled.

use image::{imageops, DynamicImage, GenericImageView, ImageReader};
use pixelmill_core::models::{OperationKind, OperationSpec, WatermarkPosition};
use pixelmill_core::TransformError;
use std::io::Cursor;

use crate::engine::ExecutionInputs;
use crate::operator::ImageOperator;
use crate::ops::resize::ImageResize;

pub struct WatermarkOperator;

impl ImageOperator for WatermarkOperator {
    fn kind(&self) -> OperationKind {
        OperationKind::Watermark
    }

    fn apply(
        &self,
        img: DynamicImage,
        spec: &OperationSpec,
        inputs: &ExecutionInputs,
    ) -> Result<DynamicImage, TransformError> {
        let OperationSpec::Watermark {
            watermark_id,
            position,
            opacity,
        } = spec
        else {
            return Err(TransformError::InvalidParameters(format!(
                "watermark operator received {} spec",
                spec.kind()
            )));
        };

        let watermark_data = inputs.watermarks.get(watermark_id).ok_or_else(|| {
            TransformError::InvalidParameters(format!(
                "watermark image {} is not available",
                watermark_id
            ))
        })?;

        let cursor = Cursor::new(watermark_data.as_ref());
        let reader = ImageReader::new(cursor)
            .with_guessed_format()
            .map_err(|e| TransformError::DecodeFailure(e.to_string()))?;
        let mut watermark_img = reader
            .decode()
            .map_err(|e| TransformError::DecodeFailure(format!("watermark: {}", e)))?
            .to_rgba8();

        let (img_width, img_height) = img.dimensions();
        let (wm_width, wm_height) = watermark_img.dimensions();

        // Scale down to fit inside the target; never upscale.
        if wm_width > img_width || wm_height > img_height {
            let scale_w = img_width as f32 / wm_width as f32;
            let scale_h = img_height as f32 / wm_height as f32;
            let scale = scale_w.min(scale_h);
            let target_w = ((wm_width as f32 * scale).floor() as u32).max(1);
            let target_h = ((wm_height as f32 * scale).floor() as u32).max(1);

            let filter = ImageResize::select_filter(wm_width, wm_height, target_w, target_h);
            let resized =
                DynamicImage::ImageRgba8(watermark_img).resize_exact(target_w, target_h, filter);
            watermark_img = resized.to_rgba8();
        }

        // Apply opacity
        if *opacity < 1.0 {
            for pixel in watermark_img.pixels_mut() {
                pixel[3] = (pixel[3] as f32 * opacity) as u8;
            }
        }

        let (wm_width, wm_height) = watermark_img.dimensions();
        let (x, y) = match position {
            WatermarkPosition::TopLeft => (0, 0),
            WatermarkPosition::TopRight => ((img_width as i64 - wm_width as i64).max(0), 0),
            WatermarkPosition::BottomLeft => (0, (img_height as i64 - wm_height as i64).max(0)),
            WatermarkPosition::BottomRight => (
                (img_width as i64 - wm_width as i64).max(0),
                (img_height as i64 - wm_height as i64).max(0),
            ),
            WatermarkPosition::Center => (
                ((img_width as i64 - wm_width as i64) / 2).max(0),
                ((img_height as i64 - wm_height as i64) / 2).max(0),
            ),
            WatermarkPosition::Custom { x, y } => (*x as i64, *y as i64),
        };

        let mut img_rgba = img.to_rgba8();
        imageops::overlay(&mut img_rgba, &watermark_img, x, y);

        Ok(DynamicImage::ImageRgba8(img_rgba))
    }
}
