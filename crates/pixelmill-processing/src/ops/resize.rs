//! Resize operation
//!
//! Dimension calculation preserves aspect ratio when only one dimension is
//! given. Filter selection adapts to the downscale ratio; it depends only on
//! the dimensions involved, so output stays deterministic.

use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};
use pixelmill_core::models::{OperationKind, OperationSpec, StretchMode};
use pixelmill_core::TransformError;

use crate::engine::ExecutionInputs;
use crate::operator::ImageOperator;

/// Image resize operations
pub struct ImageResize;

impl ImageResize {
    /// Calculate target dimensions, filling in a missing dimension from the
    /// source aspect ratio.
    pub fn calculate_dimensions(
        orig_width: u32,
        orig_height: u32,
        width: Option<u32>,
        height: Option<u32>,
    ) -> (u32, u32) {
        match (width, height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => {
                let aspect_ratio = orig_height as f32 / orig_width as f32;
                let h = (w as f32 * aspect_ratio).round() as u32;
                (w, h.max(1))
            }
            (None, Some(h)) => {
                let aspect_ratio = orig_width as f32 / orig_height as f32;
                let w = (h as f32 * aspect_ratio).round() as u32;
                (w.max(1), h)
            }
            (None, None) => (orig_width, orig_height),
        }
    }

    /// Select filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> image::imageops::FilterType {
        let width_ratio = orig_width as f32 / new_width as f32;
        let height_ratio = orig_height as f32 / new_height as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            image::imageops::FilterType::Triangle
        } else if max_ratio > 1.5 {
            image::imageops::FilterType::CatmullRom
        } else {
            image::imageops::FilterType::Lanczos3
        }
    }

    /// Resize image to exact dimensions
    pub fn resize_image(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        let filter = Self::select_filter(orig_width, orig_height, width, height);
        img.resize_exact(width, height, filter)
    }

    /// Resize with fill: scale to fit inside the target and center on a
    /// white canvas instead of stretching.
    pub fn resize_with_fill(
        img: &DynamicImage,
        target_width: u32,
        target_height: u32,
    ) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();

        let scale_width = target_width as f32 / orig_width as f32;
        let scale_height = target_height as f32 / orig_height as f32;
        let scale = scale_width.min(scale_height).min(1.0);

        let scaled_width = (orig_width as f32 * scale).round() as u32;
        let scaled_height = (orig_height as f32 * scale).round() as u32;

        let bg_color = Rgba([255u8, 255u8, 255u8, 255u8]);
        let canvas_img = RgbaImage::from_pixel(target_width, target_height, bg_color);
        let mut canvas = DynamicImage::ImageRgba8(canvas_img);

        let x_offset = (target_width - scaled_width) / 2;
        let y_offset = (target_height - scaled_height) / 2;

        if scale < 1.0 {
            let filter = Self::select_filter(orig_width, orig_height, scaled_width, scaled_height);
            let resized = img.resize_exact(scaled_width, scaled_height, filter);
            imageops::overlay(&mut canvas, &resized, x_offset as i64, y_offset as i64);
        } else {
            imageops::overlay(&mut canvas, img, x_offset as i64, y_offset as i64);
        }

        canvas
    }

    /// Apply resize with stretch mode handling
    pub fn apply_resize(
        img: &DynamicImage,
        width: Option<u32>,
        height: Option<u32>,
        mode: StretchMode,
    ) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        let (target_width, target_height) =
            Self::calculate_dimensions(orig_width, orig_height, width, height);

        match mode {
            StretchMode::On => Self::resize_image(img, target_width, target_height),
            StretchMode::Off => {
                if target_width > orig_width || target_height > orig_height {
                    img.clone()
                } else {
                    Self::resize_image(img, target_width, target_height)
                }
            }
            StretchMode::Fill => {
                if target_width > orig_width || target_height > orig_height {
                    Self::resize_with_fill(img, target_width, target_height)
                } else {
                    Self::resize_image(img, target_width, target_height)
                }
            }
        }
    }

    /// Dimensions a resize produces without running it; used by the engine's
    /// preflight dimension flow.
    pub fn projected_dimensions(
        orig_width: u32,
        orig_height: u32,
        width: Option<u32>,
        height: Option<u32>,
        mode: StretchMode,
    ) -> (u32, u32) {
        let (target_width, target_height) =
            Self::calculate_dimensions(orig_width, orig_height, width, height);
        match mode {
            StretchMode::On | StretchMode::Fill => (target_width, target_height),
            StretchMode::Off => {
                if target_width > orig_width || target_height > orig_height {
                    (orig_width, orig_height)
                } else {
                    (target_width, target_height)
                }
            }
        }
    }
}

pub struct ResizeOperator;

impl ImageOperator for ResizeOperator {
    fn kind(&self) -> OperationKind {
        OperationKind::Resize
    }

    fn apply(
        &self,
        img: DynamicImage,
        spec: &OperationSpec,
        _inputs: &ExecutionInputs,
    ) -> Result<DynamicImage, TransformError> {
        let OperationSpec::Resize { width, height, mode } = spec else {
            return Err(TransformError::InvalidParameters(format!(
                "resize operator received {} spec",
                spec.kind()
            )));
        };
        Ok(ImageResize::apply_resize(&img, *width, *height, *mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    #[test]
    fn test_calculate_dimensions_both_specified() {
        let (w, h) = ImageResize::calculate_dimensions(100, 100, Some(50), Some(75));
        assert_eq!(w, 50);
        assert_eq!(h, 75);
    }

    #[test]
    fn test_calculate_dimensions_width_only() {
        let (w, h) = ImageResize::calculate_dimensions(100, 50, Some(200), None);
        assert_eq!(w, 200);
        // Height should maintain aspect ratio: 50/100 * 200 = 100
        assert_eq!(h, 100);
    }

    #[test]
    fn test_calculate_dimensions_height_only() {
        let (w, h) = ImageResize::calculate_dimensions(100, 50, None, Some(100));
        // Width should maintain aspect ratio: 100/50 * 100 = 200
        assert_eq!(w, 200);
        assert_eq!(h, 100);
    }

    #[test]
    fn test_resize_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255])));
        let resized = ImageResize::resize_image(&img, 50, 50);
        assert_eq!(resized.dimensions(), (50, 50));
    }

    #[test]
    fn test_resize_with_fill() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, Rgba([255, 0, 0, 255])));
        let resized = ImageResize::resize_with_fill(&img, 100, 100);
        assert_eq!(resized.dimensions(), (100, 100));
    }

    #[test]
    fn test_apply_resize_stretch_off_preserves_original_on_upscale() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, Rgba([255, 0, 0, 255])));
        let resized = ImageResize::apply_resize(&img, Some(100), Some(100), StretchMode::Off);
        assert_eq!(resized.dimensions(), (50, 50));

        let resized = ImageResize::apply_resize(&img, Some(25), Some(25), StretchMode::Off);
        assert_eq!(resized.dimensions(), (25, 25));
    }

    #[test]
    fn test_projected_dimensions_match_applied() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(60, 40, Rgba([0, 255, 0, 255])));
        for (w, h, mode) in [
            (Some(30), None, StretchMode::On),
            (Some(120), Some(80), StretchMode::Off),
            (Some(120), Some(80), StretchMode::Fill),
            (None, Some(20), StretchMode::On),
        ] {
            let projected = ImageResize::projected_dimensions(60, 40, w, h, mode);
            let applied = ImageResize::apply_resize(&img, w, h, mode);
            assert_eq!(projected, applied.dimensions(), "mode {:?}", mode);
        }
    }
}
