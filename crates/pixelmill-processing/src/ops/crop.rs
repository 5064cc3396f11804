//! Crop operation
//!
//! The crop box must lie entirely within the current image; a box that
//! reaches outside is an invalid-parameters error, not a silent clamp, so
//! the output dimensions always match the requested box.

use image::{DynamicImage, GenericImageView};
use pixelmill_core::models::{OperationKind, OperationSpec};
use pixelmill_core::TransformError;

use crate::engine::ExecutionInputs;
use crate::operator::ImageOperator;

/// Validate a crop box against the given dimensions. Shared with the
/// engine's preflight so rejection happens before any pixels move.
pub fn check_crop_bounds(
    img_width: u32,
    img_height: u32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<(), TransformError> {
    let right = x.checked_add(width);
    let bottom = y.checked_add(height);
    match (right, bottom) {
        (Some(r), Some(b)) if r <= img_width && b <= img_height => Ok(()),
        _ => Err(TransformError::InvalidParameters(format!(
            "crop box {}x{}+{}+{} exceeds image bounds {}x{}",
            width, height, x, y, img_width, img_height
        ))),
    }
}

pub struct CropOperator;

impl ImageOperator for CropOperator {
    fn kind(&self) -> OperationKind {
        OperationKind::Crop
    }

    fn apply(
        &self,
        img: DynamicImage,
        spec: &OperationSpec,
        _inputs: &ExecutionInputs,
    ) -> Result<DynamicImage, TransformError> {
        let OperationSpec::Crop { x, y, width, height } = spec else {
            return Err(TransformError::InvalidParameters(format!(
                "crop operator received {} spec",
                spec.kind()
            )));
        };

        let (img_width, img_height) = img.dimensions();
        check_crop_bounds(img_width, img_height, *x, *y, *width, *height)?;

        Ok(img.crop_imm(*x, *y, *width, *height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn operator_apply(img: DynamicImage, x: u32, y: u32, w: u32, h: u32) -> Result<DynamicImage, TransformError> {
        CropOperator.apply(
            img,
            &OperationSpec::Crop {
                x,
                y,
                width: w,
                height: h,
            },
            &ExecutionInputs::default(),
        )
    }

    #[test]
    fn test_crop_within_bounds() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 80, Rgba([255, 0, 0, 255])));
        let cropped = operator_apply(img, 10, 10, 50, 40).unwrap();
        assert_eq!(cropped.dimensions(), (50, 40));
    }

    #[test]
    fn test_crop_full_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 80, Rgba([255, 0, 0, 255])));
        let cropped = operator_apply(img, 0, 0, 100, 80).unwrap();
        assert_eq!(cropped.dimensions(), (100, 80));
    }

    #[test]
    fn test_crop_out_of_bounds_rejected() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 80, Rgba([255, 0, 0, 255])));
        let err = operator_apply(img, 60, 0, 50, 40).unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameters(_)));
    }

    #[test]
    fn test_crop_bounds_overflow_rejected() {
        assert!(check_crop_bounds(100, 100, u32::MAX, 0, 10, 10).is_err());
    }
}
