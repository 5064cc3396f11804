use image::{imageops, DynamicImage};
use pixelmill_core::models::{OperationKind, OperationSpec};
use pixelmill_core::TransformError;

use crate::engine::ExecutionInputs;
use crate::operator::ImageOperator;

/// Image orientation primitives shared by the rotate/flip/mirror operators.
pub struct ImageOrientation;

impl ImageOrientation {
    /// Rotate image by specified angle (90, 180, or 270 degrees clockwise)
    pub fn rotate_by_angle(img: DynamicImage, angle: u16) -> DynamicImage {
        match angle {
            90 => DynamicImage::ImageRgba8(imageops::rotate90(&img.to_rgba8())),
            180 => DynamicImage::ImageRgba8(imageops::rotate180(&img.to_rgba8())),
            270 => DynamicImage::ImageRgba8(imageops::rotate270(&img.to_rgba8())),
            _ => img,
        }
    }

    /// Apply horizontal flip (mirror)
    pub fn apply_flip_horizontal(img: DynamicImage) -> DynamicImage {
        DynamicImage::ImageRgba8(imageops::flip_horizontal(&img.to_rgba8()))
    }

    /// Apply vertical flip
    pub fn apply_flip_vertical(img: DynamicImage) -> DynamicImage {
        DynamicImage::ImageRgba8(imageops::flip_vertical(&img.to_rgba8()))
    }
}

pub struct RotateOperator;

impl ImageOperator for RotateOperator {
    fn kind(&self) -> OperationKind {
        OperationKind::Rotate
    }

    fn apply(
        &self,
        img: DynamicImage,
        spec: &OperationSpec,
        _inputs: &ExecutionInputs,
    ) -> Result<DynamicImage, TransformError> {
        let OperationSpec::Rotate { degrees } = spec else {
            return Err(TransformError::InvalidParameters(format!(
                "rotate operator received {} spec",
                spec.kind()
            )));
        };
        if *degrees % 90 != 0 || *degrees >= 360 {
            return Err(TransformError::InvalidParameters(format!(
                "unsupported rotation angle: {}",
                degrees
            )));
        }
        Ok(ImageOrientation::rotate_by_angle(img, *degrees))
    }
}

/// Vertical flip (top-bottom).
pub struct FlipOperator;

impl ImageOperator for FlipOperator {
    fn kind(&self) -> OperationKind {
        OperationKind::Flip
    }

    fn apply(
        &self,
        img: DynamicImage,
        _spec: &OperationSpec,
        _inputs: &ExecutionInputs,
    ) -> Result<DynamicImage, TransformError> {
        Ok(ImageOrientation::apply_flip_vertical(img))
    }
}

/// Horizontal flip (left-right).
pub struct MirrorOperator;

impl ImageOperator for MirrorOperator {
    fn kind(&self) -> OperationKind {
        OperationKind::Mirror
    }

    fn apply(
        &self,
        img: DynamicImage,
        _spec: &OperationSpec,
        _inputs: &ExecutionInputs,
    ) -> Result<DynamicImage, TransformError> {
        Ok(ImageOrientation::apply_flip_horizontal(img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

    #[test]
    fn test_rotation_dimension_changes() {
        // Non-square image to verify dimension swaps
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 2, Rgba([0, 0, 255, 255])));
        assert_eq!(img.dimensions(), (4, 2));

        let rotated = ImageOrientation::rotate_by_angle(img.clone(), 90);
        assert_eq!(rotated.dimensions(), (2, 4));

        let rotated = ImageOrientation::rotate_by_angle(img.clone(), 180);
        assert_eq!(rotated.dimensions(), (4, 2));

        let rotated = ImageOrientation::rotate_by_angle(img.clone(), 270);
        assert_eq!(rotated.dimensions(), (2, 4));
    }

    #[test]
    fn test_rotate_moves_pixels_clockwise() {
        // 2x1: red on the left, blue on the right
        let mut raw = RgbaImage::new(2, 1);
        raw.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        raw.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        let img = DynamicImage::ImageRgba8(raw);

        // After 90° clockwise the red pixel lands on top
        let rotated = ImageOrientation::rotate_by_angle(img, 90).to_rgba8();
        assert_eq!(rotated.dimensions(), (1, 2));
        assert_eq!(rotated.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(rotated.get_pixel(0, 1), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_flip_and_mirror_move_pixels() {
        // 2x2: single red pixel in the top-left corner
        let mut raw = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        raw.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let img = DynamicImage::ImageRgba8(raw);

        let flipped = ImageOrientation::apply_flip_vertical(img.clone()).to_rgba8();
        assert_eq!(flipped.get_pixel(0, 1), &Rgba([255, 0, 0, 255]));

        let mirrored = ImageOrientation::apply_flip_horizontal(img).to_rgba8();
        assert_eq!(mirrored.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_rotate_operator_rejects_odd_angle() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        let err = RotateOperator
            .apply(
                img,
                &OperationSpec::Rotate { degrees: 45 },
                &ExecutionInputs::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameters(_)));
    }
}
