use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use pixelmill_core::models::{FilterKind, OperationKind, OperationSpec};
use pixelmill_core::TransformError;

use crate::engine::ExecutionInputs;
use crate::operator::ImageOperator;

/// Pixel filter primitives.
pub struct ImageFilters;

impl ImageFilters {
    /// Convert image to grayscale
    pub fn apply_grayscale(img: DynamicImage) -> DynamicImage {
        img.grayscale()
    }

    /// Apply sepia tone effect
    pub fn apply_sepia(img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let rgba8 = img.to_rgba8();
        let mut sepia_img = RgbaImage::new(width, height);

        for (x, y, pixel) in rgba8.enumerate_pixels() {
            let Rgba([r, g, b, a]) = *pixel;

            // Sepia formula
            let tr = (0.393 * r as f32 + 0.769 * g as f32 + 0.189 * b as f32).min(255.0) as u8;
            let tg = (0.349 * r as f32 + 0.686 * g as f32 + 0.168 * b as f32).min(255.0) as u8;
            let tb = (0.272 * r as f32 + 0.534 * g as f32 + 0.131 * b as f32).min(255.0) as u8;

            sepia_img.put_pixel(x, y, Rgba([tr, tg, tb, a]));
        }

        DynamicImage::ImageRgba8(sepia_img)
    }

    /// Invert colors
    pub fn apply_invert(img: DynamicImage) -> DynamicImage {
        let mut inverted = img;
        inverted.invert();
        inverted
    }

    /// Gaussian blur
    pub fn apply_blur(img: DynamicImage, sigma: f32) -> DynamicImage {
        img.blur(sigma)
    }
}

pub struct FilterOperator;

impl ImageOperator for FilterOperator {
    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }

    fn apply(
        &self,
        img: DynamicImage,
        spec: &OperationSpec,
        _inputs: &ExecutionInputs,
    ) -> Result<DynamicImage, TransformError> {
        let OperationSpec::Filter { filter } = spec else {
            return Err(TransformError::InvalidParameters(format!(
                "filter operator received {} spec",
                spec.kind()
            )));
        };

        Ok(match filter {
            FilterKind::Grayscale => ImageFilters::apply_grayscale(img),
            FilterKind::Sepia => ImageFilters::apply_sepia(img),
            FilterKind::Invert => ImageFilters::apply_invert(img),
            FilterKind::Blur { sigma } => ImageFilters::apply_blur(img, *sigma),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([200, 40, 40, 255])))
    }

    fn apply(filter: FilterKind) -> DynamicImage {
        FilterOperator
            .apply(
                red_image(),
                &OperationSpec::Filter { filter },
                &ExecutionInputs::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_grayscale_flattens_channels() {
        let result = apply(FilterKind::Grayscale).to_rgba8();
        let pixel = result.get_pixel(0, 0);
        assert_eq!(pixel[0], pixel[1]);
        assert_eq!(pixel[1], pixel[2]);
    }

    #[test]
    fn test_invert_inverts() {
        let result = apply(FilterKind::Invert).to_rgba8();
        let pixel = result.get_pixel(0, 0);
        assert_eq!(pixel[0], 255 - 200);
        assert_eq!(pixel[1], 255 - 40);
    }

    #[test]
    fn test_sepia_warms_channels() {
        let result = apply(FilterKind::Sepia).to_rgba8();
        let pixel = result.get_pixel(0, 0);
        // Red channel stays strongest under the sepia matrix
        assert!(pixel[0] >= pixel[1]);
        assert!(pixel[1] >= pixel[2]);
    }

    #[test]
    fn test_blur_preserves_dimensions() {
        let result = apply(FilterKind::Blur { sigma: 1.5 });
        assert_eq!(result.dimensions(), (4, 4));
    }
}
