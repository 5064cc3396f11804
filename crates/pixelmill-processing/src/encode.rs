//! Deterministic encoding of transformed images.
//!
//! The encoder consumes the pipeline's encode-stage settings: the output
//! format (request value, overridden by a trailing convert_format) and the
//! compress quality. Given pinned library versions, encoding the same pixels
//! with the same settings is byte-identical — required for the fingerprint
//! cache to be sound.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use pixelmill_core::models::OutputFormat;
use pixelmill_core::TransformError;
use std::io::Cursor;

/// Encoder quality applied when the pipeline carries no compress operation.
pub const DEFAULT_QUALITY: u8 = 85;

pub fn to_image_format(format: OutputFormat) -> image::ImageFormat {
    match format {
        OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        OutputFormat::Png => image::ImageFormat::Png,
        OutputFormat::Webp => image::ImageFormat::WebP,
        OutputFormat::Gif => image::ImageFormat::Gif,
    }
}

/// Encode pixels to the requested format at the given quality.
///
/// Quality only affects JPEG; the png/webp/gif encoders in the image crate
/// are lossless or fixed-parameter.
pub fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Bytes, TransformError> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);

    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
            rgb.write_with_encoder(encoder)
                .map_err(|e| TransformError::InvalidParameters(format!("jpeg encode: {}", e)))?;
        }
        OutputFormat::Png | OutputFormat::Webp | OutputFormat::Gif => {
            img.write_to(&mut cursor, to_image_format(format))
                .map_err(|e| {
                    TransformError::InvalidParameters(format!("{} encode: {}", format, e))
                })?;
        }
    }

    Ok(Bytes::from(buffer))
}
