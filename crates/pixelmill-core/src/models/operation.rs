//! Operation specifications
//!
//! An [`OperationSpec`] is an immutable description of one pixel
//! transformation: its kind plus kind-specific parameters. Construction is
//! unchecked; [`OperationSpec::validate`] enforces the per-kind constraints
//! before a spec can enter a pipeline.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Resize,
    Crop,
    Rotate,
    Watermark,
    Flip,
    Mirror,
    Compress,
    ConvertFormat,
    Filter,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OperationKind::Resize => write!(f, "resize"),
            OperationKind::Crop => write!(f, "crop"),
            OperationKind::Rotate => write!(f, "rotate"),
            OperationKind::Watermark => write!(f, "watermark"),
            OperationKind::Flip => write!(f, "flip"),
            OperationKind::Mirror => write!(f, "mirror"),
            OperationKind::Compress => write!(f, "compress"),
            OperationKind::ConvertFormat => write!(f, "convert_format"),
            OperationKind::Filter => write!(f, "filter"),
        }
    }
}

impl FromStr for OperationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resize" => Ok(OperationKind::Resize),
            "crop" => Ok(OperationKind::Crop),
            "rotate" => Ok(OperationKind::Rotate),
            "watermark" => Ok(OperationKind::Watermark),
            "flip" => Ok(OperationKind::Flip),
            "mirror" => Ok(OperationKind::Mirror),
            "compress" => Ok(OperationKind::Compress),
            "convert_format" => Ok(OperationKind::ConvertFormat),
            "filter" => Ok(OperationKind::Filter),
            _ => Err(anyhow::anyhow!("Invalid operation kind: {}", s)),
        }
    }
}

/// Encoded output format for derived artifacts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Gif => "image/gif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Gif => "gif",
        }
    }

    /// Stable single-byte tag used in canonical encodings.
    pub fn tag(&self) -> u8 {
        match self {
            OutputFormat::Jpeg => 1,
            OutputFormat::Png => 2,
            OutputFormat::Webp => 3,
            OutputFormat::Gif => 4,
        }
    }

    pub fn from_mime_type(content_type: &str) -> Option<Self> {
        match content_type {
            "image/jpeg" | "image/jpg" => Some(OutputFormat::Jpeg),
            "image/png" => Some(OutputFormat::Png),
            "image/webp" => Some(OutputFormat::Webp),
            "image/gif" => Some(OutputFormat::Gif),
            _ => None,
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OutputFormat::Jpeg => write!(f, "jpeg"),
            OutputFormat::Png => write!(f, "png"),
            OutputFormat::Webp => write!(f, "webp"),
            OutputFormat::Gif => write!(f, "gif"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "gif" => Ok(OutputFormat::Gif),
            _ => Err(anyhow::anyhow!("Invalid output format: {}", s)),
        }
    }
}

/// Stretch mode for resize operations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StretchMode {
    /// Allow upscaling
    #[default]
    On,
    /// Don't upscale (preserve original if target is larger)
    Off,
    /// Fill with white background if upscaling
    Fill,
}

impl StretchMode {
    pub fn tag(&self) -> u8 {
        match self {
            StretchMode::On => 0,
            StretchMode::Off => 1,
            StretchMode::Fill => 2,
        }
    }
}

/// Watermark placement on the target image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
    Custom {
        x: u32,
        y: u32,
    },
}

/// Pixel filter applied by the filter operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Grayscale,
    Sepia,
    Invert,
    Blur { sigma: f32 },
}

/// Per-kind parameter ceilings, taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct OperationLimits {
    pub max_pixel_dim: u32,
}

/// Upper bound on blur sigma; larger values cost quadratically more and add
/// nothing visually.
const MAX_BLUR_SIGMA: f32 = 50.0;

/// Immutable description of one pixel transformation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationSpec {
    Resize {
        width: Option<u32>,
        height: Option<u32>,
        #[serde(default)]
        mode: StretchMode,
    },
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Rotate {
        degrees: u16,
    },
    Watermark {
        watermark_id: Uuid,
        #[serde(default)]
        position: WatermarkPosition,
        opacity: f32,
    },
    Flip,
    Mirror,
    Compress {
        quality: u8,
    },
    ConvertFormat {
        format: OutputFormat,
    },
    Filter {
        filter: FilterKind,
    },
}

impl OperationSpec {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationSpec::Resize { .. } => OperationKind::Resize,
            OperationSpec::Crop { .. } => OperationKind::Crop,
            OperationSpec::Rotate { .. } => OperationKind::Rotate,
            OperationSpec::Watermark { .. } => OperationKind::Watermark,
            OperationSpec::Flip => OperationKind::Flip,
            OperationSpec::Mirror => OperationKind::Mirror,
            OperationSpec::Compress { .. } => OperationKind::Compress,
            OperationSpec::ConvertFormat { .. } => OperationKind::ConvertFormat,
            OperationSpec::Filter { .. } => OperationKind::Filter,
        }
    }

    /// Validate kind-specific parameter constraints.
    pub fn validate(&self, limits: &OperationLimits) -> Result<(), ValidationError> {
        let kind = self.kind();
        match self {
            OperationSpec::Resize { width, height, .. } => {
                if width.is_none() && height.is_none() {
                    return Err(ValidationError::for_operation(
                        kind,
                        "width",
                        "at least one of width/height must be specified",
                    ));
                }
                for (field, value) in [("width", width), ("height", height)] {
                    if let Some(v) = value {
                        if *v == 0 {
                            return Err(ValidationError::for_operation(kind, field, "must be greater than 0"));
                        }
                        if *v > limits.max_pixel_dim {
                            return Err(ValidationError::for_operation(
                                kind,
                                field,
                                format!("must not exceed {} pixels", limits.max_pixel_dim),
                            ));
                        }
                    }
                }
                Ok(())
            }
            OperationSpec::Crop { width, height, .. } => {
                for (field, v) in [("width", *width), ("height", *height)] {
                    if v == 0 {
                        return Err(ValidationError::for_operation(kind, field, "must be greater than 0"));
                    }
                    if v > limits.max_pixel_dim {
                        return Err(ValidationError::for_operation(
                            kind,
                            field,
                            format!("must not exceed {} pixels", limits.max_pixel_dim),
                        ));
                    }
                }
                Ok(())
            }
            OperationSpec::Rotate { degrees } => {
                if *degrees >= 360 {
                    return Err(ValidationError::for_operation(kind, "degrees", "must be in [0, 360)"));
                }
                if *degrees % 90 != 0 {
                    return Err(ValidationError::for_operation(
                        kind,
                        "degrees",
                        "only quarter-turn rotations (0, 90, 180, 270) are supported",
                    ));
                }
                Ok(())
            }
            OperationSpec::Watermark { opacity, .. } => {
                if !opacity.is_finite() || *opacity <= 0.0 || *opacity > 1.0 {
                    return Err(ValidationError::for_operation(
                        kind,
                        "opacity",
                        "must be in (0.0, 1.0]",
                    ));
                }
                Ok(())
            }
            OperationSpec::Flip | OperationSpec::Mirror => Ok(()),
            OperationSpec::Compress { quality } => {
                if *quality == 0 || *quality > 100 {
                    return Err(ValidationError::for_operation(kind, "quality", "must be in [1, 100]"));
                }
                Ok(())
            }
            OperationSpec::ConvertFormat { .. } => Ok(()),
            OperationSpec::Filter { filter } => {
                if let FilterKind::Blur { sigma } = filter {
                    if !sigma.is_finite() || *sigma <= 0.0 || *sigma > MAX_BLUR_SIGMA {
                        return Err(ValidationError::for_operation(
                            kind,
                            "sigma",
                            format!("must be in (0.0, {}]", MAX_BLUR_SIGMA),
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: OperationLimits = OperationLimits { max_pixel_dim: 8192 };

    #[test]
    fn test_operation_kind_display() {
        assert_eq!(OperationKind::Resize.to_string(), "resize");
        assert_eq!(OperationKind::ConvertFormat.to_string(), "convert_format");
    }

    #[test]
    fn test_operation_kind_from_str() {
        assert_eq!("resize".parse::<OperationKind>().unwrap(), OperationKind::Resize);
        assert_eq!(
            "convert_format".parse::<OperationKind>().unwrap(),
            OperationKind::ConvertFormat
        );
        assert!("sharpen".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_output_format_round_trip() {
        assert_eq!("jpeg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::Webp.to_string(), "webp");
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
        assert!("tiff".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_resize_requires_a_dimension() {
        let op = OperationSpec::Resize {
            width: None,
            height: None,
            mode: StretchMode::On,
        };
        let err = op.validate(&LIMITS).unwrap_err();
        assert_eq!(err.kind, Some(OperationKind::Resize));
        assert_eq!(err.field, "width");
    }

    #[test]
    fn test_resize_dimension_bounds() {
        let op = OperationSpec::Resize {
            width: Some(0),
            height: None,
            mode: StretchMode::On,
        };
        assert_eq!(op.validate(&LIMITS).unwrap_err().field, "width");

        let op = OperationSpec::Resize {
            width: Some(400),
            height: Some(9000),
            mode: StretchMode::On,
        };
        assert_eq!(op.validate(&LIMITS).unwrap_err().field, "height");

        let op = OperationSpec::Resize {
            width: Some(400),
            height: Some(300),
            mode: StretchMode::On,
        };
        assert!(op.validate(&LIMITS).is_ok());
    }

    #[test]
    fn test_rotate_rejects_out_of_range_degrees() {
        let err = OperationSpec::Rotate { degrees: 450 }.validate(&LIMITS).unwrap_err();
        assert_eq!(err.kind, Some(OperationKind::Rotate));
        assert_eq!(err.field, "degrees");

        assert!(OperationSpec::Rotate { degrees: 270 }.validate(&LIMITS).is_ok());
        assert!(OperationSpec::Rotate { degrees: 0 }.validate(&LIMITS).is_ok());
    }

    #[test]
    fn test_rotate_rejects_non_quarter_turns() {
        let err = OperationSpec::Rotate { degrees: 45 }.validate(&LIMITS).unwrap_err();
        assert_eq!(err.field, "degrees");
        assert!(err.reason.contains("quarter-turn"));
    }

    #[test]
    fn test_compress_quality_bounds() {
        assert!(OperationSpec::Compress { quality: 0 }.validate(&LIMITS).is_err());
        assert!(OperationSpec::Compress { quality: 101 }.validate(&LIMITS).is_err());
        assert!(OperationSpec::Compress { quality: 1 }.validate(&LIMITS).is_ok());
        assert!(OperationSpec::Compress { quality: 100 }.validate(&LIMITS).is_ok());
    }

    #[test]
    fn test_watermark_opacity_bounds() {
        let base = |opacity| OperationSpec::Watermark {
            watermark_id: Uuid::new_v4(),
            position: WatermarkPosition::BottomRight,
            opacity,
        };
        assert!(base(0.0).validate(&LIMITS).is_err());
        assert!(base(1.5).validate(&LIMITS).is_err());
        assert!(base(f32::NAN).validate(&LIMITS).is_err());
        assert!(base(0.5).validate(&LIMITS).is_ok());
        assert!(base(1.0).validate(&LIMITS).is_ok());
    }

    #[test]
    fn test_blur_sigma_bounds() {
        let blur = |sigma| OperationSpec::Filter {
            filter: FilterKind::Blur { sigma },
        };
        assert!(blur(0.0).validate(&LIMITS).is_err());
        assert!(blur(200.0).validate(&LIMITS).is_err());
        assert!(blur(2.5).validate(&LIMITS).is_ok());
    }

    #[test]
    fn test_operation_spec_serde_shape() {
        let op = OperationSpec::Resize {
            width: Some(400),
            height: Some(300),
            mode: StretchMode::On,
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "resize");
        assert_eq!(json["width"], 400);

        let parsed: OperationSpec = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, op);
    }
}
