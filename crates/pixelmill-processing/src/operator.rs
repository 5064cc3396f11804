//! Operator abstraction
//!
//! The engine never touches pixel math directly: each operation kind is a
//! capability behind the [`ImageOperator`] trait, resolved through an
//! [`OperatorRegistry`]. This keeps the engine substitutable and testable
//! with fakes, and makes an unregistered kind a classified
//! `unsupported_operation` error instead of a panic.

use std::collections::HashMap;
use std::sync::Arc;

use image::DynamicImage;
use pixelmill_core::models::{OperationKind, OperationSpec};
use pixelmill_core::TransformError;

use crate::engine::ExecutionInputs;

/// One pixel transformation capability.
///
/// Implementations must be deterministic: equal image + spec + inputs must
/// produce identical pixels, or the fingerprint cache is unsound.
pub trait ImageOperator: Send + Sync {
    fn kind(&self) -> OperationKind;

    fn apply(
        &self,
        img: DynamicImage,
        spec: &OperationSpec,
        inputs: &ExecutionInputs,
    ) -> Result<DynamicImage, TransformError>;
}

/// Registry mapping operation kinds to their operators.
#[derive(Default)]
pub struct OperatorRegistry {
    operators: HashMap<OperationKind, Arc<dyn ImageOperator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in pixel operator.
    ///
    /// `Compress` and `ConvertFormat` have no operator: they are encode-stage
    /// settings consumed by the engine, not pixel mutations.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::ops::resize::ResizeOperator));
        registry.register(Arc::new(crate::ops::crop::CropOperator));
        registry.register(Arc::new(crate::ops::orient::RotateOperator));
        registry.register(Arc::new(crate::ops::orient::FlipOperator));
        registry.register(Arc::new(crate::ops::orient::MirrorOperator));
        registry.register(Arc::new(crate::ops::watermark::WatermarkOperator));
        registry.register(Arc::new(crate::ops::filter::FilterOperator));
        registry
    }

    pub fn register(&mut self, operator: Arc<dyn ImageOperator>) {
        self.operators.insert(operator.kind(), operator);
    }

    pub fn get(&self, kind: OperationKind) -> Option<&Arc<dyn ImageOperator>> {
        self.operators.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_pixel_kinds() {
        let registry = OperatorRegistry::with_defaults();
        for kind in [
            OperationKind::Resize,
            OperationKind::Crop,
            OperationKind::Rotate,
            OperationKind::Watermark,
            OperationKind::Flip,
            OperationKind::Mirror,
            OperationKind::Filter,
        ] {
            assert!(registry.get(kind).is_some(), "missing operator for {}", kind);
        }

        // Encode-stage kinds are deliberately absent.
        assert!(registry.get(OperationKind::Compress).is_none());
        assert!(registry.get(OperationKind::ConvertFormat).is_none());
    }
}
