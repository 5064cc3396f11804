//! Pixelmill Processing
//!
//! The transformation engine: a registry of [`ImageOperator`]s (one per
//! operation kind, all backed by the `image` crate), deterministic encoding,
//! and the sequential pipeline executor with its resource preflight.

pub mod encode;
pub mod engine;
pub mod operator;
pub mod ops;

pub use engine::{CostEstimate, DerivedImage, EngineLimits, ExecutionInputs, TransformationEngine};
pub use operator::{ImageOperator, OperatorRegistry};
