pub mod image;
pub mod job;
pub mod operation;
pub mod pipeline;

pub use image::{DerivedArtifact, SourceImage};
pub use job::{Job, JobHandle, JobStatus, JobStatusReport};
pub use operation::{
    FilterKind, OperationKind, OperationLimits, OperationSpec, OutputFormat, StretchMode,
    WatermarkPosition,
};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineLimits};
