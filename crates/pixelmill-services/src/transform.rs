//! Transformation service facade.
//!
//! Orchestrates one transformation request end to end: validate and
//! canonicalize the pipeline, fingerprint it against the source's content
//! identity, consult the cache tiers, then either compute inline or enqueue
//! a job. The same execution path backs the worker via
//! [`JobHandlerContext`], so the sync and async paths cannot drift apart.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use pixelmill_cache::{ArtifactCache, ArtifactCacheConfig};
use pixelmill_core::models::{
    DerivedArtifact, Job, JobHandle, JobStatusReport, OperationSpec, OutputFormat, Pipeline,
    PipelineBuilder, SourceImage,
};
use pixelmill_core::{
    content_hash, fingerprint, Config, FingerprintKey, JobError, TransformError, ValidationError,
};
use pixelmill_db::{ArtifactRepository, JobRepository, SourceImageRepository};
use pixelmill_processing::{EngineLimits, ExecutionInputs, TransformationEngine};
use pixelmill_storage::{derived_key, source_key, Storage};
use pixelmill_worker::JobHandlerContext;
use sqlx::PgPool;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::router::{DispatchRouter, ExecutionPath};

/// Result of a transformation submission: the artifact itself on the
/// synchronous path, a job handle on the asynchronous path.
#[derive(Debug)]
pub enum SubmitOutcome {
    Artifact(DerivedArtifact),
    Job(JobHandle),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("source image {0} not found")]
    SourceNotFound(Uuid),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("metadata store error: {0}")]
    Metadata(#[from] anyhow::Error),
}

pub struct TransformationService {
    storage: Arc<dyn Storage>,
    sources: SourceImageRepository,
    artifacts: ArtifactRepository,
    jobs: JobRepository,
    engine: TransformationEngine,
    cache: ArtifactCache,
    builder: PipelineBuilder,
    router: DispatchRouter,
    job_max_attempts: i32,
    max_source_size_bytes: usize,
}

impl TransformationService {
    pub fn new(config: &Config, pool: PgPool, storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            sources: SourceImageRepository::new(pool.clone()),
            artifacts: ArtifactRepository::new(pool.clone()),
            jobs: JobRepository::new(pool),
            engine: TransformationEngine::with_defaults(EngineLimits {
                max_pixel_dim: config.max_pixel_dim,
                cost_budget: config.cost_budget,
            }),
            cache: ArtifactCache::new(ArtifactCacheConfig {
                max_entries: config.cache_max_entries,
                max_bytes: config.cache_max_bytes,
            }),
            builder: PipelineBuilder::new(config.pipeline_limits()),
            router: DispatchRouter::new(config.sync_cost_threshold),
            job_max_attempts: config.job_max_attempts,
            max_source_size_bytes: config.max_source_size_bytes,
        }
    }

    /// Submit a transformation request.
    ///
    /// Validation happens before anything else: a bad operation never
    /// reaches the fingerprint engine, the cache, or the queue. A cache hit
    /// short-circuits regardless of cost estimate or async preference.
    #[tracing::instrument(skip(self, ctx, operations), fields(user_id = %ctx.user_id))]
    pub async fn submit_transformation(
        &self,
        ctx: &RequestContext,
        source_id: Uuid,
        operations: Vec<OperationSpec>,
        output_format: OutputFormat,
        prefer_async: bool,
    ) -> Result<SubmitOutcome, SubmitError> {
        let pipeline = self.builder.build(operations.clone())?;

        let source = self
            .sources
            .get_source(source_id)
            .await?
            .ok_or(SubmitError::SourceNotFound(source_id))?;

        let key = fingerprint(&source.content_hash, &pipeline, output_format);

        if let Some(artifact) = self.lookup_cached(&key).await? {
            tracing::debug!(fingerprint = %key, "Returning cached artifact");
            return Ok(SubmitOutcome::Artifact(artifact));
        }

        // Preflight now, so ceiling violations surface to the caller
        // immediately instead of becoming failed jobs.
        let estimate =
            self.engine
                .preflight(source.width as u32, source.height as u32, &pipeline)?;

        match self.router.route(prefer_async, estimate.total_cost) {
            ExecutionPath::Inline => {
                let artifact = self
                    .compute_artifact(&source, &pipeline, output_format, &key)
                    .await?;
                Ok(SubmitOutcome::Artifact(artifact))
            }
            ExecutionPath::Queued => {
                let operations_json = serde_json::to_value(&operations)
                    .map_err(|e| SubmitError::Metadata(e.into()))?;
                let job = self
                    .jobs
                    .create_job(
                        ctx.user_id,
                        source_id,
                        operations_json,
                        output_format,
                        self.job_max_attempts,
                    )
                    .await?;
                tracing::info!(job_id = %job.id, cost = estimate.total_cost, "Request routed to async path");
                Ok(SubmitOutcome::Job(JobHandle::from(&job)))
            }
        }
    }

    /// Report a job's state, attempts, result reference and last error.
    pub async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobStatusReport>, anyhow::Error> {
        Ok(self.jobs.get_job(job_id).await?.map(JobStatusReport::from))
    }

    /// Cancel a job the requesting user owns. Pending jobs become terminal
    /// failed (reason `cancelled`); running jobs are flagged and honored
    /// best-effort by the worker.
    pub async fn cancel_job(
        &self,
        ctx: &RequestContext,
        job_id: Uuid,
    ) -> Result<Option<JobStatusReport>, anyhow::Error> {
        Ok(self
            .jobs
            .cancel_job(job_id, ctx.user_id)
            .await?
            .map(JobStatusReport::from))
    }

    /// Register an uploaded image: detect its format and dimensions, compute
    /// its content identity, persist the bytes, and record the source row.
    #[tracing::instrument(skip(self, ctx, data), fields(user_id = %ctx.user_id, byte_len = data.len()))]
    pub async fn register_source(
        &self,
        ctx: &RequestContext,
        data: Bytes,
        declared_content_type: &str,
    ) -> Result<SourceImage, SubmitError> {
        if data.len() > self.max_source_size_bytes {
            return Err(SubmitError::Validation(ValidationError::for_pipeline(
                "source",
                format!(
                    "image exceeds maximum size of {} bytes",
                    self.max_source_size_bytes
                ),
            )));
        }

        let format = image::guess_format(&data)
            .map_err(|e| TransformError::DecodeFailure(e.to_string()))?;
        let detected_content_type = match format {
            image::ImageFormat::Jpeg => "image/jpeg",
            image::ImageFormat::Png => "image/png",
            image::ImageFormat::WebP => "image/webp",
            image::ImageFormat::Gif => "image/gif",
            other => {
                return Err(SubmitError::Transform(TransformError::DecodeFailure(
                    format!("unsupported image format: {:?}", other),
                )))
            }
        };

        let cursor = std::io::Cursor::new(data.as_ref());
        let (width, height) = image::ImageReader::new(cursor)
            .with_guessed_format()
            .map_err(|e| TransformError::DecodeFailure(e.to_string()))?
            .into_dimensions()
            .map_err(|e| TransformError::DecodeFailure(e.to_string()))?;

        let id = Uuid::new_v4();
        let extension = OutputFormat::from_mime_type(detected_content_type)
            .map(|f| f.extension())
            .unwrap_or("bin");
        let storage_key = source_key(id, extension);
        let hash = content_hash(&data);

        self.storage
            .put_object(&storage_key, data.to_vec(), detected_content_type)
            .await
            .map_err(|e| TransformError::Storage(e.to_string()))?;

        let source = self
            .sources
            .create_source(
                id,
                ctx.user_id,
                &hash,
                data.len() as i64,
                declared_content_type,
                detected_content_type,
                width as i32,
                height as i32,
                &storage_key,
            )
            .await?;

        Ok(source)
    }

    /// Check the in-memory index, then the durable artifact store. A durable
    /// hit re-warms the index — eviction only ever costs a metadata lookup.
    async fn lookup_cached(
        &self,
        key: &FingerprintKey,
    ) -> Result<Option<DerivedArtifact>, anyhow::Error> {
        if let Some(artifact) = self.cache.lookup(key) {
            return Ok(Some(artifact));
        }

        if let Some(artifact) = self.artifacts.get_by_fingerprint(key.as_str()).await? {
            self.cache.insert(key.clone(), artifact.clone());
            return Ok(Some(artifact));
        }

        Ok(None)
    }

    /// Compute, persist, and record one derived artifact under the cache's
    /// single-flight guarantee. The artifact bytes are written to storage
    /// before the durable record and the cache entry exist, so a ready entry
    /// always has its bytes behind it.
    async fn compute_artifact(
        &self,
        source: &SourceImage,
        pipeline: &Pipeline,
        output_format: OutputFormat,
        key: &FingerprintKey,
    ) -> Result<DerivedArtifact, TransformError> {
        self.cache
            .get_or_compute(key.clone(), move || async move {
                let source_bytes = self
                    .storage
                    .get_object(&source.storage_key)
                    .await
                    .map_err(|e| TransformError::Storage(e.to_string()))?;

                let inputs = self.load_watermarks(pipeline).await?;

                let derived = self
                    .engine
                    .apply(&source_bytes, pipeline, output_format, &inputs)?;

                let storage_key = derived_key(key.as_str(), derived.format.extension());
                self.storage
                    .put_object(&storage_key, derived.bytes.to_vec(), derived.content_type())
                    .await
                    .map_err(|e| TransformError::Storage(e.to_string()))?;

                let artifact = self
                    .artifacts
                    .insert_artifact(
                        Uuid::new_v4(),
                        key.as_str(),
                        source.id,
                        &storage_key,
                        derived.bytes.len() as i64,
                        derived.width as i32,
                        derived.height as i32,
                        derived.content_type(),
                    )
                    .await
                    .map_err(|e| TransformError::Storage(e.to_string()))?;

                Ok(artifact)
            })
            .await
    }

    /// Prefetch the bytes of every watermark image the pipeline references,
    /// so the engine stays a pure function of byte inputs.
    async fn load_watermarks(&self, pipeline: &Pipeline) -> Result<ExecutionInputs, TransformError> {
        let mut inputs = ExecutionInputs::default();

        for op in pipeline.operations() {
            let OperationSpec::Watermark { watermark_id, .. } = op else {
                continue;
            };
            if inputs.watermarks.contains_key(watermark_id) {
                continue;
            }

            let watermark = self
                .sources
                .get_source(*watermark_id)
                .await
                .map_err(|e| TransformError::Storage(e.to_string()))?
                .ok_or_else(|| {
                    TransformError::InvalidParameters(format!(
                        "watermark image {} not found",
                        watermark_id
                    ))
                })?;

            let bytes = self
                .storage
                .get_object(&watermark.storage_key)
                .await
                .map_err(|e| TransformError::Storage(e.to_string()))?;

            inputs.watermarks.insert(*watermark_id, Bytes::from(bytes));
        }

        Ok(inputs)
    }
}

#[async_trait]
impl JobHandlerContext for TransformationService {
    /// Execute one claimed job: rebuild the pipeline from the audit copy,
    /// then run the same cached compute path as the synchronous route.
    /// Claiming is idempotent upstream; if the artifact already exists (a
    /// previous attempt got as far as recording it), this returns it without
    /// recomputation.
    async fn execute_job(&self, job: &Job) -> Result<Uuid, JobError> {
        let operations: Vec<OperationSpec> = serde_json::from_value(job.operations.clone())
            .map_err(JobError::unrecoverable)?;
        let pipeline = self
            .builder
            .build(operations)
            .map_err(JobError::unrecoverable)?;

        let source = self
            .sources
            .get_source(job.source_image_id)
            .await
            .map_err(JobError::recoverable)?
            .ok_or_else(|| {
                JobError::unrecoverable(anyhow::anyhow!(
                    "source image {} not found",
                    job.source_image_id
                ))
            })?;

        let key = fingerprint(&source.content_hash, &pipeline, job.output_format);

        if let Some(artifact) = self
            .lookup_cached(&key)
            .await
            .map_err(JobError::recoverable)?
        {
            tracing::debug!(job_id = %job.id, fingerprint = %key, "Job satisfied from cache");
            return Ok(artifact.id);
        }

        let artifact = self
            .compute_artifact(&source, &pipeline, job.output_format, &key)
            .await
            .map_err(JobError::from)?;

        Ok(artifact.id)
    }
}
