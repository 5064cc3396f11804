//! Derived artifact repository.
//!
//! Artifact rows are the durable tier behind the in-process cache index.
//! Inserts are idempotent by fingerprint: concurrent workers on different
//! nodes can race to record the same derivation, and both must observe one
//! row.

use anyhow::{Context, Result};
use pixelmill_core::models::DerivedArtifact;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const ARTIFACT_COLUMNS: &str = r#"
    id, fingerprint, source_image_id, storage_key,
    byte_len, width, height, content_type, created_at
"#;

#[derive(Clone)]
pub struct ArtifactRepository {
    pool: PgPool,
}

impl ArtifactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a derived artifact, returning the canonical row.
    ///
    /// On fingerprint conflict the existing row wins — the transformation is
    /// deterministic, so both writers computed the same bytes.
    #[tracing::instrument(skip(self))]
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_artifact(
        &self,
        id: Uuid,
        fingerprint: &str,
        source_image_id: Uuid,
        storage_key: &str,
        byte_len: i64,
        width: i32,
        height: i32,
        content_type: &str,
    ) -> Result<DerivedArtifact> {
        let inserted: Option<DerivedArtifact> = sqlx::query_as::<Postgres, DerivedArtifact>(&format!(
            r#"
            INSERT INTO derived_artifacts (
                id, fingerprint, source_image_id, storage_key,
                byte_len, width, height, content_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (fingerprint) DO NOTHING
            RETURNING {ARTIFACT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(fingerprint)
        .bind(source_image_id)
        .bind(storage_key)
        .bind(byte_len)
        .bind(width)
        .bind(height)
        .bind(content_type)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to insert derived artifact")?;

        if let Some(artifact) = inserted {
            tracing::info!(
                artifact_id = %artifact.id,
                fingerprint = %fingerprint,
                byte_len = byte_len,
                "Derived artifact recorded"
            );
            return Ok(artifact);
        }

        // Conflict: another writer recorded the same fingerprint first.
        self.get_by_fingerprint(fingerprint)
            .await?
            .context("Artifact vanished after fingerprint conflict")
    }

    pub async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DerivedArtifact>> {
        let artifact = sqlx::query_as::<Postgres, DerivedArtifact>(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM derived_artifacts WHERE fingerprint = $1"
        ))
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch derived artifact by fingerprint")?;

        Ok(artifact)
    }

    pub async fn get_artifact(&self, id: Uuid) -> Result<Option<DerivedArtifact>> {
        let artifact = sqlx::query_as::<Postgres, DerivedArtifact>(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM derived_artifacts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch derived artifact")?;

        Ok(artifact)
    }
}
