//! Source image repository.
//!
//! Source rows are created once on upload and never updated; every derived
//! artifact and job references them by id.

use anyhow::{Context, Result};
use pixelmill_core::models::SourceImage;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

#[derive(Clone)]
pub struct SourceImageRepository {
    pool: PgPool,
}

impl SourceImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self))]
    #[allow(clippy::too_many_arguments)]
    pub async fn create_source(
        &self,
        id: Uuid,
        owner_id: Uuid,
        content_hash: &str,
        byte_len: i64,
        declared_content_type: &str,
        detected_content_type: &str,
        width: i32,
        height: i32,
        storage_key: &str,
    ) -> Result<SourceImage> {
        let source: SourceImage = sqlx::query_as::<Postgres, SourceImage>(
            r#"
            INSERT INTO source_images (
                id, owner_id, content_hash, byte_len,
                declared_content_type, detected_content_type,
                width, height, storage_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING
                id, owner_id, content_hash, byte_len,
                declared_content_type, detected_content_type,
                width, height, storage_key, created_at
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(content_hash)
        .bind(byte_len)
        .bind(declared_content_type)
        .bind(detected_content_type)
        .bind(width)
        .bind(height)
        .bind(storage_key)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create source image")?;

        tracing::info!(
            source_image_id = %source.id,
            content_hash = %source.content_hash,
            byte_len = source.byte_len,
            "Source image registered"
        );

        Ok(source)
    }

    pub async fn get_source(&self, id: Uuid) -> Result<Option<SourceImage>> {
        let source = sqlx::query_as::<Postgres, SourceImage>(
            r#"
            SELECT
                id, owner_id, content_hash, byte_len,
                declared_content_type, detected_content_type,
                width, height, storage_key, created_at
            FROM source_images
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch source image")?;

        Ok(source)
    }
}
