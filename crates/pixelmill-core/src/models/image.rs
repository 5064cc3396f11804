//! Source image and derived artifact records
//!
//! A source image is created once on upload and never mutated; every derived
//! artifact references exactly one source and exactly one fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded raster image, immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SourceImage {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// sha-256 hex of the raw bytes; the content identity used in fingerprints.
    pub content_hash: String,
    pub byte_len: i64,
    pub declared_content_type: String,
    pub detected_content_type: String,
    pub width: i32,
    pub height: i32,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

/// The output of applying one canonical pipeline to one source image at a
/// given output format. Created lazily on first request, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DerivedArtifact {
    pub id: Uuid,
    /// Fingerprint hex; unique per (source content, canonical pipeline, format).
    pub fingerprint: String,
    pub source_image_id: Uuid,
    pub storage_key: String,
    pub byte_len: i64,
    pub width: i32,
    pub height: i32,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}
