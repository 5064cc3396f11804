//! Pixelmill Storage
//!
//! Object-storage collaborator for the transformation core: a [`Storage`]
//! trait with local-filesystem and S3 backends, plus the shared key scheme
//! for sources and derived artifacts.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use factory::create_storage;
pub use keys::{derived_key, source_key};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
