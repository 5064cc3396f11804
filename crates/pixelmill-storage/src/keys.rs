//! Shared key generation for storage backends.
//!
//! Key format: `sources/{id}.{ext}` for uploaded images,
//! `derived/{fingerprint}.{ext}` for derived artifacts. Derived keys are
//! content-addressed by fingerprint, so recomputing an evicted artifact
//! overwrites byte-identical data at the same key.

use uuid::Uuid;

/// Storage key for an uploaded source image.
pub fn source_key(source_id: Uuid, extension: &str) -> String {
    format!("sources/{}.{}", source_id, extension)
}

/// Storage key for a derived artifact, addressed by its fingerprint.
pub fn derived_key(fingerprint: &str, extension: &str) -> String {
    format!("derived/{}.{}", fingerprint, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        let id = Uuid::nil();
        assert_eq!(
            source_key(id, "png"),
            "sources/00000000-0000-0000-0000-000000000000.png"
        );
        assert_eq!(derived_key("abc123", "jpg"), "derived/abc123.jpg");
    }
}
