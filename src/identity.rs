//! Bundle identifiers and artifact file names.
//!
//! Ids are either a truncated content digest (`hashFileNames`) or derived
//! from the bundle's first member tag. The runtime builds request URLs from
//! the same scheme, so any change here is a breaking change for shipped
//! registries.

use sha2::{Digest, Sha256};

use crate::config::BundleConfig;
use crate::meta::is_default_mode;

/// Marks the variant whose styles are attribute-scoped.
pub const SCOPED_SUFFIX: &str = "sc";

/// Lowercase hex SHA-256 of `content`, truncated to `length` characters.
pub fn generate_content_hash(content: &str, length: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(length);
    digest
}

/// `content` is the assembled unscoped artifact, placeholder still in place.
pub fn generate_bundle_id(
    config: &BundleConfig,
    first_tag: &str,
    mode: Option<&str>,
    content: &str,
) -> String {
    if config.hash_file_names {
        return generate_content_hash(content, config.hashed_file_name_length);
    }

    match mode {
        Some(mode) if !is_default_mode(mode) => format!("{}.{}", first_tag, mode),
        _ => first_tag.to_string(),
    }
}

/// Id the runtime requests for the scoped variant of `bundle_id`.
pub fn scoped_bundle_id(bundle_id: &str) -> String {
    format!("{}.{}", bundle_id, SCOPED_SUFFIX)
}

pub fn bundle_file_name(bundle_id: &str, scoped: bool) -> String {
    if scoped {
        format!("{}.js", scoped_bundle_id(bundle_id))
    } else {
        format!("{}.js", bundle_id)
    }
}
