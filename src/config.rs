//! Build configuration handed to the bundler by the CLI/config layer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{BundleError, Result};

pub const MIN_HASHED_FILE_NAME_LENGTH: usize = 4;
/// A hex SHA-256 digest is 64 characters long.
pub const MAX_HASHED_FILE_NAME_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundleConfig {
    /// Content-hash identifiers instead of tag-name identifiers.
    pub hash_file_names: bool,
    pub hashed_file_name_length: usize,
    pub minify_css: bool,
    pub minify_js: bool,
    #[serde(rename = "generateWWW")]
    pub generate_www: bool,
    pub generate_distribution: bool,
    /// App namespace; names the global registration object and the output subpath.
    pub namespace: String,
    pub build_dir: PathBuf,
    pub dist_dir: PathBuf,
    /// Text of a `/*! ... */` banner prepended to every artifact.
    pub preamble: Option<String>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            hash_file_names: false,
            hashed_file_name_length: 8,
            minify_css: false,
            minify_js: false,
            generate_www: true,
            generate_distribution: false,
            namespace: "App".to_string(),
            build_dir: PathBuf::from("www/build"),
            dist_dir: PathBuf::from("dist"),
            preamble: None,
        }
    }
}

impl BundleConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BundleConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: BundleConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_namespace(&self.namespace) {
            return Err(BundleError::config(format!(
                "namespace \"{}\" must be a valid JavaScript identifier",
                self.namespace
            )));
        }

        if self.hash_file_names
            && !(MIN_HASHED_FILE_NAME_LENGTH..=MAX_HASHED_FILE_NAME_LENGTH)
                .contains(&self.hashed_file_name_length)
        {
            return Err(BundleError::config(format!(
                "hashedFileNameLength must be between {} and {}, got {}",
                MIN_HASHED_FILE_NAME_LENGTH,
                MAX_HASHED_FILE_NAME_LENGTH,
                self.hashed_file_name_length
            )));
        }

        Ok(())
    }

    /// Output subdirectory shared by every target.
    pub fn namespace_dir(&self) -> String {
        self.namespace.to_lowercase()
    }
}

fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
