//! Error types for fallible bundler operations.
//!
//! Problems found while compiling a build never abort it; they are collected
//! as [`Diagnostic`](crate::diagnostics::Diagnostic) values instead. The
//! variants here cover the operations that genuinely cannot continue.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// Reading a style source or other input failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration object was rejected.
    #[error("invalid bundle config: {reason}")]
    Config { reason: String },

    /// A style preprocessor reported a compile failure.
    #[error("failed to preprocess {path}: {reason}")]
    Preprocess { path: PathBuf, reason: String },

    /// The style file has an extension the compiler does not understand.
    #[error("style url \"{path}\", in component \"{tag}\", is not a supported file type")]
    UnsupportedStyle { path: PathBuf, tag: String },

    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),
}

impl BundleError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;
