//! Artifact emission with an idempotent write cache.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::config::BundleConfig;
use crate::meta::ComponentMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteOutcome {
    Written,
    /// Same bytes as the last write to this path; nothing queued.
    Unchanged,
}

/// Last content written per destination path. Lives across rebuilds.
#[derive(Debug, Default)]
pub struct EmitCache {
    compiled: HashMap<PathBuf, String>,
}

impl EmitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_and_store(&mut self, path: &Path, content: &str) -> WriteOutcome {
        if self.compiled.get(path).is_some_and(|prev| prev == content) {
            return WriteOutcome::Unchanged;
        }
        self.compiled.insert(path.to_path_buf(), content.to_string());
        WriteOutcome::Written
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Files queued for writing, per output target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFiles {
    pub www: BTreeMap<PathBuf, String>,
    pub dist: BTreeMap<PathBuf, String>,
}

impl OutputFiles {
    pub fn len(&self) -> usize {
        self.www.len() + self.dist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.www.is_empty() && self.dist.is_empty()
    }
}

/// One artifact pair (unscoped, optionally scoped) produced for a bundle mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedVariant {
    pub mode: Option<String>,
    pub bundle_id: String,
    pub has_scoped: bool,
    pub outcome: WriteOutcome,
}

/// Summary of a manifest bundle after emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedBundle {
    pub components: Vec<ComponentMeta>,
    pub variants: Vec<EmittedVariant>,
}

pub fn generate_preamble(config: &BundleConfig) -> String {
    match config.preamble.as_deref() {
        Some(text) if !text.trim().is_empty() => format!("/*! {} */\n", text.trim()),
        _ => String::new(),
    }
}

/// Preamble followed by the non-empty parts, one per line.
pub fn assemble_bundle_content(config: &BundleConfig, parts: &[&str]) -> String {
    let body = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}{}", generate_preamble(config), body)
}

pub fn www_build_path(config: &BundleConfig, file_name: &str) -> PathBuf {
    config
        .build_dir
        .join(config.namespace_dir())
        .join(file_name)
}

pub fn dist_path(config: &BundleConfig, file_name: &str) -> PathBuf {
    config.dist_dir.join(config.namespace_dir()).join(file_name)
}

/// Queues `content` for every enabled target unless it is unchanged.
///
/// The primary-tree path is the cache key for both targets.
pub fn write_bundle_file(
    config: &BundleConfig,
    cache: &mut EmitCache,
    files: &mut OutputFiles,
    file_name: &str,
    content: &str,
) -> WriteOutcome {
    let www_path = www_build_path(config, file_name);

    if cache.check_and_store(&www_path, content) == WriteOutcome::Unchanged {
        tracing::debug!(path = %www_path.display(), "bundle unchanged, skipping write");
        return WriteOutcome::Unchanged;
    }

    if config.generate_distribution {
        files
            .dist
            .insert(dist_path(config, file_name), content.to_string());
    }

    if config.generate_www {
        files.www.insert(www_path, content.to_string());
    }

    WriteOutcome::Written
}
