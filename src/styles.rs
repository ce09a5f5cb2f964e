//! Style Compiler
//!
//! Turns the style sources of one component+mode into unscoped and
//! scope-qualified CSS. Sources compile in parallel; each one is numbered in
//! declaration order before dispatch so the joined text never depends on
//! which task finished first.

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::cache::{CacheUpdate, CachedStyle, ChangeSet, StyleCache, StyleSourceKind};
use crate::config::BundleConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, DIAG_STYLE_READ_FAILED};
use crate::error::{BundleError, Result};
use crate::meta::{ComponentMeta, Encapsulation};
use crate::minify::minify_css;
use crate::scope_css::scope_css;

lazy_static! {
    static ref PREPROCESSOR_FILE_RE: Regex = Regex::new(r"(?i)\.(scss|sass)$").unwrap();
    static ref CSS_FILE_RE: Regex = Regex::new(r"(?i)\.css$").unwrap();
}

pub fn is_preprocessor_file(path: &Path) -> bool {
    PREPROCESSOR_FILE_RE.is_match(&path.to_string_lossy())
}

pub fn is_css_file(path: &Path) -> bool {
    CSS_FILE_RE.is_match(&path.to_string_lossy())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREPROCESSOR SEAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles preprocessor style files (`.scss`, `.sass`) into plain CSS.
pub trait StylePreprocessor: Send + Sync {
    fn compile(&self, path: &Path, minify: bool) -> Result<String>;
}

/// Default preprocessor: reports every preprocessor file as a build error.
#[derive(Debug, Default)]
pub struct UnavailablePreprocessor;

impl StylePreprocessor for UnavailablePreprocessor {
    fn compile(&self, path: &Path, _minify: bool) -> Result<String> {
        Err(BundleError::Preprocess {
            path: path.to_path_buf(),
            reason: "no style preprocessor is configured".to_string(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILED STYLE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// One compiled style source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledModeStyle {
    /// Declaration position; fixed before compilation starts.
    pub order: usize,
    pub unscoped_styles: Option<String>,
    pub scoped_styles: Option<String>,
}

/// Joined styles of one component for one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentModeStyles {
    pub tag: String,
    pub mode: String,
    pub unscoped_styles: String,
    pub scoped_styles: Option<String>,
}

/// Everything a compile task may read. Tasks never write through it.
pub struct StyleContext<'a> {
    pub config: &'a BundleConfig,
    pub cache: &'a StyleCache,
    pub change: Option<&'a ChangeSet>,
    pub preprocessor: &'a dyn StylePreprocessor,
    pub diagnostics: &'a DiagnosticSink,
}

enum StyleTask<'a> {
    Preprocess { order: usize, path: &'a Path },
    Css { order: usize, path: &'a Path },
    Inline { order: usize, text: &'a str },
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles every mode of a component. Cache updates are returned, not applied.
pub fn compile_component_styles(
    ctx: &StyleContext<'_>,
    cmp: &ComponentMeta,
) -> (Vec<ComponentModeStyles>, Vec<CacheUpdate>) {
    let per_mode: Vec<(ComponentModeStyles, Vec<CacheUpdate>)> = cmp
        .styles()
        .par_iter()
        .map(|(mode, _)| compile_component_mode_styles(ctx, cmp, mode))
        .collect();

    let mut styles = Vec::with_capacity(per_mode.len());
    let mut updates = Vec::new();
    for (mode_styles, mode_updates) in per_mode {
        styles.push(mode_styles);
        updates.extend(mode_updates);
    }
    (styles, updates)
}

pub fn compile_component_mode_styles(
    ctx: &StyleContext<'_>,
    cmp: &ComponentMeta,
    mode: &str,
) -> (ComponentModeStyles, Vec<CacheUpdate>) {
    let tasks = plan_style_tasks(ctx, cmp, mode);

    let results: Vec<(CompiledModeStyle, Option<CacheUpdate>)> = tasks
        .into_par_iter()
        .map(|task| run_style_task(ctx, cmp, task))
        .collect();

    let mut compiled = Vec::with_capacity(results.len());
    let mut updates = Vec::new();
    for (style, update) in results {
        compiled.push(style);
        updates.extend(update);
    }

    let mut grouped = group_component_mode_styles(cmp.tag_name(), mode, compiled);
    if ctx.config.minify_css {
        minify_mode_styles(ctx.diagnostics, &mut grouped);
    }
    (grouped, updates)
}

/// Minifies the joined unscoped text; scoped text is left as written.
pub fn minify_mode_styles(diagnostics: &DiagnosticSink, styles: &mut ComponentModeStyles) {
    if styles.unscoped_styles.is_empty() {
        return;
    }
    minify_css(&styles.unscoped_styles).apply_to(&mut styles.unscoped_styles, diagnostics);
}

/// Numbers the sources of a component+mode in author order.
fn plan_style_tasks<'a>(
    ctx: &StyleContext<'_>,
    cmp: &'a ComponentMeta,
    mode: &str,
) -> Vec<StyleTask<'a>> {
    let Some(sources) = cmp.styles().get(mode) else {
        return Vec::new();
    };

    let mut tasks = Vec::new();
    let mut order = 0;

    for path in &sources.absolute_paths {
        order += 1;
        let path = path.as_path();
        if is_preprocessor_file(path) {
            tasks.push(StyleTask::Preprocess { order, path });
        } else if is_css_file(path) {
            tasks.push(StyleTask::Css { order, path });
        } else {
            ctx.diagnostics.push(
                BundleError::UnsupportedStyle {
                    path: path.to_path_buf(),
                    tag: cmp.tag_name().to_string(),
                }
                .into(),
            );
        }
    }

    if let Some(text) = sources.style_str.as_deref() {
        tasks.push(StyleTask::Inline {
            order: order + 1,
            text,
        });
    }

    tasks
}

fn run_style_task(
    ctx: &StyleContext<'_>,
    cmp: &ComponentMeta,
    task: StyleTask<'_>,
) -> (CompiledModeStyle, Option<CacheUpdate>) {
    match task {
        StyleTask::Preprocess { order, path } => compile_preprocessor_file(ctx, cmp, order, path),
        StyleTask::Css { order, path } => read_css_file(ctx, cmp, order, path),
        StyleTask::Inline { order, text } => (
            fill_style_text(cmp, order, text),
            None,
        ),
    }
}

fn compile_preprocessor_file(
    ctx: &StyleContext<'_>,
    cmp: &ComponentMeta,
    order: usize,
    path: &Path,
) -> (CompiledModeStyle, Option<CacheUpdate>) {
    let module_path = cmp.module_path().map(|p| p.as_path());
    if let Some(cached) = ctx.cache.reusable_preprocessed(ctx.change, path, module_path) {
        tracing::debug!(path = %path.display(), "reusing cached preprocessor output");
        return (from_cache(cmp, order, cached), None);
    }

    match ctx.preprocessor.compile(path, ctx.config.minify_css) {
        Ok(css) => {
            let style = fill_style_text(cmp, order, &css);
            let update = cache_update(StyleSourceKind::Preprocessed, path, &style);
            (style, Some(update))
        }
        Err(e) => {
            ctx.diagnostics.push(e.into());
            (empty_style(order), None)
        }
    }
}

fn read_css_file(
    ctx: &StyleContext<'_>,
    cmp: &ComponentMeta,
    order: usize,
    path: &Path,
) -> (CompiledModeStyle, Option<CacheUpdate>) {
    if let Some(cached) = ctx.cache.reusable_css(ctx.change, path) {
        tracing::debug!(path = %path.display(), "reusing cached css");
        return (from_cache(cmp, order, cached), None);
    }

    match fs::read_to_string(path) {
        Ok(css) => {
            let style = fill_style_text(cmp, order, &css);
            let update = cache_update(StyleSourceKind::Css, path, &style);
            (style, Some(update))
        }
        Err(e) => {
            ctx.diagnostics.push(
                Diagnostic::error(
                    DIAG_STYLE_READ_FAILED,
                    format!("Error opening CSS file. {}", e),
                )
                .with_file(path.display().to_string()),
            );
            (empty_style(order), None)
        }
    }
}

fn empty_style(order: usize) -> CompiledModeStyle {
    CompiledModeStyle {
        order,
        ..CompiledModeStyle::default()
    }
}

fn from_cache(cmp: &ComponentMeta, order: usize, cached: &CachedStyle) -> CompiledModeStyle {
    match cached.unscoped.as_deref() {
        Some(text) => fill_style_text(cmp, order, text),
        None => empty_style(order),
    }
}

fn cache_update(kind: StyleSourceKind, path: &Path, style: &CompiledModeStyle) -> CacheUpdate {
    CacheUpdate {
        kind,
        path: path.to_path_buf(),
        style: CachedStyle {
            unscoped: style.unscoped_styles.clone(),
        },
    }
}

/// Builds the unscoped and, when the component needs it, scoped text of one source.
pub fn fill_style_text(cmp: &ComponentMeta, order: usize, text: &str) -> CompiledModeStyle {
    let trimmed = text.trim();

    let scoped = if component_requires_scoped_styles(cmp.encapsulation()) {
        Some(scope_css(
            trimmed,
            &scope_id_selector(cmp.tag_name()),
            &host_scope_id_selector(cmp.tag_name()),
        ))
    } else {
        None
    };

    CompiledModeStyle {
        order,
        unscoped_styles: Some(trimmed.to_string()),
        scoped_styles: scoped,
    }
}

/// Joins compiled sources by declaration order, independent of input order.
pub fn group_component_mode_styles(
    tag: &str,
    mode: &str,
    mut compiled: Vec<CompiledModeStyle>,
) -> ComponentModeStyles {
    compiled.sort_by_key(|s| s.order);

    let unscoped_styles = compiled
        .iter()
        .map(|s| s.unscoped_styles.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string();

    let scoped_styles = if compiled.iter().any(|s| s.scoped_styles.is_some()) {
        Some(
            compiled
                .iter()
                .map(|s| s.scoped_styles.as_deref().unwrap_or(""))
                .collect::<Vec<_>>()
                .join("\n\n")
                .trim()
                .to_string(),
        )
    } else {
        None
    };

    ComponentModeStyles {
        tag: tag.to_string(),
        mode: mode.to_string(),
        unscoped_styles,
        scoped_styles,
    }
}

pub fn component_requires_scoped_styles(encapsulation: Encapsulation) -> bool {
    encapsulation.requires_scoped_styles()
}

pub fn scope_id(tag: &str) -> String {
    format!("data-{}", tag)
}

pub fn scope_id_selector(tag: &str) -> String {
    format!("[{}]", scope_id(tag))
}

pub fn host_scope_id_selector(tag: &str) -> String {
    format!("[{}-host]", scope_id(tag))
}
