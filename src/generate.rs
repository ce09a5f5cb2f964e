//! Bundle generation: style compilation, variant assembly, identity and emission.
//!
//! A [`BuildContext`] is meant to outlive a single build. Keeping it between
//! builds is what lets change builds reuse compiled styles and skip
//! rewriting artifacts whose bytes did not change.

use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use tracing::instrument;

use crate::bundle::{
    bundle_requires_scoped_styles, bundle_variants, format_load_styles, manifest_bundle_modes,
    prepare_module_text, replace_bundle_id, BundleVariant,
};
use crate::cache::{CacheUpdate, ChangeSet, StyleCache};
use crate::config::BundleConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, DIAG_EMPTY_BUNDLE};
use crate::emit::{
    assemble_bundle_content, write_bundle_file, EmitCache, EmittedBundle, EmittedVariant,
    OutputFiles, WriteOutcome,
};
use crate::identity::{bundle_file_name, generate_bundle_id, scoped_bundle_id};
use crate::meta::ManifestBundle;
use crate::registry::{generate_component_registry, Registry};
use crate::styles::{
    compile_component_styles, ComponentModeStyles, StyleContext, StylePreprocessor,
    UnavailablePreprocessor,
};

/// State carried from one build to the next.
pub struct BuildContext {
    change: Option<ChangeSet>,
    style_cache: StyleCache,
    emit_cache: EmitCache,
    preprocessor: Box<dyn StylePreprocessor>,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new(Box::new(UnavailablePreprocessor))
    }
}

impl BuildContext {
    pub fn new(preprocessor: Box<dyn StylePreprocessor>) -> Self {
        Self {
            change: None,
            style_cache: StyleCache::new(),
            emit_cache: EmitCache::new(),
            preprocessor,
        }
    }

    /// Makes the next build a change build over `changed_files`.
    pub fn set_changed_files<I, P>(&mut self, changed_files: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.change = Some(ChangeSet::new(changed_files));
    }

    /// Makes the next build a full build.
    pub fn clear_changed_files(&mut self) {
        self.change = None;
    }

    pub fn is_change_build(&self) -> bool {
        self.change.is_some()
    }

    pub fn style_cache(&self) -> &StyleCache {
        &self.style_cache
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub preprocess_count: usize,
    pub files_written: usize,
    pub files_unchanged: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResults {
    pub files: OutputFiles,
    pub registry: Registry,
    pub bundles: Vec<EmittedBundle>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: BuildStats,
}

impl BuildResults {
    /// Whether any error diagnostic was recorded; the caller decides what that means.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

#[instrument(skip_all, fields(bundles = manifest_bundles.len(), change_build = ctx.is_change_build()))]
pub fn generate_bundles(
    config: &BundleConfig,
    ctx: &mut BuildContext,
    manifest_bundles: &[ManifestBundle],
) -> BuildResults {
    let diagnostics = DiagnosticSink::new();
    let preprocess_before = ctx.style_cache.preprocess_count();

    let mut compiled = Vec::with_capacity(manifest_bundles.len());
    for manifest_bundle in manifest_bundles {
        let styles = compile_bundle_styles(config, ctx, manifest_bundle, &diagnostics);
        compiled.push((manifest_bundle, styles));
    }

    let mut emitter = Emitter {
        config,
        cache: &mut ctx.emit_cache,
        files: OutputFiles::default(),
        stats: BuildStats::default(),
    };
    let emitted: Vec<EmittedBundle> = compiled
        .iter()
        .filter_map(|(manifest_bundle, styles)| {
            emitter.generate_bundle_files(manifest_bundle, styles, &diagnostics)
        })
        .collect();

    let Emitter {
        files, mut stats, ..
    } = emitter;
    let registry = generate_component_registry(&emitted);
    stats.preprocess_count = ctx.style_cache.preprocess_count() - preprocess_before;

    tracing::info!(
        written = stats.files_written,
        unchanged = stats.files_unchanged,
        "bundles generated"
    );

    BuildResults {
        files,
        registry,
        bundles: emitted,
        diagnostics: diagnostics.take_all(),
        stats,
    }
}

/// Compiles the styles of every member in parallel, then applies cache slots.
fn compile_bundle_styles(
    config: &BundleConfig,
    ctx: &mut BuildContext,
    manifest_bundle: &ManifestBundle,
    diagnostics: &DiagnosticSink,
) -> Vec<ComponentModeStyles> {
    let style_ctx = StyleContext {
        config,
        cache: &ctx.style_cache,
        change: ctx.change.as_ref(),
        preprocessor: ctx.preprocessor.as_ref(),
        diagnostics,
    };

    let compiled: Vec<(Vec<ComponentModeStyles>, Vec<CacheUpdate>)> = manifest_bundle
        .components()
        .par_iter()
        .map(|cmp| compile_component_styles(&style_ctx, cmp))
        .collect();

    let mut styles = Vec::new();
    let mut updates = Vec::new();
    for (cmp_styles, cmp_updates) in compiled {
        styles.extend(cmp_styles);
        updates.extend(cmp_updates);
    }

    ctx.style_cache.apply(updates);
    styles
}

/// Writes variants one after another; no two variants share a destination.
struct Emitter<'a> {
    config: &'a BundleConfig,
    cache: &'a mut EmitCache,
    files: OutputFiles,
    stats: BuildStats,
}

impl Emitter<'_> {
    fn generate_bundle_files(
        &mut self,
        manifest_bundle: &ManifestBundle,
        styles: &[ComponentModeStyles],
        diagnostics: &DiagnosticSink,
    ) -> Option<EmittedBundle> {
        let Some(first_tag) = manifest_bundle.first_tag() else {
            diagnostics.push(Diagnostic::warning(
                DIAG_EMPTY_BUNDLE,
                "bundle has no components and was skipped",
            ));
            return None;
        };

        let module_text =
            prepare_module_text(self.config, manifest_bundle.module_text(), diagnostics);
        let modes = manifest_bundle_modes(manifest_bundle.components());
        let requires_scoped = bundle_requires_scoped_styles(manifest_bundle.components());

        let variants = bundle_variants(&modes, styles)
            .iter()
            .map(|variant| {
                self.generate_bundle_mode_files(first_tag, &module_text, variant, requires_scoped)
            })
            .collect();

        Some(EmittedBundle {
            components: manifest_bundle.components().to_vec(),
            variants,
        })
    }

    fn generate_bundle_mode_files(
        &mut self,
        first_tag: &str,
        module_text: &str,
        variant: &BundleVariant<'_>,
        requires_scoped: bool,
    ) -> EmittedVariant {
        let config = self.config;
        let unscoped_styles = format_load_styles(&config.namespace, &variant.styles, false);
        let unscoped_content = assemble_bundle_content(config, &[&unscoped_styles, module_text]);

        let bundle_id = generate_bundle_id(
            config,
            first_tag,
            variant.mode.as_deref(),
            &unscoped_content,
        );

        let mut outcome = self.write(
            &bundle_file_name(&bundle_id, false),
            &replace_bundle_id(&unscoped_content, &bundle_id),
        );

        // unstyled bundles have nothing to scope
        let has_scoped = requires_scoped && variant.mode.is_some();
        if has_scoped {
            let scoped_styles = format_load_styles(&config.namespace, &variant.styles, true);
            let scoped_content = assemble_bundle_content(config, &[&scoped_styles, module_text]);
            let scoped_outcome = self.write(
                &bundle_file_name(&bundle_id, true),
                &replace_bundle_id(&scoped_content, &scoped_bundle_id(&bundle_id)),
            );
            if scoped_outcome == WriteOutcome::Written {
                outcome = WriteOutcome::Written;
            }
        }

        tracing::debug!(
            bundle_id = %bundle_id,
            mode = ?variant.mode,
            scoped = has_scoped,
            ?outcome,
            "bundle variant emitted"
        );

        EmittedVariant {
            mode: variant.mode.clone(),
            bundle_id,
            has_scoped,
            outcome,
        }
    }

    fn write(&mut self, file_name: &str, content: &str) -> WriteOutcome {
        let outcome = write_bundle_file(self.config, self.cache, &mut self.files, file_name, content);
        match outcome {
            WriteOutcome::Written => self.stats.files_written += 1,
            WriteOutcome::Unchanged => self.stats.files_unchanged += 1,
        }
        outcome
    }
}
