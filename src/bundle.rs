//! Bundle Assembler
//!
//! Splits a bundle's compiled styles into per-mode variants and formats the
//! style payload each artifact registers at runtime.
//!
//! ## Variant rules
//!
//! 1. No component declares styles: one variant, no style payload.
//! 2. Only the default mode, or only named modes: one variant per mode.
//! 3. Default and named modes mixed: one variant per named mode, carrying the
//!    default-mode styles of every member first and that mode's styles after,
//!    so mode rules win by source order.

use lazy_static::lazy_static;
use regex::{NoExpand, Regex};
use serde_json::{json, Value};

use crate::config::BundleConfig;
use crate::diagnostics::DiagnosticSink;
use crate::meta::{is_default_mode, ComponentMeta, DEFAULT_STYLE_MODE};
use crate::minify::minify_js;
use crate::styles::{component_requires_scoped_styles, ComponentModeStyles};

/// Token the front end embeds wherever the final bundle id must appear.
pub const BUNDLE_ID_PLACEHOLDER: &str = "__BUNDLE__ID__";

lazy_static! {
    static ref BUNDLE_ID_RE: Regex = Regex::new(&regex::escape(BUNDLE_ID_PLACEHOLDER)).unwrap();
}

pub fn replace_bundle_id(text: &str, bundle_id: &str) -> String {
    BUNDLE_ID_RE
        .replace_all(text, NoExpand(bundle_id))
        .into_owned()
}

/// Styles one artifact carries; `mode` is `None` when no member has styles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleVariant<'a> {
    pub mode: Option<String>,
    pub styles: Vec<&'a ComponentModeStyles>,
}

/// Distinct modes declared by the members, sorted; `$` sorts first.
pub fn manifest_bundle_modes(components: &[ComponentMeta]) -> Vec<String> {
    let mut modes: Vec<String> = components
        .iter()
        .flat_map(|c| c.styles().keys().cloned())
        .collect();
    modes.sort();
    modes.dedup();
    modes
}

pub fn contains_default_mode(modes: &[String]) -> bool {
    modes.iter().any(|m| is_default_mode(m))
}

pub fn contains_non_default_modes(modes: &[String]) -> bool {
    modes.iter().any(|m| !is_default_mode(m))
}

pub fn bundle_variants<'a>(
    modes: &[String],
    styles: &'a [ComponentModeStyles],
) -> Vec<BundleVariant<'a>> {
    let styles_for = |mode: &str| -> Vec<&'a ComponentModeStyles> {
        styles.iter().filter(|s| s.mode == mode).collect()
    };

    if contains_default_mode(modes) && contains_non_default_modes(modes) {
        modes
            .iter()
            .filter(|m| !is_default_mode(m))
            .map(|mode| {
                let mut layered = styles_for(DEFAULT_STYLE_MODE);
                layered.extend(styles_for(mode));
                BundleVariant {
                    mode: Some(mode.clone()),
                    styles: layered,
                }
            })
            .collect()
    } else if !modes.is_empty() {
        modes
            .iter()
            .map(|mode| BundleVariant {
                mode: Some(mode.clone()),
                styles: styles_for(mode),
            })
            .collect()
    } else {
        vec![BundleVariant {
            mode: None,
            styles: Vec::new(),
        }]
    }
}

/// A scoped variant exists once the bundle has styles and any member needs scoping.
pub fn bundle_requires_scoped_styles(components: &[ComponentMeta]) -> bool {
    components.iter().any(ComponentMeta::has_styles)
        && components
            .iter()
            .any(|c| component_requires_scoped_styles(c.encapsulation()))
}

/// `<Namespace>.loadStyles("<bundle id>",[["tag","css"],...]);`
///
/// Members without scoped text contribute their unscoped text to the scoped
/// payload. Empty entries are dropped; no entries at all yields no statement.
pub fn format_load_styles(
    namespace: &str,
    styles: &[&ComponentModeStyles],
    scoped: bool,
) -> String {
    let entries: Vec<Value> = styles
        .iter()
        .filter_map(|s| {
            let text = if scoped {
                s.scoped_styles.as_deref().unwrap_or(&s.unscoped_styles)
            } else {
                s.unscoped_styles.as_str()
            };
            (!text.is_empty()).then(|| json!([s.tag, text]))
        })
        .collect();

    if entries.is_empty() {
        return String::new();
    }

    format!(
        "{}.loadStyles({},{});",
        namespace,
        Value::from(BUNDLE_ID_PLACEHOLDER),
        Value::Array(entries)
    )
}

/// Module text shared by every variant of a bundle, minified when configured.
pub fn prepare_module_text(
    config: &BundleConfig,
    module_text: &str,
    diagnostics: &DiagnosticSink,
) -> String {
    if !config.minify_js {
        return module_text.to_string();
    }

    let mut text = module_text.to_string();
    minify_js(module_text).apply_to(&mut text, diagnostics);
    text
}
