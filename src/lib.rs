//! # Bundle Generation Engine
//!
//! Turns groups of compiled web components into mode-specific JavaScript
//! artifacts with embedded styles, names them deterministically, writes them
//! only when their bytes change, and publishes a tag registry the runtime
//! [`loader`] uses to fetch each artifact at most once.
//!
//! ## Invariants
//!
//! 1. **Deterministic ids**: with `hashFileNames`, a bundle id is the
//!    truncated SHA-256 of the assembled unscoped artifact (placeholder still
//!    in place). Identical inputs always yield identical ids.
//!
//! 2. **Name ids**: otherwise the id is the first member's tag, suffixed with
//!    `.<mode>` for any mode other than `$`.
//!
//! 3. **Style order**: style contributions of one component+mode are joined
//!    with a blank line, ascending by declared order; inline styles come last.
//!
//! 4. **Mode layering**: when a bundle mixes `$` and named modes, every named
//!    variant carries all `$` styles before its own.
//!
//! 5. **Scoped variant**: a `<id>.sc.js` artifact exists when the bundle has
//!    styles and any member uses scoped css or shadow dom. Its registration
//!    call uses the id `<id>.sc`.
//!
//! 6. **Idempotent emission**: re-emitting unchanged content for a path
//!    queues no write.
//!
//! 7. **Non-fatal diagnostics**: style and minifier problems are collected,
//!    never raised; the caller decides whether the build failed.
//!
//! 8. **Request coalescing**: concurrent loads of one artifact issue a single
//!    request; every waiter runs once, in call order, when the artifact
//!    registers.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod bundle;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod emit;
pub mod error;
pub mod generate;
pub mod identity;
pub mod loader;
pub mod meta;
pub mod minify;
pub mod registry;
pub mod scope_css;
pub mod styles;


pub use config::BundleConfig;
pub use diagnostics::{Diagnostic, DiagnosticLevel, DiagnosticSink};
pub use error::{BundleError, Result};
pub use generate::{generate_bundles, BuildContext, BuildResults, BuildStats};
pub use loader::{
    BundleLoader, BundleRegistration, HostElement, LoaderError, LoaderHost, LoaderOptions,
    RequestOutcome,
};
pub use meta::{BundleIds, ComponentMeta, Encapsulation, ManifestBundle, StyleSources};
pub use registry::Registry;
pub use styles::StylePreprocessor;

/// One-shot build for Node callers: JSON config and bundles in, JSON results out.
pub fn generate_bundles_json(
    config: serde_json::Value,
    bundles: serde_json::Value,
) -> Result<serde_json::Value> {
    let config = BundleConfig::from_value(config)?;
    let bundles: Vec<ManifestBundle> = serde_json::from_value(bundles)?;
    let mut ctx = BuildContext::default();
    let results = generate_bundles(&config, &mut ctx, &bundles);
    Ok(serde_json::to_value(results)?)
}

#[cfg(feature = "napi")]
#[napi]
pub fn generate_bundles_native(
    config: serde_json::Value,
    bundles: serde_json::Value,
) -> napi::Result<serde_json::Value> {
    generate_bundles_json(config, bundles).map_err(|e| napi::Error::from_reason(e.to_string()))
}
