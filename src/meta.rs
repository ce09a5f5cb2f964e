//! Component and bundle metadata handed over by the front-end compiler.
//!
//! Values are assembled through builders and never mutated afterwards; the
//! registry stage derives new [`ComponentMeta`] values carrying bundle ids.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Sentinel mode name meaning "no mode selected".
pub const DEFAULT_STYLE_MODE: &str = "$";

pub fn is_default_mode(mode: &str) -> bool {
    mode == DEFAULT_STYLE_MODE
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encapsulation {
    #[default]
    None,
    ScopedCss,
    ShadowDom,
}

impl Encapsulation {
    /// Both scoped css and shadow dom components need a scoped fallback.
    pub fn requires_scoped_styles(self) -> bool {
        matches!(self, Encapsulation::ScopedCss | Encapsulation::ShadowDom)
    }
}

/// Style inputs for one component+mode, in author order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleSources {
    pub absolute_paths: Vec<PathBuf>,
    pub style_str: Option<String>,
}

impl StyleSources {
    pub fn inline(style: impl Into<String>) -> Self {
        Self {
            absolute_paths: Vec::new(),
            style_str: Some(style.into()),
        }
    }

    pub fn files<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            absolute_paths: paths.into_iter().map(Into::into).collect(),
            style_str: None,
        }
    }
}

/// Resolved bundle ids for a component.
///
/// Components in a bundle without styles only ever get a plain id; the
/// runtime uses it without any mode lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleIds {
    Single(String),
    PerMode(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMeta {
    tag_name: String,
    #[serde(default)]
    encapsulation: Encapsulation,
    #[serde(default)]
    styles: BTreeMap<String, StyleSources>,
    #[serde(default)]
    module_path: Option<PathBuf>,
    #[serde(default)]
    bundle_ids: Option<BundleIds>,
}

impl ComponentMeta {
    pub fn builder(tag_name: impl Into<String>) -> ComponentMetaBuilder {
        ComponentMetaBuilder {
            meta: ComponentMeta {
                tag_name: tag_name.into(),
                encapsulation: Encapsulation::None,
                styles: BTreeMap::new(),
                module_path: None,
                bundle_ids: None,
            },
        }
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn encapsulation(&self) -> Encapsulation {
        self.encapsulation
    }

    /// Mode name to style sources, ordered by mode name.
    pub fn styles(&self) -> &BTreeMap<String, StyleSources> {
        &self.styles
    }

    pub fn has_styles(&self) -> bool {
        !self.styles.is_empty()
    }

    /// Compiled module file of this component, used by the change-build heuristic.
    pub fn module_path(&self) -> Option<&PathBuf> {
        self.module_path.as_ref()
    }

    pub fn bundle_ids(&self) -> Option<&BundleIds> {
        self.bundle_ids.as_ref()
    }

    /// Copy of this component with its bundle ids resolved.
    pub fn with_bundle_ids(&self, bundle_ids: BundleIds) -> Self {
        Self {
            bundle_ids: Some(bundle_ids),
            ..self.clone()
        }
    }
}

pub struct ComponentMetaBuilder {
    meta: ComponentMeta,
}

impl ComponentMetaBuilder {
    pub fn encapsulation(mut self, encapsulation: Encapsulation) -> Self {
        self.meta.encapsulation = encapsulation;
        self
    }

    pub fn mode_styles(mut self, mode: impl Into<String>, sources: StyleSources) -> Self {
        self.meta.styles.insert(mode.into(), sources);
        self
    }

    pub fn module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.meta.module_path = Some(path.into());
        self
    }

    pub fn bundle_ids(mut self, bundle_ids: BundleIds) -> Self {
        self.meta.bundle_ids = Some(bundle_ids);
        self
    }

    pub fn build(self) -> ComponentMeta {
        self.meta
    }
}

/// Components the grouping step decided to compile together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestBundle {
    components: Vec<ComponentMeta>,
    /// Joined module text; contains [`BUNDLE_ID_PLACEHOLDER`](crate::bundle::BUNDLE_ID_PLACEHOLDER).
    module_text: String,
}

impl ManifestBundle {
    pub fn new(module_text: impl Into<String>, components: Vec<ComponentMeta>) -> Self {
        Self {
            components,
            module_text: module_text.into(),
        }
    }

    pub fn components(&self) -> &[ComponentMeta] {
        &self.components
    }

    pub fn module_text(&self) -> &str {
        &self.module_text
    }

    /// The first member names the bundle when ids are not hashed.
    pub fn first_tag(&self) -> Option<&str> {
        self.components.first().map(ComponentMeta::tag_name)
    }
}
