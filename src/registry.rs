//! Registry Builder: the tag to metadata lookup shipped to the runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::emit::EmittedBundle;
use crate::meta::{BundleIds, ComponentMeta};

/// Component metadata keyed and ordered by tag name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    components: BTreeMap<String, ComponentMeta>,
}

impl Registry {
    pub fn get(&self, tag: &str) -> Option<&ComponentMeta> {
        self.components.get(tag)
    }

    /// Components in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComponentMeta)> {
        self.components.iter().map(|(tag, cmp)| (tag.as_str(), cmp))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl FromIterator<ComponentMeta> for Registry {
    fn from_iter<I: IntoIterator<Item = ComponentMeta>>(iter: I) -> Self {
        Self {
            components: iter
                .into_iter()
                .map(|cmp| (cmp.tag_name().to_string(), cmp))
                .collect(),
        }
    }
}

/// Bundle ids every member of `bundle` is reachable through.
fn resolved_bundle_ids(bundle: &EmittedBundle) -> Option<BundleIds> {
    match bundle.variants.as_slice() {
        [] => None,
        [only] if only.mode.is_none() => Some(BundleIds::Single(only.bundle_id.clone())),
        variants => Some(BundleIds::PerMode(
            variants
                .iter()
                .filter_map(|v| Some((v.mode.clone()?, v.bundle_id.clone())))
                .collect(),
        )),
    }
}

pub fn generate_component_registry(bundles: &[EmittedBundle]) -> Registry {
    let mut components: Vec<ComponentMeta> = Vec::new();

    for bundle in bundles {
        let Some(bundle_ids) = resolved_bundle_ids(bundle) else {
            continue;
        };
        components.extend(
            bundle
                .components
                .iter()
                .map(|cmp| cmp.with_bundle_ids(bundle_ids.clone())),
        );
    }

    components.sort_by(|a, b| a.tag_name().cmp(b.tag_name()));

    let registry: Registry = components.into_iter().collect();
    tracing::debug!(components = registry.len(), "component registry generated");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{EmittedVariant, WriteOutcome};

    fn variant(mode: Option<&str>, id: &str) -> EmittedVariant {
        EmittedVariant {
            mode: mode.map(str::to_string),
            bundle_id: id.to_string(),
            has_scoped: false,
            outcome: WriteOutcome::Written,
        }
    }

    fn bundle(tags: &[&str], variants: Vec<EmittedVariant>) -> EmittedBundle {
        EmittedBundle {
            components: tags.iter().map(|t| ComponentMeta::builder(*t).build()).collect(),
            variants,
        }
    }

    #[test]
    fn registry_is_sorted_by_tag() {
        let registry = generate_component_registry(&[
            bundle(&["cmp-c", "cmp-a"], vec![variant(None, "cmp-c")]),
            bundle(&["cmp-b"], vec![variant(None, "cmp-b")]),
        ]);
        let tags: Vec<&str> = registry.tags().collect();
        assert_eq!(tags, vec!["cmp-a", "cmp-b", "cmp-c"]);
    }

    #[test]
    fn unstyled_bundles_attach_single_id() {
        let registry =
            generate_component_registry(&[bundle(&["cmp-a", "cmp-b"], vec![variant(None, "cmp-a")])]);
        assert_eq!(
            registry.get("cmp-b").and_then(ComponentMeta::bundle_ids),
            Some(&BundleIds::Single("cmp-a".to_string()))
        );
    }

    #[test]
    fn styled_bundles_attach_per_mode_ids() {
        let registry = generate_component_registry(&[bundle(
            &["cmp-a"],
            vec![variant(Some("ios"), "cmp-a.ios"), variant(Some("md"), "cmp-a.md")],
        )]);
        let Some(BundleIds::PerMode(ids)) = registry.get("cmp-a").and_then(ComponentMeta::bundle_ids)
        else {
            panic!("expected per-mode ids");
        };
        assert_eq!(ids["ios"], "cmp-a.ios");
        assert_eq!(ids["md"], "cmp-a.md");
    }

    #[test]
    fn default_only_bundle_is_keyed_by_sentinel() {
        let registry =
            generate_component_registry(&[bundle(&["cmp-a"], vec![variant(Some("$"), "cmp-a")])]);
        assert!(matches!(
            registry.get("cmp-a").and_then(ComponentMeta::bundle_ids),
            Some(BundleIds::PerMode(ids)) if ids["$"] == "cmp-a"
        ));
    }

    #[test]
    fn registry_serializes_as_tag_map() {
        let registry =
            generate_component_registry(&[bundle(&["cmp-a"], vec![variant(None, "cmp-a")])]);
        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(json["cmp-a"]["bundleIds"], "cmp-a");
    }
}
