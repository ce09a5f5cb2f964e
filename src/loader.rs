//! Runtime Loader
//!
//! Resolves the artifact a host element needs, requests each artifact URL at
//! most once while it is in flight, and fans readiness out to every waiter
//! once the artifact registers itself. Also owns the per-tag style templates
//! that shadow roots clone from.
//!
//! Everything touching the document goes through [`LoaderHost`]; the loader
//! itself is plain bookkeeping driven by one event loop.
//!
//! ## Completion semantics
//!
//! A request finishing (load, error or timeout) only clears request state.
//! Components become ready when the artifact's registration call runs
//! ([`BundleLoader::register_bundle`]). A failed or timed-out request leaves
//! its waiters queued and never calls them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::identity::scoped_bundle_id;
use crate::meta::{BundleIds, ComponentMeta, Encapsulation, DEFAULT_STYLE_MODE};
use crate::registry::Registry;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    #[error("no component is registered for tag \"{tag}\"")]
    UnknownComponent { tag: String },

    #[error("component \"{tag}\" has no bundle ids")]
    MissingBundleIds { tag: String },

    #[error("component \"{tag}\" has no bundle for mode \"{mode}\" and no default")]
    UnresolvedMode { tag: String, mode: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// A `<style>` element destined for the document head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleElement {
    pub id: String,
    pub text: String,
}

/// Style template cloned into every shadow root of one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleTemplate {
    pub tag: String,
    pub text: String,
}

/// Document and event loop operations the loader relies on.
pub trait LoaderHost {
    fn supports_native_shadow_dom(&self) -> bool;
    fn inject_script(&mut self, url: &str) -> ScriptId;
    fn remove_script(&mut self, script: ScriptId);
    /// Schedules a timeout; when it fires the host reports
    /// [`RequestOutcome::TimedOut`] for `url`.
    fn start_timer(&mut self, url: &str, timeout: Duration) -> TimerId;
    fn cancel_timer(&mut self, timer: TimerId);
    fn append_style(&mut self, style: StyleElement);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostElement {
    pub tag_name: String,
    pub mode: Option<String>,
}

impl HostElement {
    pub fn new(tag_name: impl Into<String>, mode: Option<&str>) -> Self {
        Self {
            tag_name: tag_name.into(),
            mode: mode.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderOptions {
    /// Prefix of every artifact URL, usually ending in `/`.
    pub public_path: String,
    /// Mode used for elements that do not carry one.
    pub default_mode: Option<String>,
    pub request_timeout: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            public_path: String::new(),
            default_mode: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Loaded,
    Errored,
    TimedOut,
}

/// What an executed artifact hands to the registration entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRegistration {
    pub bundle_id: String,
    /// `(tag, style text)` pairs in artifact order.
    #[serde(default)]
    pub styles: Vec<(String, String)>,
}

type ReadyCallback = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    script: ScriptId,
    timer: TimerId,
}

/// Whether `cmp` renders into a native shadow root on this host.
pub fn use_shadow_dom(supports_native_shadow_dom: bool, cmp: &ComponentMeta) -> bool {
    supports_native_shadow_dom && cmp.encapsulation() == Encapsulation::ShadowDom
}

/// Whether `cmp` needs the attribute-scoped artifact on this host.
pub fn use_scoped_css(supports_native_shadow_dom: bool, cmp: &ComponentMeta) -> bool {
    match cmp.encapsulation() {
        Encapsulation::ScopedCss => true,
        Encapsulation::ShadowDom => !supports_native_shadow_dom,
        Encapsulation::None => false,
    }
}

/// Bundle id to request for `cmp` rendered in `mode`.
///
/// Per-mode ids fall back to `default_mode`, then to the `$` entry.
pub fn resolve_bundle_id(
    supports_native_shadow_dom: bool,
    cmp: &ComponentMeta,
    mode: Option<&str>,
    default_mode: Option<&str>,
) -> Result<String, LoaderError> {
    let ids = match cmp.bundle_ids() {
        Some(BundleIds::Single(id)) => return Ok(id.clone()),
        Some(BundleIds::PerMode(ids)) => ids,
        None => {
            return Err(LoaderError::MissingBundleIds {
                tag: cmp.tag_name().to_string(),
            })
        }
    };

    let bundle_id = [mode, default_mode, Some(DEFAULT_STYLE_MODE)]
        .into_iter()
        .flatten()
        .find_map(|m| ids.get(m))
        .ok_or_else(|| LoaderError::UnresolvedMode {
            tag: cmp.tag_name().to_string(),
            mode: mode.or(default_mode).unwrap_or(DEFAULT_STYLE_MODE).to_string(),
        })?;

    if use_scoped_css(supports_native_shadow_dom, cmp) {
        Ok(scoped_bundle_id(bundle_id))
    } else {
        Ok(bundle_id.clone())
    }
}

pub struct BundleLoader<H: LoaderHost> {
    host: H,
    registry: Registry,
    options: LoaderOptions,
    loaded: HashSet<String>,
    callbacks: HashMap<String, Vec<ReadyCallback>>,
    in_flight: HashMap<String, PendingRequest>,
    style_templates: HashMap<String, StyleTemplate>,
    appended_styles: HashSet<String>,
}

impl<H: LoaderHost> BundleLoader<H> {
    pub fn new(host: H, registry: Registry, options: LoaderOptions) -> Self {
        Self {
            host,
            registry,
            options,
            loaded: HashSet::new(),
            callbacks: HashMap::new(),
            in_flight: HashMap::new(),
            style_templates: HashMap::new(),
            appended_styles: HashSet::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn bundle_url(&self, bundle_id: &str) -> String {
        format!("{}{}.js", self.options.public_path, bundle_id)
    }

    /// Runs `on_ready` once the bundle serving `elm` has registered.
    ///
    /// Already loaded bundles call `on_ready` before returning.
    pub fn load_bundle<F>(
        &mut self,
        cmp: &ComponentMeta,
        elm: &HostElement,
        on_ready: F,
    ) -> Result<(), LoaderError>
    where
        F: FnOnce() + 'static,
    {
        let bundle_id = resolve_bundle_id(
            self.host.supports_native_shadow_dom(),
            cmp,
            elm.mode.as_deref(),
            self.options.default_mode.as_deref(),
        )?;

        if self.loaded.contains(&bundle_id) {
            on_ready();
            return Ok(());
        }

        self.callbacks
            .entry(bundle_id.clone())
            .or_default()
            .push(Box::new(on_ready));
        self.request_bundle(&bundle_id);
        Ok(())
    }

    /// Like [`load_bundle`](Self::load_bundle), looking the component up by
    /// the element's tag name.
    pub fn load_element<F>(&mut self, elm: &HostElement, on_ready: F) -> Result<(), LoaderError>
    where
        F: FnOnce() + 'static,
    {
        let cmp = self
            .registry
            .get(&elm.tag_name)
            .cloned()
            .ok_or_else(|| LoaderError::UnknownComponent {
                tag: elm.tag_name.clone(),
            })?;
        self.load_bundle(&cmp, elm, on_ready)
    }

    fn request_bundle(&mut self, bundle_id: &str) {
        let url = self.bundle_url(bundle_id);
        if self.in_flight.contains_key(&url) {
            tracing::debug!(%url, "bundle request already in flight");
            return;
        }

        tracing::debug!(%url, "requesting bundle");
        let script = self.host.inject_script(&url);
        let timer = self.host.start_timer(&url, self.options.request_timeout);
        self.in_flight.insert(url, PendingRequest { script, timer });
    }

    /// Clears the request state of `url`. Never runs callbacks.
    pub fn complete_request(&mut self, url: &str, outcome: RequestOutcome) {
        let Some(request) = self.in_flight.remove(url) else {
            return;
        };

        if outcome != RequestOutcome::TimedOut {
            self.host.cancel_timer(request.timer);
        }
        self.host.remove_script(request.script);

        match outcome {
            RequestOutcome::Loaded => tracing::debug!(%url, "bundle request completed"),
            RequestOutcome::Errored => tracing::warn!(%url, "bundle request failed"),
            RequestOutcome::TimedOut => tracing::warn!(%url, "bundle request timed out"),
        }
    }

    /// Entry point executed artifacts call: installs styles, marks the
    /// bundle loaded and runs its waiters in the order they were queued.
    pub fn register_bundle(&mut self, registration: BundleRegistration) {
        self.load_styles(&registration);

        self.loaded.insert(registration.bundle_id.clone());
        let callbacks = self
            .callbacks
            .remove(&registration.bundle_id)
            .unwrap_or_default();
        tracing::debug!(
            bundle_id = %registration.bundle_id,
            callbacks = callbacks.len(),
            "bundle registered"
        );
        for callback in callbacks {
            callback();
        }
    }

    fn load_styles(&mut self, registration: &BundleRegistration) {
        let supports_shadow = self.host.supports_native_shadow_dom();

        // same-tag entries are concatenated, first appearance keeps its place
        let mut by_tag: Vec<(&str, String)> = Vec::new();
        for (tag, text) in &registration.styles {
            match by_tag.iter_mut().find(|(t, _)| *t == tag.as_str()) {
                Some((_, joined)) => joined.push_str(text),
                None => by_tag.push((tag.as_str(), text.clone())),
            }
        }

        let mut document_styles = String::new();
        for (tag, text) in by_tag {
            let Some(cmp) = self.registry.get(tag) else {
                tracing::debug!(tag, "styles for unregistered tag ignored");
                continue;
            };

            if use_shadow_dom(supports_shadow, cmp) {
                self.style_templates
                    .entry(tag.to_string())
                    .or_insert_with(|| StyleTemplate {
                        tag: tag.to_string(),
                        text,
                    });
            } else {
                document_styles.push_str(&text);
            }
        }

        if document_styles.is_empty() {
            return;
        }

        let id = format!("style-{}", registration.bundle_id);
        if self.appended_styles.insert(id.clone()) {
            self.host.append_style(StyleElement {
                id,
                text: document_styles,
            });
        }
    }

    /// Fresh copy of the style template for `tag`, if one was registered.
    pub fn clone_component_style(&self, tag: &str) -> Option<StyleTemplate> {
        self.style_templates.get(tag).cloned()
    }

    pub fn is_loaded(&self, bundle_id: &str) -> bool {
        self.loaded.contains(bundle_id)
    }

    pub fn is_request_pending(&self, url: &str) -> bool {
        self.in_flight.contains_key(url)
    }

    pub fn pending_callbacks(&self, bundle_id: &str) -> usize {
        self.callbacks.get(bundle_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeHost {
        native_shadow: bool,
        next_id: u64,
        injected: Vec<String>,
        removed: Vec<ScriptId>,
        timers: Vec<(TimerId, String, Duration)>,
        cancelled: Vec<TimerId>,
        styles: Vec<StyleElement>,
    }

    impl LoaderHost for FakeHost {
        fn supports_native_shadow_dom(&self) -> bool {
            self.native_shadow
        }

        fn inject_script(&mut self, url: &str) -> ScriptId {
            self.next_id += 1;
            self.injected.push(url.to_string());
            ScriptId(self.next_id)
        }

        fn remove_script(&mut self, script: ScriptId) {
            self.removed.push(script);
        }

        fn start_timer(&mut self, url: &str, timeout: Duration) -> TimerId {
            self.next_id += 1;
            let id = TimerId(self.next_id);
            self.timers.push((id, url.to_string(), timeout));
            id
        }

        fn cancel_timer(&mut self, timer: TimerId) {
            self.cancelled.push(timer);
        }

        fn append_style(&mut self, style: StyleElement) {
            self.styles.push(style);
        }
    }

    fn per_mode(tag: &str, encapsulation: Encapsulation, ids: &[(&str, &str)]) -> ComponentMeta {
        let ids: BTreeMap<String, String> = ids
            .iter()
            .map(|(m, id)| (m.to_string(), id.to_string()))
            .collect();
        ComponentMeta::builder(tag)
            .encapsulation(encapsulation)
            .bundle_ids(BundleIds::PerMode(ids))
            .build()
    }

    fn single(tag: &str, id: &str) -> ComponentMeta {
        ComponentMeta::builder(tag)
            .bundle_ids(BundleIds::Single(id.to_string()))
            .build()
    }

    fn loader(native_shadow: bool, components: Vec<ComponentMeta>) -> BundleLoader<FakeHost> {
        let host = FakeHost {
            native_shadow,
            ..FakeHost::default()
        };
        let options = LoaderOptions {
            public_path: "/build/app/".to_string(),
            ..LoaderOptions::default()
        };
        BundleLoader::new(host, components.into_iter().collect(), options)
    }

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let handle = calls.clone();
        let make = move |name: &'static str| -> Box<dyn FnOnce()> {
            let calls = handle.clone();
            Box::new(move || calls.borrow_mut().push(name))
        };
        (calls, make)
    }

    #[test]
    fn resolves_scoped_id_for_scoped_css() {
        let cmp = per_mode("cmp-a", Encapsulation::ScopedCss, &[("ios", "bundle-id")]);
        assert_eq!(
            resolve_bundle_id(true, &cmp, Some("ios"), None).unwrap(),
            "bundle-id.sc"
        );
    }

    #[test]
    fn resolves_scoped_id_for_shadow_without_native_support() {
        let cmp = per_mode("cmp-a", Encapsulation::ShadowDom, &[("ios", "bundle-id")]);
        assert_eq!(
            resolve_bundle_id(false, &cmp, Some("ios"), None).unwrap(),
            "bundle-id.sc"
        );
        assert_eq!(
            resolve_bundle_id(true, &cmp, Some("ios"), None).unwrap(),
            "bundle-id"
        );
    }

    #[test]
    fn resolves_plain_id_without_encapsulation() {
        let cmp = per_mode("cmp-a", Encapsulation::None, &[("ios", "bundle-id")]);
        assert_eq!(
            resolve_bundle_id(true, &cmp, Some("ios"), None).unwrap(),
            "bundle-id"
        );
    }

    #[test]
    fn single_id_is_used_as_is() {
        let cmp = ComponentMeta::builder("cmp-a")
            .encapsulation(Encapsulation::ScopedCss)
            .bundle_ids(BundleIds::Single("bundle-id".to_string()))
            .build();
        assert_eq!(
            resolve_bundle_id(false, &cmp, Some("ios"), None).unwrap(),
            "bundle-id"
        );
    }

    #[test]
    fn mode_falls_back_to_default_mode_then_sentinel() {
        let cmp = per_mode(
            "cmp-a",
            Encapsulation::None,
            &[("$", "cmp-a"), ("md", "cmp-a.md")],
        );
        assert_eq!(
            resolve_bundle_id(true, &cmp, None, Some("md")).unwrap(),
            "cmp-a.md"
        );
        assert_eq!(
            resolve_bundle_id(true, &cmp, Some("wp"), None).unwrap(),
            "cmp-a"
        );
        assert_eq!(resolve_bundle_id(true, &cmp, None, None).unwrap(), "cmp-a");
    }

    #[test]
    fn unresolvable_mode_is_an_error() {
        let cmp = per_mode("cmp-a", Encapsulation::None, &[("ios", "cmp-a.ios")]);
        assert_eq!(
            resolve_bundle_id(true, &cmp, Some("md"), None),
            Err(LoaderError::UnresolvedMode {
                tag: "cmp-a".to_string(),
                mode: "md".to_string(),
            })
        );

        let bare = ComponentMeta::builder("cmp-b").build();
        assert!(matches!(
            resolve_bundle_id(true, &bare, None, None),
            Err(LoaderError::MissingBundleIds { .. })
        ));
    }

    #[test]
    fn coalesces_concurrent_requests() {
        let cmp = single("cmp-a", "cmp-a");
        let mut loader = loader(true, vec![cmp.clone()]);
        let (calls, make) = recorder();
        let elm = HostElement::new("cmp-a", None);

        loader.load_bundle(&cmp, &elm, make("first")).unwrap();
        loader.load_bundle(&cmp, &elm, make("second")).unwrap();

        assert_eq!(loader.host().injected, vec!["/build/app/cmp-a.js"]);
        assert_eq!(loader.host().timers.len(), 1);
        assert_eq!(loader.host().timers[0].2, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(loader.pending_callbacks("cmp-a"), 2);
        assert!(calls.borrow().is_empty());

        loader.register_bundle(BundleRegistration {
            bundle_id: "cmp-a".to_string(),
            styles: Vec::new(),
        });
        loader.complete_request("/build/app/cmp-a.js", RequestOutcome::Loaded);

        assert_eq!(*calls.borrow(), vec!["first", "second"]);
        assert_eq!(loader.pending_callbacks("cmp-a"), 0);
        assert!(!loader.is_request_pending("/build/app/cmp-a.js"));
        assert_eq!(loader.host().cancelled.len(), 1);
        assert_eq!(loader.host().removed.len(), 1);
    }

    #[test]
    fn loads_element_through_registry() {
        let cmp = per_mode("cmp-a", Encapsulation::ScopedCss, &[("md", "cmp-a.md")]);
        let mut loader = loader(true, vec![cmp]);

        loader
            .load_element(&HostElement::new("cmp-a", Some("md")), || {})
            .unwrap();
        assert_eq!(loader.host().injected, vec!["/build/app/cmp-a.md.sc.js"]);
        assert_eq!(loader.pending_callbacks("cmp-a.md.sc"), 1);

        assert_eq!(
            loader.load_element(&HostElement::new("cmp-z", None), || {}),
            Err(LoaderError::UnknownComponent {
                tag: "cmp-z".to_string(),
            })
        );
        assert_eq!(loader.host().injected.len(), 1);
    }

    #[test]
    fn loaded_bundle_calls_back_synchronously() {
        let cmp = single("cmp-a", "cmp-a");
        let mut loader = loader(true, vec![cmp.clone()]);
        loader.register_bundle(BundleRegistration {
            bundle_id: "cmp-a".to_string(),
            styles: Vec::new(),
        });

        let (calls, make) = recorder();
        loader
            .load_bundle(&cmp, &HostElement::new("cmp-a", None), make("ready"))
            .unwrap();

        assert_eq!(*calls.borrow(), vec!["ready"]);
        assert!(loader.host().injected.is_empty());
    }

    #[test]
    fn failed_request_clears_state_without_callbacks() {
        let cmp = single("cmp-a", "cmp-a");
        let mut loader = loader(true, vec![cmp.clone()]);
        let (calls, make) = recorder();
        let elm = HostElement::new("cmp-a", None);

        loader.load_bundle(&cmp, &elm, make("first")).unwrap();
        loader.complete_request("/build/app/cmp-a.js", RequestOutcome::Errored);

        assert!(calls.borrow().is_empty());
        assert!(!loader.is_loaded("cmp-a"));
        assert!(!loader.is_request_pending("/build/app/cmp-a.js"));
        assert_eq!(loader.pending_callbacks("cmp-a"), 1);

        // the next load issues a fresh request
        loader.load_bundle(&cmp, &elm, make("second")).unwrap();
        assert_eq!(loader.host().injected.len(), 2);
    }

    #[test]
    fn timeout_does_not_cancel_its_own_timer() {
        let cmp = single("cmp-a", "cmp-a");
        let mut loader = loader(true, vec![cmp.clone()]);
        let (calls, make) = recorder();

        loader
            .load_bundle(&cmp, &HostElement::new("cmp-a", None), make("first"))
            .unwrap();
        loader.complete_request("/build/app/cmp-a.js", RequestOutcome::TimedOut);

        assert!(loader.host().cancelled.is_empty());
        assert_eq!(loader.host().removed.len(), 1);
        assert!(calls.borrow().is_empty());

        // a late completion for the same url is ignored
        loader.complete_request("/build/app/cmp-a.js", RequestOutcome::Loaded);
        assert_eq!(loader.host().removed.len(), 1);
    }

    #[test]
    fn scoped_request_uses_scoped_url() {
        let cmp = per_mode("cmp-a", Encapsulation::ScopedCss, &[("ios", "cmp-a.ios")]);
        let mut loader = loader(true, vec![cmp.clone()]);
        loader
            .load_bundle(&cmp, &HostElement::new("cmp-a", Some("ios")), || {})
            .unwrap();
        assert_eq!(loader.host().injected, vec!["/build/app/cmp-a.ios.sc.js"]);
    }

    #[test]
    fn shadow_styles_become_templates_first_write_wins() {
        let shadow = per_mode("cmp-a", Encapsulation::ShadowDom, &[("$", "cmp-a")]);
        let mut loader = loader(true, vec![shadow]);

        loader.register_bundle(BundleRegistration {
            bundle_id: "cmp-a".to_string(),
            styles: vec![
                ("cmp-a".to_string(), "h1{}".to_string()),
                ("cmp-a".to_string(), "h2{}".to_string()),
            ],
        });
        loader.register_bundle(BundleRegistration {
            bundle_id: "cmp-a.other".to_string(),
            styles: vec![("cmp-a".to_string(), "h3{}".to_string())],
        });

        let template = loader.clone_component_style("cmp-a").unwrap();
        assert_eq!(template.text, "h1{}h2{}");
        assert!(loader.host().styles.is_empty());
        assert_eq!(loader.clone_component_style("cmp-b"), None);
    }

    #[test]
    fn document_styles_append_once_per_bundle() {
        let plain = per_mode("cmp-a", Encapsulation::None, &[("$", "cmp-a")]);
        // without native support shadow components fall back to the document
        let shadow = per_mode("cmp-b", Encapsulation::ShadowDom, &[("$", "cmp-a")]);
        let mut loader = loader(false, vec![plain, shadow]);

        let registration = BundleRegistration {
            bundle_id: "cmp-a".to_string(),
            styles: vec![
                ("cmp-a".to_string(), "a{}".to_string()),
                ("cmp-b".to_string(), "b{}".to_string()),
                ("cmp-x".to_string(), "x{}".to_string()),
            ],
        };
        loader.register_bundle(registration.clone());
        loader.register_bundle(registration);

        assert_eq!(
            loader.host().styles,
            vec![StyleElement {
                id: "style-cmp-a".to_string(),
                text: "a{}b{}".to_string(),
            }]
        );
        assert_eq!(loader.clone_component_style("cmp-b"), None);
    }

    #[test]
    fn registration_deserializes_from_artifact_payload() {
        let registration: BundleRegistration = serde_json::from_str(
            r#"{ "bundleId": "cmp-a", "styles": [["cmp-a", "h1{}"]] }"#,
        )
        .unwrap();
        assert_eq!(
            registration.styles,
            vec![("cmp-a".to_string(), "h1{}".to_string())]
        );
    }
}
