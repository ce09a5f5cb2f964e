//! Change-build reuse of compiled style sources.
//!
//! Entries are keyed by the exact absolute path of the style source. A file
//! that was moved or renamed is a miss even when its bytes did not change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::styles::{is_css_file, is_preprocessor_file};

/// Compiled text remembered for one style source.
///
/// Only the unscoped text is kept. Scoped text depends on the component
/// reading the source, so it is derived again on every hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedStyle {
    pub unscoped: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleSourceKind {
    Preprocessed,
    Css,
}

/// Result slot handed back by one compile task, applied after the fan-out joins.
#[derive(Debug, Clone)]
pub struct CacheUpdate {
    pub kind: StyleSourceKind,
    pub path: PathBuf,
    pub style: CachedStyle,
}

/// Source paths that changed since the previous build.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changed_files: Vec<PathBuf>,
    has_preprocessor_change: bool,
    has_css_change: bool,
}

impl ChangeSet {
    pub fn new<I, P>(changed_files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let changed_files: Vec<PathBuf> = changed_files.into_iter().map(Into::into).collect();
        let has_preprocessor_change = changed_files.iter().any(|f| is_preprocessor_file(f));
        let has_css_change = changed_files.iter().any(|f| is_css_file(f));
        Self {
            changed_files,
            has_preprocessor_change,
            has_css_change,
        }
    }

    pub fn changed_files(&self) -> &[PathBuf] {
        &self.changed_files
    }

    pub fn has_preprocessor_change(&self) -> bool {
        self.has_preprocessor_change
    }

    pub fn has_css_change(&self) -> bool {
        self.has_css_change
    }

    /// True when a changed file has the same stem as the component's module.
    ///
    /// `cmp-a.tsx` changing may mean `cmp-a.scss` needs regenerating, so the
    /// preprocessor cache is bypassed for that component.
    pub fn touches_module(&self, module_path: &Path) -> bool {
        let Some(module_stem) = module_path.file_stem() else {
            return false;
        };
        self.changed_files
            .iter()
            .any(|f| f.file_stem() == Some(module_stem))
    }
}

#[derive(Debug, Default)]
pub struct StyleCache {
    preprocessed: HashMap<PathBuf, CachedStyle>,
    css: HashMap<PathBuf, CachedStyle>,
    preprocess_count: usize,
}

impl StyleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached preprocessor output that a change build may reuse.
    pub fn reusable_preprocessed(
        &self,
        change: Option<&ChangeSet>,
        path: &Path,
        module_path: Option<&Path>,
    ) -> Option<&CachedStyle> {
        let change = change?;
        if change.has_preprocessor_change() {
            return None;
        }
        if module_path.is_some_and(|m| change.touches_module(m)) {
            return None;
        }
        self.preprocessed.get(path)
    }

    /// Cached plain css that a change build may reuse.
    pub fn reusable_css(&self, change: Option<&ChangeSet>, path: &Path) -> Option<&CachedStyle> {
        let change = change?;
        if change.has_css_change() {
            return None;
        }
        self.css.get(path)
    }

    pub fn apply(&mut self, updates: impl IntoIterator<Item = CacheUpdate>) {
        for update in updates {
            match update.kind {
                StyleSourceKind::Preprocessed => {
                    self.preprocess_count += 1;
                    self.preprocessed.insert(update.path, update.style);
                }
                StyleSourceKind::Css => {
                    self.css.insert(update.path, update.style);
                }
            }
        }
    }

    /// Number of preprocessor runs whose output was stored.
    pub fn preprocess_count(&self) -> usize {
        self.preprocess_count
    }

    pub fn len(&self) -> usize {
        self.preprocessed.len() + self.css.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(text: &str) -> CachedStyle {
        CachedStyle {
            unscoped: Some(text.to_string()),
        }
    }

    fn cache_with(kind: StyleSourceKind, path: &str, text: &str) -> StyleCache {
        let mut cache = StyleCache::new();
        cache.apply([CacheUpdate {
            kind,
            path: PathBuf::from(path),
            style: cached(text),
        }]);
        cache
    }

    #[test]
    fn full_builds_never_reuse() {
        let cache = cache_with(StyleSourceKind::Preprocessed, "/src/cmp-a.scss", "h1{}");
        assert!(cache
            .reusable_preprocessed(None, Path::new("/src/cmp-a.scss"), None)
            .is_none());
    }

    #[test]
    fn change_without_style_files_reuses_preprocessed() {
        let cache = cache_with(StyleSourceKind::Preprocessed, "/src/cmp-a.scss", "h1{}");
        let change = ChangeSet::new(["/src/other.tsx"]);
        let hit = cache.reusable_preprocessed(
            Some(&change),
            Path::new("/src/cmp-a.scss"),
            Some(Path::new("/build/cmp-a.js")),
        );
        assert_eq!(hit, Some(&cached("h1{}")));
        assert_eq!(cache.preprocess_count(), 1);
    }

    #[test]
    fn change_to_same_stem_module_bypasses_cache() {
        let cache = cache_with(StyleSourceKind::Preprocessed, "/src/cmp-a.scss", "h1{}");
        let change = ChangeSet::new(["/src/cmp-a.tsx"]);
        assert!(cache
            .reusable_preprocessed(
                Some(&change),
                Path::new("/src/cmp-a.scss"),
                Some(Path::new("/build/cmp-a.js")),
            )
            .is_none());
    }

    #[test]
    fn preprocessor_change_bypasses_cache() {
        let cache = cache_with(StyleSourceKind::Preprocessed, "/src/cmp-a.scss", "h1{}");
        let change = ChangeSet::new(["/src/theme.SCSS"]);
        assert!(change.has_preprocessor_change());
        assert!(cache
            .reusable_preprocessed(Some(&change), Path::new("/src/cmp-a.scss"), None)
            .is_none());
    }

    #[test]
    fn renamed_path_is_a_miss() {
        let cache = cache_with(StyleSourceKind::Css, "/src/cmp-a.css", "h1{}");
        let change = ChangeSet::new(["/src/cmp-a.tsx"]);
        assert!(cache
            .reusable_css(Some(&change), Path::new("/src/moved/cmp-a.css"))
            .is_none());
        assert!(cache
            .reusable_css(Some(&change), Path::new("/src/cmp-a.css"))
            .is_some());
    }

    #[test]
    fn any_css_change_bypasses_css_cache() {
        let cache = cache_with(StyleSourceKind::Css, "/src/cmp-a.css", "h1{}");
        let change = ChangeSet::new(["/src/unrelated.css"]);
        assert!(cache
            .reusable_css(Some(&change), Path::new("/src/cmp-a.css"))
            .is_none());
    }
}
