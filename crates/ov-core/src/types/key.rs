//! Override keys and the strategies that derive them.
//!
//! An [`OverrideKey`] is the normalized identifier used to pair a file in the
//! override tree with a file in a target package. Keys are compared
//! case-sensitively and are never empty.
//!
//! # Strategies
//!
//! | Strategy | `components/Button.tsx` | `components/Button/index.tsx` |
//! |----------|-------------------------|-------------------------------|
//! | [`MatchStrategy::Basename`] | `Button` | `Button` |
//! | [`MatchStrategy::Path`] | `components/Button` | `components/Button/index` |

use std::borrow::Borrow;
use std::fmt;

use camino::{Utf8Component, Utf8Path};
use serde::{Deserialize, Serialize};

/// File stem that stands in for its parent directory under the basename strategy.
pub const INDEX_STEM: &str = "index";

/// How an override key is derived from a file path.
///
/// # Examples
///
/// ```
/// use ov_core::MatchStrategy;
/// use camino::Utf8Path;
///
/// let key = MatchStrategy::Basename.derive(Utf8Path::new("menu/index.tsx"));
/// assert_eq!(key.unwrap().as_str(), "menu");
///
/// let key = MatchStrategy::Path.derive(Utf8Path::new("layout/Header.vue"));
/// assert_eq!(key.unwrap().as_str(), "layout/Header");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// File name without extension; `index` files take their directory's name.
    #[default]
    Basename,
    /// Path relative to the scan root, extension stripped.
    Path,
}

impl MatchStrategy {
    /// Derives the key for `relative`, a file path relative to its scan root.
    ///
    /// Returns `None` when the path has no usable file stem.
    #[must_use]
    pub fn derive(self, relative: &Utf8Path) -> Option<OverrideKey> {
        match self {
            Self::Basename => basename_key(relative),
            Self::Path => path_key(relative),
        }
    }
}

fn basename_key(relative: &Utf8Path) -> Option<OverrideKey> {
    let stem = relative.file_stem()?;
    if stem != INDEX_STEM {
        return OverrideKey::new(stem);
    }
    // A root-level index file has no directory to borrow a name from.
    match relative.parent().and_then(Utf8Path::file_name) {
        Some(dir) => OverrideKey::new(dir),
        None => OverrideKey::new(INDEX_STEM),
    }
}

fn path_key(relative: &Utf8Path) -> Option<OverrideKey> {
    let stem = relative.file_stem()?;
    let mut key = String::with_capacity(relative.as_str().len());
    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            if let Utf8Component::Normal(segment) = component {
                key.push_str(segment);
                key.push('/');
            }
        }
    }
    key.push_str(stem);
    OverrideKey::new(key)
}

/// A normalized, non-empty identifier pairing override files with target files.
///
/// Implements [`Borrow<str>`] so maps keyed by `OverrideKey` can be queried
/// with plain string slices.
///
/// # Examples
///
/// ```
/// use ov_core::OverrideKey;
///
/// assert!(OverrideKey::new("").is_none());
///
/// let key = OverrideKey::new("Sidebar").unwrap();
/// assert_eq!(key.to_string(), "Sidebar");
/// assert!(!key.is_index());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideKey(String);

impl OverrideKey {
    /// Creates a key, rejecting empty input.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() { None } else { Some(Self(raw)) }
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the literal `index` key, which is never stored.
    #[inline]
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.0 == INDEX_STEM
    }
}

impl Borrow<str> for OverrideKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for OverrideKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverrideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Returns the extension-stripped basename of an import specifier.
///
/// Query strings and fragments are ignored. Returns `None` for specifiers
/// that end in a separator or have no name at all.
///
/// # Examples
///
/// ```
/// use ov_core::specifier_stem;
///
/// assert_eq!(specifier_stem("./components/Sidebar.vue"), Some("Sidebar"));
/// assert_eq!(specifier_stem("../menu?raw"), Some("menu"));
/// assert_eq!(specifier_stem("./"), None);
/// ```
#[must_use]
pub fn specifier_stem(specifier: &str) -> Option<&str> {
    let bare = specifier
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or(specifier);
    let last = bare.rsplit('/').next().unwrap_or(bare);
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Utf8Path::new(last).file_stem().filter(|stem| !stem.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basename(path: &str) -> Option<String> {
        MatchStrategy::Basename
            .derive(Utf8Path::new(path))
            .map(|k| k.as_str().to_owned())
    }

    fn by_path(path: &str) -> Option<String> {
        MatchStrategy::Path
            .derive(Utf8Path::new(path))
            .map(|k| k.as_str().to_owned())
    }

    #[test]
    fn test_basename_strips_extension() {
        assert_eq!(basename("Button.tsx").as_deref(), Some("Button"));
        assert_eq!(basename("deep/nested/Button.vue").as_deref(), Some("Button"));
    }

    #[test]
    fn test_basename_index_takes_directory_name() {
        assert_eq!(basename("foo/index.ts").as_deref(), Some("foo"));
        assert_eq!(basename("a/b/foo/index.tsx").as_deref(), Some("foo"));
    }

    #[test]
    fn test_basename_root_index_stays_index() {
        let key = MatchStrategy::Basename.derive(Utf8Path::new("index.ts"));
        assert!(key.is_some_and(|k| k.is_index()));
    }

    #[test]
    fn test_path_strategy_keeps_directories() {
        assert_eq!(by_path("layout/Header.vue").as_deref(), Some("layout/Header"));
        assert_eq!(by_path("Header.vue").as_deref(), Some("Header"));
        assert_eq!(by_path("menu/index.ts").as_deref(), Some("menu/index"));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let lower = OverrideKey::new("button");
        let upper = OverrideKey::new("Button");
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_specifier_stem() {
        assert_eq!(specifier_stem("./Sidebar"), Some("Sidebar"));
        assert_eq!(specifier_stem("@/layout/Menu.tsx"), Some("Menu"));
        assert_eq!(specifier_stem("./index"), Some("index"));
        assert_eq!(specifier_stem("lodash"), Some("lodash"));
        assert_eq!(specifier_stem(".."), None);
        assert_eq!(specifier_stem(""), None);
    }
}
