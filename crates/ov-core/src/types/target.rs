//! Target packages and their redirect options.
//!
//! A [`Target`] is built once by the target resolver from user input plus
//! filesystem probing and is immutable afterwards.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Prefix of generated aliases (`@acme/admin-ui` becomes `~admin-ui`).
pub const ALIAS_MARKER: char = '~';

/// Directory name recognized by the default entry-redirect rule.
const DIST_DIR: &str = "dist";

/// File stem recognized by the default entry-redirect rule.
const APP_STEM: &str = "app";

/// Source entry the default rule rewrites to, relative to the package root.
const DEFAULT_ENTRY_SOURCE: &str = "src/app.tsx";

/// Derives the default alias for a package identifier.
///
/// # Examples
///
/// ```
/// use ov_core::default_alias;
///
/// assert_eq!(default_alias("@acme/admin-ui"), "~admin-ui");
/// assert_eq!(default_alias("dashboard"), "~dashboard");
/// ```
#[must_use]
pub fn default_alias(package: &str) -> String {
    let name = package.rsplit('/').next().unwrap_or(package);
    format!("{ALIAS_MARKER}{name}")
}

/// Rewrites a package's built entry file to its source entry.
///
/// `from` is matched as a suffix of the resolved entry path; `to` is relative
/// to the package root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRedirect {
    /// Suffix of the built entry path, e.g. `dist/index.mjs`.
    pub from: String,
    /// Replacement path relative to the package root, e.g. `src/index.ts`.
    pub to: String,
}

impl EntryRedirect {
    /// Returns `true` if the trailing components of `resolved` are this
    /// rule's `from` suffix.
    #[must_use]
    pub fn matches(&self, resolved: &Utf8Path) -> bool {
        let suffix = self.from.trim_start_matches("./").trim_start_matches('/');
        !suffix.is_empty() && resolved.ends_with(suffix)
    }
}

/// Redirects a stylesheet import to a source stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CssRedirect {
    /// Suffix of the imported stylesheet specifier, e.g. `dist/style.css`.
    pub from: String,
    /// Replacement path relative to the package root.
    pub to: String,
}

/// Hot-update helper options for a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HmrOptions {
    /// Optional stylesheet redirect.
    pub css_redirect: Option<CssRedirect>,
    /// Whether the redirected entry file becomes a self-accepting boundary.
    pub entry_boundary: bool,
}

/// A located package whose source files may be overridden.
///
/// # Examples
///
/// ```
/// use ov_core::Target;
/// use camino::{Utf8Path, Utf8PathBuf};
///
/// let target = Target::new(
///     "@acme/admin-ui",
///     Utf8PathBuf::from("/repo/node_modules/@acme/admin-ui"),
///     Utf8PathBuf::from("/repo/node_modules/@acme/admin-ui/src"),
/// );
/// assert_eq!(target.alias, "~admin-ui");
/// assert!(target.owns(Utf8Path::new("/repo/node_modules/@acme/admin-ui/src/App.tsx")));
/// assert!(target.is_package_specifier("@acme/admin-ui/dist/app.mjs"));
/// assert!(!target.is_package_specifier("@acme/admin-uikit"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    /// Package identifier, e.g. `@acme/admin-ui`.
    pub package: String,
    /// Real path of the installed package directory.
    pub package_root: Utf8PathBuf,
    /// Real path of the source root (package root plus source subdirectory).
    pub source_root: Utf8PathBuf,
    /// Import alias pointing at the source root.
    pub alias: String,
    /// Explicit entry-redirect rule.
    pub entry_redirect: Option<EntryRedirect>,
    /// Cached absolute path of the redirected entry file, when it exists.
    pub entry_file: Option<Utf8PathBuf>,
    /// Hot-update helper options.
    pub hmr: Option<HmrOptions>,
}

impl Target {
    /// Creates a target with the default alias and no redirect options.
    #[must_use]
    pub fn new(package: impl Into<String>, package_root: Utf8PathBuf, source_root: Utf8PathBuf) -> Self {
        let package = package.into();
        let alias = default_alias(&package);
        Self {
            package,
            package_root,
            source_root,
            alias,
            entry_redirect: None,
            entry_file: None,
            hmr: None,
        }
    }

    /// Returns `true` if `path` lies under the source root or, failing that,
    /// under the package directory.
    #[must_use]
    pub fn owns(&self, path: &Utf8Path) -> bool {
        path.starts_with(&self.source_root) || path.starts_with(&self.package_root)
    }

    /// Returns `true` if `specifier` names this package or a path inside it.
    #[must_use]
    pub fn is_package_specifier(&self, specifier: &str) -> bool {
        is_prefixed(specifier, &self.package)
    }

    /// Returns `true` if `specifier` is exactly this package or its alias,
    /// with no subpath.
    #[must_use]
    pub fn is_named_by(&self, specifier: &str) -> bool {
        specifier == self.package || specifier == self.alias
    }

    /// Returns `true` if `specifier` goes through this target's alias.
    #[must_use]
    pub fn is_alias_specifier(&self, specifier: &str) -> bool {
        is_prefixed(specifier, &self.alias)
    }

    /// Applies the explicit entry-redirect rule, then the default
    /// `<package>/dist/app.<ext>` rule, to a resolved entry path.
    ///
    /// The returned path is not checked for existence.
    #[must_use]
    pub fn redirect_entry(&self, resolved: &Utf8Path) -> Option<Utf8PathBuf> {
        if let Some(rule) = &self.entry_redirect {
            if rule.matches(resolved) {
                return Some(self.package_root.join(&rule.to));
            }
        }
        default_entry_source(resolved)
    }

    /// Returns `true` if the entry file should become a self-accepting boundary.
    #[must_use]
    pub fn is_entry_boundary(&self, path: &Utf8Path) -> bool {
        self.hmr.as_ref().is_some_and(|hmr| hmr.entry_boundary)
            && self.entry_file.as_deref() == Some(path)
    }
}

fn is_prefixed(specifier: &str, prefix: &str) -> bool {
    specifier
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn default_entry_source(resolved: &Utf8Path) -> Option<Utf8PathBuf> {
    if resolved.file_stem() != Some(APP_STEM) {
        return None;
    }
    let dist = resolved.parent()?;
    if dist.file_name() != Some(DIST_DIR) {
        return None;
    }
    Some(dist.parent()?.join(DEFAULT_ENTRY_SOURCE))
}
