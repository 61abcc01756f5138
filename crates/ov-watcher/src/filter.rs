//! File filtering for watch events.
//!
//! Filters run on the blocking watcher thread, so events that cannot matter
//! never reach the channel.
//!
//! # Design
//!
//! The [`FileFilter`] trait is a simple predicate. The override watcher
//! combines:
//!
//! - [`OverrideRootFilter`]: path lies under an override root and no segment
//!   below the root is reserved or a dependency cache
//! - [`ExtensionFilter`]: allow-listed extensions
//! - [`FileNameFilter`]: exact basenames (patch config files)
//! - [`DirectoryFilter`]: whole directories created, moved, or removed
//!
//! # Examples
//!
//! ```
//! use ov_watcher::{
//!     AnyFilter, CompositeFilter, DirectoryFilter, ExtensionFilter, FileFilter, FileNameFilter, OverrideRootFilter,
//! };
//! use camino::{Utf8Path, Utf8PathBuf};
//!
//! let filter = CompositeFilter::new()
//!     .and(OverrideRootFilter::new(vec![Utf8PathBuf::from("/app/src/overrides")]))
//!     .and(
//!         AnyFilter::new()
//!             .or(ExtensionFilter::new(&["ts", ".tsx"]))
//!             .or(FileNameFilter::new(["menu.config.json"]))
//!             .or(DirectoryFilter),
//!     );
//!
//! assert!(filter.should_process(Utf8Path::new("/app/src/overrides/Sidebar.tsx")));
//! assert!(filter.should_process(Utf8Path::new("/app/src/overrides/menu.config.json")));
//! assert!(filter.should_process(Utf8Path::new("/app/src/overrides/layout")));
//! assert!(!filter.should_process(Utf8Path::new("/app/src/overrides/_wip/Sidebar.tsx")));
//! assert!(!filter.should_process(Utf8Path::new("/app/src/overrides/notes.md")));
//! assert!(!filter.should_process(Utf8Path::new("/app/src/Sidebar.tsx")));
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use ov_scanner::is_skipped_path;
use smallvec::SmallVec;

/// A filter for determining which file events to process.
///
/// Filters must be [`Send`] and [`Sync`] because they are used from the
/// blocking watcher thread, and `'static` to be moved into the spawned task.
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if the event for `path` should be sent to the channel.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// Returns `true` if `path` is a directory, or looks like one.
///
/// A removed or renamed-away directory can no longer be inspected, so a path
/// without an extension counts as a directory.
#[must_use]
pub fn is_directory_like(path: &Utf8Path) -> bool {
    path.is_dir() || path.extension().is_none()
}

/// Accepts directories, so that moving or deleting a whole subtree reaches
/// the consumer even though no event names a file inside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryFilter;

impl FileFilter for DirectoryFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        is_directory_like(path)
    }
}

/// Accepts files with any of the given extensions.
///
/// Extensions may be written with or without the leading dot.
///
/// # Examples
///
/// ```
/// use ov_watcher::{ExtensionFilter, FileFilter};
/// use camino::Utf8Path;
///
/// let filter = ExtensionFilter::new(&[".ts", "vue"]);
/// assert!(filter.should_process(Utf8Path::new("src/app.ts")));
/// assert!(filter.should_process(Utf8Path::new("src/App.vue")));
/// assert!(!filter.should_process(Utf8Path::new("styles.css")));
/// ```
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: SmallVec<[String; 8]>,
}

impl ExtensionFilter {
    /// Creates a new extension filter.
    #[must_use]
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_owned())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }
}

impl FileFilter for ExtensionFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

/// Accepts files whose basename is one of the given names.
#[derive(Debug, Clone, Default)]
pub struct FileNameFilter {
    names: SmallVec<[String; 4]>,
}

impl FileNameFilter {
    /// Creates a filter for the given basenames.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl FileFilter for FileNameFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.names.iter().any(|n| n == name))
    }
}

/// Accepts paths under one of the override roots, rejecting any path with a
/// reserved-marker or dependency-cache segment below its root.
#[derive(Debug, Clone)]
pub struct OverrideRootFilter {
    roots: Vec<Utf8PathBuf>,
}

impl OverrideRootFilter {
    /// Creates a filter for the given roots.
    #[must_use]
    pub fn new(roots: Vec<Utf8PathBuf>) -> Self {
        Self { roots }
    }
}

impl FileFilter for OverrideRootFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        self.roots.iter().any(|root| {
            path.strip_prefix(root)
                .is_ok_and(|relative| !is_skipped_path(relative))
        })
    }
}

/// Combines filters with AND logic. An empty composite accepts everything.
pub struct CompositeFilter {
    filters: Vec<Box<dyn FileFilter>>,
}

impl CompositeFilter {
    /// Creates a new empty composite filter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Adds a filter that must also accept the path.
    #[must_use]
    pub fn and<F: FileFilter>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Default for CompositeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileFilter for CompositeFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        self.filters.iter().all(|f| f.should_process(path))
    }
}

/// Combines filters with OR logic. An empty set rejects everything.
pub struct AnyFilter {
    filters: Vec<Box<dyn FileFilter>>,
}

impl AnyFilter {
    /// Creates a new empty filter set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Adds an alternative filter.
    #[must_use]
    pub fn or<F: FileFilter>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Default for AnyFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileFilter for AnyFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        self.filters.iter().any(|f| f.should_process(path))
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}
