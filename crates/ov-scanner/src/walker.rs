//! Directory traversal for target and override trees.
//!
//! This module provides [`FileWalker`], which uses the `ignore` crate's
//! iterative walker to collect files under a root directory.
//!
//! # Rules
//!
//! - Only files whose extension is in the allow-set are collected (an empty
//!   allow-set accepts every file)
//! - Any entry whose name begins with [`RESERVED_MARKER`] is skipped, and a
//!   skipped directory is never descended into
//! - Dependency-cache directories (`node_modules`, `.git`, `.vite`) are skipped
//! - Entries are visited in lexicographic order, so results are stable
//! - Recursion stops at the maximum depth; deeper subtrees are silently
//!   truncated
//!
//! # Examples
//!
//! ```no_run
//! use ov_scanner::FileWalker;
//! use camino::Utf8Path;
//!
//! let walker = FileWalker::new(Utf8Path::new("./src/overrides"))?
//!     .with_extensions(&["ts", "tsx"])
//!     .with_max_depth(4);
//!
//! for path in walker.collect_paths() {
//!     println!("Found: {path}");
//! }
//! # Ok::<(), ov_scanner::ScanError>(())
//! ```

use std::ffi::OsStr;

use camino::{Utf8Path, Utf8PathBuf};
use ignore::{DirEntry, WalkBuilder};
use ov_core::DEFAULT_MAX_DEPTH;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::error::ScanError;

/// Names beginning with this character are ignored entirely.
pub const RESERVED_MARKER: char = '_';

/// Dependency-cache directories that are never scanned.
const SKIP_DIRECTORIES: &[&str] = &["node_modules", ".git", ".vite"];

/// A file walker that collects allow-listed files in a directory tree.
#[derive(Debug, Clone)]
pub struct FileWalker {
    /// The root directory to walk.
    root: Utf8PathBuf,
    /// Accepted extensions, without the leading dot. Empty accepts all.
    extensions: SmallVec<[String; 8]>,
    /// Maximum recursion depth below the root.
    max_depth: usize,
}

impl FileWalker {
    /// Creates a new file walker for the given root directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if the root path doesn't exist or
    /// isn't a directory.
    pub fn new(root: &Utf8Path) -> Result<Self, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::config(format!(
                "root path is not a directory: {root}"
            )));
        }

        Ok(Self {
            root: root.to_owned(),
            extensions: SmallVec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        })
    }

    /// Restricts collection to the given extensions (leading dots are ignored).
    #[must_use]
    pub fn with_extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        self.extensions = extensions
            .iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_owned())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    /// Sets the maximum recursion depth (files directly under the root are
    /// at depth 1).
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Collects every matching file path in sorted walk order.
    ///
    /// Entries that cannot be read, and non-UTF-8 paths, are logged and
    /// skipped.
    pub fn collect_paths(&self) -> Vec<Utf8PathBuf> {
        let mut paths = Vec::new();

        for result in self.build_walker() {
            let entry = match result {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(root = %self.root, error = %error, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let Some(path) = Utf8Path::from_path(entry.path()) else {
                let err = ScanError::NonUtf8Path(entry.path().to_owned());
                warn!(error = %err, "Skipping entry");
                continue;
            };

            if !self.has_allowed_extension(path) {
                trace!(path = %path, "Extension not allowed");
                continue;
            }

            paths.push(path.to_owned());
        }

        paths
    }

    /// Builds the ignore walker with configured settings.
    fn build_walker(&self) -> ignore::Walk {
        WalkBuilder::new(&self.root)
            // Overrides are often gitignored scratch files; scan them anyway
            .standard_filters(false)
            // Linked workspace packages are common in target trees
            .follow_links(true)
            .max_depth(Some(self.max_depth))
            .sort_by_file_name(OsStr::cmp)
            .filter_entry(is_walkable)
            .build()
    }

    /// Checks whether a path carries an allowed extension.
    fn has_allowed_extension(&self, path: &Utf8Path) -> bool {
        self.extensions.is_empty()
            || path
                .extension()
                .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    /// Returns the root directory being walked.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

/// Entry predicate: the root is always walked, everything else by name.
fn is_walkable(entry: &DirEntry) -> bool {
    entry.depth() == 0 || entry.file_name().to_str().is_none_or(|name| !is_skipped_name(name))
}

/// Returns `true` for reserved-marker names and dependency-cache directories.
#[must_use]
pub fn is_skipped_name(name: &str) -> bool {
    name.starts_with(RESERVED_MARKER) || SKIP_DIRECTORIES.contains(&name)
}

/// Returns `true` if any segment of `relative` would be skipped by the walker.
///
/// Used by the watcher path, which sees raw filesystem events rather than
/// walker output.
#[must_use]
pub fn is_skipped_path(relative: &Utf8Path) -> bool {
    relative.components().any(|c| is_skipped_name(c.as_str()))
}
