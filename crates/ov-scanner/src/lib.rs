//! Target and override tree scanning.
//!
//! This crate turns a [`Config`] into the indexes the resolution engine
//! works from. It locates target packages, indexes their sources by override
//! key, indexes the user's override trees, and checks flat overrides for
//! cross-target conflicts.
//!
//! # Overview
//!
//! The main entry point is [`Scanner`], which combines:
//!
//! - [`TargetResolver`]: Package lookup and real-path resolution
//! - [`FileWalker`]: Sorted, depth-bounded traversal via the `ignore` crate
//! - [`TargetIndexSet`]: Per-target key indexes, built in parallel with rayon
//! - [`IndexBuilder`]: Flat and namespaced override indexes
//! - [`ConflictDetector`]: Startup conflict policy
//!
//! # Example
//!
//! ```no_run
//! use ov_core::Config;
//! use ov_scanner::Scanner;
//! use camino::Utf8Path;
//!
//! let config = Config::load(Utf8Path::new("ov.config.json"))?;
//! let outcome = Scanner::new(config, Utf8Path::new(".")).scan()?;
//!
//! println!("{} targets, {} overrides", outcome.targets.len(), outcome.overrides.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! Scanner
//!     │
//!     ├── TargetResolver (node_modules lookup, canonical paths)
//!     │
//!     ├── TargetIndexSet (rayon, one TargetIndex per target)
//!     │       │
//!     │       └── FileWalker (ignore::WalkBuilder)
//!     │
//!     ├── IndexBuilder (flat + namespaced OverrideIndex)
//!     │
//!     └── ConflictDetector (error / warn / first)
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod index;
mod target;
mod walker;

pub use conflict::{Conflict, ConflictDetector};
pub use error::ScanError;
pub use index::{IndexBuilder, KeyMap, OverrideIndex, ScanOptions, TargetIndex, TargetIndexSet};
pub use target::TargetResolver;
pub use walker::{FileWalker, RESERVED_MARKER, is_skipped_name, is_skipped_path};

use camino::{Utf8Path, Utf8PathBuf};
use ov_core::{Config, Target};
use tracing::{info, warn};

/// Everything produced by an activation scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Located targets, in configured order.
    pub targets: Vec<Target>,
    /// Source indexes, one per located target.
    pub target_indexes: TargetIndexSet,
    /// Override index filtered against the target indexes.
    pub overrides: OverrideIndex,
    /// Conflicts tolerated by the configured policy.
    pub conflicts: Vec<Conflict>,
    /// Builder to rescan the override roots with the same settings.
    pub builder: IndexBuilder,
}

impl ScanOutcome {
    /// Returns `true` when no target could be located.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Runs the activation scan for one project.
#[derive(Debug, Clone)]
pub struct Scanner {
    config: Config,
    project_root: Utf8PathBuf,
}

impl Scanner {
    /// Creates a scanner for `config` anchored at `project_root`.
    #[must_use]
    pub fn new(config: Config, project_root: &Utf8Path) -> Self {
        Self {
            config,
            project_root: project_root.to_owned(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the absolute override roots, as real paths where they exist.
    ///
    /// Watcher events carry real paths, so index paths must as well.
    #[must_use]
    pub fn override_roots(&self) -> Vec<Utf8PathBuf> {
        self.config
            .overrides
            .resolve(&self.project_root)
            .into_iter()
            .map(|root| root.canonicalize_utf8().unwrap_or(root))
            .collect()
    }

    /// Locates targets, builds every index, and applies the conflict policy.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Conflict`] when a flat override matches several
    /// targets under the `error` policy.
    pub fn scan(&self) -> Result<ScanOutcome, ScanError> {
        let options = ScanOptions::from_config(&self.config);
        let targets = TargetResolver::new(&self.project_root).resolve_all(&self.config.targets);
        if targets.is_empty() {
            warn!(
                configured = self.config.targets.len(),
                "No target package could be located; overrides are inactive"
            );
        }

        let target_indexes = TargetIndexSet::build(&targets, &options);
        let builder = IndexBuilder::new(self.override_roots(), &targets, options);
        let overrides = builder.build(&target_indexes);
        let conflicts =
            ConflictDetector::new(self.config.on_conflict).check(&target_indexes, &overrides)?;

        info!(
            targets = targets.len(),
            flat = overrides.flat.len(),
            namespaced = overrides.namespaced.len(),
            "Override index built"
        );

        Ok(ScanOutcome {
            targets,
            target_indexes,
            overrides,
            conflicts,
            builder,
        })
    }
}
