//! Shared resolver state.
//!
//! The override index is the only mutable state in a session. It lives in an
//! [`ArcSwap`] and is replaced as a whole: readers call
//! [`SharedState::snapshot`] once at the start of an operation and keep
//! working from that snapshot, so a concurrent rebuild is observed either
//! entirely or not at all.
//!
//! Everything else (targets, their source indexes, the scan settings) is
//! fixed at activation and kept in [`Session`].

use std::sync::Arc;

use arc_swap::ArcSwap;
use camino::{Utf8Path, Utf8PathBuf};
use ov_core::{MatchStrategy, OverrideKey, Target};
use ov_scanner::{IndexBuilder, OverrideIndex, ScanOutcome, TargetIndexSet};
use smallvec::SmallVec;

/// Immutable facts established at activation.
#[derive(Debug)]
pub struct Session {
    /// Located targets, in configured order.
    pub targets: Vec<Target>,
    /// Source indexes, one per target.
    pub target_indexes: TargetIndexSet,
    /// Builder used for every override rescan.
    pub builder: IndexBuilder,
}

impl Session {
    /// Returns the active match strategy.
    #[must_use]
    pub fn strategy(&self) -> MatchStrategy {
        self.builder.options().strategy
    }

    /// Returns the override roots.
    #[must_use]
    pub fn override_roots(&self) -> &[Utf8PathBuf] {
        self.builder.roots()
    }

    /// Returns the target owning `path`, preferring source-root matches.
    #[must_use]
    pub fn owner_of(&self, path: &Utf8Path) -> Option<&Target> {
        self.targets
            .iter()
            .find(|t| path.starts_with(&t.source_root))
            .or_else(|| self.targets.iter().find(|t| t.owns(path)))
    }

    /// Returns the target whose package (or alias) `specifier` names.
    #[must_use]
    pub fn target_for_specifier(&self, specifier: &str) -> Option<&Target> {
        self.targets
            .iter()
            .find(|t| t.is_package_specifier(specifier) || t.is_alias_specifier(specifier))
    }

    /// Returns `true` if `specifier` is exactly a target's package or alias.
    #[must_use]
    pub fn names_target(&self, specifier: &str) -> bool {
        self.targets.iter().any(|t| t.is_named_by(specifier))
    }

    /// Returns `true` if `path` lies under an override root.
    #[must_use]
    pub fn is_override_path(&self, path: &Utf8Path) -> bool {
        self.override_roots().iter().any(|root| path.starts_with(root))
    }

    /// Returns the target source files an override for `key` replaces.
    ///
    /// A namespaced override replaces its own target's file; a flat override
    /// replaces the file in every target containing the key.
    #[must_use]
    pub fn replaced_files(&self, namespace: Option<&str>, key: &OverrideKey) -> SmallVec<[Utf8PathBuf; 2]> {
        match namespace {
            Some(package) => self
                .target_indexes
                .for_package(package)
                .and_then(|index| index.get(key.as_str()))
                .cloned()
                .into_iter()
                .collect(),
            None => self
                .target_indexes
                .containing(key.as_str())
                .filter_map(|index| index.get(key.as_str()).cloned())
                .collect(),
        }
    }
}

/// One published version of the override index.
#[derive(Debug, Default)]
pub struct ResolverState {
    /// The override mappings.
    pub overrides: OverrideIndex,
    /// Incremented on every replacement.
    pub generation: u64,
}

/// The session plus the swappable resolver state.
///
/// # Examples
///
/// ```
/// use ov_engine::{Session, SharedState};
/// use ov_scanner::{IndexBuilder, OverrideIndex, ScanOptions, TargetIndexSet};
///
/// let session = Session {
///     targets: Vec::new(),
///     target_indexes: TargetIndexSet::default(),
///     builder: IndexBuilder::new(Vec::new(), &[], ScanOptions::from_config(&Default::default())),
/// };
/// let state = SharedState::new(session, OverrideIndex::default());
///
/// let before = state.snapshot();
/// let old = state.replace(OverrideIndex::default());
/// assert_eq!(old.generation, before.generation);
/// assert_eq!(state.snapshot().generation, before.generation + 1);
/// ```
#[derive(Debug)]
pub struct SharedState {
    session: Session,
    current: ArcSwap<ResolverState>,
}

impl SharedState {
    /// Creates state with an initial override index.
    #[must_use]
    pub fn new(session: Session, overrides: OverrideIndex) -> Self {
        Self {
            session,
            current: ArcSwap::from_pointee(ResolverState {
                overrides,
                generation: 0,
            }),
        }
    }

    /// Creates state from an activation scan.
    #[must_use]
    pub fn from_outcome(outcome: ScanOutcome) -> Self {
        let session = Session {
            targets: outcome.targets,
            target_indexes: outcome.target_indexes,
            builder: outcome.builder,
        };
        Self::new(session, outcome.overrides)
    }

    /// Returns the immutable session facts.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the current resolver state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ResolverState> {
        self.current.load_full()
    }

    /// Publishes a new override index, returning the replaced state.
    ///
    /// Replacement only happens from the invalidation engine's task, so the
    /// generation read here is never stale.
    pub fn replace(&self, overrides: OverrideIndex) -> Arc<ResolverState> {
        let generation = self.current.load().generation + 1;
        self.current.swap(Arc::new(ResolverState {
            overrides,
            generation,
        }))
    }

    /// Rescans the override roots against the fixed target indexes.
    #[must_use]
    pub fn rebuild(&self) -> OverrideIndex {
        self.session.builder.build(&self.session.target_indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ov_core::Config;
    use ov_scanner::ScanOptions;

    fn session(targets: Vec<Target>) -> Session {
        let options = ScanOptions::from_config(&Config::default());
        Session {
            target_indexes: TargetIndexSet::build(&targets, &options),
            builder: IndexBuilder::new(vec![Utf8PathBuf::from("/app/src/overrides")], &targets, options),
            targets,
        }
    }

    fn target(package: &str, root: &str) -> Target {
        Target::new(package, Utf8PathBuf::from(root), Utf8PathBuf::from(format!("{root}/src")))
    }

    #[test]
    fn test_owner_prefers_source_root() {
        let session = session(vec![
            target("outer", "/nm/outer"),
            target("inner", "/nm/outer/src/vendor/inner"),
        ]);
        let owner = session.owner_of(Utf8Path::new("/nm/outer/src/vendor/inner/src/A.ts"));
        assert_eq!(owner.map(|t| t.package.as_str()), Some("outer"));

        let owner = session.owner_of(Utf8Path::new("/nm/outer/lib/B.ts"));
        assert_eq!(owner.map(|t| t.package.as_str()), Some("outer"));
        assert!(session.owner_of(Utf8Path::new("/elsewhere/C.ts")).is_none());
    }

    #[test]
    fn test_target_for_specifier() {
        let session = session(vec![target("@acme/admin-ui", "/nm/@acme/admin-ui")]);
        assert!(session.target_for_specifier("@acme/admin-ui/dist/app.mjs").is_some());
        assert!(session.target_for_specifier("~admin-ui/layout").is_some());
        assert!(session.target_for_specifier("./admin-ui").is_none());
    }

    #[test]
    fn test_replace_is_whole_and_versioned() {
        let state = SharedState::new(session(Vec::new()), OverrideIndex::default());
        let reader = state.snapshot();

        let mut next = OverrideIndex::default();
        next.flat.insert(OverrideKey::new("A").unwrap(), Utf8PathBuf::from("/o/A.ts"));
        state.replace(next);

        assert!(reader.overrides.is_empty());
        assert_eq!(state.snapshot().overrides.len(), 1);
        assert_eq!(state.snapshot().generation, 1);
    }
}
