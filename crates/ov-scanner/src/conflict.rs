//! Startup check for flat overrides that match several targets.

use ov_core::{ConflictPolicy, OverrideKey};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::index::{OverrideIndex, TargetIndexSet};

/// A flat key present in more than one target's sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// The colliding key.
    pub key: OverrideKey,
    /// Every target containing the key, in configured order.
    pub targets: Vec<String>,
}

impl Conflict {
    /// Returns the target whose file the flat override replaces.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.targets.first().map(String::as_str)
    }
}

impl From<Conflict> for ScanError {
    fn from(conflict: Conflict) -> Self {
        Self::Conflict {
            key: conflict.key,
            targets: conflict.targets,
        }
    }
}

/// Applies a [`ConflictPolicy`] to the flat overrides of a session.
///
/// The check only runs with two or more targets and at least one flat key.
/// Target sources are assumed static, so it runs once at activation.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    policy: ConflictPolicy,
}

impl ConflictDetector {
    /// Creates a detector for `policy`.
    #[must_use]
    pub const fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Finds every conflicting flat key.
    #[must_use]
    pub fn find(targets: &TargetIndexSet, overrides: &OverrideIndex) -> Vec<Conflict> {
        if targets.len() < 2 || overrides.flat.is_empty() {
            return Vec::new();
        }

        overrides
            .flat
            .keys()
            .filter_map(|key| {
                let owners: Vec<String> = targets
                    .containing(key.as_str())
                    .map(|index| index.package.clone())
                    .collect();
                (owners.len() > 1).then(|| Conflict {
                    key: key.clone(),
                    targets: owners,
                })
            })
            .collect()
    }

    /// Runs the check and applies the policy.
    ///
    /// Returns the conflicts found when the policy lets activation proceed.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Conflict`] for the first conflicting key under
    /// [`ConflictPolicy::Error`].
    pub fn check(
        &self,
        targets: &TargetIndexSet,
        overrides: &OverrideIndex,
    ) -> Result<Vec<Conflict>, ScanError> {
        let conflicts = Self::find(targets, overrides);

        if self.policy.is_fatal() {
            if let Some(conflict) = conflicts.into_iter().next() {
                return Err(conflict.into());
            }
            return Ok(Vec::new());
        }

        for conflict in &conflicts {
            let selected = conflict.selected().unwrap_or_default();
            if self.policy.should_warn() {
                warn!(
                    key = %conflict.key,
                    targets = %conflict.targets.join(", "),
                    selected,
                    "Override matches files in several targets; use a namespaced directory to disambiguate"
                );
            } else {
                debug!(key = %conflict.key, selected, "Conflicting override resolved to first target");
            }
        }

        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexBuilder, ScanOptions};
    use camino::Utf8PathBuf;
    use ov_core::{Config, Target};
    use std::fs;
    use tempfile::TempDir;

    struct Session {
        _dir: TempDir,
        targets: TargetIndexSet,
        overrides: OverrideIndex,
    }

    /// Two targets both containing `Sidebar`, one flat override for it.
    fn session(extra_override: Option<&str>) -> Session {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().unwrap()).unwrap();
        let write = |relative: &str| {
            let path = root.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "export default 1").unwrap();
        };
        write("pkgs/admin/src/layout/Sidebar.tsx");
        write("pkgs/portal/src/Sidebar.tsx");
        write("pkgs/portal/src/Footer.tsx");
        write("overrides/Sidebar.tsx");
        if let Some(extra) = extra_override {
            write(extra);
        }

        let targets = [
            Target::new("admin", root.join("pkgs/admin"), root.join("pkgs/admin/src")),
            Target::new("portal", root.join("pkgs/portal"), root.join("pkgs/portal/src")),
        ];
        let options = ScanOptions::from_config(&Config::default());
        let set = TargetIndexSet::build(&targets, &options);
        let overrides =
            IndexBuilder::new(vec![root.join("overrides")], &targets, options).build(&set);

        Session {
            _dir: dir,
            targets: set,
            overrides,
        }
    }

    #[test]
    fn test_error_policy_aborts() {
        let s = session(None);
        let err = ConflictDetector::new(ConflictPolicy::Error)
            .check(&s.targets, &s.overrides)
            .unwrap_err();
        match err {
            ScanError::Conflict { key, targets } => {
                assert_eq!(key.as_str(), "Sidebar");
                assert_eq!(targets, vec!["admin", "portal"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_warn_and_first_select_same_target_every_run() {
        for policy in [ConflictPolicy::Warn, ConflictPolicy::First] {
            for _ in 0..3 {
                let s = session(None);
                let conflicts = ConflictDetector::new(policy)
                    .check(&s.targets, &s.overrides)
                    .unwrap();
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].selected(), Some("admin"));
            }
        }
    }

    #[test]
    fn test_unique_keys_do_not_conflict() {
        let s = session(Some("overrides/Footer.tsx"));
        let conflicts = ConflictDetector::find(&s.targets, &s.overrides);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key.as_str(), "Sidebar");
    }

    #[test]
    fn test_namespaced_override_avoids_conflict() {
        let mut s = session(Some("overrides/portal/Footer.tsx"));
        s.overrides.flat.clear();
        assert!(
            ConflictDetector::new(ConflictPolicy::Error)
                .check(&s.targets, &s.overrides)
                .unwrap()
                .is_empty()
        );
    }
}
