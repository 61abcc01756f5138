//! Key-level differences between two override indexes.

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use ov_core::OverrideKey;
use ov_scanner::{KeyMap, OverrideIndex};
use ov_watcher::ChangeKind;
use serde::Serialize;

/// One key whose mapping differs between two indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyChange {
    /// Owning package for namespaced keys, `None` for flat ones.
    pub namespace: Option<String>,
    /// The key.
    pub key: OverrideKey,
    /// How the mapping changed.
    pub kind: ChangeKind,
    /// Override file before the change.
    pub old: Option<Utf8PathBuf>,
    /// Override file after the change.
    pub new: Option<Utf8PathBuf>,
}

impl KeyChange {
    /// Returns the override file to invalidate: the old path for deletions,
    /// the new path otherwise.
    #[must_use]
    pub fn override_path(&self) -> Option<&Utf8Path> {
        match self.kind {
            ChangeKind::Deleted => self.old.as_deref(),
            ChangeKind::Created | ChangeKind::Changed => self.new.as_deref(),
        }
    }
}

/// Every key change between two override indexes, flat keys first.
///
/// # Examples
///
/// ```
/// use ov_engine::IndexDiff;
/// use ov_core::OverrideKey;
/// use ov_scanner::OverrideIndex;
/// use ov_watcher::ChangeKind;
/// use camino::Utf8PathBuf;
///
/// let old = OverrideIndex::default();
/// let mut new = OverrideIndex::default();
/// new.flat.insert(OverrideKey::new("Sidebar").unwrap(), Utf8PathBuf::from("/o/Sidebar.tsx"));
///
/// let diff = IndexDiff::between(&old, &new);
/// assert_eq!(diff.len(), 1);
/// assert_eq!(diff.iter().next().unwrap().kind, ChangeKind::Created);
/// assert!(IndexDiff::between(&new, &new).is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IndexDiff {
    changes: Vec<KeyChange>,
}

impl IndexDiff {
    /// Compares flat mappings, then namespaced mappings package by package.
    #[must_use]
    pub fn between(old: &OverrideIndex, new: &OverrideIndex) -> Self {
        let mut changes = Vec::new();
        diff_maps(None, &old.flat, &new.flat, &mut changes);

        let empty = KeyMap::new();
        let packages: BTreeSet<&String> = old.namespaced.keys().chain(new.namespaced.keys()).collect();
        for package in packages {
            diff_maps(
                Some(package.as_str()),
                old.namespaced.get(package).unwrap_or(&empty),
                new.namespaced.get(package).unwrap_or(&empty),
                &mut changes,
            );
        }

        Self { changes }
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Iterates over the changes.
    pub fn iter(&self) -> impl Iterator<Item = &KeyChange> {
        self.changes.iter()
    }
}

fn diff_maps(namespace: Option<&str>, old: &KeyMap, new: &KeyMap, out: &mut Vec<KeyChange>) {
    let keys: BTreeSet<&OverrideKey> = old.keys().chain(new.keys()).collect();
    for key in keys {
        let before = old.get(key);
        let after = new.get(key);
        let kind = match (before, after) {
            (None, Some(_)) => ChangeKind::Created,
            (Some(_), None) => ChangeKind::Deleted,
            (Some(a), Some(b)) if a != b => ChangeKind::Changed,
            _ => continue,
        };
        out.push(KeyChange {
            namespace: namespace.map(str::to_owned),
            key: key.clone(),
            kind,
            old: before.cloned(),
            new: after.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> OverrideKey {
        OverrideKey::new(raw).unwrap()
    }

    fn index(flat: &[(&str, &str)], namespaced: &[(&str, &str, &str)]) -> OverrideIndex {
        let mut index = OverrideIndex::default();
        for (k, path) in flat {
            index.flat.insert(key(k), Utf8PathBuf::from(*path));
        }
        for (package, k, path) in namespaced {
            index
                .namespaced
                .entry((*package).to_owned())
                .or_default()
                .insert(key(k), Utf8PathBuf::from(*path));
        }
        index
    }

    #[test]
    fn test_classifies_every_kind() {
        let old = index(&[("A", "/o/A.ts"), ("B", "/o/B.ts")], &[("pkg", "C", "/o/pkg/C.ts")]);
        let new = index(&[("A", "/o/x/A.ts"), ("D", "/o/D.ts")], &[("pkg", "C", "/o/pkg/C.ts")]);

        let diff = IndexDiff::between(&old, &new);
        let summary: Vec<(&str, ChangeKind, Option<&Utf8Path>)> = diff
            .iter()
            .map(|c| (c.key.as_str(), c.kind, c.override_path()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A", ChangeKind::Changed, Some(Utf8Path::new("/o/x/A.ts"))),
                ("B", ChangeKind::Deleted, Some(Utf8Path::new("/o/B.ts"))),
                ("D", ChangeKind::Created, Some(Utf8Path::new("/o/D.ts"))),
            ]
        );
    }

    #[test]
    fn test_namespaced_changes_carry_package() {
        let old = index(&[], &[]);
        let new = index(&[], &[("@acme/admin-ui", "Sidebar", "/o/@acme/admin-ui/Sidebar.tsx")]);

        let diff = IndexDiff::between(&old, &new);
        let change = diff.iter().next().unwrap();
        assert_eq!(change.namespace.as_deref(), Some("@acme/admin-ui"));
        assert_eq!(IndexDiff::between(&new, &old).iter().next().unwrap().kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_add_then_remove_restores_index() {
        let before = index(&[("A", "/o/A.ts")], &[]);
        let added = index(&[("A", "/o/A.ts"), ("B", "/o/B.ts")], &[]);
        assert_eq!(IndexDiff::between(&before, &added).len(), 1);
        assert!(IndexDiff::between(&before, &index(&[("A", "/o/A.ts")], &[])).is_empty());
    }
}
