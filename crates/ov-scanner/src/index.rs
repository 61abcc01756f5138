//! Key-to-file indexes for target packages and override trees.
//!
//! Two kinds of index are built here:
//!
//! - [`TargetIndex`]: one per target, mapping keys to the package's own
//!   source files. Built once (in parallel across targets) and never updated.
//! - [`OverrideIndex`]: the user's override files, split into a flat mapping
//!   that applies to every target and namespaced mappings that apply to one.
//!   Rebuilt wholesale by [`IndexBuilder`] on every override-tree change.

use std::collections::BTreeMap;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use ov_core::{Config, MatchStrategy, OverrideKey, Target};
use rayon::prelude::*;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::walker::FileWalker;

/// Key-to-path mapping with deterministic iteration order.
pub type KeyMap = BTreeMap<OverrideKey, Utf8PathBuf>;

/// Settings shared by every tree scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Key derivation strategy.
    pub strategy: MatchStrategy,
    /// Allow-listed extensions without leading dots.
    pub extensions: SmallVec<[String; 8]>,
    /// Maximum recursion depth.
    pub max_depth: usize,
}

impl ScanOptions {
    /// Extracts the scan settings from a configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            strategy: config.match_strategy,
            extensions: config.normalized_extensions(),
            max_depth: config.max_depth,
        }
    }

    /// Walks `root` and returns `(relative path, absolute path)` pairs in
    /// sorted order. A missing root yields nothing.
    fn collect(&self, root: &Utf8Path) -> Vec<(Utf8PathBuf, Utf8PathBuf)> {
        let walker = match FileWalker::new(root) {
            Ok(walker) => walker
                .with_extensions(self.extensions.as_slice())
                .with_max_depth(self.max_depth),
            Err(error) => {
                debug!(root = %root, error = %error, "Skipping scan root");
                return Vec::new();
            }
        };

        walker
            .collect_paths()
            .into_iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(root).ok()?.to_owned();
                Some((relative, path))
            })
            .collect()
    }
}

/// Inserts `key -> path` unless the key is already taken, keeping the first.
fn insert_first(map: &mut KeyMap, key: OverrideKey, path: Utf8PathBuf) {
    if let Some(existing) = map.get(&key) {
        debug!(key = %key, kept = %existing, ignored = %path, "Duplicate key");
        return;
    }
    map.insert(key, path);
}

/// The source files of one target, keyed by override key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetIndex {
    /// Package identifier of the owning target.
    pub package: String,
    /// Root the keys were derived from.
    pub source_root: Utf8PathBuf,
    /// Key to first source file producing it.
    pub files: KeyMap,
    /// Every collected file, including those shadowed by a duplicate key.
    #[serde(skip)]
    pub all_files: Vec<Utf8PathBuf>,
}

impl TargetIndex {
    /// Scans a target's source root.
    #[must_use]
    pub fn build(target: &Target, options: &ScanOptions) -> Self {
        let mut files = KeyMap::new();
        let mut all_files = Vec::new();

        for (relative, path) in options.collect(&target.source_root) {
            if let Some(key) = options.strategy.derive(&relative) {
                insert_first(&mut files, key, path.clone());
            }
            all_files.push(path);
        }

        debug!(
            package = %target.package,
            keys = files.len(),
            files = all_files.len(),
            "Indexed target sources"
        );

        Self {
            package: target.package.clone(),
            source_root: target.source_root.clone(),
            files,
            all_files,
        }
    }

    /// Returns the source file for `key`.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Utf8PathBuf> {
        self.files.get(key)
    }

    /// Returns `true` if some source file produces `key`.
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }
}

/// The target indexes of a session, in configured target order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TargetIndexSet {
    indexes: Vec<TargetIndex>,
}

impl TargetIndexSet {
    /// Builds one index per target, scanning targets in parallel.
    #[must_use]
    pub fn build(targets: &[Target], options: &ScanOptions) -> Self {
        let indexes = targets
            .par_iter()
            .map(|target| TargetIndex::build(target, options))
            .collect();
        Self { indexes }
    }

    /// Returns the number of targets.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Returns `true` when no target was indexed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Iterates over the indexes in configured order.
    pub fn iter(&self) -> impl Iterator<Item = &TargetIndex> {
        self.indexes.iter()
    }

    /// Returns the index for a package identifier.
    #[must_use]
    pub fn for_package(&self, package: &str) -> Option<&TargetIndex> {
        self.indexes.iter().find(|index| index.package == package)
    }

    /// Returns every index containing `key`, in configured order.
    pub fn containing<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a TargetIndex> + 'a {
        self.indexes.iter().filter(move |index| index.contains_key(key))
    }

    /// Returns the first index, in configured order, containing `key`.
    #[must_use]
    pub fn first_containing(&self, key: &str) -> Option<&TargetIndex> {
        self.indexes.iter().find(|index| index.contains_key(key))
    }

    /// Returns `true` if any target contains `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.first_containing(key).is_some()
    }
}

/// The user's override files.
///
/// Namespaced entries take precedence over flat entries for their target.
///
/// # Examples
///
/// ```
/// use ov_core::OverrideKey;
/// use ov_scanner::OverrideIndex;
/// use camino::Utf8PathBuf;
///
/// let key = OverrideKey::new("Sidebar").unwrap();
/// let mut index = OverrideIndex::default();
/// index.flat.insert(key.clone(), Utf8PathBuf::from("/o/Sidebar.tsx"));
/// index
///     .namespaced
///     .entry("@acme/admin-ui".to_owned())
///     .or_default()
///     .insert(key, Utf8PathBuf::from("/o/@acme/admin-ui/Sidebar.tsx"));
///
/// assert_eq!(index.lookup("@acme/admin-ui", "Sidebar").unwrap().as_str(), "/o/@acme/admin-ui/Sidebar.tsx");
/// assert_eq!(index.lookup("@acme/portal", "Sidebar").unwrap().as_str(), "/o/Sidebar.tsx");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverrideIndex {
    /// Overrides applying to every target.
    pub flat: KeyMap,
    /// Overrides scoped to one target, keyed by package identifier.
    pub namespaced: BTreeMap<String, KeyMap>,
}

impl OverrideIndex {
    /// Looks up the override for `key` as seen from `package`.
    #[must_use]
    pub fn lookup(&self, package: &str, key: &str) -> Option<&Utf8PathBuf> {
        self.namespaced
            .get(package)
            .and_then(|map| map.get(key))
            .or_else(|| self.flat.get(key))
    }

    /// Returns the total number of override entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flat.len() + self.namespaced.values().map(BTreeMap::len).sum::<usize>()
    }

    /// Returns `true` when no override exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the entry whose override file is `path`.
    ///
    /// Returns the owning package for namespaced entries, `None` for flat ones.
    #[must_use]
    pub fn find_path(&self, path: &Utf8Path) -> Option<(Option<&str>, &OverrideKey)> {
        let flat = self
            .flat
            .iter()
            .find(|(_, file)| file.as_path() == path)
            .map(|(key, _)| (None, key));

        flat.or_else(|| {
            self.namespaced.iter().find_map(|(package, map)| {
                map.iter()
                    .find(|(_, file)| file.as_path() == path)
                    .map(|(key, _)| (Some(package.as_str()), key))
            })
        })
    }
}

/// Builds [`OverrideIndex`]es from the override roots.
///
/// # Examples
///
/// ```no_run
/// use ov_core::Config;
/// use ov_scanner::{IndexBuilder, ScanOptions, TargetIndexSet};
/// use camino::Utf8PathBuf;
///
/// let config = Config::default();
/// let builder = IndexBuilder::new(
///     vec![Utf8PathBuf::from("/repo/src/overrides")],
///     &[],
///     ScanOptions::from_config(&config),
/// );
/// let overrides = builder.build(&TargetIndexSet::default());
/// assert!(overrides.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    roots: Vec<Utf8PathBuf>,
    packages: Vec<String>,
    options: ScanOptions,
}

impl IndexBuilder {
    /// Creates a builder over `roots` that recognizes namespaces for `targets`.
    #[must_use]
    pub fn new(roots: Vec<Utf8PathBuf>, targets: &[Target], options: ScanOptions) -> Self {
        Self {
            roots,
            packages: targets.iter().map(|t| t.package.clone()).collect(),
            options,
        }
    }

    /// Returns the override roots in scan order.
    #[must_use]
    pub fn roots(&self) -> &[Utf8PathBuf] {
        &self.roots
    }

    /// Returns the scan settings.
    #[must_use]
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scans every override root without filtering against targets.
    #[must_use]
    pub fn scan(&self) -> OverrideIndex {
        let mut index = OverrideIndex::default();

        for root in &self.roots {
            for (relative, path) in self.options.collect(root) {
                let Some((namespace, key)) = self.classify(&relative) else {
                    continue;
                };
                match namespace {
                    Some(package) => {
                        let map = index.namespaced.entry(package.to_owned()).or_default();
                        insert_first(map, key, path);
                    }
                    None => insert_first(&mut index.flat, key, path),
                }
            }
        }

        index
    }

    /// Scans the override roots and drops flat keys no target contains.
    #[must_use]
    pub fn build(&self, targets: &TargetIndexSet) -> OverrideIndex {
        let mut index = self.scan();
        index.flat.retain(|key, path| {
            let known = targets.contains_key(key.as_str());
            if !known {
                warn!(key = %key, path = %path, "Override matches no target file, ignoring");
            }
            known
        });
        index
    }

    /// Splits a relative override path into its namespace and key.
    ///
    /// Returns `None` for `index` keys, which cannot be overridden at the
    /// top of a scope.
    #[must_use]
    pub fn classify<'a>(&'a self, relative: &Utf8Path) -> Option<(Option<&'a str>, OverrideKey)> {
        let (namespace, inner) = match self.namespace_of(relative) {
            Some((package, inner)) => (Some(package), inner),
            None => (None, relative.to_owned()),
        };
        let key = self.options.strategy.derive(&inner)?;
        if key.is_index() {
            debug!(path = %relative, "Dropping top-level index override");
            return None;
        }
        Some((namespace, key))
    }

    /// Matches the leading `@scope/name` or `name` segment against the
    /// configured packages.
    fn namespace_of(&self, relative: &Utf8Path) -> Option<(&str, Utf8PathBuf)> {
        let segments: SmallVec<[&str; 8]> = relative
            .components()
            .filter_map(|c| match c {
                Utf8Component::Normal(segment) => Some(segment),
                _ => None,
            })
            .collect();

        let (candidate, consumed) = match segments.as_slice() {
            [scope, name, _, ..] if scope.starts_with('@') => (format!("{scope}/{name}"), 2),
            [name, _, ..] => ((*name).to_owned(), 1),
            _ => return None,
        };

        let package = self.packages.iter().find(|p| **p == candidate)?;
        let inner: Utf8PathBuf = segments[consumed..].iter().collect();
        Some((package.as_str(), inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: Utf8PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().unwrap()).unwrap();
            Self { _dir: dir, root }
        }

        fn touch(&self, relative: &str) -> Utf8PathBuf {
            let path = self.root.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "export default 1").unwrap();
            path
        }

        fn remove(&self, relative: &str) {
            fs::remove_file(self.root.join(relative)).unwrap();
        }

        fn target(&self, package: &str) -> Target {
            let package_root = self.root.join("node_modules").join(package);
            Target::new(package, package_root.clone(), package_root.join("src"))
        }
    }

    fn options() -> ScanOptions {
        ScanOptions::from_config(&Config::default())
    }

    fn keys(map: &KeyMap) -> Vec<&str> {
        map.keys().map(OverrideKey::as_str).collect()
    }

    #[test]
    fn test_index_file_produces_directory_key() {
        let fx = Fixture::new();
        fx.touch("node_modules/ui/src/menu/index.tsx");
        fx.touch("node_modules/ui/src/a/b/foo/index.ts");
        fx.touch("node_modules/ui/src/Button.vue");

        let index = TargetIndex::build(&fx.target("ui"), &options());
        assert_eq!(keys(&index.files), vec!["Button", "foo", "menu"]);
    }

    #[test]
    fn test_duplicate_keys_keep_first_in_sorted_order() {
        let fx = Fixture::new();
        let first = fx.touch("node_modules/ui/src/a/Button.tsx");
        fx.touch("node_modules/ui/src/b/Button.tsx");

        let index = TargetIndex::build(&fx.target("ui"), &options());
        assert_eq!(index.get("Button"), Some(&first));
        assert_eq!(index.all_files.len(), 2);
    }

    #[test]
    fn test_target_set_preserves_configured_order() {
        let fx = Fixture::new();
        fx.touch("node_modules/b-pkg/src/Shared.ts");
        fx.touch("node_modules/a-pkg/src/Shared.ts");

        let targets = [fx.target("b-pkg"), fx.target("a-pkg")];
        let set = TargetIndexSet::build(&targets, &options());
        assert_eq!(set.first_containing("Shared").unwrap().package, "b-pkg");
        assert_eq!(set.containing("Shared").count(), 2);
    }

    #[test]
    fn test_override_scan_splits_flat_and_namespaced() {
        let fx = Fixture::new();
        let targets = [fx.target("@acme/admin-ui"), fx.target("portal")];
        fx.touch("overrides/Sidebar.tsx");
        let scoped = fx.touch("overrides/@acme/admin-ui/layout/Sidebar.tsx");
        let plain = fx.touch("overrides/portal/Header.tsx");

        let builder = IndexBuilder::new(vec![fx.root.join("overrides")], &targets, options());
        let index = builder.scan();

        assert_eq!(keys(&index.flat), vec!["Sidebar"]);
        assert_eq!(index.namespaced["@acme/admin-ui"].get("Sidebar"), Some(&scoped));
        assert_eq!(index.namespaced["portal"].get("Header"), Some(&plain));
    }

    #[test]
    fn test_unknown_scope_stays_flat() {
        let fx = Fixture::new();
        let targets = [fx.target("@acme/admin-ui")];
        fx.touch("overrides/@other/lib/Widget.tsx");

        let builder = IndexBuilder::new(vec![fx.root.join("overrides")], &targets, options());
        let index = builder.scan();
        assert_eq!(keys(&index.flat), vec!["Widget"]);
        assert!(index.namespaced.is_empty());
    }

    #[test]
    fn test_index_keys_dropped_at_scope_top() {
        let fx = Fixture::new();
        let targets = [fx.target("@acme/admin-ui")];
        fx.touch("overrides/index.ts");
        fx.touch("overrides/@acme/admin-ui/index.ts");
        fx.touch("overrides/menu/index.ts");

        let builder = IndexBuilder::new(vec![fx.root.join("overrides")], &targets, options());
        let index = builder.scan();
        assert_eq!(keys(&index.flat), vec!["menu"]);
        assert!(index.namespaced.is_empty());
    }

    #[test]
    fn test_marker_segments_excluded_at_any_depth() {
        let fx = Fixture::new();
        fx.touch("overrides/_drafts/Sidebar.tsx");
        fx.touch("overrides/layout/deep/_old/Header.tsx");
        fx.touch("overrides/_Footer.tsx");
        fx.touch("overrides/layout/Nav.tsx");

        let builder = IndexBuilder::new(vec![fx.root.join("overrides")], &[], options());
        assert_eq!(keys(&builder.scan().flat), vec!["Nav"]);
    }

    #[test]
    fn test_build_filters_flat_keys_to_target_files() {
        let fx = Fixture::new();
        let targets = [fx.target("ui")];
        fx.touch("node_modules/ui/src/Sidebar.tsx");
        fx.touch("overrides/Sidebar.tsx");
        fx.touch("overrides/Unrelated.tsx");

        let set = TargetIndexSet::build(&targets, &options());
        let builder = IndexBuilder::new(vec![fx.root.join("overrides")], &targets, options());
        assert_eq!(keys(&builder.build(&set).flat), vec!["Sidebar"]);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let fx = Fixture::new();
        let targets = [fx.target("ui")];
        fx.touch("node_modules/ui/src/A.tsx");
        fx.touch("node_modules/ui/src/B.tsx");
        fx.touch("overrides/x/A.tsx");
        fx.touch("overrides/B.tsx");
        fx.touch("overrides/ui/A.tsx");

        let set = TargetIndexSet::build(&targets, &options());
        let builder = IndexBuilder::new(vec![fx.root.join("overrides")], &targets, options());
        let first = serde_json::to_string(&builder.build(&set)).unwrap();
        let second = serde_json::to_string(&builder.build(&set)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_add_then_remove_restores_index() {
        let fx = Fixture::new();
        let targets = [fx.target("ui")];
        fx.touch("node_modules/ui/src/A.tsx");
        fx.touch("node_modules/ui/src/B.tsx");
        fx.touch("overrides/A.tsx");

        let set = TargetIndexSet::build(&targets, &options());
        let builder = IndexBuilder::new(vec![fx.root.join("overrides")], &targets, options());
        let before = builder.build(&set);

        fx.touch("overrides/B.tsx");
        assert_ne!(builder.build(&set), before);
        fx.remove("overrides/B.tsx");
        assert_eq!(builder.build(&set), before);
    }

    #[test]
    fn test_path_strategy_keys() {
        let fx = Fixture::new();
        let targets = [fx.target("ui")];
        fx.touch("overrides/layout/Header.tsx");
        fx.touch("overrides/ui/layout/Footer.tsx");

        let opts = ScanOptions {
            strategy: MatchStrategy::Path,
            ..options()
        };
        let builder = IndexBuilder::new(vec![fx.root.join("overrides")], &targets, opts);
        let index = builder.scan();
        assert_eq!(keys(&index.flat), vec!["layout/Header"]);
        assert_eq!(keys(&index.namespaced["ui"]), vec!["layout/Footer"]);
    }

    #[test]
    fn test_missing_root_yields_empty_index() {
        let fx = Fixture::new();
        let builder = IndexBuilder::new(vec![fx.root.join("absent")], &[], options());
        assert!(builder.scan().is_empty());
    }

    #[test]
    fn test_find_path() {
        let fx = Fixture::new();
        let targets = [fx.target("ui")];
        let flat = fx.touch("overrides/A.tsx");
        let scoped = fx.touch("overrides/ui/B.tsx");

        let builder = IndexBuilder::new(vec![fx.root.join("overrides")], &targets, options());
        let index = builder.scan();
        assert_eq!(index.find_path(&flat).map(|(ns, k)| (ns, k.as_str())), Some((None, "A")));
        assert_eq!(
            index.find_path(&scoped).map(|(ns, k)| (ns, k.as_str())),
            Some((Some("ui"), "B"))
        );
        assert!(index.find_path(Utf8Path::new("/nope.ts")).is_none());
    }
}
