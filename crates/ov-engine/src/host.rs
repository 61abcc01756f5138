//! The boundary with the embedding build tool.
//!
//! The engine needs exactly three things from its host:
//!
//! - [`ModuleGraph`]: lookup-by-file, invalidate-node, list-importers
//! - [`ReloadSink`]: a way to force a full reload
//! - [`HostResolver`]: the host's default module resolution
//!
//! [`MemoryGraph`], [`ReloadLog`] and [`FsResolver`] are self-contained
//! implementations used by the CLI and by tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::{info, trace};

/// Identifier of a module in the host's graph.
pub type ModuleId = String;

/// The subset of the host's module graph the engine relies on.
pub trait ModuleGraph: Send + Sync {
    /// Returns every module whose file is `file`.
    fn modules_by_file(&self, file: &Utf8Path) -> Vec<ModuleId>;

    /// Drops the cached transform result of `module`.
    fn invalidate(&self, module: &ModuleId);

    /// Returns the modules that import `module`.
    fn importers(&self, module: &ModuleId) -> Vec<ModuleId>;
}

/// Receives full-reload requests.
pub trait ReloadSink: Send + Sync {
    /// Asks the host to reload every client.
    fn full_reload(&self, reason: &str);
}

/// The host's default module resolution.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolves `specifier` as imported from `importer`, or `None`.
    async fn resolve(&self, specifier: &str, importer: &Utf8Path) -> Option<Utf8PathBuf>;
}

#[derive(Debug, Default)]
struct GraphInner {
    by_file: FxHashMap<Utf8PathBuf, Vec<ModuleId>>,
    importers: FxHashMap<ModuleId, FxHashSet<ModuleId>>,
}

/// An in-memory module graph that records invalidations.
///
/// # Examples
///
/// ```
/// use ov_engine::{MemoryGraph, ModuleGraph};
/// use camino::Utf8Path;
///
/// let graph = MemoryGraph::new();
/// graph.add_module("/src/App.tsx", "/src/App.tsx");
/// graph.add_module("/src/Menu.tsx", "/src/Menu.tsx");
/// graph.add_import("/src/App.tsx", "/src/Menu.tsx");
///
/// assert_eq!(graph.importers(&"/src/Menu.tsx".to_owned()), vec!["/src/App.tsx".to_owned()]);
/// assert_eq!(graph.modules_by_file(Utf8Path::new("/src/Menu.tsx")).len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryGraph {
    inner: RwLock<GraphInner>,
    invalidated: Mutex<Vec<ModuleId>>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` as the module for `file`.
    pub fn add_module(&self, id: impl Into<ModuleId>, file: impl Into<Utf8PathBuf>) {
        self.inner
            .write()
            .by_file
            .entry(file.into())
            .or_default()
            .push(id.into());
    }

    /// Records that `importer` imports `imported`.
    pub fn add_import(&self, importer: impl Into<ModuleId>, imported: impl Into<ModuleId>) {
        self.inner
            .write()
            .importers
            .entry(imported.into())
            .or_default()
            .insert(importer.into());
    }

    /// Returns every invalidation so far, in order.
    #[must_use]
    pub fn invalidated(&self) -> Vec<ModuleId> {
        self.invalidated.lock().clone()
    }
}

impl ModuleGraph for MemoryGraph {
    fn modules_by_file(&self, file: &Utf8Path) -> Vec<ModuleId> {
        self.inner.read().by_file.get(file).cloned().unwrap_or_default()
    }

    fn invalidate(&self, module: &ModuleId) {
        trace!(module = %module, "Invalidating module");
        self.invalidated.lock().push(module.clone());
    }

    fn importers(&self, module: &ModuleId) -> Vec<ModuleId> {
        let inner = self.inner.read();
        let mut importers: Vec<ModuleId> = inner
            .importers
            .get(module)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        importers.sort_unstable();
        importers
    }
}

/// A reload sink that logs and counts requests.
#[derive(Debug, Default)]
pub struct ReloadLog {
    reasons: Mutex<Vec<String>>,
    count: AtomicUsize,
}

impl ReloadLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of reloads requested.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns every reason, in order.
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }
}

impl ReloadSink for ReloadLog {
    fn full_reload(&self, reason: &str) {
        info!(reason, "Full reload");
        self.count.fetch_add(1, Ordering::Relaxed);
        self.reasons.lock().push(reason.to_owned());
    }
}

/// Extensions probed when a relative specifier omits one.
const DEFAULT_PROBE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "vue"];

/// Resolution over the real filesystem.
///
/// Relative and absolute specifiers are probed as-is, then with each
/// extension, then as a directory `index`. Bare specifiers are looked up in
/// `node_modules` of the importer's ancestors; a package's entry comes from
/// `exports["."]`, then `module`, then `main`, then `index.js`.
#[derive(Debug, Clone)]
pub struct FsResolver {
    extensions: Vec<String>,
}

impl FsResolver {
    /// Creates a resolver probing the given extensions (leading dots ignored).
    #[must_use]
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_owned())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Resolves synchronously; see [`HostResolver::resolve`].
    #[must_use]
    pub fn resolve_sync(&self, specifier: &str, importer: &Utf8Path) -> Option<Utf8PathBuf> {
        let specifier = strip_query(specifier);
        let base = importer.parent().unwrap_or(importer);

        let found = if is_relative(specifier) {
            self.probe(&base.join(specifier))
        } else if Utf8Path::new(specifier).is_absolute() {
            self.probe(Utf8Path::new(specifier))
        } else {
            self.resolve_bare(specifier, base)
        }?;

        Some(found.canonicalize_utf8().unwrap_or(found))
    }

    fn resolve_bare(&self, specifier: &str, from: &Utf8Path) -> Option<Utf8PathBuf> {
        let (package, subpath) = split_package(specifier)?;
        from.ancestors().find_map(|dir| {
            let package_dir = dir.join("node_modules").join(package);
            if !package_dir.is_dir() {
                return None;
            }
            match subpath {
                Some(sub) => self.probe(&package_dir.join(sub)),
                None => self.package_entry(&package_dir),
            }
        })
    }

    fn package_entry(&self, package_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        let manifest = std::fs::read_to_string(package_dir.join("package.json"))
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok());

        let declared = manifest.as_ref().and_then(|json| {
            json.get("exports")
                .and_then(export_entry)
                .or_else(|| json.get("module")?.as_str())
                .or_else(|| json.get("main")?.as_str())
                .map(str::to_owned)
        });
        let entry = declared.unwrap_or_else(|| "index.js".to_owned());
        self.probe(&package_dir.join(entry.trim_start_matches("./")))
    }

    fn probe(&self, path: &Utf8Path) -> Option<Utf8PathBuf> {
        if path.is_file() {
            return Some(path.to_owned());
        }
        let with_ext = self.extensions.iter().find_map(|ext| {
            let candidate = Utf8PathBuf::from(format!("{path}.{ext}"));
            candidate.is_file().then_some(candidate)
        });
        with_ext.or_else(|| {
            if !path.is_dir() {
                return None;
            }
            self.extensions.iter().find_map(|ext| {
                let candidate = path.join(format!("index.{ext}"));
                candidate.is_file().then_some(candidate)
            })
        })
    }
}

impl Default for FsResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_EXTENSIONS)
    }
}

#[async_trait]
impl HostResolver for FsResolver {
    async fn resolve(&self, specifier: &str, importer: &Utf8Path) -> Option<Utf8PathBuf> {
        self.resolve_sync(specifier, importer)
    }
}

/// Picks the `"."` entry of an `exports` field.
fn export_entry(exports: &Value) -> Option<&str> {
    match exports {
        Value::String(entry) => Some(entry),
        Value::Object(map) => {
            let root = map.get(".").unwrap_or(exports);
            match root {
                Value::String(entry) => Some(entry),
                Value::Object(conditions) => ["import", "module", "default", "require"]
                    .iter()
                    .find_map(|c| conditions.get(*c).and_then(export_entry)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Splits `@scope/name/sub/path` into the package name and subpath.
fn split_package(specifier: &str) -> Option<(&str, Option<&str>)> {
    let mut slashes = specifier.match_indices('/').map(|(i, _)| i);
    let end = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match end {
        Some(end) => {
            let sub = &specifier[end + 1..];
            Some((&specifier[..end], (!sub.is_empty()).then_some(sub)))
        }
        None if specifier.starts_with('@') && !specifier.contains('/') => None,
        None => Some((specifier, None)),
    }
}

/// Returns `true` for `./x`, `../x`, `.` and `..`.
pub(crate) fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

pub(crate) fn strip_query(specifier: &str) -> &str {
    specifier
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or(specifier)
}
