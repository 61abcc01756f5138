//! Host build-tool hooks.
//!
//! [`OverridePlugin`] is the surface an embedding dev server drives: one
//! method per hook, all backed by the same [`SharedState`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ov_core::{Config, WatchConfig};
use ov_scanner::Scanner;
use ov_watcher::{AnyFilter, CompositeFilter, DirectoryFilter, ExtensionFilter, FileNameFilter, OverrideRootFilter};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::host::{strip_query, HostResolver, ModuleGraph, ReloadSink};
use crate::interceptor::{Interceptor, Resolution};
use crate::invalidation::InvalidationEngine;
use crate::patch::{PatchPipeline, TransformRegistry};
use crate::state::SharedState;

/// Plugin names that provide component fast refresh on their own.
pub const REFRESH_PLUGINS: &[&str] = &["vite:react-refresh", "vite:react-babel", "vite:react-swc"];

const HOT_API: &str = "import.meta.hot";
const SELF_ACCEPT: &str = "if (import.meta.hot) {\n  import.meta.hot.accept();\n}";

/// Settings merged into the host configuration before it is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    /// Directories the dev server may serve from.
    pub fs_allow: Vec<Utf8PathBuf>,
    /// Packages excluded from dependency pre-bundling.
    pub optimize_deps_exclude: Vec<String>,
    /// Import aliases, alias to source root.
    pub aliases: BTreeMap<String, Utf8PathBuf>,
    /// Extra pre-bundling entry points.
    pub entries: Vec<Utf8PathBuf>,
}

/// Content returned from the load hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    /// Module source.
    pub code: String,
    /// Files the host must watch for this module.
    pub watch_files: Vec<Utf8PathBuf>,
}

impl LoadResult {
    /// Creates a load result with no extra watched files.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            watch_files: Vec::new(),
        }
    }

    /// Adds a watched file.
    #[must_use]
    pub fn watching(mut self, file: impl Into<Utf8PathBuf>) -> Self {
        self.watch_files.push(file.into());
        self
    }
}

/// Content returned from the transform hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    /// Transformed source.
    pub code: String,
}

impl TransformResult {
    /// Creates a transform result.
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// The override plugin for one dev session.
pub struct OverridePlugin {
    state: Arc<SharedState>,
    interceptor: Interceptor,
    patches: Arc<PatchPipeline>,
    hmr_boundaries: Vec<String>,
    watch: WatchConfig,
    external_refresh: AtomicBool,
}

impl std::fmt::Debug for OverridePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverridePlugin")
            .field("targets", &self.state.session().targets.len())
            .field("patches", &self.patches.declarations().len())
            .field("external_refresh", &self.has_external_refresh())
            .finish_non_exhaustive()
    }
}

impl OverridePlugin {
    /// Validates `config`, scans the project, and binds patch configs.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, a patch that does not compile, or a
    /// flat override conflict under the `error` policy.
    pub fn activate(
        config: Config,
        project_root: &Utf8Path,
        registry: &TransformRegistry,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let patches = PatchPipeline::from_specs(&config.patches, registry)?;
        let hmr_boundaries = config.hmr_boundaries.clone();
        let watch = config.watch;
        let max_depth = config.max_depth;

        let outcome = Scanner::new(config, project_root).scan()?;
        patches.discover(outcome.builder.roots(), max_depth);

        let state = Arc::new(SharedState::from_outcome(outcome));
        let snapshot = state.snapshot();
        info!(
            targets = state.session().targets.len(),
            overrides = snapshot.overrides.len(),
            patches = patches.declarations().len(),
            "Override plugin activated"
        );

        Ok(Self {
            interceptor: Interceptor::new(Arc::clone(&state), resolver),
            state,
            patches: Arc::new(patches),
            hmr_boundaries,
            watch,
            external_refresh: AtomicBool::new(false),
        })
    }

    /// Returns the shared state.
    #[must_use]
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Returns the patch pipeline.
    #[must_use]
    pub fn patches(&self) -> &Arc<PatchPipeline> {
        &self.patches
    }

    /// Returns the watcher settings.
    #[must_use]
    pub fn watch_config(&self) -> &WatchConfig {
        &self.watch
    }

    /// Returns `true` once a host refresh plugin has been detected.
    #[must_use]
    pub fn has_external_refresh(&self) -> bool {
        self.external_refresh.load(Ordering::Relaxed)
    }

    /// Builds the pre-resolution configuration patch.
    #[must_use]
    pub fn config_patch(&self) -> ConfigPatch {
        let session = self.state.session();
        let mut patch = ConfigPatch {
            fs_allow: session.override_roots().to_vec(),
            ..ConfigPatch::default()
        };
        for target in &session.targets {
            patch.fs_allow.push(target.package_root.clone());
            patch.optimize_deps_exclude.push(target.package.clone());
            patch.aliases.insert(target.alias.clone(), target.source_root.clone());
            if let Some(entry) = &target.entry_file {
                patch.entries.push(entry.clone());
            }
        }
        patch
    }

    /// Inspects the resolved host plugin list.
    pub fn config_resolved<I, S>(&self, plugins: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in plugins {
            let name = name.as_ref();
            if REFRESH_PLUGINS.contains(&name) {
                info!(plugin = name, "External refresh plugin detected, boundary injection disabled");
                self.external_refresh.store(true, Ordering::Relaxed);
                return;
            }
        }
    }

    /// Resolution hook.
    pub async fn resolve_id(&self, specifier: &str, importer: Option<&Utf8Path>) -> Option<Resolution> {
        self.interceptor.resolve(specifier, importer?).await
    }

    /// Load hook: a re-export shim for overridden target files, otherwise
    /// patched content.
    pub async fn load(&self, id: &str) -> Option<LoadResult> {
        let path = Utf8Path::new(strip_query(id));
        let session = self.state.session();
        let owner = session.owner_of(path)?;

        let snapshot = self.state.snapshot();
        let replacement = path
            .strip_prefix(&owner.source_root)
            .ok()
            .and_then(|relative| session.strategy().derive(relative))
            .and_then(|key| snapshot.overrides.lookup(&owner.package, key.as_str()))
            .filter(|replacement| replacement.as_path() != path);

        if let Some(replacement) = replacement {
            let has_default = match tokio::fs::read_to_string(replacement).await {
                Ok(source) => has_default_export(&source),
                Err(error) => {
                    warn!(path = %replacement, error = %error, "Failed to read override");
                    false
                }
            };
            debug!(target = %path, replacement = %replacement, "Serving override shim");
            return Some(LoadResult::code(reexport_shim(replacement, has_default)).watching(replacement.clone()));
        }

        let output = self.patches.apply(path).await?;
        Some(LoadResult::code(output.code).watching(output.config_path))
    }

    /// Transform hook: makes boundary modules self-accepting.
    pub fn transform(&self, code: &str, id: &str) -> Option<TransformResult> {
        if self.has_external_refresh() || code.contains(HOT_API) {
            return None;
        }
        let path = Utf8Path::new(strip_query(id));
        let session = self.state.session();
        let in_scope = session.is_override_path(path) || session.targets.iter().any(|t| t.owns(path));
        if !in_scope {
            return None;
        }

        let marked = self.hmr_boundaries.iter().any(|marker| code.contains(marker.as_str()));
        let entry = session.targets.iter().any(|t| t.is_entry_boundary(path));
        if !(marked || entry) {
            return None;
        }

        debug!(path = %path, "Injecting self-accept boundary");
        Some(TransformResult::code(format!("{code}\n{SELF_ACCEPT}\n")))
    }

    /// Returns the override roots that exist on disk.
    #[must_use]
    pub fn watch_roots(&self) -> Vec<Utf8PathBuf> {
        self.state
            .session()
            .override_roots()
            .iter()
            .filter(|root| root.is_dir())
            .cloned()
            .collect()
    }

    /// Builds the watcher filter: override sources, patch config files, and
    /// directories under the override roots.
    #[must_use]
    pub fn watch_filter(&self) -> CompositeFilter {
        let session = self.state.session();
        let sources = AnyFilter::new()
            .or(ExtensionFilter::new(session.builder.options().extensions.as_slice()))
            .or(FileNameFilter::new(self.patches.config_files()))
            .or(DirectoryFilter);
        CompositeFilter::new()
            .and(OverrideRootFilter::new(session.override_roots().to_vec()))
            .and(sources)
    }

    /// Creates the invalidation engine for this session.
    #[must_use]
    pub fn engine(&self, graph: Arc<dyn ModuleGraph>, reload: Arc<dyn ReloadSink>) -> InvalidationEngine {
        InvalidationEngine::new(Arc::clone(&self.state), graph, reload, Arc::clone(&self.patches))
            .with_debounce(Duration::from_millis(self.watch.debounce_ms))
    }
}

/// Block and line comments, removed before looking for exports.
const COMMENT_PATTERN: &str = r"(?s)/\*.*?\*/|//[^\n]*";

/// `export default ...`, `export { x as default }`, and `export { default }`.
const DEFAULT_EXPORT_PATTERN: &str =
    r"(?m)^\s*export\s+default\b|\bexport\s*\{[^}]*\bas\s+default\b|\bexport\s*\{(?:[^}]*,)?\s*default\s*[,}]";

/// Returns `true` if module source exports a default binding.
fn has_default_export(source: &str) -> bool {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| Some((Regex::new(COMMENT_PATTERN).ok()?, Regex::new(DEFAULT_EXPORT_PATTERN).ok()?)))
        .as_ref()
        .is_some_and(|(comments, default_export)| default_export.is_match(&comments.replace_all(source, "")))
}

/// Builds the module that stands in for an overridden target file.
fn reexport_shim(replacement: &Utf8Path, has_default: bool) -> String {
    // A JSON string literal is also a valid JS string literal.
    let quoted = serde_json::to_string(replacement.as_str()).unwrap_or_else(|_| format!("\"{replacement}\""));
    let mut shim = format!("export * from {quoted};");
    if has_default {
        shim.push_str(&format!("\nexport {{ default }} from {quoted};"));
    }
    shim
}
