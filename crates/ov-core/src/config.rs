//! Configuration structures for package source overrides.
//!
//! This module provides the configuration surface recognized by the plugin:
//!
//! - [`Config`] - Root configuration, deserialized from `ov.config.json`
//! - [`TargetSpec`] / [`TargetOptions`] - Which packages to override
//! - [`OverrideRoots`] - One or more override root directories
//! - [`PatchSpec`] - Patch declarations bound to named transforms
//! - [`WatchConfig`] - File watcher settings (debouncing, recursion)
//!
//! All configuration types implement [`Default`] and accept partial JSON.
//! Field names are camelCase, matching the host build tool's conventions.
//!
//! ```json
//! {
//!   "targets": ["@acme/admin-ui", { "package": "@acme/charts", "src": "lib" }],
//!   "overrides": "./src/overrides",
//!   "match": "basename",
//!   "onConflict": "warn",
//!   "patches": [{ "target": "layout/Sidebar", "configFile": "menu.config.json", "transform": "menu" }]
//! }
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::ConfigError;
use crate::types::{ConflictPolicy, EntryRedirect, HmrOptions, MatchStrategy};

/// Default configuration file name looked up in the project root.
pub const DEFAULT_CONFIG_FILE: &str = "ov.config.json";

/// Default override root, relative to the project root.
pub const DEFAULT_OVERRIDE_ROOT: &str = "./src/overrides";

/// Default source subdirectory inside a target package.
pub const DEFAULT_SOURCE_DIR: &str = "src";

/// Default maximum recursion depth for directory scans.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Full record for one target package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOptions {
    /// Package identifier (or a path to the package directory).
    pub package: String,
    /// Explicit alias; defaults to `~<last segment>`.
    pub alias: Option<String>,
    /// Source subdirectory; defaults to `src`.
    pub src: Option<String>,
    /// Explicit entry-redirect rule.
    pub entry_redirect: Option<EntryRedirect>,
    /// Hot-update helper options.
    pub hmr: Option<HmrOptions>,
}

impl TargetOptions {
    /// Creates options for `package` with every sub-option unset.
    #[must_use]
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            alias: None,
            src: None,
            entry_redirect: None,
            hmr: None,
        }
    }

    /// Returns the source subdirectory, falling back to `src`.
    #[must_use]
    pub fn source_dir(&self) -> &str {
        self.src.as_deref().unwrap_or(DEFAULT_SOURCE_DIR)
    }
}

/// A target given either as a bare package identifier or a full record.
///
/// # Examples
///
/// ```
/// use ov_core::TargetSpec;
///
/// let bare: TargetSpec = serde_json::from_str(r#""@acme/admin-ui""#).unwrap();
/// assert_eq!(bare.options().package, "@acme/admin-ui");
///
/// let full: TargetSpec =
///     serde_json::from_str(r#"{"package": "@acme/charts", "src": "lib"}"#).unwrap();
/// assert_eq!(full.options().source_dir(), "lib");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    /// Bare package identifier.
    Package(String),
    /// Full record with sub-options.
    Detailed(TargetOptions),
}

impl TargetSpec {
    /// Returns the full record for this target.
    #[must_use]
    pub fn options(&self) -> TargetOptions {
        match self {
            Self::Package(package) => TargetOptions::new(package.as_str()),
            Self::Detailed(options) => options.clone(),
        }
    }

    /// Returns the package identifier.
    #[must_use]
    pub fn package(&self) -> &str {
        match self {
            Self::Package(package) => package,
            Self::Detailed(options) => &options.package,
        }
    }
}

/// One or more override root directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideRoots {
    /// A single root.
    Single(Utf8PathBuf),
    /// Several roots, scanned in order.
    Multiple(Vec<Utf8PathBuf>),
}

impl OverrideRoots {
    /// Returns the configured roots as a slice.
    #[must_use]
    pub fn paths(&self) -> &[Utf8PathBuf] {
        match self {
            Self::Single(path) => std::slice::from_ref(path),
            Self::Multiple(paths) => paths,
        }
    }

    /// Resolves every root against `project_root` (absolute roots are kept).
    #[must_use]
    pub fn resolve(&self, project_root: &Utf8Path) -> Vec<Utf8PathBuf> {
        self.paths()
            .iter()
            .map(|root| {
                if root.is_absolute() {
                    root.clone()
                } else {
                    let relative = root.strip_prefix("./").unwrap_or(root.as_path());
                    project_root.join(relative)
                }
            })
            .collect()
    }
}

impl Default for OverrideRoots {
    fn default() -> Self {
        Self::Single(Utf8PathBuf::from(DEFAULT_OVERRIDE_ROOT))
    }
}

/// A patch declaration as written in the configuration file.
///
/// The transform is referenced by name and looked up in the engine's
/// transform registry at activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSpec {
    /// Regular expression matched against target file paths.
    pub target: String,
    /// Basename of the config file searched for in the override roots.
    pub config_file: String,
    /// Name of the registered transform.
    pub transform: String,
}

/// Configuration for the file watcher.
///
/// Controls how file changes are detected and debounced.
///
/// # Examples
///
/// ```
/// use ov_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.debounce_ms, 100);
/// assert!(config.recursive);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchConfig {
    /// Debounce window in milliseconds.
    ///
    /// Structural changes within this window are coalesced into a single
    /// recomputation.
    pub debounce_ms: u64,

    /// Whether to watch subdirectories recursively.
    pub recursive: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            recursive: true,
        }
    }
}

/// Root configuration for the override plugin.
///
/// # Examples
///
/// ```
/// use ov_core::{Config, ConflictPolicy, MatchStrategy};
///
/// let config = Config::from_json_str(r#"{"targets": ["@acme/admin-ui"], "onConflict": "warn"}"#)
///     .unwrap();
/// assert_eq!(config.on_conflict, ConflictPolicy::Warn);
/// assert_eq!(config.match_strategy, MatchStrategy::Basename);
/// assert_eq!(config.overrides.paths()[0].as_str(), "./src/overrides");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Packages whose sources may be overridden.
    pub targets: Vec<TargetSpec>,

    /// Override root directories.
    pub overrides: OverrideRoots,

    /// Key derivation strategy.
    #[serde(rename = "match")]
    pub match_strategy: MatchStrategy,

    /// Policy for flat keys shared by several targets.
    pub on_conflict: ConflictPolicy,

    /// Enables debug-level logging.
    pub debug: bool,

    /// Allow-listed file extensions (with or without the leading dot).
    pub extensions: Vec<String>,

    /// Patch declarations.
    pub patches: Vec<PatchSpec>,

    /// Content markers that trigger self-acceptance injection.
    pub hmr_boundaries: Vec<String>,

    /// Maximum recursion depth for directory scans.
    pub max_depth: usize,

    /// File watcher configuration.
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            overrides: OverrideRoots::default(),
            match_strategy: MatchStrategy::default(),
            on_conflict: ConflictPolicy::default(),
            debug: false,
            extensions: [".ts", ".tsx", ".js", ".jsx", ".mjs", ".vue"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            patches: Vec::new(),
            hmr_boundaries: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            watch: WatchConfig::default(),
        }
    }
}

impl Config {
    /// Parses and validates a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a configuration file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_std_path())?;
        Self::from_json_str(&contents)
    }

    /// Checks option values that serde alone cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.iter().all(|ext| ext.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::invalid_option("extensions", "must list at least one extension"));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::invalid_option("maxDepth", "must be at least 1"));
        }
        if self.overrides.paths().is_empty() {
            return Err(ConfigError::invalid_option("overrides", "must name at least one directory"));
        }
        if let Some(spec) = self.targets.iter().find(|spec| spec.package().trim().is_empty()) {
            return Err(ConfigError::invalid_option(
                "targets",
                format!("empty package identifier in {spec:?}"),
            ));
        }
        for patch in &self.patches {
            if patch.config_file.is_empty() || patch.config_file.contains('/') {
                return Err(ConfigError::invalid_option(
                    "patches.configFile",
                    format!("'{}' must be a plain file name", patch.config_file),
                ));
            }
        }
        Ok(())
    }

    /// Returns the allow-listed extensions without leading dots.
    ///
    /// # Examples
    ///
    /// ```
    /// use ov_core::Config;
    ///
    /// let mut config = Config::default();
    /// config.extensions = vec![".ts".to_owned(), "vue".to_owned()];
    /// assert_eq!(config.normalized_extensions().as_slice(), ["ts", "vue"]);
    /// ```
    #[must_use]
    pub fn normalized_extensions(&self) -> SmallVec<[String; 8]> {
        let mut extensions: SmallVec<[String; 8]> = SmallVec::new();
        for ext in &self.extensions {
            let ext = ext.trim_start_matches('.');
            if !ext.is_empty() && !extensions.iter().any(|e| e == ext) {
                extensions.push(ext.to_owned());
            }
        }
        extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(config.targets.is_empty());
        assert_eq!(config.match_strategy, MatchStrategy::Basename);
        assert_eq!(config.on_conflict, ConflictPolicy::Error);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.debounce_ms, 100);
        assert!(config.recursive);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_full_surface() {
        let json = r#"{
            "targets": [
                "@acme/admin-ui",
                {
                    "package": "@acme/charts",
                    "alias": "@charts",
                    "src": "lib",
                    "entryRedirect": { "from": "dist/index.mjs", "to": "lib/index.ts" },
                    "hmr": { "cssRedirect": { "from": "dist/style.css", "to": "lib/style.css" }, "entryBoundary": true }
                }
            ],
            "overrides": ["./src/overrides", "/abs/overrides"],
            "match": "path",
            "onConflict": "first",
            "debug": true,
            "extensions": ["ts", ".tsx"],
            "patches": [{ "target": "Sidebar", "configFile": "menu.json", "transform": "menu" }],
            "hmrBoundaries": ["defineComponent("],
            "watch": { "debounceMs": 50 }
        }"#;
        let config = Config::from_json_str(json).unwrap();

        assert_eq!(config.targets.len(), 2);
        let charts = config.targets[1].options();
        assert_eq!(charts.alias.as_deref(), Some("@charts"));
        assert_eq!(charts.source_dir(), "lib");
        assert!(charts.hmr.is_some_and(|h| h.entry_boundary && h.css_redirect.is_some()));
        assert_eq!(config.match_strategy, MatchStrategy::Path);
        assert_eq!(config.on_conflict, ConflictPolicy::First);
        assert_eq!(config.overrides.paths().len(), 2);
        assert_eq!(config.patches[0].config_file, "menu.json");
        assert_eq!(config.watch.debounce_ms, 50);
        assert!(config.watch.recursive);
    }

    #[test]
    fn test_override_roots_resolve() {
        let roots = OverrideRoots::Multiple(vec![
            Utf8PathBuf::from("./src/overrides"),
            Utf8PathBuf::from("/abs/overrides"),
        ]);
        let resolved = roots.resolve(Utf8Path::new("/project"));
        assert_eq!(resolved[0], Utf8PathBuf::from("/project/src/overrides"));
        assert_eq!(resolved[1], Utf8PathBuf::from("/abs/overrides"));
    }

    #[test]
    fn test_validate_rejects_empty_extensions() {
        let config = Config {
            extensions: vec![".".to_owned()],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidOption { .. })));
    }

    #[test]
    fn test_validate_rejects_nested_config_file() {
        let json = r#"{"patches": [{"target": "x", "configFile": "a/b.json", "transform": "t"}]}"#;
        assert!(Config::from_json_str(json).is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        std::fs::write(&path, r#"{"targets": ["pkg"]}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.targets, vec![TargetSpec::Package("pkg".to_owned())]);
    }
}
