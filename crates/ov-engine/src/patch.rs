//! Patch pipeline.
//!
//! A patch declaration pairs a path pattern with a named transform and a
//! config file discovered in the override roots. When a target file matching
//! the pattern is loaded, its on-disk content and the config path go through
//! the transform and the result is served instead.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use camino::{Utf8Path, Utf8PathBuf};
use ov_core::PatchSpec;
use ov_scanner::{FileWalker, TargetIndexSet};
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Rewrites a target file's source using a config file.
///
/// Implemented for any `Fn(&str, &Utf8Path) -> anyhow::Result<String>`.
///
/// # Examples
///
/// ```
/// use ov_engine::Transform;
/// use camino::Utf8Path;
///
/// let banner = |source: &str, config: &Utf8Path| -> anyhow::Result<String> {
///     Ok(format!("// {config}\n{source}"))
/// };
/// let out = banner.apply("export {}", Utf8Path::new("/o/menu.json")).unwrap();
/// assert!(out.starts_with("// /o/menu.json"));
/// ```
pub trait Transform: Send + Sync {
    /// Returns the transformed source.
    ///
    /// # Errors
    ///
    /// Any error makes the pipeline serve the file unpatched.
    fn apply(&self, source: &str, config: &Utf8Path) -> anyhow::Result<String>;
}

impl<F> Transform for F
where
    F: Fn(&str, &Utf8Path) -> anyhow::Result<String> + Send + Sync,
{
    fn apply(&self, source: &str, config: &Utf8Path) -> anyhow::Result<String> {
        self(source, config)
    }
}

/// Named transforms available to patch declarations.
#[derive(Default, Clone)]
pub struct TransformRegistry {
    transforms: FxHashMap<String, Arc<dyn Transform>>,
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TransformRegistry").field("transforms", &names).finish()
    }
}

impl TransformRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transform` under `name`, replacing any previous one.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, transform: impl Transform + 'static) -> Self {
        self.transforms.insert(name.into(), Arc::new(transform));
        self
    }

    /// Looks up a transform by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(name).map(Arc::clone)
    }

    /// Returns `true` if no transform is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

/// One compiled patch declaration.
pub struct PatchDeclaration {
    pattern: Regex,
    config_file: String,
    transform_name: String,
    transform: Arc<dyn Transform>,
    config_path: ArcSwapOption<Utf8PathBuf>,
}

impl std::fmt::Debug for PatchDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchDeclaration")
            .field("pattern", &self.pattern.as_str())
            .field("config_file", &self.config_file)
            .field("transform", &self.transform_name)
            .field("config_path", &self.config_path())
            .finish_non_exhaustive()
    }
}

impl PatchDeclaration {
    /// Compiles a declaration from its configuration entry.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidPattern`] for a bad regex and
    /// [`EngineError::UnknownTransform`] for an unregistered transform name.
    pub fn compile(spec: &PatchSpec, registry: &TransformRegistry) -> Result<Self, EngineError> {
        let pattern = Regex::new(&spec.target).map_err(|source| EngineError::InvalidPattern {
            pattern: spec.target.clone(),
            source,
        })?;
        let transform = registry
            .get(&spec.transform)
            .ok_or_else(|| EngineError::UnknownTransform(spec.transform.clone()))?;

        Ok(Self {
            pattern,
            config_file: spec.config_file.clone(),
            transform_name: spec.transform.clone(),
            transform,
            config_path: ArcSwapOption::empty(),
        })
    }

    /// Returns `true` if `path` matches the target pattern.
    #[must_use]
    pub fn matches(&self, path: &Utf8Path) -> bool {
        self.pattern.is_match(path.as_str())
    }

    /// Returns the config file basename searched for.
    #[must_use]
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Returns the currently bound config path.
    #[must_use]
    pub fn config_path(&self) -> Option<Arc<Utf8PathBuf>> {
        self.config_path.load_full()
    }

    /// Searches `roots` for the config file and rebinds the config path.
    ///
    /// Returns `true` if the bound path changed.
    pub fn rediscover(&self, roots: &[Utf8PathBuf], max_depth: usize) -> bool {
        let found = roots.iter().find_map(|root| {
            let walker = FileWalker::new(root).ok()?.with_max_depth(max_depth);
            walker
                .collect_paths()
                .into_iter()
                .find(|path| path.file_name() == Some(self.config_file.as_str()))
        });

        let previous = self.config_path.swap(found.clone().map(Arc::new));
        let changed = previous.as_deref() != found.as_ref();
        if changed {
            match &found {
                Some(path) => info!(transform = %self.transform_name, config = %path, "Patch config bound"),
                None => info!(transform = %self.transform_name, file = %self.config_file, "Patch config unbound"),
            }
        }
        changed
    }

    /// Returns every target source file this declaration patches.
    #[must_use]
    pub fn target_files(&self, indexes: &TargetIndexSet) -> Vec<Utf8PathBuf> {
        indexes
            .iter()
            .flat_map(|index| index.all_files.iter())
            .filter(|path| self.matches(path))
            .cloned()
            .collect()
    }
}

/// Content produced by a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutput {
    /// The transformed source.
    pub code: String,
    /// The config file the transform read, to register as a dependency.
    pub config_path: Utf8PathBuf,
}

/// Ordered patch declarations.
#[derive(Debug, Default)]
pub struct PatchPipeline {
    declarations: Vec<PatchDeclaration>,
}

impl PatchPipeline {
    /// Compiles every declaration, in order.
    ///
    /// # Errors
    ///
    /// Fails on the first declaration that does not compile.
    pub fn from_specs(specs: &[PatchSpec], registry: &TransformRegistry) -> Result<Self, EngineError> {
        let declarations = specs
            .iter()
            .map(|spec| PatchDeclaration::compile(spec, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { declarations })
    }

    /// Returns `true` if no declaration exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Returns the declarations in order.
    #[must_use]
    pub fn declarations(&self) -> &[PatchDeclaration] {
        &self.declarations
    }

    /// Returns the config file basenames of every declaration.
    #[must_use]
    pub fn config_files(&self) -> Vec<&str> {
        self.declarations.iter().map(PatchDeclaration::config_file).collect()
    }

    /// Binds every declaration's config path.
    pub fn discover(&self, roots: &[Utf8PathBuf], max_depth: usize) {
        for declaration in &self.declarations {
            declaration.rediscover(roots, max_depth);
        }
    }

    /// Applies the first declaration that matches `path` and produces content.
    ///
    /// Returns `None` when no declaration applies, the file cannot be read,
    /// or every matching transform fails; the file is then served as is.
    pub async fn apply(&self, path: &Utf8Path) -> Option<PatchOutput> {
        for declaration in self.declarations.iter().filter(|d| d.matches(path)) {
            let Some(config_path) = declaration.config_path() else {
                debug!(path = %path, file = %declaration.config_file, "Patch config not found, skipping");
                continue;
            };
            if !config_path.is_file() {
                debug!(path = %path, config = %config_path, "Patch config gone, skipping");
                continue;
            }

            let source = match tokio::fs::read_to_string(path).await {
                Ok(source) => source,
                Err(error) => {
                    warn!(path = %path, error = %error, "Failed to read patch target");
                    return None;
                }
            };

            match declaration.transform.apply(&source, &config_path) {
                Ok(code) => {
                    debug!(path = %path, transform = %declaration.transform_name, "Patched");
                    return Some(PatchOutput {
                        code,
                        config_path: Utf8PathBuf::clone(&config_path),
                    });
                }
                Err(error) => warn!(
                    path = %path,
                    transform = %declaration.transform_name,
                    error = %error,
                    "Patch transform failed"
                ),
            }
        }
        None
    }
}
