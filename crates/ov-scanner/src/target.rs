//! Locating target packages on disk.
//!
//! [`TargetResolver`] turns configured [`TargetSpec`]s into [`Target`]s by
//! probing the filesystem. Every path stored on a target is a real path
//! (symbolic links resolved) so that later prefix comparisons are exact.

use camino::{Utf8Path, Utf8PathBuf};
use ov_core::{Target, TargetOptions, TargetSpec};
use tracing::{debug, warn};

/// Directory holding installed packages.
const NODE_MODULES: &str = "node_modules";

/// Manifest file that marks an installed package.
const PACKAGE_MANIFEST: &str = "package.json";

/// Resolves package identifiers relative to a project root.
///
/// Lookup order:
///
/// 1. The identifier is itself a path (absolute, or relative to the project
///    root) to an existing directory.
/// 2. `node_modules/<identifier>/package.json` exists in the project root or
///    any of its ancestors.
///
/// # Examples
///
/// ```no_run
/// use ov_core::TargetSpec;
/// use ov_scanner::TargetResolver;
/// use camino::Utf8Path;
///
/// let resolver = TargetResolver::new(Utf8Path::new("/repo/app"));
/// let targets = resolver.resolve_all(&[TargetSpec::Package("@acme/admin-ui".into())]);
/// for target in &targets {
///     println!("{} -> {}", target.package, target.source_root);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TargetResolver {
    project_root: Utf8PathBuf,
}

impl TargetResolver {
    /// Creates a resolver anchored at `project_root`.
    #[must_use]
    pub fn new(project_root: &Utf8Path) -> Self {
        Self {
            project_root: project_root.to_owned(),
        }
    }

    /// Resolves every spec, dropping (with a warning) packages that cannot be
    /// located. Configured order is preserved.
    #[must_use]
    pub fn resolve_all(&self, specs: &[TargetSpec]) -> Vec<Target> {
        specs
            .iter()
            .filter_map(|spec| {
                let options = spec.options();
                let target = self.resolve(&options);
                if target.is_none() {
                    warn!(
                        package = %options.package,
                        project_root = %self.project_root,
                        "Target package not found, excluding it"
                    );
                }
                target
            })
            .collect()
    }

    /// Resolves a single target, or `None` when no lookup strategy finds it.
    #[must_use]
    pub fn resolve(&self, options: &TargetOptions) -> Option<Target> {
        let package_root = self.locate(&options.package)?;

        let candidate = package_root.join(options.source_dir());
        let source_root = if candidate.is_dir() {
            real_path(&candidate).unwrap_or(candidate)
        } else {
            debug!(
                package = %options.package,
                src = options.source_dir(),
                "Source directory missing, using package root"
            );
            package_root.clone()
        };

        let mut target = Target::new(options.package.as_str(), package_root, source_root);
        if let Some(alias) = &options.alias {
            target.alias.clone_from(alias);
        }
        target.entry_redirect.clone_from(&options.entry_redirect);
        target.hmr.clone_from(&options.hmr);

        if let (Some(rule), Some(_)) = (&target.entry_redirect, &target.hmr) {
            let entry = target.package_root.join(&rule.to);
            if entry.is_file() {
                target.entry_file = Some(real_path(&entry).unwrap_or(entry));
            }
        }

        debug!(
            package = %target.package,
            source_root = %target.source_root,
            alias = %target.alias,
            "Resolved target"
        );
        Some(target)
    }

    /// Finds the real path of the package directory.
    fn locate(&self, package: &str) -> Option<Utf8PathBuf> {
        let as_path = Utf8Path::new(package);
        let direct = if as_path.is_absolute() {
            as_path.to_owned()
        } else {
            self.project_root.join(as_path)
        };
        if is_path_like(package) && direct.is_dir() {
            return real_path(&direct);
        }

        self.project_root.ancestors().find_map(|dir| {
            let installed = dir.join(NODE_MODULES).join(package);
            if installed.join(PACKAGE_MANIFEST).is_file() {
                real_path(&installed)
            } else {
                None
            }
        })
    }
}

/// Returns `true` for identifiers that can only be filesystem paths.
fn is_path_like(package: &str) -> bool {
    package.starts_with('.') || package.starts_with('/') || Utf8Path::new(package).is_absolute()
}

/// Canonicalizes `path`, logging and discarding failures.
fn real_path(path: &Utf8Path) -> Option<Utf8PathBuf> {
    match path.canonicalize_utf8() {
        Ok(real) => Some(real),
        Err(error) => {
            warn!(path = %path, error = %error, "Failed to resolve real path");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ov_core::{EntryRedirect, HmrOptions};
    use std::fs;
    use tempfile::TempDir;

    fn project() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().unwrap()).unwrap();
        (dir, root)
    }

    fn install(root: &Utf8Path, package: &str, src: Option<&str>) -> Utf8PathBuf {
        let package_root = root.join(NODE_MODULES).join(package);
        fs::create_dir_all(&package_root).unwrap();
        fs::write(package_root.join(PACKAGE_MANIFEST), "{}").unwrap();
        if let Some(src) = src {
            fs::create_dir_all(package_root.join(src)).unwrap();
        }
        package_root
    }

    #[test]
    fn test_resolves_installed_package_with_source_dir() {
        let (_dir, root) = project();
        let package_root = install(&root, "@acme/admin-ui", Some("src"));

        let target = TargetResolver::new(&root)
            .resolve(&TargetOptions::new("@acme/admin-ui"))
            .unwrap();
        assert_eq!(target.package_root, package_root);
        assert_eq!(target.source_root, package_root.join("src"));
        assert_eq!(target.alias, "~admin-ui");
    }

    #[test]
    fn test_missing_source_dir_falls_back_to_package_root() {
        let (_dir, root) = project();
        let package_root = install(&root, "plain", None);

        let target = TargetResolver::new(&root)
            .resolve(&TargetOptions::new("plain"))
            .unwrap();
        assert_eq!(target.source_root, package_root);
    }

    #[test]
    fn test_lookup_walks_ancestors() {
        let (_dir, root) = project();
        install(&root, "shared", Some("src"));
        let app = root.join("apps/web");
        fs::create_dir_all(&app).unwrap();

        let target = TargetResolver::new(&app).resolve(&TargetOptions::new("shared"));
        assert!(target.is_some());
    }

    #[test]
    fn test_path_identifier_for_linked_package() {
        let (_dir, root) = project();
        let linked = root.join("packages/ui");
        fs::create_dir_all(linked.join("lib")).unwrap();

        let mut options = TargetOptions::new("./packages/ui");
        options.src = Some("lib".to_owned());
        options.alias = Some("@ui".to_owned());

        let target = TargetResolver::new(&root).resolve(&options).unwrap();
        assert_eq!(target.source_root, linked.join("lib"));
        assert_eq!(target.alias, "@ui");
    }

    #[test]
    fn test_resolve_all_drops_missing_targets() {
        let (_dir, root) = project();
        install(&root, "present", Some("src"));

        let targets = TargetResolver::new(&root).resolve_all(&[
            TargetSpec::Package("missing".to_owned()),
            TargetSpec::Package("present".to_owned()),
        ]);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].package, "present");
    }

    #[test]
    fn test_entry_file_cached_only_with_hmr() {
        let (_dir, root) = project();
        let package_root = install(&root, "app-kit", Some("src"));
        fs::write(package_root.join("src/main.tsx"), "export {}").unwrap();

        let mut options = TargetOptions::new("app-kit");
        options.entry_redirect = Some(EntryRedirect {
            from: "dist/app.mjs".to_owned(),
            to: "src/main.tsx".to_owned(),
        });
        let resolver = TargetResolver::new(&root);
        assert!(resolver.resolve(&options).unwrap().entry_file.is_none());

        options.hmr = Some(HmrOptions {
            css_redirect: None,
            entry_boundary: true,
        });
        let target = resolver.resolve(&options).unwrap();
        assert_eq!(target.entry_file, Some(package_root.join("src/main.tsx")));
    }
}
