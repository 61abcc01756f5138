//! Resolution interception.
//!
//! Decides, per import, whether a specifier should resolve somewhere other
//! than where the host would send it. Precedence:
//!
//! 1. an override file for the specifier's key (namespaced, then flat),
//! 2. a stylesheet redirect configured on a target,
//! 3. the source entry of a target package whose built entry was resolved.
//!
//! Anything else is declined and falls through to the host.

use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use ov_core::{specifier_stem, MatchStrategy, OverrideKey, Target, INDEX_STEM};
use serde::Serialize;
use tracing::debug;

use crate::host::{is_relative, strip_query, HostResolver};
use crate::state::{ResolverState, Session, SharedState};

/// Why a specifier was redirected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedirectReason {
    /// An override file replaced a target source file.
    Override {
        /// The matched key.
        key: OverrideKey,
        /// Whether the namespaced mapping supplied the file.
        namespaced: bool,
    },
    /// A package's built entry was swapped for its source entry.
    EntryRedirect,
    /// A stylesheet import was swapped for a source stylesheet.
    CssRedirect,
}

/// A redirected resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// The file the specifier resolves to.
    pub path: Utf8PathBuf,
    /// Why it was redirected.
    pub reason: RedirectReason,
}

/// Resolves specifiers against the current override snapshot.
#[derive(Clone)]
pub struct Interceptor {
    state: Arc<SharedState>,
    resolver: Arc<dyn HostResolver>,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("targets", &self.state.session().targets.len())
            .finish_non_exhaustive()
    }
}

impl Interceptor {
    /// Creates an interceptor over shared state and the host's resolver.
    #[must_use]
    pub fn new(state: Arc<SharedState>, resolver: Arc<dyn HostResolver>) -> Self {
        Self { state, resolver }
    }

    /// Returns the redirect for `specifier` imported from `importer`, or
    /// `None` to let the host resolve it.
    pub async fn resolve(&self, specifier: &str, importer: &Utf8Path) -> Option<Resolution> {
        // One snapshot for the whole request, even across the await below.
        let snapshot = self.state.snapshot();
        let session = self.state.session();
        if session.targets.is_empty() {
            return None;
        }

        if let Some(resolution) = override_for(session, &snapshot, specifier, importer) {
            debug!(
                specifier,
                importer = %importer,
                path = %resolution.path,
                "Redirected to override"
            );
            return Some(resolution);
        }

        if let Some(resolution) = css_redirect(session, specifier) {
            debug!(specifier, path = %resolution.path, "Redirected stylesheet");
            return Some(resolution);
        }

        let target = session.target_for_specifier(specifier)?;
        let resolved = self.resolver.resolve(specifier, importer).await?;
        let resolved = resolved.canonicalize_utf8().unwrap_or(resolved);
        let source = target.redirect_entry(&resolved)?;
        if !source.is_file() {
            debug!(
                package = %target.package,
                entry = %resolved,
                missing = %source,
                "Entry source missing, declining"
            );
            return None;
        }

        debug!(package = %target.package, from = %resolved, to = %source, "Redirected entry");
        Some(Resolution {
            path: source,
            reason: RedirectReason::EntryRedirect,
        })
    }
}

/// Step 1: the override lookup for importers inside a target.
fn override_for(
    session: &Session,
    snapshot: &ResolverState,
    specifier: &str,
    importer: &Utf8Path,
) -> Option<Resolution> {
    if snapshot.overrides.is_empty() || session.names_target(strip_query(specifier)) {
        return None;
    }
    let owner = session.owner_of(importer)?;
    let key = specifier_key(session.strategy(), owner, specifier, importer)?;

    let namespaced = snapshot
        .overrides
        .namespaced
        .get(&owner.package)
        .and_then(|map| map.get(key.as_str()));
    let (path, namespaced) = match namespaced {
        Some(path) => (path, true),
        None => (snapshot.overrides.flat.get(key.as_str())?, false),
    };

    Some(Resolution {
        path: path.clone(),
        reason: RedirectReason::Override { key, namespaced },
    })
}

/// Derives the lookup key for a specifier under `strategy`.
fn specifier_key(
    strategy: MatchStrategy,
    owner: &Target,
    specifier: &str,
    importer: &Utf8Path,
) -> Option<OverrideKey> {
    match strategy {
        MatchStrategy::Basename => {
            let stem = specifier_stem(specifier)?;
            if stem == INDEX_STEM {
                return None;
            }
            OverrideKey::new(stem)
        }
        MatchStrategy::Path => {
            if !is_relative(specifier) {
                return None;
            }
            let joined = normalize(&importer.parent()?.join(strip_query(specifier)));
            let relative = joined.strip_prefix(&owner.source_root).ok()?;
            strategy.derive(relative).filter(|key| !key.is_index())
        }
    }
}

/// Step 2b: stylesheet redirects.
fn css_redirect(session: &Session, specifier: &str) -> Option<Resolution> {
    let specifier = strip_query(specifier);
    session.targets.iter().find_map(|target| {
        let redirect = target.hmr.as_ref()?.css_redirect.as_ref()?;
        let suffix = redirect.from.trim_start_matches("./");
        if suffix.is_empty() || !Utf8Path::new(specifier).ends_with(suffix) {
            return None;
        }
        let path = target.package_root.join(&redirect.to);
        path.is_file().then_some(Resolution {
            path,
            reason: RedirectReason::CssRedirect,
        })
    })
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FsResolver;
    use ov_core::{Config, CssRedirect, HmrOptions, TargetSpec};
    use ov_scanner::Scanner;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Utf8Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn project() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().unwrap()).unwrap();
        write(
            &root,
            "node_modules/@acme/admin-ui/package.json",
            r#"{"name": "@acme/admin-ui", "main": "dist/app.mjs"}"#,
        );
        write(&root, "node_modules/@acme/admin-ui/dist/app.mjs", "export {}");
        write(&root, "node_modules/@acme/admin-ui/src/app.tsx", "export {}");
        write(&root, "node_modules/@acme/admin-ui/src/layout/Sidebar.tsx", "export {}");
        write(&root, "node_modules/@acme/admin-ui/src/layout/Shell.tsx", "import './Sidebar'");
        write(&root, "node_modules/@acme/admin-ui/src/menu/index.tsx", "export {}");
        write(&root, "src/main.tsx", "import '@acme/admin-ui'");
        (dir, root)
    }

    fn interceptor(root: &Utf8Path, config: Config) -> Interceptor {
        let outcome = Scanner::new(config, root).scan().unwrap();
        Interceptor::new(
            Arc::new(SharedState::from_outcome(outcome)),
            Arc::new(FsResolver::default()),
        )
    }

    fn config() -> Config {
        Config {
            targets: vec![TargetSpec::Package("@acme/admin-ui".to_owned())],
            ..Config::default()
        }
    }

    fn shell(root: &Utf8Path) -> Utf8PathBuf {
        root.join("node_modules/@acme/admin-ui/src/layout/Shell.tsx")
    }

    #[tokio::test]
    async fn test_namespaced_override_wins_over_flat() {
        let (_dir, root) = project();
        write(&root, "src/overrides/Sidebar.tsx", "export default 1");
        write(&root, "src/overrides/@acme/admin-ui/Sidebar.tsx", "export default 2");
        let interceptor = interceptor(&root, config());

        let resolution = interceptor.resolve("./Sidebar", &shell(&root)).await.unwrap();
        assert_eq!(resolution.path, root.join("src/overrides/@acme/admin-ui/Sidebar.tsx"));
        assert!(matches!(
            resolution.reason,
            RedirectReason::Override { namespaced: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_flat_override_and_decline() {
        let (_dir, root) = project();
        write(&root, "src/overrides/Sidebar.tsx", "export default 1");
        let interceptor = interceptor(&root, config());

        let resolution = interceptor.resolve("./Sidebar.tsx?v=3", &shell(&root)).await.unwrap();
        assert_eq!(resolution.path, root.join("src/overrides/Sidebar.tsx"));

        assert!(interceptor.resolve("./Header", &shell(&root)).await.is_none());
        // Importers outside every target are never redirected to overrides.
        assert!(interceptor.resolve("./Sidebar", &root.join("src/main.tsx")).await.is_none());
    }

    #[tokio::test]
    async fn test_index_specifier_is_not_overridden() {
        let (_dir, root) = project();
        write(&root, "src/overrides/menu.tsx", "export default 1");
        let interceptor = interceptor(&root, config());

        assert!(interceptor.resolve("../menu/index", &shell(&root)).await.is_none());
        assert!(interceptor.resolve("../menu", &shell(&root)).await.is_some());
    }

    #[tokio::test]
    async fn test_path_strategy_uses_relative_location() {
        let (_dir, root) = project();
        write(&root, "src/overrides/layout/Sidebar.tsx", "export default 1");
        let mut config = config();
        config.match_strategy = MatchStrategy::Path;
        let interceptor = interceptor(&root, config);

        let resolution = interceptor.resolve("./Sidebar", &shell(&root)).await.unwrap();
        assert_eq!(resolution.path, root.join("src/overrides/layout/Sidebar.tsx"));
        assert!(interceptor.resolve("../Sidebar", &shell(&root)).await.is_none());
    }

    #[tokio::test]
    async fn test_entry_redirect_present_and_absent() {
        let (_dir, root) = project();
        let interceptor = interceptor(&root, config());
        let importer = root.join("src/main.tsx");

        let resolution = interceptor.resolve("@acme/admin-ui", &importer).await.unwrap();
        assert_eq!(resolution.reason, RedirectReason::EntryRedirect);
        assert_eq!(resolution.path, root.join("node_modules/@acme/admin-ui/src/app.tsx"));

        fs::remove_file(root.join("node_modules/@acme/admin-ui/src/app.tsx")).unwrap();
        assert!(interceptor.resolve("@acme/admin-ui", &importer).await.is_none());
    }

    #[tokio::test]
    async fn test_package_specifier_skips_override_lookup() {
        let (_dir, root) = project();
        write(&root, "node_modules/@acme/admin-ui/src/admin-ui.tsx", "export {}");
        write(&root, "src/overrides/admin-ui.tsx", "export default 1");
        let interceptor = interceptor(&root, config());

        let resolution = interceptor.resolve("@acme/admin-ui", &shell(&root)).await.unwrap();
        assert_eq!(resolution.reason, RedirectReason::EntryRedirect);
    }

    #[tokio::test]
    async fn test_subpath_and_alias_specifiers_are_overridden() {
        let (_dir, root) = project();
        write(&root, "src/overrides/Sidebar.tsx", "export default 1");
        let interceptor = interceptor(&root, config());
        let expected = root.join("src/overrides/Sidebar.tsx");

        for specifier in ["~admin-ui/layout/Sidebar", "@acme/admin-ui/src/layout/Sidebar"] {
            let resolution = interceptor.resolve(specifier, &shell(&root)).await.unwrap();
            assert_eq!(resolution.path, expected, "{specifier}");
            assert!(matches!(
                resolution.reason,
                RedirectReason::Override { namespaced: false, .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_css_redirect() {
        let (_dir, root) = project();
        write(&root, "node_modules/@acme/admin-ui/src/styles/index.css", "body {}");
        let mut options = ov_core::TargetOptions::new("@acme/admin-ui");
        options.hmr = Some(HmrOptions {
            css_redirect: Some(CssRedirect {
                from: "dist/style.css".to_owned(),
                to: "src/styles/index.css".to_owned(),
            }),
            entry_boundary: false,
        });
        let config = Config {
            targets: vec![TargetSpec::Detailed(options)],
            ..Config::default()
        };
        let interceptor = interceptor(&root, config);

        let resolution = interceptor
            .resolve("@acme/admin-ui/dist/style.css", &root.join("src/main.tsx"))
            .await
            .unwrap();
        assert_eq!(resolution.reason, RedirectReason::CssRedirect);
        assert_eq!(
            resolution.path,
            root.join("node_modules/@acme/admin-ui/src/styles/index.css")
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Utf8Path::new("/a/b/./../c/d")), Utf8PathBuf::from("/a/c/d"));
    }
}
