//! Incremental invalidation.
//!
//! Consumes classified override-tree events and keeps the host consistent
//! with the override index:
//!
//! - creations and deletions are debounced, then the override index is
//!   rebuilt, swapped in, diffed, and every affected module plus its
//!   transitive importers is invalidated before one full reload;
//! - edits of an override the host does not track as a module invalidate the
//!   target file it replaces, then reload;
//! - patch config changes invalidate the declaration's target files, then
//!   reload.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashSet;
use serde::Serialize;
use smallvec::SmallVec;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use ov_watcher::{EventBatchStats, EventClass, OverrideEvent, OverrideEventBatch, is_directory_like};

use crate::diff::IndexDiff;
use crate::host::{ModuleGraph, ModuleId, ReloadSink};
use crate::patch::{PatchDeclaration, PatchPipeline};
use crate::state::SharedState;

/// Trailing debounce window for structural events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Invalidates every module backed by `files` and, breadth first, every
/// module importing one of them.
///
/// Returns the set of invalidated modules.
pub fn invalidate_with_importers<'a, I>(graph: &dyn ModuleGraph, files: I) -> FxHashSet<ModuleId>
where
    I: IntoIterator<Item = &'a Utf8Path>,
{
    let mut seen = FxHashSet::default();
    let mut queue: VecDeque<ModuleId> = files
        .into_iter()
        .flat_map(|file| graph.modules_by_file(file))
        .collect();

    while let Some(module) = queue.pop_front() {
        if !seen.insert(module.clone()) {
            continue;
        }
        graph.invalidate(&module);
        queue.extend(graph.importers(&module).into_iter().filter(|m| !seen.contains(m)));
    }

    seen
}

/// Counters accumulated over an engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineReport {
    /// Events received.
    pub events: usize,
    /// Override index rebuilds.
    pub recomputations: usize,
    /// Full reloads requested.
    pub reloads: usize,
    /// Module invalidations, summed over every pass.
    pub invalidated: usize,
}

/// Reacts to override-tree events for the lifetime of a session.
pub struct InvalidationEngine {
    state: Arc<SharedState>,
    graph: Arc<dyn ModuleGraph>,
    reload: Arc<dyn ReloadSink>,
    patches: Arc<PatchPipeline>,
    debounce: Duration,
    report: EngineReport,
}

impl std::fmt::Debug for InvalidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationEngine")
            .field("debounce", &self.debounce)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl InvalidationEngine {
    /// Creates an engine with the default debounce window.
    #[must_use]
    pub fn new(
        state: Arc<SharedState>,
        graph: Arc<dyn ModuleGraph>,
        reload: Arc<dyn ReloadSink>,
        patches: Arc<PatchPipeline>,
    ) -> Self {
        Self {
            state,
            graph,
            reload,
            patches,
            debounce: DEFAULT_DEBOUNCE,
            report: EngineReport::default(),
        }
    }

    /// Sets the trailing debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Processes events until the channel closes.
    ///
    /// A recomputation still pending when the channel closes runs once
    /// before returning.
    pub async fn run(mut self, mut events: mpsc::Receiver<OverrideEvent>) -> EngineReport {
        let mut pending = OverrideEventBatch::new();
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if self.handle(event, &mut pending) {
                        deadline = Some(Instant::now() + self.debounce);
                    }
                }
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.recompute(&mut pending);
                }
            }
        }

        if !pending.is_empty() {
            self.recompute(&mut pending);
        }

        info!(
            events = self.report.events,
            recomputations = self.report.recomputations,
            reloads = self.report.reloads,
            "Invalidation engine stopped"
        );
        self.report
    }

    /// Routes one event. Returns `true` if a structural event was queued.
    ///
    /// Creating, moving, or removing a directory is structural: it can add or
    /// drop every override beneath it.
    fn handle(&mut self, event: OverrideEvent, pending: &mut OverrideEventBatch) -> bool {
        self.report.events += 1;
        self.on_patch_config(&event);

        if !self.state.session().is_override_path(&event.path) {
            return false;
        }
        match event.class() {
            EventClass::Structural if self.is_override_source(&event.path) || is_directory_like(&event.path) => {
                debug!(path = %event.path, kind = ?event.kind, "Queued structural change");
                pending.push(event);
                true
            }
            EventClass::Content if self.is_override_source(&event.path) => {
                self.on_content(&event.path);
                false
            }
            _ => false,
        }
    }

    fn is_override_source(&self, path: &Utf8Path) -> bool {
        path.extension().is_some_and(|ext| {
            self.state
                .session()
                .builder
                .options()
                .extensions
                .iter()
                .any(|e| e == ext)
        })
    }

    /// Handles edits of an existing override file.
    fn on_content(&mut self, path: &Utf8Path) {
        if !self.graph.modules_by_file(path).is_empty() {
            debug!(path = %path, "Override tracked by host, leaving update to host");
            return;
        }

        let snapshot = self.state.snapshot();
        let Some((namespace, key)) = snapshot.overrides.find_path(path) else {
            debug!(path = %path, "Edited file is not an active override");
            return;
        };

        let seeds = self.state.session().replaced_files(namespace, key);
        if seeds.is_empty() {
            return;
        }
        let invalidated = invalidate_with_importers(self.graph.as_ref(), seeds.iter().map(Utf8PathBuf::as_path));
        self.report.invalidated += invalidated.len();

        info!(key = %key, path = %path, invalidated = invalidated.len(), "Override content changed");
        self.full_reload(&format!("override '{key}' changed"));
    }

    /// Rebuilds the override index after a burst of structural events.
    fn recompute(&mut self, pending: &mut OverrideEventBatch) {
        let stats = EventBatchStats::from_batch(pending);
        pending.drain();
        self.report.recomputations += 1;

        let rebuilt = self.state.rebuild();
        let previous = self.state.replace(rebuilt);
        let current = self.state.snapshot();

        let diff = IndexDiff::between(&previous.overrides, &current.overrides);
        if diff.is_empty() {
            debug!(events = stats.total_events, "Override tree changed without affecting the index");
            return;
        }

        let session = self.state.session();
        let mut seeds: Vec<Utf8PathBuf> = Vec::new();
        for change in diff.iter() {
            seeds.extend(session.replaced_files(change.namespace.as_deref(), &change.key));
            if let Some(path) = change.override_path() {
                seeds.push(path.to_owned());
            }
        }
        let invalidated = invalidate_with_importers(self.graph.as_ref(), seeds.iter().map(Utf8PathBuf::as_path));
        self.report.invalidated += invalidated.len();

        info!(
            events = stats.total_events,
            files = stats.unique_files,
            changed = diff.len(),
            invalidated = invalidated.len(),
            generation = current.generation,
            "Override index recomputed"
        );
        for change in diff.iter() {
            debug!(
                namespace = ?change.namespace,
                key = %change.key,
                kind = ?change.kind,
                "Override mapping changed"
            );
        }
        self.full_reload(&format!("{} override mapping(s) changed", diff.len()));
    }

    /// Handles events for patch config files.
    ///
    /// A directory moving in or out of the override tree can carry a config
    /// file with it, so structural directory events rediscover every binding.
    fn on_patch_config(&mut self, event: &OverrideEvent) {
        let Some(name) = event.file_name() else {
            return;
        };
        let structural = event.class() == EventClass::Structural;
        let directory = structural && is_directory_like(&event.path);

        let patches = Arc::clone(&self.patches);
        let mut affected: SmallVec<[&PatchDeclaration; 2]> = SmallVec::new();
        for declaration in patches.declarations() {
            let named = declaration.config_file() == name;
            let hit = if structural {
                (named || directory) && {
                    let session = self.state.session();
                    declaration.rediscover(session.override_roots(), session.builder.options().max_depth)
                }
            } else {
                named
                    && declaration
                        .config_path()
                        .is_some_and(|bound| bound.as_path() == event.path)
            };
            if hit {
                affected.push(declaration);
            }
        }
        if affected.is_empty() {
            return;
        }

        let indexes = &self.state.session().target_indexes;
        let files: Vec<Utf8PathBuf> = affected.iter().flat_map(|d| d.target_files(indexes)).collect();
        let invalidated = invalidate_with_importers(self.graph.as_ref(), files.iter().map(Utf8PathBuf::as_path));

        info!(config = %event.path, kind = ?event.kind, invalidated = invalidated.len(), "Patch config changed");
        self.report.invalidated += invalidated.len();
        self.full_reload(&format!("patch config '{name}' changed"));
    }

    fn full_reload(&mut self, reason: &str) {
        self.report.reloads += 1;
        self.reload.full_reload(reason);
    }
}
