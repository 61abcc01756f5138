//! Override-root watcher with async event streaming.
//!
//! This module provides the [`FileWatcher`] type that bridges the synchronous
//! `notify` watcher to the async tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    Blocking Thread (spawn_blocking)              │
//! │  ┌───────────────────┐    ┌──────────────┐    ┌──────────────┐  │
//! │  │ RecommendedWatcher│ -> │ classify     │ -> │ FileFilter   │  │
//! │  │ (one per root set)│    │ (kind)       │    │              │  │
//! │  └───────────────────┘    └──────────────┘    └──────┬───────┘  │
//! └──────────────────────────────────────────────────────│──────────┘
//!                                                        │
//!                                          blocking_send │
//!                                                        ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                         │
//! │  FileWatcher (shutdown ctrl)   mpsc::Receiver -> InvalidationEngine│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Debouncing is deliberately left to the consumer, which only debounces
//! structural events.

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{EventKind, ModifyKind};
use notify::{RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use ov_core::WatchConfig;

use crate::error::WatchError;
use crate::events::{ChangeKind, OverrideEvent};
use crate::filter::FileFilter;

/// Default channel capacity for file events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Classifies a raw `notify` event kind for one of its paths.
///
/// Renames are reported per path: the side that still exists is a creation,
/// the side that is gone a deletion. Access and metadata events are ignored.
///
/// # Examples
///
/// ```
/// use notify::event::{CreateKind, EventKind};
/// use ov_watcher::{ChangeKind, classify};
/// use camino::Utf8Path;
///
/// let kind = classify(&EventKind::Create(CreateKind::File), Utf8Path::new("/o/a.ts"));
/// assert_eq!(kind, Some(ChangeKind::Created));
/// ```
#[must_use]
pub fn classify(kind: &EventKind, path: &Utf8Path) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(_)) => Some(if path.exists() {
            ChangeKind::Created
        } else {
            ChangeKind::Deleted
        }),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Changed),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// A watcher over one or more override roots that streams classified events.
///
/// # Lifecycle
///
/// 1. **Creation**: `FileWatcher::new()` canonicalizes the existing roots,
///    creates channels, and spawns a blocking task with the notify watcher.
/// 2. **Event Reception**: Use `recv()` or take the receiver with
///    `into_receiver()`. Events are already filtered.
/// 3. **Shutdown**: Call `shutdown()`, or drop the watcher.
///
/// # Examples
///
/// ```no_run
/// use ov_watcher::{ExtensionFilter, FileWatcher};
/// use ov_core::WatchConfig;
/// use camino::Utf8PathBuf;
///
/// # async fn example() -> Result<(), ov_watcher::WatchError> {
/// let roots = vec![Utf8PathBuf::from("./src/overrides")];
/// let mut watcher = FileWatcher::new(&roots, &WatchConfig::default(), ExtensionFilter::new(&["ts"])).await?;
///
/// while let Some(event) = watcher.recv().await {
///     println!("{:?}: {}", event.kind, event.path);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileWatcher {
    /// Shutdown signal sender. `None` after shutdown is initiated.
    shutdown_tx: Option<oneshot::Sender<()>>,

    /// Handle to the blocking watcher task.
    task_handle: Option<JoinHandle<Result<(), WatchError>>>,

    /// Event receiver for async consumption. `None` once handed out.
    event_rx: Option<mpsc::Receiver<OverrideEvent>>,

    /// The canonical roots being watched.
    roots: Vec<Utf8PathBuf>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("roots", &self.roots)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Starts watching every existing root.
    ///
    /// Missing roots are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NoRoots`] if none of the roots exists, or
    /// [`WatchError::Io`] if a root cannot be canonicalized.
    #[allow(clippy::unused_async)] // Async for API consistency with shutdown()
    pub async fn new<F: FileFilter>(
        roots: &[Utf8PathBuf],
        config: &WatchConfig,
        filter: F,
    ) -> Result<Self, WatchError> {
        Self::with_capacity(roots, config, filter, DEFAULT_CHANNEL_CAPACITY).await
    }

    /// Starts watching with a custom channel capacity.
    ///
    /// # Errors
    ///
    /// Same as [`FileWatcher::new`].
    #[allow(clippy::unused_async)]
    pub async fn with_capacity<F: FileFilter>(
        roots: &[Utf8PathBuf],
        config: &WatchConfig,
        filter: F,
        channel_capacity: usize,
    ) -> Result<Self, WatchError> {
        let mut watched = Vec::with_capacity(roots.len());
        for root in roots {
            if root.is_dir() {
                watched.push(root.canonicalize_utf8()?);
            } else {
                warn!(root = %root, "Override root does not exist, not watching it");
            }
        }
        if watched.is_empty() {
            return Err(WatchError::NoRoots(roots.to_vec()));
        }

        let (event_tx, event_rx) = mpsc::channel(channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task_roots = watched.clone();
        let recursive = config.recursive;
        let task_handle = tokio::task::spawn_blocking(move || {
            run_watcher_loop(task_roots, recursive, event_tx, shutdown_rx, filter)
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
            event_rx: Some(event_rx),
            roots: watched,
        })
    }

    /// Receives the next event.
    ///
    /// Returns `None` when the watcher has been shut down, the channel is
    /// closed, or the receiver was taken with [`FileWatcher::take_receiver`].
    pub async fn recv(&mut self) -> Option<OverrideEvent> {
        match self.event_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Takes the event receiver so it can be handed to a consumer task.
    ///
    /// The watcher keeps running until it is shut down or dropped.
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<OverrideEvent>> {
        self.event_rx.take()
    }

    /// Returns the canonical roots being watched.
    #[must_use]
    pub fn roots(&self) -> &[Utf8PathBuf] {
        &self.roots
    }

    /// Returns `true` if the watcher is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Gracefully shuts down the watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher thread panicked or failed.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        if let Some(tx) = self.shutdown_tx.take() {
            // Ignore error if receiver is already dropped
            let _ = tx.send(());
        }

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => result?,
                Err(_join_error) => return Err(WatchError::ChannelClosed),
            }
        }

        Ok(())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Runs the notify watcher in a blocking context until shutdown.
#[allow(clippy::needless_pass_by_value)] // Owned for the blocking task lifetime
fn run_watcher_loop<F: FileFilter>(
    roots: Vec<Utf8PathBuf>,
    recursive: bool,
    event_tx: mpsc::Sender<OverrideEvent>,
    shutdown_rx: oneshot::Receiver<()>,
    filter: F,
) -> Result<(), WatchError> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(error) => {
                warn!(error = %error, "Watcher error");
                return;
            }
        };

        for path in event.paths {
            let path = match Utf8PathBuf::try_from(path) {
                Ok(p) => p,
                Err(e) => {
                    let err = WatchError::non_utf8_path(e.into_path_buf());
                    warn!(error = %err, "Skipping file event");
                    continue;
                }
            };

            let Some(kind) = classify(&event.kind, &path) else {
                continue;
            };

            if !filter.should_process(&path) {
                trace!(path = %path, "Filtered out file event");
                continue;
            }

            if event_tx.blocking_send(OverrideEvent::new(path, kind)).is_err() {
                debug!("Event channel closed, dropping file events");
                return;
            }
        }
    })?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    for root in &roots {
        watcher.watch(root.as_std_path(), mode)?;
        info!(root = %root, recursive, "Watching override root");
    }

    // Block until shutdown signal is received
    let _ = shutdown_rx.blocking_recv();

    info!(roots = roots.len(), "Override watcher stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CompositeFilter, ExtensionFilter};
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_classify_kinds() {
        let path = Utf8Path::new("/definitely/not/here.ts");
        assert_eq!(classify(&EventKind::Create(CreateKind::File), path), Some(ChangeKind::Created));
        assert_eq!(classify(&EventKind::Remove(RemoveKind::File), path), Some(ChangeKind::Deleted));
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content)), path),
            Some(ChangeKind::Changed)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)), path),
            None
        );
        assert_eq!(classify(&EventKind::Any, path), None);
    }

    #[test]
    fn test_classify_rename_by_existence() {
        let (_dir, root) = temp_root();
        let present = root.join("New.tsx");
        fs::write(&present, "").unwrap();
        let rename = EventKind::Modify(ModifyKind::Name(RenameMode::Any));

        assert_eq!(classify(&rename, &present), Some(ChangeKind::Created));
        assert_eq!(classify(&rename, &root.join("Old.tsx")), Some(ChangeKind::Deleted));
    }

    #[tokio::test]
    async fn test_watcher_requires_an_existing_root() {
        let roots = vec![Utf8PathBuf::from("/nonexistent/overrides")];
        let result = FileWatcher::new(&roots, &WatchConfig::default(), CompositeFilter::new()).await;
        assert!(matches!(result, Err(WatchError::NoRoots(_))));
    }

    #[tokio::test]
    async fn test_watcher_skips_missing_roots() {
        let (_dir, root) = temp_root();
        let roots = vec![root.join("missing"), root.clone()];
        let watcher = FileWatcher::new(&roots, &WatchConfig::default(), CompositeFilter::new())
            .await
            .unwrap();
        assert_eq!(watcher.roots().len(), 1);
        watcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_watcher_receives_created_event() {
        let (_dir, root) = temp_root();
        let mut watcher = FileWatcher::new(
            std::slice::from_ref(&root),
            &WatchConfig::default(),
            ExtensionFilter::new(&["tsx"]),
        )
        .await
        .unwrap();

        // Give the backend a moment to register the watch
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(root.join("Sidebar.tsx"), "export {}").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), watcher.recv()).await;
        watcher.shutdown().await.unwrap();

        // Timing-dependent on some CI filesystems; assert only what arrived
        if let Ok(Some(event)) = event {
            assert!(event.path.as_str().ends_with("Sidebar.tsx"));
        }
    }

    #[tokio::test]
    async fn test_take_receiver() {
        let (_dir, root) = temp_root();
        let mut watcher = FileWatcher::new(&[root], &WatchConfig::default(), CompositeFilter::new())
            .await
            .unwrap();
        assert!(watcher.take_receiver().is_some());
        assert!(watcher.recv().await.is_none());
        assert!(watcher.is_running());
    }
}
