//! Event types for override-tree change notifications.
//!
//! The watcher classifies raw `notify` events into [`OverrideEvent`]s before
//! they leave the blocking thread.
//!
//! # Event Flow
//!
//! ```text
//! File System Change
//!        │
//!        ▼
//! notify::RecommendedWatcher
//!        │
//!        ▼
//! classify (Created / Changed / Deleted) + FileFilter
//!        │
//!        ▼
//!   OverrideEvent sent via channel to the invalidation engine
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The file now exists and did not before.
    Created,
    /// The file's content changed.
    Changed,
    /// The file no longer exists.
    Deleted,
}

impl ChangeKind {
    /// Returns the structural/content class of this change.
    #[inline]
    #[must_use]
    pub const fn class(self) -> EventClass {
        match self {
            Self::Created | Self::Deleted => EventClass::Structural,
            Self::Changed => EventClass::Content,
        }
    }
}

/// Whether a change can alter which file an import resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    /// A file appeared or disappeared.
    Structural,
    /// An existing file was edited.
    Content,
}

/// A classified change to one file under an override root.
///
/// # Examples
///
/// ```
/// use ov_watcher::{ChangeKind, EventClass, OverrideEvent};
/// use camino::Utf8PathBuf;
///
/// let event = OverrideEvent::new(Utf8PathBuf::from("/o/Sidebar.tsx"), ChangeKind::Deleted);
/// assert_eq!(event.class(), EventClass::Structural);
/// assert_eq!(event.file_name(), Some("Sidebar.tsx"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideEvent {
    /// Absolute path of the changed file.
    pub path: Utf8PathBuf,
    /// What happened to it.
    pub kind: ChangeKind,
}

impl OverrideEvent {
    /// Creates an event.
    #[inline]
    #[must_use]
    pub fn new(path: Utf8PathBuf, kind: ChangeKind) -> Self {
        Self { path, kind }
    }

    /// Shorthand for a [`ChangeKind::Created`] event.
    #[must_use]
    pub fn created(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(path.into(), ChangeKind::Created)
    }

    /// Shorthand for a [`ChangeKind::Changed`] event.
    #[must_use]
    pub fn changed(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(path.into(), ChangeKind::Changed)
    }

    /// Shorthand for a [`ChangeKind::Deleted`] event.
    #[must_use]
    pub fn deleted(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(path.into(), ChangeKind::Deleted)
    }

    /// Returns the structural/content class of this event.
    #[inline]
    #[must_use]
    pub const fn class(&self) -> EventClass {
        self.kind.class()
    }

    /// Returns the file name without the directory path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }
}

/// Events accumulated while a debounce window is open.
///
/// Uses [`SmallVec`] with inline storage for up to 8 events, the common size
/// of a save or rename burst.
///
/// # Examples
///
/// ```
/// use ov_watcher::{OverrideEvent, OverrideEventBatch};
///
/// let mut batch = OverrideEventBatch::new();
/// batch.push(OverrideEvent::created("/o/A.tsx"));
/// batch.push(OverrideEvent::deleted("/o/A.tsx"));
///
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch.drain().len(), 2);
/// assert!(batch.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct OverrideEventBatch {
    /// The events in arrival order.
    pub events: SmallVec<[OverrideEvent; 8]>,
}

impl OverrideEventBatch {
    /// Creates a new empty batch.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: SmallVec::new(),
        }
    }

    /// Adds an event to the batch.
    #[inline]
    pub fn push(&mut self, event: OverrideEvent) {
        self.events.push(event);
    }

    /// Returns the number of events in this batch.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the batch contains no events.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns an iterator over the events.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &OverrideEvent> {
        self.events.iter()
    }

    /// Returns the unique paths in this batch, sorted.
    fn unique_paths(&self) -> Vec<&Utf8Path> {
        let mut paths: Vec<&Utf8Path> = self.events.iter().map(|e| e.path.as_path()).collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }

    /// Empties the batch, returning its events.
    pub fn drain(&mut self) -> SmallVec<[OverrideEvent; 8]> {
        std::mem::take(&mut self.events)
    }
}

impl Default for OverrideEventBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics for a batch of events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBatchStats {
    /// Total number of events in the batch.
    pub total_events: usize,
    /// Number of creations and deletions.
    pub structural_events: usize,
    /// Number of unique files affected.
    pub unique_files: usize,
}

impl EventBatchStats {
    /// Computes statistics for a batch of events.
    #[must_use]
    pub fn from_batch(batch: &OverrideEventBatch) -> Self {
        Self {
            total_events: batch.len(),
            structural_events: batch
                .iter()
                .filter(|e| e.class() == EventClass::Structural)
                .count(),
            unique_files: batch.unique_paths().len(),
        }
    }
}
