//! Override-tree watcher with async event streaming.
//!
//! This crate detects changes under the override roots via the `notify`
//! crate, classifies each one as a creation, edit, or deletion, and streams
//! the result into a tokio channel consumed by the invalidation engine.
//!
//! # Overview
//!
//! - [`FileWatcher`]: one `notify` watcher over every existing override root
//! - [`OverrideEvent`] / [`ChangeKind`] / [`EventClass`]: typed change events
//! - [`FileFilter`] and friends: drop irrelevant paths on the watcher thread
//!
//! # Crate Dependencies
//!
//! ```text
//! ov-cli ──► ov-engine ──► ov-scanner ──► ov-core
//!                     └──► ov-watcher ──► ov-scanner
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use ov_watcher::{CompositeFilter, ExtensionFilter, FileWatcher, OverrideRootFilter};
//! use ov_core::WatchConfig;
//! use camino::Utf8PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let roots = vec![Utf8PathBuf::from("./src/overrides")];
//!     let filter = CompositeFilter::new()
//!         .and(OverrideRootFilter::new(roots.clone()))
//!         .and(ExtensionFilter::new(&["ts", "tsx"]));
//!
//!     let mut watcher = FileWatcher::new(&roots, &WatchConfig::default(), filter).await?;
//!     while let Some(event) = watcher.recv().await {
//!         println!("{:?} {}", event.kind, event.path);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod filter;
pub mod watcher;

pub use error::WatchError;

pub use events::{ChangeKind, EventBatchStats, EventClass, OverrideEvent, OverrideEventBatch};

pub use filter::{
    AnyFilter, CompositeFilter, DirectoryFilter, ExtensionFilter, FileFilter, FileNameFilter,
    OverrideRootFilter, is_directory_like,
};

pub use watcher::{FileWatcher, classify};
