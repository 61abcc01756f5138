//! Resolution interception, patching, and incremental invalidation.
//!
//! This crate is the live half of the override system. Given the indexes
//! built by `ov-scanner`, it answers the host build tool's hooks and keeps the
//! host's module cache consistent as the override trees change.
//!
//! # Overview
//!
//! - [`OverridePlugin`]: one method per host hook
//! - [`Interceptor`]: override, stylesheet, and entry redirects
//! - [`PatchPipeline`]: named [`Transform`]s applied to matching target files
//! - [`InvalidationEngine`]: debounced rebuilds, index diffs, importer walks
//! - [`SharedState`]: the override index, swapped whole on every rebuild
//! - [`ModuleGraph`] / [`ReloadSink`] / [`HostResolver`]: what the host provides
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use camino::Utf8Path;
//! use ov_core::Config;
//! use ov_engine::{FsResolver, MemoryGraph, OverridePlugin, ReloadLog, TransformRegistry};
//! use ov_watcher::FileWatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Utf8Path::new("ov.config.json"))?;
//!     let plugin = OverridePlugin::activate(
//!         config,
//!         Utf8Path::new("."),
//!         &TransformRegistry::new(),
//!         Arc::new(FsResolver::default()),
//!     )?;
//!
//!     let mut watcher =
//!         FileWatcher::new(&plugin.watch_roots(), plugin.watch_config(), plugin.watch_filter()).await?;
//!     let engine = plugin.engine(Arc::new(MemoryGraph::new()), Arc::new(ReloadLog::new()));
//!     if let Some(events) = watcher.take_receiver() {
//!         engine.run(events).await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! OverridePlugin
//!     │
//!     ├── Interceptor ──────► SharedState (ArcSwap<ResolverState>)
//!     │                            ▲
//!     ├── PatchPipeline            │ replace()
//!     │                            │
//!     └── InvalidationEngine ──────┘
//!             │
//!             ├── IndexDiff
//!             └── ModuleGraph / ReloadSink (host)
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod diff;
pub mod error;
pub mod host;
pub mod interceptor;
pub mod invalidation;
pub mod patch;
pub mod plugin;
pub mod state;

pub use diff::{IndexDiff, KeyChange};
pub use error::EngineError;
pub use host::{FsResolver, HostResolver, MemoryGraph, ModuleGraph, ModuleId, ReloadLog, ReloadSink};
pub use interceptor::{Interceptor, RedirectReason, Resolution};
pub use invalidation::{invalidate_with_importers, EngineReport, InvalidationEngine, DEFAULT_DEBOUNCE};
pub use patch::{PatchDeclaration, PatchOutput, PatchPipeline, Transform, TransformRegistry};
pub use plugin::{ConfigPatch, LoadResult, OverridePlugin, TransformResult, REFRESH_PLUGINS};
pub use state::{ResolverState, Session, SharedState};
