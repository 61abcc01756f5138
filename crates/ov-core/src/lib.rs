//! Core types, errors, and configuration for package source overrides.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`Config`] and its sections, deserialized from `ov.config.json`
//! - [`ConfigError`] for configuration-related failures
//! - Domain types: [`OverrideKey`], [`MatchStrategy`], [`ConflictPolicy`],
//!   and [`Target`] with its entry-redirect and HMR helper options
//!
//! # Crate Dependencies
//!
//! ```text
//! ov-cli ──► ov-engine ──► ov-scanner ──► ov-core
//!                     └──► ov-watcher ──►
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    Config, OverrideRoots, PatchSpec, TargetOptions, TargetSpec, WatchConfig,
    DEFAULT_CONFIG_FILE, DEFAULT_MAX_DEPTH,
};
pub use error::ConfigError;
pub use types::{
    default_alias, specifier_stem, ConflictPolicy, CssRedirect, EntryRedirect, HmrOptions,
    MatchStrategy, OverrideKey, Target, ALIAS_MARKER, INDEX_STEM,
};
