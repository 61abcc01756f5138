//! Domain types shared by the scanner, watcher, and engine.
//!
//! - [`key`] - Override keys and the match strategies that derive them
//! - [`policy`] - What to do when a flat override matches several targets
//! - [`target`] - Resolved target packages and their redirect options
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use ov_core::{MatchStrategy, OverrideKey, Target};
//! ```

mod key;
mod policy;
mod target;

pub use key::{specifier_stem, MatchStrategy, OverrideKey, INDEX_STEM};
pub use policy::ConflictPolicy;
pub use target::{default_alias, CssRedirect, EntryRedirect, HmrOptions, Target, ALIAS_MARKER};
