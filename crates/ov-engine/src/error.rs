//! Error types for the ov-engine crate.
//!
//! This module provides the [`EngineError`] type for failures while
//! activating the override plugin. Once a session is running, per-file and
//! per-key problems are logged rather than returned.

use ov_core::ConfigError;
use ov_scanner::ScanError;
use ov_watcher::WatchError;

/// Errors that can occur while activating or wiring the engine.
///
/// # Error Recovery Strategy
///
/// - **Scan** ([`EngineError::Scan`]): Fatal for conflicts under the `error`
///   policy, which is the only scan failure that reaches activation
/// - **Config** / **Pattern** / **Unknown transform**: Fatal - activation stops
/// - **Watch** ([`EngineError::Watch`]): The watcher could not start; the
///   plugin keeps resolving but no longer invalidates
///
/// # Examples
///
/// ```
/// use ov_engine::EngineError;
///
/// let err = EngineError::UnknownTransform("menu".into());
/// assert_eq!(err.to_string(), "patch references unknown transform 'menu'");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The activation scan failed.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The override watcher failed.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// A patch target pattern is not a valid regular expression.
    #[error("invalid patch pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The regex compiler's error.
        source: regex::Error,
    },

    /// A patch names a transform that was never registered.
    #[error("patch references unknown transform '{0}'")]
    UnknownTransform(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ov_core::OverrideKey;

    #[test]
    fn test_conflict_is_transparent() {
        let err = EngineError::from(ScanError::Conflict {
            key: OverrideKey::new("Sidebar").unwrap(),
            targets: vec!["a".to_owned(), "b".to_owned()],
        });
        assert!(matches!(err, EngineError::Scan(ScanError::Conflict { .. })));
        assert!(err.to_string().starts_with("override 'Sidebar'"));
    }

    #[test]
    fn test_invalid_pattern_message() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = EngineError::InvalidPattern {
            pattern: "(".to_owned(),
            source,
        };
        assert!(err.to_string().starts_with("invalid patch pattern '('"));
    }

    #[test]
    fn test_watch_error_is_transparent() {
        let err = EngineError::from(WatchError::non_utf8_path("x"));
        assert_eq!(err.to_string(), "path is not valid UTF-8: x");
    }
}
