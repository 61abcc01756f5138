//! Error types for the ov-scanner crate.
//!
//! This module provides the [`ScanError`] type for errors that can occur
//! while locating targets, walking trees, and checking for conflicts.

use ov_core::OverrideKey;

/// Errors that can occur during scanning operations.
///
/// # Error Recovery Strategy
///
/// - **Conflict** ([`ScanError::Conflict`]): Fatal - aborts activation under
///   the `error` policy
/// - **Config** ([`ScanError::Config`]): Fatal - the walker cannot start
/// - **Non-UTF-8 path** ([`ScanError::NonUtf8Path`]): Recoverable - the
///   entry is logged and skipped
///
/// # Examples
///
/// ```
/// use ov_scanner::ScanError;
///
/// fn handle_error(err: &ScanError) {
///     match err {
///         ScanError::Conflict { key, targets } => eprintln!("{key}: {targets:?}"),
///         ScanError::Config(msg) => eprintln!("Config error: {msg}"),
///         ScanError::NonUtf8Path(p) => eprintln!("Invalid path: {}", p.display()),
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A flat override key matches source files in more than one target.
    #[error(
        "override '{key}' matches files in several targets ({}); move it under a \
         namespaced directory (e.g. overrides/{}/...) or set onConflict to \"warn\" or \"first\"",
        .targets.join(", "),
        .targets.first().map_or("<package>", String::as_str)
    )]
    Conflict {
        /// The colliding key.
        key: OverrideKey,
        /// Package identifiers of every target containing the key, in
        /// configured order.
        targets: Vec<String>,
    },

    /// Invalid scanner configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl ScanError {
    /// Creates a new [`ScanError::Config`] error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_key_and_targets() {
        let err = ScanError::Conflict {
            key: OverrideKey::new("Sidebar").unwrap(),
            targets: vec!["@acme/admin-ui".to_owned(), "@acme/portal".to_owned()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Sidebar"));
        assert!(msg.contains("@acme/admin-ui, @acme/portal"));
        assert!(msg.contains("overrides/@acme/admin-ui/"));
    }

    #[test]
    fn test_scan_error_config() {
        let err = ScanError::config("root is not a directory");
        assert_eq!(err.to_string(), "invalid configuration: root is not a directory");
    }

    #[test]
    fn test_scan_error_non_utf8() {
        let err = ScanError::NonUtf8Path(std::path::PathBuf::from("test"));
        assert_eq!(err.to_string(), "path is not valid UTF-8: test");
    }
}
