//! Error types for the ov-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! during file watching operations.

use camino::Utf8PathBuf;

/// Errors that can occur during file watching operations.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`WatchError::Notify`]): Fatal - propagate immediately
/// - **No roots** ([`WatchError::NoRoots`]): Fatal - nothing exists to watch
/// - **Channel closed** ([`WatchError::ChannelClosed`]): Fatal - communication broken
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - skip and continue
/// - **I/O errors** ([`WatchError::Io`]): Fatal - propagate immediately
///
/// # Examples
///
/// ```
/// use ov_watcher::WatchError;
///
/// fn handle_error(err: WatchError) {
///     match err {
///         WatchError::Notify(e) => eprintln!("Notify error: {e}"),
///         WatchError::NoRoots(roots) => eprintln!("Nothing to watch: {roots:?}"),
///         WatchError::ChannelClosed => eprintln!("Channel closed"),
///         WatchError::NonUtf8Path(p) => eprintln!("Invalid path: {}", p.display()),
///         WatchError::Io(e) => eprintln!("I/O error: {e}"),
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// None of the requested roots exists.
    #[error("no watch root exists: {}", display_roots(.0))]
    NoRoots(Vec<Utf8PathBuf>),

    /// The event channel was closed unexpectedly.
    ///
    /// This indicates a communication failure between the watcher thread
    /// and the async event consumer.
    #[error("event channel closed unexpectedly")]
    ChannelClosed,

    /// A path is not valid UTF-8.
    ///
    /// Paths in file events that are not UTF-8 are logged and skipped.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_roots(roots: &[Utf8PathBuf]) -> String {
    roots
        .iter()
        .map(|root| root.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl WatchError {
    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_watch_error_no_roots() {
        let err = WatchError::NoRoots(vec![
            Utf8PathBuf::from("/a/overrides"),
            Utf8PathBuf::from("/b/overrides"),
        ]);
        assert_eq!(err.to_string(), "no watch root exists: /a/overrides, /b/overrides");
    }

    #[test]
    fn test_watch_error_channel_closed() {
        let err = WatchError::ChannelClosed;
        assert!(err.to_string().contains("channel closed"));
    }

    #[test]
    fn test_watch_error_non_utf8() {
        let err = WatchError::non_utf8_path(PathBuf::from("test"));
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_watch_error_io() {
        let err = WatchError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "access denied"));
        assert!(err.to_string().contains("I/O error"));
    }
}
