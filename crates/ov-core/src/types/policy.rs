//! Conflict policy for flat overrides shared by several targets.

use serde::{Deserialize, Serialize};

/// What to do when one flat override key matches files in more than one target.
///
/// # Examples
///
/// ```
/// use ov_core::ConflictPolicy;
///
/// assert_eq!(ConflictPolicy::default(), ConflictPolicy::Error);
/// assert!(ConflictPolicy::Warn.should_warn());
/// assert!(!ConflictPolicy::First.should_warn());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Abort activation, naming the colliding targets and key.
    #[default]
    Error,
    /// Log the collision and use the first configured target.
    Warn,
    /// Use the first configured target without logging.
    First,
}

impl ConflictPolicy {
    /// Returns `true` if a collision aborts activation.
    #[inline]
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Returns `true` if a collision is logged as a warning.
    #[inline]
    #[must_use]
    pub const fn should_warn(self) -> bool {
        matches!(self, Self::Warn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_serialization() {
        assert_eq!(serde_json::to_string(&ConflictPolicy::Warn).unwrap(), r#""warn""#);
        let parsed: ConflictPolicy = serde_json::from_str(r#""first""#).unwrap();
        assert_eq!(parsed, ConflictPolicy::First);
    }

    #[test]
    fn test_only_error_is_fatal() {
        assert!(ConflictPolicy::Error.is_fatal());
        assert!(!ConflictPolicy::Warn.is_fatal());
        assert!(!ConflictPolicy::First.is_fatal());
    }
}
