//! Dependency resolution errors.

use std::sync::Arc;

use thiserror::Error;

use crate::di::key::DependencyKey;

/// Faults raised while registering or resolving dependencies.
///
/// Cloneable so a single failed initialization can be reported to every
/// caller awaiting it.
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    #[error("Could not resolve dependency for `{0}`")]
    Missing(DependencyKey),

    #[error("Attempted to redefine dependency `{0}`")]
    Duplicate(DependencyKey),

    #[error("Cannot decide which value for {key}: {}", display_keys(.implementations, ", "))]
    Ambiguous {
        key: DependencyKey,
        implementations: Vec<DependencyKey>,
    },

    #[error("Circular dependency found: {}", display_keys(.0, " -> "))]
    Circular(Vec<DependencyKey>),

    #[error("Attempted to define {0} after dependencies were resolved")]
    OutOfOrder(DependencyKey),

    #[error("Value registered for `{key}` is not a `{expected}`")]
    TypeMismatch {
        key: DependencyKey,
        expected: &'static str,
    },

    #[error("Property `{path}` could not be decoded: {reason}")]
    Property { path: String, reason: String },

    #[error("Dependency initialization failed: {0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),

    #[error("Dependency resolution failed:{}", display_failures(.0))]
    Validation(Vec<(DependencyKey, DependencyError)>),
}

impl DependencyError {
    /// Wrap an application error raised by an initializer.
    pub fn failed(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        DependencyError::Failed(Arc::from(cause.into()))
    }

    /// True if this error is `Missing` for exactly `key`.
    pub fn is_missing(&self, key: &DependencyKey) -> bool {
        matches!(self, DependencyError::Missing(missing) if missing == key)
    }
}

fn display_keys(keys: &[DependencyKey], separator: &str) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

fn display_failures(failures: &[(DependencyKey, DependencyError)]) -> String {
    failures
        .iter()
        .map(|(key, error)| format!("\n  - {}: {}", key, error))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_message() {
        let err = DependencyError::Circular(vec![
            DependencyKey::of::<u8>(),
            DependencyKey::of::<u16>(),
            DependencyKey::of::<u8>(),
        ]);
        assert_eq!(err.to_string(), "Circular dependency found: u8 -> u16 -> u8");
    }

    #[test]
    fn test_validation_message_lists_every_failure() {
        let err = DependencyError::Validation(vec![
            (DependencyKey::of::<u8>(), DependencyError::Missing(DependencyKey::of::<u8>())),
            (DependencyKey::of::<u16>(), DependencyError::Duplicate(DependencyKey::of::<u16>())),
        ]);
        let message = err.to_string();
        assert!(message.contains("\n  - u8: Could not resolve dependency for `u8`"));
        assert!(message.contains("\n  - u16: Attempted to redefine dependency `u16`"));
    }
}
