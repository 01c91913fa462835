//! Error types for confapply.
//!
//! All errors are strongly typed using thiserror. The split follows how the
//! apply pipeline treats a failure:
//! - configuration errors abort rule registration or expansion,
//! - evaluation errors are swallowed per rule by the expander,
//! - storage errors abort the current commit attempt.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::debug_info::DebugInfo;

/// Configuration errors surfaced at rule registration, expansion or commit time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown apply source type '{source_type}'")]
    UnknownSourceType {
        source_type: String,
    },

    #[error("Invalid target type '{target_type}' for apply rules of type '{source_type}'")]
    InvalidTargetType {
        source_type: String,
        target_type: String,
    },

    #[error("Apply rules of type '{source_type}' need an explicit target type (one of {candidates:?})")]
    AmbiguousTargetType {
        source_type: String,
        candidates: Vec<String>,
    },

    #[error("{message} ({debug_info})")]
    ForTermShape {
        message: &'static str,
        debug_info: DebugInfo,
    },

    #[error("An object of type '{type_name}' and name '{name}' already exists ({debug_info})")]
    DuplicateObject {
        type_name: String,
        name: String,
        debug_info: DebugInfo,
    },

    #[error("Invalid config item: {reason}")]
    InvalidItem {
        reason: String,
    },

    #[error("Invalid commit configuration: {reason}")]
    InvalidCommitConfig {
        reason: String,
    },

    #[error("Error while evaluating object '{name}' of type '{type_name}' ({debug_info}): {source}")]
    ItemEvaluation {
        type_name: String,
        name: String,
        debug_info: DebugInfo,
        #[source]
        source: EvaluationError,
    },
}

/// Errors raised while evaluating an expression against a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Tried to access undefined script variable '{name}'")]
    UndefinedVariable {
        name: String,
    },

    #[error("Cannot index a value of type '{type_name}'")]
    InvalidIndexer {
        type_name: &'static str,
    },

    #[error("Invalid index '{index}' for a value of type '{type_name}'")]
    InvalidIndex {
        index: String,
        type_name: &'static str,
    },

    #[error("Operator '{operator}' cannot be applied to '{left}' and '{right}'")]
    TypeMismatch {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("Cannot set field '{field}': no object in scope")]
    NoObjectInScope {
        field: String,
    },

    #[error("Invalid wildcard pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },
}

/// Storage errors from the atomic write path and the objects file.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{operation} failed for '{}': {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt objects file '{}': {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        reason: String,
    },

    #[error("No objects file is open")]
    NotOpen,
}

impl StorageError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Returns the OS error code of an I/O failure, if there is one.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Returns the file path involved in the failure, if known.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Io { path, .. } | Self::Corrupt { path, .. } => Some(path),
            Self::Serialization(_) | Self::NotOpen => None,
        }
    }
}

/// Top-level error type for confapply.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ApplyError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an evaluation error.
    #[must_use]
    pub const fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for confapply operations.
pub type ApplyResult<T> = Result<T, ApplyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_target_type_message() {
        let err = ConfigError::InvalidTargetType {
            source_type: "Dependency".to_string(),
            target_type: "Zone".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("Dependency"));
        assert!(msg.contains("Zone"));
    }

    #[test]
    fn test_for_term_shape_includes_location() {
        let err = ConfigError::ForTermShape {
            message: "Array iterator requires value to be an array.",
            debug_info: DebugInfo::new("deps.conf", 3, 1, 5, 2),
        };
        let msg = format!("{err}");
        assert!(msg.contains("Array iterator"));
        assert!(msg.contains("deps.conf"));
    }

    #[test]
    fn test_storage_error_keeps_os_code_and_path() {
        let err = StorageError::io(
            "rename",
            "/var/lib/objects",
            io::Error::from_raw_os_error(13),
        );
        assert_eq!(err.raw_os_error(), Some(13));
        assert_eq!(err.path(), Some(std::path::Path::new("/var/lib/objects")));
        assert!(format!("{err}").contains("rename failed"));
    }

    #[test]
    fn test_apply_error_classification() {
        let err: ApplyError = ConfigError::UnknownSourceType {
            source_type: "Nope".to_string(),
        }
        .into();
        assert!(err.is_config());
        assert!(!err.is_storage());

        let err: ApplyError = EvaluationError::UndefinedVariable {
            name: "x".to_string(),
        }
        .into();
        assert!(err.is_evaluation());

        let err: ApplyError = StorageError::Serialization("bad".to_string()).into();
        assert!(err.is_storage());

        let err = ApplyError::internal("unexpected state");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
