//! Unified error types for the nsshift workspace.
//!
//! One enum covers the whole mapping pipeline: reading the id databases,
//! validating a map set, and rewriting a filesystem tree. Advisory
//! conditions (a capability that cannot be re-applied) are logged at the
//! point of failure and never reach this type.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ShiftError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A line in an id database had the wrong shape.
    #[error("unexpected values in {path}: {line:?}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// The offending line.
        line: String,
    },

    /// The shadow files exist but hold no record for the user.
    #[error("no map found for user {user:?}")]
    NoUserMap {
        /// User the lookup was for.
        user: String,
    },

    /// A namespace map file exists but yielded zero records.
    #[error("namespace doesn't have any map set in {path}")]
    EmptyMap {
        /// File that was read.
        path: PathBuf,
    },

    /// The calling user could not be resolved from the user database.
    #[error("cannot resolve user: {name}")]
    UnknownUser {
        /// Name or uid that failed to resolve.
        name: String,
    },

    /// A map entry is zero-length or collides with another entry.
    #[error("invalid id mapping entry: {entry}")]
    RangeInvariant {
        /// Canonical form of the offending entry.
        entry: String,
    },

    /// A map entry references host ids outside the delegated ranges.
    #[error("id mapping entry {entry} isn't usable in the current namespace")]
    Unusable {
        /// Canonical form of the offending entry.
        entry: String,
    },

    /// Serialization or deserialization of a persisted map failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl ShiftError {
    /// Wraps an I/O error with the path it occurred on.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ShiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_user_map_display_names_user() {
        let err = ShiftError::NoUserMap {
            user: "alice".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("alice"));
    }

    #[test]
    fn parse_error_display_path_and_line() {
        let err = ShiftError::Parse {
            path: "/etc/subuid".into(),
            line: "root:100000".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("/etc/subuid"));
        assert!(msg.contains("root:100000"));
    }

    #[test]
    fn io_helper_keeps_path() {
        let err = ShiftError::io(
            "/tmp/rootfs",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(format!("{err}").contains("/tmp/rootfs"));
    }

    #[test]
    fn serialization_error_from_serde_json() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ShiftError = serde_err.into();
        assert!(matches!(err, ShiftError::Serialization { .. }));
    }
}
