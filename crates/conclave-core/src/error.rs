//! Error taxonomy for Conclave.
//!
//! Core layers return [`Error`] upward; only the HTTP surface maps variants
//! to status codes. Variants are grouped by what the caller can do about
//! them: fix the request (`Validation`, `NotFound`, `Conflict`), wait and
//! retry (`BackendUnavailable`, `Transient`), or file a bug (`Internal`).

use thiserror::Error;

/// Top-level error type for the Conclave services.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Bad input from an API caller. No state was changed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown agent, task, tool, or model.
    #[error("not found: {0}")]
    NotFound(String),

    /// Dependency cycle, duplicate start, or an illegal state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A model backend failed to load or a tool dependency is missing.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Store or broker I/O blip. Retry at the caller's discretion.
    #[error("transient error: {0}")]
    Transient(String),

    /// Invariant violation. Logged with context where it occurs.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Transient(format!("sqlite: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("json: {e}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transient(format!("io: {e}"))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = Error::Conflict("task t1 already completed".into());
        assert_eq!(err.to_string(), "conflict: task t1 already completed");

        let err = Error::NotFound("agent abc".into());
        assert_eq!(err.to_string(), "not found: agent abc");
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Transient(_)));
        assert!(err.to_string().contains("reset"));
    }

    #[test]
    fn test_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_result_alias() {
        fn fails() -> Result<()> {
            Err(Error::Validation("empty title".into()))
        }
        assert!(fails().is_err());
    }
}
