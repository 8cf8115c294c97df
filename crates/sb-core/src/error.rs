//! Unified error type for streambridge.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for HTTP handlers to derive a status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes of the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "session", "segment").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The media object does not describe a usable quality ladder.
    #[error("Quality ladder error: {0}")]
    Ladder(String),

    /// The fetch substrate failed to deliver bytes for a resource.
    #[error("Fetch error [{resource}]: {message}")]
    Fetch {
        /// Resource identifier the fetch was issued for.
        resource: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The operation was cancelled by its owner.
    #[error("Operation cancelled")]
    Cancelled,

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Ladder(_) => 422,
            Error::Fetch { .. } => 502,
            Error::Io { .. } => 500,
            Error::Cancelled => 499,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Fetch`].
    pub fn fetch(resource: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::Fetch {
            resource: resource.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("session", "abc-123");
        assert_eq!(err.to_string(), "session not found: abc-123");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("bad range".into());
        assert_eq!(err.to_string(), "Validation error: bad range");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn ladder_maps_to_unprocessable() {
        let err = Error::Ladder("no playlists".into());
        assert_eq!(err.http_status(), 422);
    }

    #[test]
    fn fetch_display() {
        let err = Error::fetch("video-1", "connection reset");
        assert_eq!(err.to_string(), "Fetch error [video-1]: connection reset");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn internal_display() {
        let err = Error::Internal("unexpected state".into());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
        assert_eq!(err.http_status(), 500);
    }
}
