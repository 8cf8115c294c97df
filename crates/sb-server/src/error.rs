//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`sb_core::Error`] so that route handlers
//! can return `Result<T, AppError>` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: sb_core::Error,
}

impl AppError {
    pub fn new(inner: sb_core::Error) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &sb_core::Error {
        &self.inner
    }
}

impl From<sb_core::Error> for AppError {
    fn from(e: sb_core::Error) -> Self {
        Self::new(e)
    }
}

impl From<sb_media::LadderError> for AppError {
    fn from(e: sb_media::LadderError) -> Self {
        Self::new(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in bridge handler"
            );
        }

        let code = match &self.inner {
            sb_core::Error::NotFound { .. } => "not_found",
            sb_core::Error::Validation(_) => "validation_error",
            sb_core::Error::Ladder(_) => "ladder_incomplete",
            sb_core::Error::Fetch { .. } => "fetch_error",
            sb_core::Error::Io { .. } => "io_error",
            sb_core::Error::Cancelled => "cancelled",
            sb_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.inner.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
