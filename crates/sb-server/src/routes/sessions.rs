//! Session management routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sb_core::{MediaObject, SessionId};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::registry::SessionInfo;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    /// Path of the session's master manifest.
    pub master: String,
}

/// `POST /sessions`
pub async fn create_session(
    State(ctx): State<AppContext>,
    Json(media): Json<MediaObject>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let session_id = ctx.registry.register(media)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            master: format!("/{session_id}/master.m3u8"),
        }),
    ))
}

/// `GET /sessions`
pub async fn list_sessions(State(ctx): State<AppContext>) -> Json<Vec<SessionInfo>> {
    Json(ctx.registry.list())
}

/// `DELETE /sessions/{session_id}`
pub async fn delete_session(
    State(ctx): State<AppContext>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: SessionId = session_id
        .parse()
        .map_err(|_| sb_core::Error::not_found("session", &session_id))?;
    if ctx.registry.unregister(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(sb_core::Error::not_found("session", id).into())
    }
}
