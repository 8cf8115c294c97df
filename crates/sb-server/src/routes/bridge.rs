//! Per-session bridge routes: `/{session_id}/{file}`.
//!
//! The file name selects what is served: the master manifest, a level
//! playlist, a segment, or a static asset.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use sb_core::{Error, MediaId, SessionId};
use sb_media::{parse_level_playlist_path, parse_segment_path};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::range::{chunk_response, resolve_range, unsatisfiable_response};
use crate::source::StreamingSource;

const MASTER_MANIFEST: &str = "master.m3u8";
const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp4";

/// `GET /{session_id}/{file}`
pub async fn session_file(
    State(ctx): State<AppContext>,
    Path((session_id, file)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id: SessionId = session_id
        .parse()
        .map_err(|_| Error::not_found("session", &session_id))?;
    let source = ctx
        .registry
        .get(&id)
        .ok_or_else(|| Error::not_found("session", id))?;

    if file == MASTER_MANIFEST {
        return Ok(playlist_response(source.master_manifest()));
    }

    if let Some(height) = parse_level_playlist_path(&file) {
        return match source.quality_playlist(height).await {
            Some(text) => Ok(playlist_response(text)),
            None => Err(Error::not_found("quality level", height).into()),
        };
    }

    if let Some(segment) = parse_segment_path(&file) {
        let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
        return serve_segment(&source, segment, range).await;
    }

    match source.static_asset(&file) {
        Some(asset) => Ok(([(header::CONTENT_TYPE, asset.content_type)], asset.bytes).into_response()),
        None => Err(Error::not_found("asset", file).into()),
    }
}

fn playlist_response(text: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        text,
    )
        .into_response()
}

async fn serve_segment(
    source: &Arc<StreamingSource>,
    segment: MediaId,
    range_header: Option<&str>,
) -> Result<Response, AppError> {
    if !source.has_segment(segment) {
        return Err(Error::not_found("segment", segment).into());
    }
    let size = source.segment_size(segment);
    let Ok(range) = resolve_range(range_header, size) else {
        return Ok(unsatisfiable_response(size));
    };

    let mut request = source
        .segment_bytes(segment, range.clone())
        .ok_or_else(|| Error::not_found("segment", segment))?;

    // Dropping this future (client gone) drops and disposes the request.
    let Some(chunk) = request.wait().await else {
        tracing::debug!(
            session_id = %source.session_id(),
            segment = %segment,
            range = ?range,
            "Segment range resolved to nothing"
        );
        if range_header.is_some() {
            return Ok(unsatisfiable_response(size));
        }
        return Err(Error::not_found("segment", segment).into());
    };

    tracing::trace!(
        session_id = %source.session_id(),
        segment = %segment,
        available = ?chunk.available,
        "Serving segment"
    );
    Ok(chunk_response(chunk, SEGMENT_CONTENT_TYPE, range_header.is_some())?)
}
