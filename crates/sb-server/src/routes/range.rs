//! Byte-range helpers: `Range` header parsing and chunked temp-file bodies.

use std::io::Seek;
use std::ops::Range;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use sb_fetch::substrate::OPEN_END;
use sb_fetch::SegmentChunk;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

const STREAM_CAPACITY: usize = 64 * 1024;

/// One `bytes=` range from a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRangeSpec {
    /// `bytes=START-END` or the open-ended `bytes=START-`. `end` is inclusive.
    From { start: u64, end: Option<u64> },
    /// `bytes=-N`: the last `N` bytes.
    Suffix(u64),
}

/// Parse a single-range `Range` header value.
///
/// Multi-range requests and other units are not supported and yield `None`.
pub fn parse_range_header(value: &str) -> Option<ByteRangeSpec> {
    let spec = value.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        return end.parse().ok().map(ByteRangeSpec::Suffix);
    }
    let start = start.parse().ok()?;
    let end = if end.is_empty() { None } else { Some(end.parse().ok()?) };
    Some(ByteRangeSpec::From { start, end })
}

/// A range that cannot be served for a resource of the given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsatisfiable;

/// Turn an optional `Range` header into a half-open byte range.
///
/// Missing or unparseable headers select the whole resource. The end is
/// clipped to `size` when it is known. A suffix range needs the size to be
/// placed, so without one it also selects the whole resource.
pub fn resolve_range(header: Option<&str>, size: Option<u64>) -> Result<Range<u64>, Unsatisfiable> {
    let full_end = size.unwrap_or(OPEN_END);
    let (start, end) = match header.and_then(parse_range_header) {
        None => return Ok(0..full_end),
        Some(ByteRangeSpec::Suffix(0)) => return Err(Unsatisfiable),
        Some(ByteRangeSpec::Suffix(len)) => match size {
            Some(size) => (size.saturating_sub(len), size),
            None => (0, full_end),
        },
        Some(ByteRangeSpec::From { start, end }) => (
            start,
            end.map(|e| e.saturating_add(1)).unwrap_or(OPEN_END).min(full_end),
        ),
    };

    if size.is_some_and(|size| start >= size) || start >= end {
        return Err(Unsatisfiable);
    }
    Ok(start..end)
}

/// `416` answer, advertising the size when it is known.
pub fn unsatisfiable_response(size: Option<u64>) -> Response {
    let content_range = match size {
        Some(size) => format!("bytes */{size}"),
        None => "bytes */*".to_string(),
    };
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [(header::CONTENT_RANGE.as_str(), content_range)],
        Body::empty(),
    )
        .into_response()
}

/// Stream a segment chunk to the client.
///
/// The temp file is deleted once the body has been sent or dropped.
pub fn chunk_response(
    chunk: SegmentChunk,
    content_type: &'static str,
    partial: bool,
) -> Result<Response, sb_core::Error> {
    let SegmentChunk {
        file,
        available,
        total_size,
    } = chunk;
    let length = available.end - available.start;

    let (mut std_file, temp_path) = file.into_parts();
    std_file.rewind()?;
    let limited = tokio::fs::File::from_std(std_file).take(length);
    let stream = ReaderStream::with_capacity(limited, STREAM_CAPACITY).map(move |piece| {
        let _owned = &temp_path;
        piece
    });
    let body = Body::from_stream(stream);

    let status = if partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let mut response = (
        status,
        [
            (header::CONTENT_TYPE.as_str(), content_type.to_string()),
            (header::CONTENT_LENGTH.as_str(), length.to_string()),
            (header::ACCEPT_RANGES.as_str(), "bytes".to_string()),
        ],
        body,
    )
        .into_response();

    if partial {
        let value = format!(
            "bytes {}-{}/{}",
            available.start,
            available.end.saturating_sub(1),
            total_size
        );
        if let Ok(value) = header::HeaderValue::from_str(&value) {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
    }
    Ok(response)
}
