//! HTTP substrate: ranged GETs against a remote origin.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use sb_core::{Error, ResourceId, Result};
use tokio::sync::mpsc;

use crate::memory::MemoryCache;
use crate::substrate::{deliver, FetchRequest, FetchSubstrate, FetchedChunk, OPEN_END};

/// Fetches `{base_url}/{resource_id}` with `Range` requests.
///
/// Every chunk that arrives is also stored in a shared [`MemoryCache`], which
/// backs [`FetchSubstrate::cached_slice`].
pub struct HttpSubstrate {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<MemoryCache>,
    chunk_size: usize,
}

impl HttpSubstrate {
    pub fn new(base_url: &str, cache: Arc<MemoryCache>, chunk_size: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            cache,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn cache(&self) -> &Arc<MemoryCache> {
        &self.cache
    }

    fn url(&self, resource: &ResourceId) -> String {
        format!("{}/{}", self.base_url, resource.as_str().trim_start_matches('/'))
    }
}

/// `Range` header value for a half-open range.
fn range_header(range: &Range<u64>) -> String {
    if range.end == OPEN_END {
        format!("bytes={}-", range.start)
    } else {
        format!("bytes={}-{}", range.start, range.end.saturating_sub(1))
    }
}

/// Parse `bytes <start>-<end>/<total>` into `(start, total)`.
///
/// The total is `None` when the origin answers with `*`.
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (start, _end) = span.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start, total))
}

#[async_trait]
impl FetchSubstrate for HttpSubstrate {
    fn cached_slice(&self, resource: &ResourceId, size: Option<u64>, range: Range<u64>) -> Option<Bytes> {
        self.cache.get(resource, size, range)
    }

    async fn fetch(&self, request: FetchRequest, sink: mpsc::Sender<FetchedChunk>) -> Result<()> {
        let id = request.resource.id.clone();
        if request.range.start >= request.range.end {
            return Ok(());
        }

        let send = self
            .client
            .get(self.url(&id))
            .header(RANGE, range_header(&request.range))
            .send();
        let response = tokio::select! {
            _ = request.cancel.cancelled() => return Err(Error::Cancelled),
            r = send => r.map_err(|e| Error::fetch(&id, e.to_string()))?,
        };

        let status = response.status();
        let (mut offset, mut total) = match status {
            StatusCode::PARTIAL_CONTENT => response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range)
                .ok_or_else(|| Error::fetch(&id, "206 without a usable Content-Range"))?,
            StatusCode::OK => {
                let length = response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                (0, length)
            }
            StatusCode::RANGE_NOT_SATISFIABLE => return Ok(()),
            other => return Err(Error::fetch(&id, format!("origin answered {other}"))),
        };
        total = total.or(request.resource.size);
        let end = request.range.end.min(total.unwrap_or(OPEN_END));

        tracing::debug!(resource = %id, %status, offset, ?total, "Origin response");

        let mut body = response.bytes_stream();
        loop {
            let next = tokio::select! {
                _ = request.cancel.cancelled() => return Err(Error::Cancelled),
                next = body.next() => next,
            };
            let Some(piece) = next else {
                break;
            };
            let mut data = piece.map_err(|e| Error::fetch(&id, e.to_string()))?;

            while !data.is_empty() {
                let take = data.len().min(self.chunk_size);
                let part = data.split_to(take);
                let part_range = offset..offset + part.len() as u64;
                offset = part_range.end;

                // A plain 200 starts at byte zero; skip what precedes the request.
                if part_range.end <= request.range.start {
                    continue;
                }
                let skip = request.range.start.saturating_sub(part_range.start) as usize;
                let part = part.slice(skip..);
                let chunk_offset = part_range.start + skip as u64;

                self.cache.insert(&id, chunk_offset, part.clone(), total);
                let chunk = FetchedChunk {
                    offset: chunk_offset,
                    data: part,
                    total_size: total,
                };
                if !deliver(&sink, &request.cancel, chunk).await {
                    return Ok(());
                }
            }

            if offset >= end {
                break;
            }
        }

        if total.is_none() && request.range.end == OPEN_END {
            // Origin never told us the size; the stream ending marks it.
            total = Some(offset);
            let _ = deliver(
                &sink,
                &request.cancel,
                FetchedChunk {
                    offset,
                    data: Bytes::new(),
                    total_size: total,
                },
            )
            .await;
        }
        Ok(())
    }
}
