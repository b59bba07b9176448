//! Chunk fetching: one GET per chunk, streamed into its own chunk file.

use reqwest::header::{HeaderMap, HeaderValue, RANGE};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::transport::Transport;
use crate::types::{DownloadChunk, Status};

/// Size of each body read
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Everything one chunk fetch needs to know
#[derive(Clone, Copy, Debug)]
pub struct ChunkFetch<'a> {
    /// Remote URL
    pub url: &'a str,
    /// Request headers (without `Range`; it is derived from the chunk)
    pub headers: &'a HeaderMap,
    /// Chunk to fetch
    pub chunk: &'a DownloadChunk,
    /// Position of the chunk in the tracker
    pub index: usize,
    /// Chunk file to write; truncated if it already exists
    pub destination: &'a Path,
    /// Total size of the download, used when neither the response nor the chunk
    /// declares a size
    pub total_bytes: Option<u64>,
}

impl ChunkFetch<'_> {
    fn request_headers(&self) -> Result<HeaderMap> {
        let mut headers = self.headers.clone();
        if let Some(range) = self.chunk.range_header() {
            let value = HeaderValue::from_str(&range)
                .map_err(|e| Error::Other(format!("invalid range header '{}': {}", range, e)))?;
            headers.insert(RANGE, value);
        }
        Ok(headers)
    }
}

/// Fetch one chunk into its chunk file, reporting progress after every read
///
/// Returns the number of bytes written. A ranged chunk never receives more than its
/// range; a `200` answer is only usable for a chunk starting at offset 0, whose
/// leading bytes are kept. Cancellation is observed while waiting for the
/// response and between reads; the partially written chunk file is left in place.
///
/// # Errors
///
/// - [`Error::Cancelled`] when `cancel` fires
/// - [`Error::Http`] for a non-2xx response (message carries `HTTP <code>`)
/// - [`Error::RangeNotHonored`] when a chunk past offset 0 gets anything but 206
/// - [`Error::TruncatedChunk`] when the body ends before the range is filled
/// - [`Error::Network`] / [`Error::Io`] for transport and filesystem failures
pub async fn fetch_chunk(
    transport: &dyn Transport,
    fetch: ChunkFetch<'_>,
    tracker: &ProgressTracker,
    cancel: &CancellationToken,
) -> Result<u64> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let headers = fetch.request_headers()?;
    tracker.mark_status(fetch.index, Status::Running);
    debug!(
        chunk = %fetch.chunk.name,
        start = ?fetch.chunk.start,
        end = ?fetch.chunk.end,
        "Fetching chunk"
    );

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        response = transport.get(fetch.url, &headers) => response?,
    };

    if !response.head.is_success() {
        return Err(Error::Http {
            status: response.head.status,
            url: fetch.url.to_string(),
        });
    }

    // A ranged chunk owns exactly its range; never write past it
    let range_len = fetch.chunk.len();
    let expected: Option<u64> = if response.head.status == 206 || range_len.is_none() {
        response
            .head
            .content_length()
            .or(range_len)
            .or(fetch.total_bytes)
    } else if fetch.chunk.start == Some(0) {
        // A full body still begins with this chunk's bytes
        debug!(
            chunk = %fetch.chunk.name,
            status = response.head.status,
            "Range ignored, keeping the leading bytes"
        );
        range_len
    } else {
        return Err(Error::RangeNotHonored {
            status: response.head.status,
            range: fetch.chunk.range_header().unwrap_or_default(),
        });
    };
    let expected = expected.filter(|&e| e > 0);

    let mut body = response.body;
    let mut file = tokio::fs::File::create(fetch.destination).await?;
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut downloaded = 0u64;

    loop {
        let want = match range_len {
            Some(len) if downloaded >= len => break,
            Some(len) => buffer.len().min((len - downloaded) as usize),
            None => buffer.len(),
        };
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            read = body.read(&mut buffer[..want]) => read?,
        };
        if read == 0 {
            break;
        }

        file.write_all(&buffer[..read]).await?;
        downloaded += read as u64;
        tracker.update(fetch.index, downloaded, expected);
        trace!(chunk = %fetch.chunk.name, downloaded, "Chunk progress");
    }

    if let Some(len) = range_len
        && downloaded < len
    {
        return Err(Error::TruncatedChunk {
            chunk: fetch.chunk.name.clone(),
            expected: len,
            received: downloaded,
        });
    }

    file.flush().await?;
    tracker.complete(fetch.index, downloaded, expected);

    debug!(chunk = %fetch.chunk.name, bytes = downloaded, "Chunk finished");
    Ok(downloaded)
}
