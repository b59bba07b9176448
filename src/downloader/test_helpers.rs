//! Shared test helpers: a scripted in-memory transport and engine constructors.

use crate::config::Config;
use crate::downloader::SteadyFetch;
use crate::error::{Error, Result};
use crate::transport::{ResponseHead, Transport, TransportResponse};
use crate::types::{DownloadId, DownloadSnapshot};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, ETAG, HeaderMap, HeaderValue, RANGE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// In-memory "server" for one file.
///
/// Answers range probes and ranged GETs from `content`, and can be scripted to fail or
/// stall specific chunks.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    pub(crate) content: Vec<u8>,
    /// Answer `Range` requests with 206
    pub(crate) supports_ranges: bool,
    /// Send Content-Length on HEAD and full responses
    pub(crate) advertise_length: bool,
    /// ETag returned on every response
    pub(crate) etag: Option<String>,
    /// Extra headers (digests) returned on every response
    pub(crate) extra_headers: Vec<(&'static str, String)>,
    /// Confirm ranges on the probe but answer chunk GETs with the whole file
    pub(crate) ignore_chunk_ranges: bool,
    /// Time every non-probe GET spends before answering
    pub(crate) chunk_delay: Option<Duration>,
    /// Non-probe GETs currently waiting out `chunk_delay`
    pub(crate) in_flight: AtomicUsize,
    /// Highest `in_flight` seen
    pub(crate) peak_in_flight: AtomicUsize,
    /// Chunk start offset → status to answer that chunk's GET with
    pub(crate) fail_at: HashMap<u64, u16>,
    /// Chunk start offsets whose body never finishes
    pub(crate) stall_at: Vec<u64>,
    /// Stall whole-file (non-ranged) GETs
    pub(crate) stall_whole: bool,
    /// Every transport call fails with a connection error
    pub(crate) unreachable: bool,
    /// `Range` header of every GET, in arrival order (None for whole-file GETs)
    pub(crate) requests: Mutex<Vec<Option<String>>>,
    /// Writers of stalled bodies, kept alive so reads pend until the transport drops
    pub(crate) stalled: Mutex<Vec<tokio::io::DuplexStream>>,
}

impl ScriptedTransport {
    /// Range-capable server for `content`
    pub(crate) fn ranged(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            supports_ranges: true,
            advertise_length: true,
            ..Self::default()
        }
    }

    /// Server that ignores `Range` and always sends the whole file
    pub(crate) fn whole(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            supports_ranges: false,
            advertise_length: true,
            ..Self::default()
        }
    }

    /// Range headers of the non-probe GETs received so far
    pub(crate) fn chunk_requests(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_deref() != Some(crate::probe::PROBE_RANGE))
            .cloned()
            .collect()
    }

    fn base_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(etag) = &self.etag {
            headers.insert(ETAG, HeaderValue::from_str(etag).unwrap());
        }
        for (name, value) in &self.extra_headers {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    fn respond(&self, status: u16, mut headers: HeaderMap, body: Vec<u8>) -> TransportResponse {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
        TransportResponse {
            head: ResponseHead::new(status, headers),
            body: Box::pin(std::io::Cursor::new(body)),
        }
    }

    fn stalled(&self, status: u16) -> TransportResponse {
        let (reader, writer) = tokio::io::duplex(64);
        self.stalled.lock().unwrap().push(writer);
        TransportResponse {
            head: ResponseHead::new(status, self.base_headers()),
            body: Box::pin(reader),
        }
    }
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn head(&self, _url: &str, _headers: &HeaderMap) -> Result<ResponseHead> {
        if self.unreachable {
            return Err(Error::Other("connection refused".to_string()));
        }
        let mut headers = self.base_headers();
        if self.advertise_length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(self.content.len() as u64));
        }
        Ok(ResponseHead::new(200, headers))
    }

    async fn get(&self, _url: &str, headers: &HeaderMap) -> Result<TransportResponse> {
        if self.unreachable {
            return Err(Error::Other("connection refused".to_string()));
        }

        let range = headers
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push(range.clone());

        let is_probe = range.as_deref() == Some(crate::probe::PROBE_RANGE);
        if !is_probe && let Some(delay) = self.chunk_delay {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let Some((start, end)) = range.as_deref().and_then(parse_range) else {
            if self.stall_whole {
                return Ok(self.stalled(200));
            }
            return Ok(self.respond(200, self.base_headers(), self.content.clone()));
        };

        if !self.supports_ranges || (self.ignore_chunk_ranges && !is_probe) {
            return Ok(self.respond(200, self.base_headers(), self.content.clone()));
        }
        // The probe is never scripted to fail, only chunk fetches are
        if !is_probe && let Some(&status) = self.fail_at.get(&start) {
            return Ok(self.respond(status, HeaderMap::new(), Vec::new()));
        }
        if !is_probe && self.stall_at.contains(&start) {
            return Ok(self.stalled(206));
        }

        let last = self.content.len().saturating_sub(1) as u64;
        let end = end.min(last);
        let body = self.content[start as usize..=end as usize].to_vec();
        let mut response_headers = self.base_headers();
        response_headers.insert(
            CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, self.content.len()))
                .unwrap(),
        );
        Ok(self.respond(206, response_headers, body))
    }
}

/// Deterministic test payload of `len` bytes
pub(crate) fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Config with fast progress reporting and no disk space check
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.download.progress_interval_ms = 10;
    config.disk_space.enabled = false;
    config
}

/// Helper to create a test engine over `transport`.
/// Returns the engine and the tempdir (which must be kept alive).
pub(crate) fn create_test_engine(
    transport: Arc<ScriptedTransport>,
) -> (SteadyFetch, tempfile::TempDir) {
    create_test_engine_with_config(transport, test_config())
}

pub(crate) fn create_test_engine_with_config(
    transport: Arc<ScriptedTransport>,
    config: Config,
) -> (SteadyFetch, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let engine = SteadyFetch::with_transport(config, transport);
    (engine, temp_dir)
}

/// Poll until the download reaches a terminal status (panics after 10 seconds)
pub(crate) async fn wait_for_terminal(engine: &SteadyFetch, id: DownloadId) -> DownloadSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let snapshot = engine.query(id).await;
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "download {id} did not finish, last status {:?}",
            snapshot.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until `predicate` holds for the download's snapshot (panics after 10 seconds)
pub(crate) async fn wait_until(
    engine: &SteadyFetch,
    id: DownloadId,
    predicate: impl Fn(&DownloadSnapshot) -> bool,
) -> DownloadSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let snapshot = engine.query(id).await;
        if predicate(&snapshot) {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached for download {id}, last snapshot {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
