//! Common test utilities for steady-fetch integration tests

#![allow(dead_code)]

use std::time::Duration;
use steady_fetch::{Config, DownloadId, DownloadSnapshot, SteadyFetch};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Path every test file is served under
pub const FILE_PATH: &str = "/files/payload.bin";

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Answers `Range: bytes=a-b` with 206 and the slice, anything else with the whole body
#[derive(Default)]
pub struct RangeResponder {
    pub content: Vec<u8>,
    /// Headers added to every response (ETag, Repr-Digest, ...)
    pub headers: Vec<(&'static str, String)>,
    /// Delay applied to every request except the `bytes=0-0` probe
    pub delay: Option<Duration>,
    /// Confirm the `bytes=0-0` probe but answer every other range with the whole body
    pub ignore_chunk_ranges: bool,
}

fn requested_range(request: &Request) -> Option<(usize, usize)> {
    let value = request.headers.get("range")?.to_str().ok()?;
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let is_probe = requested_range(request) == Some((0, 0));
        let range = requested_range(request).filter(|_| is_probe || !self.ignore_chunk_ranges);
        let mut template = match range {
            Some((start, end)) if start < self.content.len() => {
                let end = end.min(self.content.len() - 1);
                ResponseTemplate::new(206)
                    .insert_header(
                        "content-range",
                        format!("bytes {}-{}/{}", start, end, self.content.len()).as_str(),
                    )
                    .set_body_bytes(self.content[start..=end].to_vec())
            }
            Some(_) => ResponseTemplate::new(416),
            None => ResponseTemplate::new(200).set_body_bytes(self.content.clone()),
        };
        for (name, value) in &self.headers {
            template = template.insert_header(*name, value.as_str());
        }
        match self.delay {
            Some(delay) if !is_probe => template.set_delay(delay),
            _ => template,
        }
    }
}

/// Mock server that serves `content` at [`FILE_PATH`] with range support
pub async fn range_server(content: &[u8]) -> MockServer {
    serve(RangeResponder {
        content: content.to_vec(),
        ..RangeResponder::default()
    })
    .await
}

/// Mock server answering GETs at [`FILE_PATH`] with `responder`
pub async fn serve(responder: RangeResponder) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(responder)
        .mount(&server)
        .await;
    server
}

/// Mock server that ignores `Range` and always sends the whole file
pub async fn plain_server(content: &[u8]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&server)
        .await;
    server
}

/// Engine over the real HTTP transport, without the disk space check
pub fn engine() -> SteadyFetch {
    let mut config = Config::default();
    config.download.progress_interval_ms = 20;
    config.disk_space.enabled = false;
    SteadyFetch::new(config).unwrap()
}

/// Poll until the download finishes (panics after 15 seconds)
pub async fn wait_for_terminal(engine: &SteadyFetch, id: DownloadId) -> DownloadSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let snapshot = engine.query(id).await;
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "download {id} did not finish: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
