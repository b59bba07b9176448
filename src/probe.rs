//! Remote metadata probing: content length, range support and an advertised checksum.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_RANGE, ETAG, RANGE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::transport::{ResponseHead, Transport};

/// Range requested by the probe: the first byte only
pub const PROBE_RANGE: &str = "bytes=0-0";

/// What the server told us about a URL
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    /// Total size in bytes, if the server reported one
    pub content_length: Option<u64>,
    /// The server answered a range request with 206 and a resolvable total
    pub supports_ranges: bool,
    /// Hex MD5 or SHA-256 digest of the whole file, from a header that carries one
    /// explicitly (`Repr-Digest`, `Digest`, `x-goog-hash`, `Content-MD5`)
    pub checksum: Option<String>,
    /// Strong ETag that looks like a hex digest. ETags are opaque validators, so this
    /// is only ever compared, never enforced.
    pub etag_digest: Option<String>,
}

impl RemoteMetadata {
    /// Length and range support are both known, so the download can be chunked
    pub fn is_chunkable(&self) -> bool {
        self.supports_ranges && self.content_length.is_some_and(|len| len > 0)
    }
}

/// Learn what we can about `url` without downloading it
///
/// Sends `GET` with `Range: bytes=0-0` first. A `206` carrying
/// `Content-Range: bytes 0-0/<total>` confirms range support. Anything else (transport
/// failure, another status, unparsable header) falls back to `HEAD` for the length alone.
/// Transport failures never escape: the result degrades to an unknown length.
pub async fn probe_metadata(
    transport: &dyn Transport,
    url: &str,
    headers: &HeaderMap,
) -> RemoteMetadata {
    let mut ranged = headers.clone();
    ranged.insert(RANGE, HeaderValue::from_static(PROBE_RANGE));

    match transport.get(url, &ranged).await {
        Ok(response) => {
            // Only the head matters; dropping the body aborts the transfer
            let head = response.head;
            if head.status == 206 {
                let total = head
                    .header(CONTENT_RANGE.as_str())
                    .and_then(parse_content_range_total);
                if let Some(total) = total {
                    let metadata = RemoteMetadata {
                        content_length: Some(total),
                        supports_ranges: true,
                        checksum: checksum_from_headers(&head),
                        etag_digest: etag_digest(&head),
                    };
                    debug!(url, total, "Range probe succeeded");
                    return metadata;
                }
                debug!(url, "Range probe returned 206 without a usable Content-Range");
            } else {
                debug!(url, status = head.status, "Server did not honor range probe");
            }
        }
        Err(e) => {
            debug!(url, error = %e, "Range probe failed, falling back to HEAD");
        }
    }

    match transport.head(url, headers).await {
        Ok(head) if head.is_success() => RemoteMetadata {
            content_length: head.content_length().filter(|&len| len > 0),
            supports_ranges: false,
            checksum: checksum_from_headers(&head),
            etag_digest: etag_digest(&head),
        },
        Ok(head) => {
            warn!(url, status = head.status, "HEAD request failed, size unknown");
            RemoteMetadata::default()
        }
        Err(e) => {
            warn!(url, error = %e, "HEAD request failed, size unknown");
            RemoteMetadata::default()
        }
    }
}

/// Total length from a `Content-Range` value such as `bytes 0-0/12345`
///
/// Returns None for an unknown total (`*`) or a malformed value.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok().filter(|&t: &u64| t > 0)
}

/// Whole-file digest advertised by the response headers, as lowercase hex
///
/// Reads `sha-256` and `md5` entries of `Repr-Digest`, `Digest` and `x-goog-hash`,
/// preferring SHA-256. `Content-MD5` describes the response body, so it only counts on
/// a response that is not partial.
pub fn checksum_from_headers(head: &ResponseHead) -> Option<String> {
    let mut md5 = None;
    for name in ["repr-digest", "digest", "x-goog-hash"] {
        let Some(value) = head.header(name) else {
            continue;
        };
        for (algorithm, encoded) in digest_entries(value) {
            match algorithm.as_str() {
                "sha-256" => {
                    if let Some(hex) = decode_digest(encoded, 32) {
                        return Some(hex);
                    }
                }
                "md5" => md5 = md5.or_else(|| decode_digest(encoded, 16)),
                _ => {}
            }
        }
    }

    if md5.is_none() && head.status != 206 {
        md5 = head
            .header("content-md5")
            .and_then(|value| decode_digest(value.trim(), 16));
    }
    md5
}

/// `algorithm=value` pairs of a digest header; `:b64:` wrapping is stripped
fn digest_entries(value: &str) -> impl Iterator<Item = (String, &str)> {
    value.split(',').filter_map(|entry| {
        let (algorithm, encoded) = entry.trim().split_once('=')?;
        Some((
            algorithm.trim().to_ascii_lowercase(),
            encoded.trim().trim_matches(':'),
        ))
    })
}

fn decode_digest(encoded: &str, digest_len: usize) -> Option<String> {
    BASE64
        .decode(encoded)
        .ok()
        .filter(|bytes| bytes.len() == digest_len)
        .map(hex::encode)
}

/// Strong ETag shaped like a bare MD5 or SHA-256 hex digest, lowercased
pub fn etag_digest(head: &ResponseHead) -> Option<String> {
    let etag = head.header(ETAG.as_str())?.trim();
    if etag.starts_with("W/") {
        return None;
    }
    let value = etag.trim_matches('"');
    let is_digest =
        matches!(value.len(), 32 | 64) && value.chars().all(|c| c.is_ascii_hexdigit());
    is_digest.then(|| value.to_ascii_lowercase())
}
