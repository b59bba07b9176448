//! HTTP transport seam: the engine talks to servers only through [`Transport`].
//!
//! [`HttpTransport`] is the reqwest-backed default. Tests substitute a scripted
//! implementation to drive failure and cancellation paths without a network.

use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use std::collections::HashMap;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::config::HttpConfig;
use crate::error::{Error, Result};

/// Response body as a byte stream
pub type ResponseBody = Pin<Box<dyn AsyncRead + Send>>;

/// Status line and headers of a response
#[derive(Clone, Debug, Default)]
pub struct ResponseHead {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Create a response head
    pub fn new(status: u16, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    /// 2xx status (206 included)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value as text, if present and valid ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parsed `Content-Length`
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

/// A GET response: head plus streaming body
pub struct TransportResponse {
    /// Status and headers
    pub head: ResponseHead,
    /// Body stream; dropping it aborts the underlying request
    pub body: ResponseBody,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// Abstraction over HTTP requests, enabling testability.
///
/// Implementations must not treat non-2xx statuses as errors; callers inspect
/// [`ResponseHead::status`] themselves. Each call is cancelled by dropping its future
/// (or the returned body).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Metadata-only request (HEAD)
    async fn head(&self, url: &str, headers: &HeaderMap) -> Result<ResponseHead>;

    /// GET with a streaming body
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<TransportResponse>;
}

/// Production [`Transport`] backed by a shared `reqwest::Client`.
///
/// The client's connection pool is shared by every download of the engine.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with the configured timeouts and user agent
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the TLS backend cannot be initialised.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn head(&self, url: &str, headers: &HeaderMap) -> Result<ResponseHead> {
        let response = self.client.head(url).headers(headers.clone()).send().await?;
        Ok(ResponseHead::new(
            response.status().as_u16(),
            response.headers().clone(),
        ))
    }

    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<TransportResponse> {
        let response = self.client.get(url).headers(headers.clone()).send().await?;
        let head = ResponseHead::new(response.status().as_u16(), response.headers().clone());
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(TransportResponse {
            head,
            body: Box::pin(StreamReader::new(stream)),
        })
    }
}

/// Convert request headers into a `HeaderMap`
///
/// # Errors
///
/// Returns [`Error::Validation`] for a header name or value HTTP cannot carry.
pub fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| Error::Validation(format!("invalid header name '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Validation(format!("invalid value for header '{}': {}", key, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}
