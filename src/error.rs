//! Error types for steady-fetch
//!
//! This module provides the error handling for the library:
//! - [`Error`], the typed failure used inside the engine and returned by `queue`
//! - [`DownloadError`], the numeric code + message value stored alongside a failed download
//! - [`classify`], which maps any [`Error`] onto a [`DownloadError`]

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;

use crate::types::{DownloadId, Status};

/// Result type alias for steady-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Code reported for a download cancelled by the caller or by shutdown
pub const CODE_CANCELLED: u16 = 499;
/// Code reported when querying an id the engine does not know
pub const CODE_NOT_FOUND: u16 = 404;
/// Code reported for local validation and state errors
pub const CODE_BAD_REQUEST: u16 = 400;
/// Code reported for everything that is not otherwise classified
pub const CODE_INTERNAL: u16 = 500;

/// Main error type for steady-fetch
///
/// Transport, filesystem and validation failures all flow through this type. The
/// engine never lets it escape a download pipeline; it is classified into a
/// [`DownloadError`] and stored on the failed download instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Request parameters are invalid (bad url, blank file name, parallelism out of range)
    #[error("invalid request: {0}")]
    Validation(String),

    /// A download attempted a status transition the state machine forbids
    #[error("illegal status transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Status the download was in
        from: Status,
        /// Status that was requested
        to: Status,
    },

    /// Not enough free space in the destination directory
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the download
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to determine free space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// The server answered with a non-success status
    ///
    /// The rendered message always carries `HTTP <code>`, which [`classify`] parses.
    #[error("HTTP {status} while fetching {url}")]
    Http {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// A ranged chunk request was answered with something other than 206
    #[error("server answered status {status} to range request {range}")]
    RangeNotHonored {
        /// Response status code
        status: u16,
        /// The `Range` header that was sent
        range: String,
    },

    /// A chunk body ended before the chunk's byte range was filled
    #[error("chunk {chunk} ended after {received} of {expected} bytes")]
    TruncatedChunk {
        /// Chunk file name
        chunk: String,
        /// Bytes the chunk's range covers
        expected: u64,
        /// Bytes actually received
        received: u64,
    },

    /// Transport-level failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Assembled file does not match the expected checksum
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Assembled file
        path: PathBuf,
        /// Checksum the download was expected to have
        expected: String,
        /// Checksum computed from the file on disk
        actual: String,
    },

    /// The download was cancelled
    #[error("Download cancelled")]
    Cancelled,

    /// Download id is unknown to the engine
    #[error("download {0} not found")]
    NotFound(DownloadId),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short name of the failure kind, used when the rendered message is blank
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::InvalidTransition { .. } => "IllegalStateError",
            Error::InsufficientSpace { .. } => "StorageError",
            Error::DiskSpaceCheckFailed(_) => "StorageError",
            Error::Http { .. } => "NetworkError",
            Error::RangeNotHonored { .. } => "NetworkError",
            Error::TruncatedChunk { .. } => "NetworkError",
            Error::Network(_) => "NetworkError",
            Error::Io(_) => "IoError",
            Error::ChecksumMismatch { .. } => "ChecksumMismatchError",
            Error::Cancelled => "CancellationError",
            Error::NotFound(_) => "NotFoundError",
            Error::ShuttingDown => "ShuttingDownError",
            Error::Other(_) => "Error",
        }
    }

    /// True for failures caused by local validation or an illegal state
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::InvalidTransition { .. } | Error::InsufficientSpace { .. }
        )
    }

    /// Numeric code this error classifies to
    pub fn code(&self) -> u16 {
        classify(self).code
    }
}

/// Code and message describing why a download failed
///
/// This is a plain value, stored next to a `Failed` status and returned from `query`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadError {
    /// Numeric code (HTTP status, 499 for cancellation, 400/500 for local/other failures)
    pub code: u16,
    /// Human-readable description
    pub message: String,
}

impl DownloadError {
    /// Create a new DownloadError
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error reported for a download cancelled by the caller
    pub fn cancelled_by_user() -> Self {
        Self::new(CODE_CANCELLED, "Download cancelled by user")
    }

    /// Synthetic error reported when querying an unknown id
    pub fn not_found(id: DownloadId) -> Self {
        Self::new(CODE_NOT_FOUND, format!("Download {} not found", id))
    }
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl From<&Error> for DownloadError {
    fn from(error: &Error) -> Self {
        classify(error)
    }
}

/// `HTTP` + whitespace + exactly three digits
#[allow(clippy::expect_used)]
static HTTP_STATUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"HTTP\s+(\d{3})(?:\D|$)").expect("HTTP status pattern is a valid literal")
});

/// Extract the status code from a message containing `HTTP <3 digits>`
pub fn http_status_in(message: &str) -> Option<u16> {
    HTTP_STATUS_PATTERN
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Map a failure onto a [`DownloadError`]
///
/// Rules, in priority order:
/// 1. cancellation → 499, "Download cancelled"
/// 2. message contains `HTTP <3 digits>` → that code, message preserved
/// 3. local validation / state error → 400
/// 4. anything else → 500
pub fn classify(error: &Error) -> DownloadError {
    if matches!(error, Error::Cancelled) {
        return DownloadError::new(CODE_CANCELLED, "Download cancelled");
    }

    let rendered = error.to_string();
    let message = if rendered.trim().is_empty() {
        error.kind_name().to_string()
    } else {
        rendered
    };

    if let Some(code) = http_status_in(&message) {
        return DownloadError::new(code, message);
    }

    let code = match error {
        Error::NotFound(_) => CODE_NOT_FOUND,
        Error::ShuttingDown => 503,
        e if e.is_local() => CODE_BAD_REQUEST,
        _ => CODE_INTERNAL,
    };
    DownloadError::new(code, message)
}
