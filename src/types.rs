//! Core types for steady-fetch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{DownloadError, Error, Result};

/// Upper bound for [`DownloadRequest::max_parallel_chunks`]
pub const MAX_PARALLEL_CHUNKS: usize = 30;

/// Unique identifier for a download
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub u64);

impl DownloadId {
    /// Create a new DownloadId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for DownloadId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<DownloadId> for u64 {
    fn from(id: DownloadId) -> Self {
        id.0
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DownloadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Download (and chunk) status
///
/// Transitions only move forward: `Queued → Running → {Success | Failed}`, plus
/// `Queued → Failed` for downloads cancelled or rejected before they start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Queued and waiting to start
    Queued,
    /// Currently downloading or assembling
    Running,
    /// Successfully completed
    Success,
    /// Failed, cancelled, or rejected
    Failed,
}

impl Status {
    /// Success or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Queued, Status::Running)
                | (Status::Queued, Status::Failed)
                | (Status::Running, Status::Success)
                | (Status::Running, Status::Failed)
        )
    }

    /// Validate and perform a transition, returning the new status
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] for anything the state machine forbids,
    /// including any move out of a terminal status.
    pub fn transition(self, next: Status) -> Result<Status> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Immutable description of a download to perform
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Remote URL (http or https)
    pub url: String,
    /// Extra request headers sent with every probe and chunk request
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Maximum concurrent chunk fetches (1..=[`MAX_PARALLEL_CHUNKS`])
    pub max_parallel_chunks: usize,
    /// Directory the final file (and its chunk files) are written to
    pub destination_dir: PathBuf,
    /// Name of the final file
    pub file_name: String,
    /// Expected MD5 or SHA-256 hex digest; overrides any checksum advertised by the server
    #[serde(default)]
    pub expected_checksum: Option<String>,
    /// Chunk size in bytes; overrides the size-tiered default
    #[serde(default)]
    pub preferred_chunk_size: Option<u64>,
}

impl DownloadRequest {
    /// Create a request with 4 parallel chunks and no extra headers
    pub fn new(
        url: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            max_parallel_chunks: 4,
            destination_dir: destination_dir.into(),
            file_name: file_name.into(),
            expected_checksum: None,
            preferred_chunk_size: None,
        }
    }

    /// Add a request header (replaces an existing value for the same key)
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the maximum number of concurrent chunk fetches
    #[must_use]
    pub fn with_max_parallel_chunks(mut self, max_parallel_chunks: usize) -> Self {
        self.max_parallel_chunks = max_parallel_chunks;
        self
    }

    /// Set the checksum the assembled file must match
    #[must_use]
    pub fn with_expected_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    /// Override the chunk size
    #[must_use]
    pub fn with_preferred_chunk_size(mut self, bytes: u64) -> Self {
        self.preferred_chunk_size = Some(bytes);
        self
    }

    /// Full path of the final file
    pub fn destination_path(&self) -> PathBuf {
        self.destination_dir.join(&self.file_name)
    }

    /// Check the parameters `queue` rejects up front
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when parallelism is out of range, the file name is
    /// blank, or the URL is not an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_chunks < 1 || self.max_parallel_chunks > MAX_PARALLEL_CHUNKS {
            return Err(Error::Validation(format!(
                "max_parallel_chunks must be between 1 and {}, got {}",
                MAX_PARALLEL_CHUNKS, self.max_parallel_chunks
            )));
        }
        if self.file_name.trim().is_empty() {
            return Err(Error::Validation("file name must not be blank".to_string()));
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| Error::Validation(format!("invalid url '{}': {}", self.url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Validation(format!(
                "unsupported url scheme '{}'",
                parsed.scheme()
            )));
        }
        Ok(())
    }
}

/// One contiguous byte range of the target file, stored in its own chunk file
///
/// `start`/`end` are inclusive. Both unset means "fetch the whole file".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadChunk {
    /// Chunk file name, unique within a download
    pub name: String,
    /// First byte (inclusive)
    pub start: Option<u64>,
    /// Last byte (inclusive)
    pub end: Option<u64>,
}

impl DownloadChunk {
    /// A ranged chunk covering `start..=end`
    pub fn ranged(name: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            name: name.into(),
            start: Some(start),
            end: Some(end),
        }
    }

    /// A chunk fetched without a `Range` header
    pub fn whole_file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            end: None,
        }
    }

    /// Number of bytes in the declared range, if any
    pub fn len(&self) -> Option<u64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end >= start => Some(end - start + 1),
            _ => None,
        }
    }

    /// True when the declared range is known to be empty (never produced by the planner)
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// `Range` header value for this chunk, if it is ranged
    pub fn range_header(&self) -> Option<String> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(format!("bytes={}-{}", start, end)),
            _ => None,
        }
    }
}

/// A request together with everything learned about it before fetching
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadMetadata {
    /// The original request
    pub request: DownloadRequest,
    /// Planned chunks; `None` means a single whole-file fetch
    pub chunks: Option<Vec<DownloadChunk>>,
    /// Checksum the assembled file is verified against
    pub checksum: Option<String>,
    /// Total size reported by the server
    pub content_length: Option<u64>,
}

/// Progress of one chunk
///
/// Instances are replaced, never mutated, by the progress tracker, so a value handed
/// out in a snapshot stays consistent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkProgress {
    /// Chunk file name
    pub name: String,
    /// Chunk status
    pub status: Status,
    /// Completed fraction in `[0, 1]`; `None` while the expected size is unknown
    pub progress: Option<f64>,
    /// Bytes written to the chunk file so far
    pub downloaded_bytes: u64,
    /// Bytes the chunk is expected to contain, if known
    pub expected_bytes: Option<u64>,
}

impl ChunkProgress {
    /// Fresh, queued progress entry for a chunk
    pub fn queued(chunk: &DownloadChunk) -> Self {
        Self {
            name: chunk.name.clone(),
            status: Status::Queued,
            progress: chunk.len().map(|_| 0.0),
            downloaded_bytes: 0,
            expected_bytes: chunk.len(),
        }
    }

    /// Expected size when it is known and positive
    pub fn known_expected(&self) -> Option<u64> {
        self.expected_bytes.filter(|&e| e > 0)
    }

    /// Fraction used when no chunk has a known size
    ///
    /// Unknown progress counts as 0, except for a chunk that already succeeded.
    pub fn effective_fraction(&self) -> f64 {
        match self.progress {
            Some(p) => p.clamp(0.0, 1.0),
            None if self.status == Status::Success => 1.0,
            None => 0.0,
        }
    }

    /// Whether the chunk has received all of its bytes
    pub fn is_complete(&self) -> bool {
        match self.known_expected() {
            Some(expected) => self.downloaded_bytes >= expected,
            None => self.progress.is_some_and(|p| p >= 1.0),
        }
    }
}

/// Point-in-time view of a download, as returned by `query`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadSnapshot {
    /// Download ID
    pub id: DownloadId,
    /// Current status
    pub status: Status,
    /// Failure details when `status` is `Failed`
    pub error: Option<DownloadError>,
    /// Per-chunk progress, in chunk order
    pub chunks: Vec<ChunkProgress>,
    /// Byte-weighted overall progress in `[0, 1]`
    pub overall_progress: f64,
    /// When the download was queued (absent for unknown ids)
    pub queued_at: Option<DateTime<Utc>>,
}

impl DownloadSnapshot {
    /// Synthetic response for an id the engine does not know
    pub fn not_found(id: DownloadId) -> Self {
        Self {
            id,
            status: Status::Failed,
            error: Some(DownloadError::not_found(id)),
            chunks: Vec::new(),
            overall_progress: 0.0,
            queued_at: None,
        }
    }
}

/// Event emitted during the download lifecycle
///
/// Events are fire-and-forget: a slow or absent subscriber never blocks a download.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Download accepted and queued
    Queued {
        /// Download ID
        id: DownloadId,
        /// Destination file name
        file_name: String,
    },

    /// Pipeline started (probing)
    Started {
        /// Download ID
        id: DownloadId,
    },

    /// Periodic progress update
    Progress {
        /// Download ID
        id: DownloadId,
        /// Destination file name
        file_name: String,
        /// Overall progress fraction (0.0 to 1.0)
        fraction: f64,
        /// Current speed in bytes per second
        speed_bps: u64,
        /// Current status
        status: Status,
    },

    /// Final file assembled (and verified when a checksum was available)
    Completed {
        /// Download ID
        id: DownloadId,
        /// Path of the final file
        path: PathBuf,
    },

    /// Download failed
    Failed {
        /// Download ID
        id: DownloadId,
        /// Classified error
        error: DownloadError,
    },

    /// Download cancelled by the caller
    Cancelled {
        /// Download ID
        id: DownloadId,
    },
}
