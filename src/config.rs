//! Configuration types for steady-fetch

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP transport configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// TCP/TLS connect timeout (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum idle time between body reads (default: 10 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Download behavior configuration (chunking, progress reporting)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Chunk size used for every download that does not set its own
    /// (None = size-tiered default: 1 MiB / 4 MiB / 8 MiB)
    #[serde(default)]
    pub preferred_chunk_size: Option<u64>,

    /// Interval between `Event::Progress` emissions in milliseconds (default: 500)
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            preferred_chunk_size: None,
            progress_interval_ms: default_progress_interval_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl DownloadConfig {
    /// Progress interval as a Duration (never zero)
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

/// Disk space checking configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra free space to keep on top of the scaled download size (default: 0)
    #[serde(default)]
    pub min_free_space: u64,

    /// Multiplier applied to the content length (default: 1.1)
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: 0,
            size_multiplier: default_size_multiplier(),
        }
    }
}

impl DiskSpaceConfig {
    /// Bytes that must be free before downloading `content_length` bytes
    pub fn required_for(&self, content_length: u64) -> u64 {
        let scaled = (content_length as f64 * self.size_multiplier) as u64;
        scaled.saturating_add(self.min_free_space)
    }
}

/// Retention of finished downloads in the registry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Keep at most this many finished (Success/Failed) downloads; the oldest are
    /// evicted when a new download is queued (None = keep until `forget`)
    #[serde(default)]
    pub max_finished: Option<usize>,
}

/// Main configuration for [`SteadyFetch`](crate::SteadyFetch)
///
/// Every field has a default, so `Config::default()` (or `{}` in JSON) is a working
/// configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP transport settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Chunking and progress settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Free space checks
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Registry retention
    #[serde(default)]
    pub retention: RetentionConfig,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    format!("steady-fetch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_progress_interval_ms() -> u64 {
    500
}

fn default_event_buffer() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_size_multiplier() -> f64 {
    1.1
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
