//! Download engine split into focused submodules.
//!
//! The `SteadyFetch` struct and its methods are organized by domain:
//! - [`queue`] - Request validation, id minting and pipeline launch
//! - [`control`] - Query, cancel, forget and listing
//! - [`lifecycle`] - Shutdown coordination
//! - [`registry`] - Concurrent id → download state table
//! - [`download_task`] - The per-download pipeline
//! - [`background_tasks`] - Progress reporting

mod background_tasks;
mod control;
mod download_task;
mod lifecycle;
mod queue;
mod registry;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::Config;
use crate::error::Result;
use crate::transport::{HttpTransport, Transport};
use crate::types::{DownloadId, Event};

use registry::Registry;

/// Download table and admission state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Every known download, by id
    pub(crate) registry: Registry,
    /// Next id to hand out (seeded from the clock, then strictly increasing)
    pub(crate) next_id: Arc<AtomicU64>,
    /// Flag to indicate whether new downloads are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl QueueState {
    fn new() -> Self {
        let seed = chrono::Utc::now().timestamp_micros().max(0) as u64;
        Self {
            registry: Registry::new(),
            next_id: Arc::new(AtomicU64::new(seed)),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mint an id no other `queue` call on this engine will see
    pub(crate) fn mint_id(&self) -> DownloadId {
        DownloadId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Download engine (cloneable - all fields are Arc-wrapped)
///
/// Construct one per application and share clones wherever downloads are queued.
/// Each queued download runs as its own tokio task; a failure in one never affects
/// another.
#[derive(Clone)]
pub struct SteadyFetch {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// HTTP transport shared by every download
    pub(crate) transport: Arc<dyn Transport>,
    /// Download table and admission state
    pub(crate) queue_state: QueueState,
}

impl SteadyFetch {
    /// Create an engine backed by a reqwest [`HttpTransport`]
    ///
    /// Must be called within a tokio runtime before queueing downloads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`](crate::Error::Network) if the HTTP client cannot be
    /// built.
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.http)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create an engine that sends every request through `transport`
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        // Lagging subscribers lose the oldest events, downloads never wait on them
        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.download.event_buffer.max(1));

        Self {
            event_tx,
            config: Arc::new(config),
            transport,
            queue_state: QueueState::new(),
        }
    }

    /// Subscribe to download events
    ///
    /// Each subscriber receives every event emitted after it subscribed.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
