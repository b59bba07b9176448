//! Download control: query, cancel, forget and listing.

use crate::types::{DownloadId, DownloadMetadata, DownloadSnapshot, Event, Status};

use super::SteadyFetch;

impl SteadyFetch {
    /// Current state of a download
    ///
    /// Combines the stored status and error with a fresh copy of the per-chunk progress
    /// and the aggregate fraction. An unknown id yields a synthetic Failed snapshot
    /// with code 404 and no chunks; nothing is stored for it.
    pub async fn query(&self, id: DownloadId) -> DownloadSnapshot {
        match self.queue_state.registry.snapshot(id).await {
            Some(snapshot) => snapshot,
            None => DownloadSnapshot::not_found(id),
        }
    }

    /// Cancel a download
    ///
    /// Signals the download's cancellation token, which aborts in-flight chunk
    /// requests between reads, and marks it Failed with code 499. Chunk files written
    /// so far are left on disk.
    ///
    /// # Returns
    ///
    /// `true` if an active download was cancelled. `false` for unknown ids, finished
    /// downloads, and a second cancel of the same id.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use steady_fetch::*;
    /// # async fn example(engine: SteadyFetch, id: DownloadId) {
    /// if engine.cancel(id).await {
    ///     assert_eq!(engine.query(id).await.error.map(|e| e.code), Some(499));
    /// }
    /// # }
    /// ```
    pub async fn cancel(&self, id: DownloadId) -> bool {
        let Some(cancel_token) = self.queue_state.registry.cancel(id).await else {
            tracing::debug!(download_id = id.0, "Nothing to cancel");
            return false;
        };

        cancel_token.cancel();
        tracing::info!(download_id = id.0, "Download cancelled");
        self.event_tx.send(Event::Cancelled { id }).ok();
        true
    }

    /// Drop a finished download from the registry
    ///
    /// Returns `false` for unknown ids and for downloads that are still queued or
    /// running; cancel those first.
    pub async fn forget(&self, id: DownloadId) -> bool {
        self.queue_state.registry.remove_finished(id).await
    }

    /// Every known download with its status, oldest first
    pub async fn list(&self) -> Vec<(DownloadId, Status)> {
        self.queue_state.registry.list().await
    }

    /// Chunks and checksum resolved for a download
    ///
    /// None until the pipeline has probed the server and planned the download.
    pub async fn metadata(&self, id: DownloadId) -> Option<DownloadMetadata> {
        self.queue_state.registry.metadata(id).await
    }
}
