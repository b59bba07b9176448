//! Concurrent table of downloads: status, error, chunks and cancellation handle per id.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, Error, Result};
use crate::progress::{ProgressTracker, overall_progress};
use crate::types::{DownloadId, DownloadMetadata, DownloadSnapshot, Status};

/// Everything the engine remembers about one download
#[derive(Debug)]
pub(crate) struct DownloadEntry {
    pub(crate) status: Status,
    pub(crate) error: Option<DownloadError>,
    /// Filled in once the pipeline has probed and planned
    pub(crate) metadata: Option<DownloadMetadata>,
    pub(crate) tracker: Arc<ProgressTracker>,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) queued_at: DateTime<Utc>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
}

impl DownloadEntry {
    pub(crate) fn new(cancel_token: CancellationToken) -> Self {
        Self {
            status: Status::Queued,
            error: None,
            metadata: None,
            tracker: Arc::new(ProgressTracker::new()),
            cancel_token,
            queued_at: Utc::now(),
            finished_at: None,
        }
    }

    fn snapshot(&self, id: DownloadId) -> DownloadSnapshot {
        let chunks = self.tracker.snapshot();
        let overall_progress = if self.status == Status::Success {
            1.0
        } else {
            overall_progress(&chunks)
        };
        DownloadSnapshot {
            id,
            status: self.status,
            error: self.error.clone(),
            chunks,
            overall_progress,
            queued_at: Some(self.queued_at),
        }
    }
}

/// Shared download table (cloneable, all clones see the same map)
#[derive(Clone, Debug, Default)]
pub(crate) struct Registry {
    entries: Arc<RwLock<HashMap<DownloadId, DownloadEntry>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn insert(&self, id: DownloadId, entry: DownloadEntry) {
        self.entries.write().await.insert(id, entry);
    }

    /// Insert `entry` unless `accepting` has been cleared
    ///
    /// The flag is read under the write lock. Shutdown clears it before reading the
    /// table for active ids, so an entry inserted here is always seen there.
    pub(crate) async fn insert_if_accepting(
        &self,
        id: DownloadId,
        entry: DownloadEntry,
        accepting: &AtomicBool,
    ) -> bool {
        let mut entries = self.entries.write().await;
        if !accepting.load(Ordering::SeqCst) {
            return false;
        }
        entries.insert(id, entry);
        true
    }

    /// Move a download to `next`, recording `error` when it fails
    ///
    /// Returns the previous status. Terminal statuses are never left, so whichever of
    /// the pipeline and `cancel` finishes a download first decides its outcome.
    pub(crate) async fn transition(
        &self,
        id: DownloadId,
        next: Status,
        error: Option<DownloadError>,
    ) -> Result<Status> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id).ok_or(Error::NotFound(id))?;
        let previous = entry.status;
        entry.status = previous.transition(next)?;
        if next == Status::Failed {
            entry.error = error;
        }
        if next.is_terminal() {
            entry.finished_at = Some(Utc::now());
        }
        Ok(previous)
    }

    /// Mark an active download failed as cancelled and hand back its token
    ///
    /// Returns None for unknown ids and for downloads that already finished.
    pub(crate) async fn cancel(&self, id: DownloadId) -> Option<CancellationToken> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id)?;
        entry.status = entry.status.transition(Status::Failed).ok()?;
        entry.error = Some(DownloadError::cancelled_by_user());
        entry.finished_at = Some(Utc::now());
        Some(entry.cancel_token.clone())
    }

    pub(crate) async fn set_metadata(&self, id: DownloadId, metadata: DownloadMetadata) {
        if let Some(entry) = self.entries.write().await.get_mut(&id) {
            entry.metadata = Some(metadata);
        }
    }

    pub(crate) async fn metadata(&self, id: DownloadId) -> Option<DownloadMetadata> {
        self.entries
            .read()
            .await
            .get(&id)
            .and_then(|e| e.metadata.clone())
    }

    pub(crate) async fn snapshot(&self, id: DownloadId) -> Option<DownloadSnapshot> {
        self.entries.read().await.get(&id).map(|e| e.snapshot(id))
    }

    /// All ids with their status, oldest first
    pub(crate) async fn list(&self) -> Vec<(DownloadId, Status)> {
        let entries = self.entries.read().await;
        let mut listed: Vec<_> = entries
            .iter()
            .map(|(id, e)| (e.queued_at, *id, e.status))
            .collect();
        listed.sort_by_key(|(queued_at, id, _)| (*queued_at, *id));
        listed.into_iter().map(|(_, id, status)| (id, status)).collect()
    }

    /// Ids of downloads that have not reached a terminal status
    pub(crate) async fn active_ids(&self) -> Vec<DownloadId> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| !e.status.is_terminal())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Remove a finished download; active downloads are left alone
    pub(crate) async fn remove_finished(&self, id: DownloadId) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(&id) {
            Some(entry) if entry.status.is_terminal() => {
                entries.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Drop the oldest finished downloads until at most `keep` remain
    ///
    /// Returns how many entries were evicted.
    pub(crate) async fn evict_finished(&self, keep: usize) -> usize {
        let mut entries = self.entries.write().await;
        let mut finished: Vec<(DateTime<Utc>, DownloadId)> = entries
            .iter()
            .filter_map(|(id, e)| e.finished_at.map(|at| (at, *id)))
            .collect();
        if finished.len() <= keep {
            return 0;
        }

        finished.sort_unstable();
        let excess = finished.len() - keep;
        for (_, id) in finished.into_iter().take(excess) {
            entries.remove(&id);
        }
        excess
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
