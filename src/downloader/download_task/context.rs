//! Download task context: shared state for one download's pipeline and its status updates.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, classify};
use crate::progress::ProgressTracker;
use crate::transport::Transport;
use crate::types::{DownloadId, DownloadRequest, Event, Status};

use super::super::registry::Registry;

/// Shared context for a single download task, reducing parameter passing between helpers.
pub(crate) struct DownloadTaskContext {
    pub(crate) id: DownloadId,
    pub(crate) request: Arc<DownloadRequest>,
    pub(crate) config: Arc<Config>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Registry,
    pub(crate) tracker: Arc<ProgressTracker>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) cancel_token: tokio_util::sync::CancellationToken,
}

impl DownloadTaskContext {
    /// Move Queued → Running and emit `Started`.
    ///
    /// Returns false if the download was cancelled before it got here.
    pub(super) async fn mark_running(&self) -> bool {
        match self.registry.transition(self.id, Status::Running, None).await {
            Ok(_) => {
                self.event_tx.send(Event::Started { id: self.id }).ok();
                true
            }
            Err(e) => {
                tracing::debug!(download_id = self.id.0, error = %e, "Download not started");
                false
            }
        }
    }

    /// Record success and emit `Completed`.
    pub(super) async fn mark_succeeded(&self, path: &Path) {
        match self.registry.transition(self.id, Status::Success, None).await {
            Ok(_) => {
                tracing::info!(
                    download_id = self.id.0,
                    path = %path.display(),
                    "Download complete"
                );
                self.event_tx
                    .send(Event::Completed {
                        id: self.id,
                        path: path.to_path_buf(),
                    })
                    .ok();
            }
            Err(e) => {
                // Cancelled while assembling; the cancellation stands
                tracing::debug!(download_id = self.id.0, error = %e, "Success not recorded");
            }
        }
    }

    /// Record the classified failure and emit `Failed`.
    ///
    /// A download that was already cancelled keeps its cancellation error.
    pub(super) async fn mark_failed(&self, error: &Error) {
        let classified = classify(error);
        match self
            .registry
            .transition(self.id, Status::Failed, Some(classified.clone()))
            .await
        {
            Ok(_) => {
                tracing::error!(
                    download_id = self.id.0,
                    code = classified.code,
                    error = %error,
                    "Download failed"
                );
                self.event_tx
                    .send(Event::Failed {
                        id: self.id,
                        error: classified,
                    })
                    .ok();
            }
            Err(e) => {
                tracing::debug!(download_id = self.id.0, error = %e, "Failure not recorded");
            }
        }
    }
}
