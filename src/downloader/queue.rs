//! Queueing: validate a request, mint its id and launch its pipeline.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::transport::header_map;
use crate::types::{DownloadId, DownloadRequest, Event};

use super::SteadyFetch;
use super::download_task::{DownloadTaskContext, run_download_task};
use super::registry::DownloadEntry;

impl SteadyFetch {
    /// Queue a download
    ///
    /// Validates the request, stores it as Queued and starts its pipeline in the
    /// background. The pipeline's outcome is only observable through [`query`] and
    /// events; this call never waits for network or disk.
    ///
    /// If retention is configured, the oldest finished downloads beyond the limit are
    /// evicted first.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `max_parallel_chunks` is outside
    ///   `1..=MAX_PARALLEL_CHUNKS`, the file name is blank, the URL is not http(s), or
    ///   a header cannot be sent. No id is minted and nothing is started.
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use steady_fetch::*;
    /// # async fn example(engine: SteadyFetch) -> Result<()> {
    /// let request = DownloadRequest::new(
    ///     "https://example.com/archive.tar.gz",
    ///     "/downloads",
    ///     "archive.tar.gz",
    /// )
    /// .with_max_parallel_chunks(8);
    /// let id = engine.queue(request).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// [`query`]: Self::query
    pub async fn queue(&self, request: DownloadRequest) -> Result<DownloadId> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        request.validate()?;
        header_map(&request.headers)?;

        if let Some(keep) = self.config.retention.max_finished {
            let evicted = self.queue_state.registry.evict_finished(keep).await;
            if evicted > 0 {
                tracing::debug!(evicted, "Evicted finished downloads");
            }
        }

        let id = self.queue_state.mint_id();
        let request = Arc::new(request);
        let cancel_token = tokio_util::sync::CancellationToken::new();
        let entry = DownloadEntry::new(cancel_token.clone());
        let tracker = Arc::clone(&entry.tracker);
        let inserted = self
            .queue_state
            .registry
            .insert_if_accepting(id, entry, &self.queue_state.accepting_new)
            .await;
        if !inserted {
            return Err(Error::ShuttingDown);
        }

        tracing::info!(
            download_id = id.0,
            url = %request.url,
            file_name = %request.file_name,
            max_parallel_chunks = request.max_parallel_chunks,
            "Download queued"
        );
        self.event_tx
            .send(Event::Queued {
                id,
                file_name: request.file_name.clone(),
            })
            .ok();

        let ctx = DownloadTaskContext {
            id,
            request,
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            registry: self.queue_state.registry.clone(),
            tracker,
            event_tx: self.event_tx.clone(),
            cancel_token,
        };
        tokio::spawn(run_download_task(ctx));

        Ok(id)
    }
}
