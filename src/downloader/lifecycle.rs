//! Shutdown coordination.

use std::sync::atomic::Ordering;

use super::SteadyFetch;

impl SteadyFetch {
    /// Stop accepting downloads and cancel every active one
    ///
    /// After this call `queue` fails with
    /// [`Error::ShuttingDown`](crate::Error::ShuttingDown). Finished downloads stay
    /// queryable. Returns how many downloads were cancelled.
    pub async fn shutdown(&self) -> usize {
        tracing::info!("Initiating shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        let mut cancelled = 0;
        for id in self.queue_state.registry.active_ids().await {
            if self.cancel(id).await {
                cancelled += 1;
            }
        }

        tracing::info!(cancelled, "Shutdown complete");
        cancelled
    }

    /// Whether `queue` still accepts new downloads
    pub fn is_accepting(&self) -> bool {
        self.queue_state.accepting_new.load(Ordering::SeqCst)
    }
}
