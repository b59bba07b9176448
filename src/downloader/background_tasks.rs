//! Background progress reporting for running downloads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::progress::ProgressTracker;
use crate::types::{DownloadId, Event, Status};

/// Parameters for spawning a progress reporter background task
pub(crate) struct ProgressReporterParams {
    /// Download ID
    pub id: DownloadId,
    /// Destination file name (carried on every event)
    pub file_name: String,
    /// Tracker the chunk fetchers write into
    pub tracker: Arc<ProgressTracker>,
    /// Interval between emissions
    pub interval: Duration,
    /// Event broadcast sender
    pub event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Stops the reporter; cancelled when fetching ends or the download is cancelled
    pub cancel_token: tokio_util::sync::CancellationToken,
}

/// Spawn a background task that periodically emits `Event::Progress`.
pub(crate) fn spawn_progress_reporter(
    params: ProgressReporterParams,
) -> tokio::task::JoinHandle<()> {
    let ProgressReporterParams {
        id,
        file_name,
        tracker,
        interval,
        event_tx,
        cancel_token,
    } = params;
    tokio::spawn(async move {
        let started = Instant::now();
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let fraction = tracker.overall();
                    let downloaded = tracker.downloaded_bytes();

                    let elapsed_secs = started.elapsed().as_secs_f64();
                    let speed_bps = if elapsed_secs > 0.0 {
                        (downloaded as f64 / elapsed_secs) as u64
                    } else {
                        0
                    };

                    // Nobody listening is fine
                    event_tx
                        .send(Event::Progress {
                            id,
                            file_name: file_name.clone(),
                            fraction,
                            speed_bps,
                            status: Status::Running,
                        })
                        .ok();
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    })
}
