//! Download task orchestration: top-level lifecycle for a single download.

use std::path::{Path, PathBuf};

use crate::config::DiskSpaceConfig;
use crate::error::{Error, Result};
use crate::planner;
use crate::probe::{RemoteMetadata, probe_metadata};
use crate::transport::header_map;
use crate::types::{DownloadChunk, DownloadMetadata};

use super::super::background_tasks::{ProgressReporterParams, spawn_progress_reporter};
use super::context::DownloadTaskContext;
use super::fetching::fetch_all_chunks;
use super::finalization::assemble_and_verify;

/// Core download task: orchestrates the full lifecycle of a single download.
///
/// Phases:
/// 1. Transition to Running (skipped entirely if already cancelled)
/// 2. Create the destination directory
/// 3. Probe the remote file
/// 4. Check free disk space
/// 5. Plan chunks and initialise progress
/// 6. Fetch chunks in parallel
/// 7. Assemble, verify and record the final status
///
/// Never returns an error: every failure ends up on the download's status.
pub(crate) async fn run_download_task(ctx: DownloadTaskContext) {
    if !ctx.mark_running().await {
        return;
    }

    let result = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => Err(Error::Cancelled),
        result = execute(&ctx) => result,
    };

    match result {
        Ok(path) => ctx.mark_succeeded(&path).await,
        Err(e) => ctx.mark_failed(&e).await,
    }
}

async fn execute(ctx: &DownloadTaskContext) -> Result<PathBuf> {
    let id = ctx.id;
    let request = &ctx.request;

    tokio::fs::create_dir_all(&request.destination_dir)
        .await
        .map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create destination directory '{}': {}",
                    request.destination_dir.display(),
                    e
                ),
            ))
        })?;

    let headers = header_map(&request.headers)?;
    let remote = probe_metadata(ctx.transport.as_ref(), &request.url, &headers).await;
    tracing::info!(
        download_id = id.0,
        content_length = ?remote.content_length,
        supports_ranges = remote.supports_ranges,
        "Probed remote file"
    );

    if let Some(content_length) = remote.content_length {
        check_disk_space(&ctx.config.disk_space, &request.destination_dir, content_length)?;
    }

    let metadata = plan_download(ctx, &remote)?;
    let chunks = metadata
        .chunks
        .clone()
        .unwrap_or_else(|| vec![planner::whole_file_chunk(&request.file_name)]);
    let checksum = metadata.checksum.clone();
    let etag_digest = remote.etag_digest.clone().filter(|_| checksum.is_none());
    ctx.registry.set_metadata(id, metadata).await;
    ctx.tracker.init(&chunks);

    let reporter_token = ctx.cancel_token.child_token();
    let _reporter_guard = reporter_token.clone().drop_guard();
    spawn_progress_reporter(ProgressReporterParams {
        id,
        file_name: request.file_name.clone(),
        tracker: ctx.tracker.clone(),
        interval: ctx.config.download.progress_interval(),
        event_tx: ctx.event_tx.clone(),
        cancel_token: reporter_token,
    });

    fetch_all_chunks(ctx, &headers, &chunks, remote.content_length).await?;

    assemble_and_verify(ctx, &chunks, checksum.as_deref(), etag_digest.as_deref()).await
}

/// Resolve chunks and checksum for a probed download.
///
/// Chunking needs both a known length and confirmed range support; otherwise the
/// metadata carries no chunks and the file is fetched whole.
fn plan_download(ctx: &DownloadTaskContext, remote: &RemoteMetadata) -> Result<DownloadMetadata> {
    let request = &ctx.request;
    let chunks: Option<Vec<DownloadChunk>> = if remote.is_chunkable() {
        let preferred = request
            .preferred_chunk_size
            .or(ctx.config.download.preferred_chunk_size);
        planner::plan(&request.file_name, remote.content_length, preferred)?
    } else {
        None
    };

    let checksum = request
        .expected_checksum
        .clone()
        .filter(|c| !c.trim().is_empty())
        .or_else(|| remote.checksum.clone());

    Ok(DownloadMetadata {
        request: request.as_ref().clone(),
        chunks,
        checksum,
        content_length: remote.content_length,
    })
}

/// Check if there is sufficient disk space for a download of `content_length` bytes.
///
/// Required space is the length scaled by the configured multiplier plus the
/// configured reserve. The check runs against the nearest existing ancestor of `dir`.
pub(crate) fn check_disk_space(
    config: &DiskSpaceConfig,
    dir: &Path,
    content_length: u64,
) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let required = config.required_for(content_length);
    let check_path = crate::utils::nearest_existing_ancestor(dir).ok_or_else(|| {
        Error::DiskSpaceCheckFailed(format!(
            "No existing ancestor of '{}' to check",
            dir.display()
        ))
    })?;

    let available = crate::utils::get_available_space(check_path).map_err(|e| {
        Error::DiskSpaceCheckFailed(format!(
            "Failed to check disk space for '{}': {}",
            check_path.display(),
            e
        ))
    })?;

    if available < required {
        return Err(Error::InsufficientSpace {
            required,
            available,
        });
    }

    Ok(())
}
