//! Bounded-parallel chunk fetching: one task per chunk, gated by a semaphore.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::fetcher::{ChunkFetch, fetch_chunk};
use crate::types::{DownloadChunk, Status};

use super::context::DownloadTaskContext;

/// Concurrent fetches for a download: the request's limit, capped by the chunk count
pub(super) fn effective_parallelism(requested: usize, chunk_count: usize) -> usize {
    requested.clamp(1, chunk_count.max(1))
}

/// Fetch every chunk, at most `effective_parallelism` at a time.
///
/// The first failure cancels the remaining chunk tasks and is returned; errors from
/// siblings that fail afterwards (usually cancellations) are discarded.
pub(super) async fn fetch_all_chunks(
    ctx: &DownloadTaskContext,
    headers: &HeaderMap,
    chunks: &[DownloadChunk],
    total_bytes: Option<u64>,
) -> Result<()> {
    let id = ctx.id;
    let parallelism = effective_parallelism(ctx.request.max_parallel_chunks, chunks.len());
    let semaphore = Arc::new(Semaphore::new(parallelism));
    let fetch_token = ctx.cancel_token.child_token();

    let url: Arc<str> = Arc::from(ctx.request.url.as_str());
    let headers = Arc::new(headers.clone());
    let dir: Arc<PathBuf> = Arc::new(ctx.request.destination_dir.clone());

    tracing::info!(
        download_id = id.0,
        chunks = chunks.len(),
        parallelism,
        "Fetching chunks"
    );

    let mut join_set = JoinSet::new();
    for (index, chunk) in chunks.iter().cloned().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let token = fetch_token.clone();
        let transport = Arc::clone(&ctx.transport);
        let tracker = Arc::clone(&ctx.tracker);
        let url = Arc::clone(&url);
        let headers = Arc::clone(&headers);
        let dir = Arc::clone(&dir);

        join_set.spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled),
                permit = semaphore.acquire_owned() => {
                    permit.map_err(|_| Error::Other("chunk semaphore closed".to_string()))?
                }
            };

            let destination = dir.join(&chunk.name);
            let result = fetch_chunk(
                transport.as_ref(),
                ChunkFetch {
                    url: &url,
                    headers: &headers,
                    chunk: &chunk,
                    index,
                    destination: &destination,
                    total_bytes,
                },
                &tracker,
                &token,
            )
            .await;

            if result.is_err() {
                tracker.mark_status(index, Status::Failed);
            }
            result
        });
    }

    while let Some(joined) = join_set.join_next().await {
        let result = match joined {
            Ok(result) => result.map(|_| ()),
            Err(e) => Err(Error::Other(format!("chunk task failed: {}", e))),
        };

        if let Err(e) = result {
            if !matches!(e, Error::Cancelled) {
                tracing::warn!(download_id = id.0, error = %e, "Chunk failed, cancelling siblings");
            }
            fetch_token.cancel();
            join_set.shutdown().await;
            return Err(e);
        }
    }

    Ok(())
}
