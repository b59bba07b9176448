//! Chunk planning: split a known total size into contiguous, named byte ranges.
//!
//! Chunk size is picked by total size unless the caller supplies one:
//!
//! | total size          | chunk size |
//! |---------------------|------------|
//! | ≤ 100 MiB           | 1 MiB      |
//! | ≤ 1 GiB             | 4 MiB      |
//! | > 1 GiB             | 8 MiB      |
//!
//! A plan never holds more than [`MAX_CHUNKS`] chunks; the chunk size grows to
//! `ceil(total / MAX_CHUNKS)` when the picked size would need more.

use crate::error::{Error, Result};
use crate::types::DownloadChunk;

/// One mebibyte
pub const MIB: u64 = 1024 * 1024;

/// Largest total size that still uses 1 MiB chunks
pub const SMALL_FILE_LIMIT: u64 = 100 * MIB;

/// Largest total size that still uses 4 MiB chunks
pub const MEDIUM_FILE_LIMIT: u64 = 1024 * MIB;

/// Upper bound on the number of chunks in one plan
pub const MAX_CHUNKS: u64 = 10_000;

/// Chunk size for a download of `total_bytes`
///
/// A `preferred` size of at least one byte wins over the tiered default. Either is
/// raised to `ceil(total_bytes / MAX_CHUNKS)` if smaller.
pub fn chunk_size_for(total_bytes: u64, preferred: Option<u64>) -> u64 {
    let size = match preferred.filter(|&s| s >= 1) {
        Some(size) => size,
        None if total_bytes <= SMALL_FILE_LIMIT => MIB,
        None if total_bytes <= MEDIUM_FILE_LIMIT => 4 * MIB,
        None => 8 * MIB,
    };
    size.max(total_bytes.div_ceil(MAX_CHUNKS))
}

/// Chunk file name for chunk `index` (1-based) of `count`
///
/// The part number is zero-padded to the width of `count`, so names sort in byte
/// order: `movie.mkv.part007-of-120`.
pub fn chunk_name(file_name: &str, index: usize, count: usize) -> String {
    let width = count.to_string().len();
    format!("{file_name}.part{index:0width$}-of-{count}")
}

/// Single chunk used when the size is unknown or ranges are unsupported
pub fn whole_file_chunk(file_name: &str) -> DownloadChunk {
    DownloadChunk::whole_file(chunk_name(file_name, 1, 1))
}

/// Plan the chunks for a download
///
/// Returns `Ok(None)` when `total_bytes` is unknown; the caller then falls back to a
/// single whole-file fetch.
///
/// # Errors
///
/// Returns [`Error::Validation`] if `file_name` is blank or `total_bytes` is zero.
pub fn plan(
    file_name: &str,
    total_bytes: Option<u64>,
    preferred_chunk_size: Option<u64>,
) -> Result<Option<Vec<DownloadChunk>>> {
    if file_name.trim().is_empty() {
        return Err(Error::Validation("file name must not be blank".to_string()));
    }
    let Some(total_bytes) = total_bytes else {
        return Ok(None);
    };
    if total_bytes == 0 {
        return Err(Error::Validation(
            "total size must be greater than zero".to_string(),
        ));
    }

    let chunk_size = chunk_size_for(total_bytes, preferred_chunk_size);
    let count = total_bytes.div_ceil(chunk_size).max(1) as usize;

    let mut chunks = Vec::with_capacity(count);
    let mut start = 0u64;
    for index in 1..=count {
        let end = start.saturating_add(chunk_size - 1).min(total_bytes - 1);
        chunks.push(DownloadChunk::ranged(
            chunk_name(file_name, index, count),
            start,
            end,
        ));
        start = end + 1;
    }

    tracing::debug!(
        file_name,
        total_bytes,
        chunk_size,
        chunk_count = count,
        "Planned chunks"
    );

    Ok(Some(chunks))
}
