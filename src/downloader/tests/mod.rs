//! Engine tests: queueing, control, pipeline behavior and shutdown.

use super::test_helpers::*;
use super::*;
use crate::error::Error;
use crate::types::{DownloadRequest, Event, Status};
use std::sync::Arc;
use std::time::Duration;


/// Request for `file_name` in `dir` with the given parallelism and chunk size
fn request_in(
    dir: &std::path::Path,
    file_name: &str,
    parallel: usize,
    chunk_size: u64,
) -> DownloadRequest {
    DownloadRequest::new("https://files.example.com/payload", dir, file_name)
        .with_max_parallel_chunks(parallel)
        .with_preferred_chunk_size(chunk_size)
}
