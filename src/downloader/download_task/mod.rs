//! Download task execution: the per-download pipeline.
//!
//! Split into focused submodules:
//! - [`context`] - Shared state and status updates for one download
//! - [`orchestration`] - Top-level pipeline: probe, disk check, plan
//! - [`fetching`] - Bounded-parallel chunk fetching
//! - [`finalization`] - Assembly and checksum verification

mod context;
mod fetching;
mod finalization;
mod orchestration;

pub(crate) use context::DownloadTaskContext;
pub(crate) use orchestration::run_download_task;
#[cfg(test)]
pub(crate) use orchestration::check_disk_space;
