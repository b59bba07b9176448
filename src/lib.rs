//! # steady-fetch
//!
//! Resumable multi-connection HTTP download engine.
//!
//! ## Design Philosophy
//!
//! steady-fetch is designed to be:
//! - **Fire and forget** - `queue` validates and returns an id immediately
//! - **Chunked** - files are split into byte ranges fetched over parallel connections
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events or poll with `query`
//!
//! Each queued download probes the server, plans contiguous byte-range chunks,
//! fetches them with bounded parallelism into `<file>.partNN-of-MM` files, merges them
//! in order and verifies the result against an MD5 or SHA-256 digest when one is
//! known. Servers without range support are downloaded as a single chunk.
//!
//! ## Quick Start
//!
//! ```no_run
//! use steady_fetch::{Config, DownloadRequest, Event, SteadyFetch};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = SteadyFetch::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::Progress { fraction, .. } = event {
//!                 println!("{:.0}%", fraction * 100.0);
//!             }
//!         }
//!     });
//!
//!     let request = DownloadRequest::new(
//!         "https://example.com/archive.tar.gz",
//!         "/downloads",
//!         "archive.tar.gz",
//!     )
//!     .with_max_parallel_chunks(8);
//!     let id = engine.queue(request).await?;
//!
//!     let snapshot = engine.query(id).await;
//!     println!("{:?}: {:.2}", snapshot.status, snapshot.overall_progress);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Chunk merging and checksum verification
pub mod assembler;
/// Configuration types
pub mod config;
/// Download engine (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Single-chunk fetching
pub mod fetcher;
/// Chunk planning
pub mod planner;
/// Remote metadata probing
pub mod probe;
/// Per-chunk and overall progress
pub mod progress;
/// HTTP transport abstraction
pub mod transport;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use downloader::SteadyFetch;
pub use error::{DownloadError, Error, Result, classify};
pub use transport::{HttpTransport, ResponseHead, Transport, TransportResponse};
pub use types::{
    ChunkProgress, DownloadChunk, DownloadId, DownloadMetadata, DownloadRequest,
    DownloadSnapshot, Event, MAX_PARALLEL_CHUNKS, Status,
};
