//! Per-download progress tracking.
//!
//! A [`ProgressTracker`] belongs to exactly one download. Chunk fetchers write into it
//! after every read; `query` and the progress reporter read consistent snapshots out.

use std::sync::RwLock;

use crate::types::{ChunkProgress, DownloadChunk, Status};

/// Completed fraction of `expected`, or None when `expected` is unknown or zero
pub fn fraction(downloaded: u64, expected: Option<u64>) -> Option<f64> {
    let expected = expected.filter(|&e| e > 0)?;
    Some(downloaded.min(expected) as f64 / expected as f64)
}

/// Aggregate progress across chunks, in `[0, 1]`
///
/// Byte-weighted over chunks with a known, positive expected size. When no chunk has
/// one, falls back to the unweighted mean of each chunk's own fraction.
pub fn overall_progress(chunks: &[ChunkProgress]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }

    let (done, expected) = chunks
        .iter()
        .filter_map(|c| c.known_expected().map(|e| (c.downloaded_bytes.min(e), e)))
        .fold((0u64, 0u64), |(done, total), (d, e)| {
            (done.saturating_add(d), total.saturating_add(e))
        });

    let value = if expected > 0 {
        done as f64 / expected as f64
    } else {
        chunks.iter().map(ChunkProgress::effective_fraction).sum::<f64>() / chunks.len() as f64
    };
    value.clamp(0.0, 1.0)
}

/// Thread-safe store of chunk progress for one download
///
/// Entries are replaced whole on every update, so a snapshot never mixes fields from
/// two different updates of the same chunk.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    chunks: RwLock<Vec<ChunkProgress>>,
}

impl ProgressTracker {
    /// Empty tracker; [`init`](Self::init) fills it once chunks are planned
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to one queued entry per chunk, in chunk order
    pub fn init(&self, chunks: &[DownloadChunk]) {
        let fresh: Vec<ChunkProgress> = chunks.iter().map(ChunkProgress::queued).collect();
        *self.write() = fresh;
    }

    /// Move a chunk to `status`, keeping its counters
    pub fn mark_status(&self, index: usize, status: Status) {
        self.replace(index, |current| ChunkProgress {
            status,
            ..current.clone()
        });
    }

    /// Record cumulative bytes for a running chunk
    pub fn update(&self, index: usize, downloaded_bytes: u64, expected_bytes: Option<u64>) {
        self.replace(index, |current| {
            let expected_bytes = expected_bytes.or(current.expected_bytes);
            ChunkProgress {
                name: current.name.clone(),
                status: Status::Running,
                // unknown expected size keeps the last reported value
                progress: fraction(downloaded_bytes, expected_bytes).or(current.progress),
                downloaded_bytes,
                expected_bytes,
            }
        });
    }

    /// Mark a chunk finished, forcing its fraction to 1.0 when the size is known
    pub fn complete(&self, index: usize, downloaded_bytes: u64, expected_bytes: Option<u64>) {
        self.replace(index, |current| {
            let expected_bytes = expected_bytes.or(current.expected_bytes);
            match expected_bytes.filter(|&e| e > 0) {
                Some(expected) => ChunkProgress {
                    name: current.name.clone(),
                    status: Status::Success,
                    progress: Some(1.0),
                    downloaded_bytes: expected,
                    expected_bytes: Some(expected),
                },
                None => ChunkProgress {
                    name: current.name.clone(),
                    status: Status::Success,
                    progress: current.progress,
                    downloaded_bytes,
                    expected_bytes,
                },
            }
        });
    }

    /// Consistent copy of every chunk's progress
    pub fn snapshot(&self) -> Vec<ChunkProgress> {
        self.read().clone()
    }

    /// Aggregate progress of the current snapshot
    pub fn overall(&self) -> f64 {
        overall_progress(&self.read())
    }

    /// Bytes written across all chunks
    pub fn downloaded_bytes(&self) -> u64 {
        self.read()
            .iter()
            .fold(0u64, |sum, c| sum.saturating_add(c.downloaded_bytes))
    }

    /// Number of tracked chunks
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True before [`init`](Self::init) has run
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn replace(&self, index: usize, f: impl FnOnce(&ChunkProgress) -> ChunkProgress) {
        let mut chunks = self.write();
        if let Some(slot) = chunks.get_mut(index) {
            *slot = f(slot);
        }
    }

    // A panicking writer cannot leave a torn entry behind, so poison is ignored
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ChunkProgress>> {
        self.chunks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ChunkProgress>> {
        self.chunks.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn progress(downloaded: u64, expected: Option<u64>, status: Status) -> ChunkProgress {
        ChunkProgress {
            name: "c".into(),
            status,
            progress: fraction(downloaded, expected),
            downloaded_bytes: downloaded,
            expected_bytes: expected,
        }
    }

    #[test]
    fn overall_progress_is_byte_weighted() {
        let chunks = [
            progress(5, Some(10), Status::Running),
            progress(90, Some(90), Status::Success),
        ];
        let overall = overall_progress(&chunks);
        assert!((overall - 0.95).abs() < 1e-9, "got {overall}");
    }

    #[test]
    fn overall_progress_caps_overshooting_chunks() {
        let chunks = [progress(50, Some(10), Status::Running)];
        assert_eq!(overall_progress(&chunks), 1.0);
    }

    #[test]
    fn unknown_sizes_are_ignored_when_any_size_is_known() {
        let chunks = [
            progress(5, Some(10), Status::Running),
            progress(1_000, None, Status::Running),
        ];
        assert_eq!(overall_progress(&chunks), 0.5);
    }

    #[test]
    fn all_unknown_sizes_use_unweighted_mean() {
        let mut unknown = progress(100, None, Status::Running);
        unknown.progress = Some(0.5);
        let chunks = [
            unknown,
            progress(10, None, Status::Success),
            progress(10, None, Status::Running),
        ];
        let overall = overall_progress(&chunks);
        assert!((overall - 0.5).abs() < 1e-9, "got {overall}");
    }

    #[test]
    fn empty_download_has_zero_progress() {
        assert_eq!(overall_progress(&[]), 0.0);
    }

    #[test]
    fn tracker_updates_replace_entries() {
        let tracker = ProgressTracker::new();
        tracker.init(&[
            DownloadChunk::ranged("a", 0, 9),
            DownloadChunk::ranged("b", 10, 19),
        ]);
        assert!(tracker.snapshot().iter().all(|c| c.status == Status::Queued));

        let before = tracker.snapshot();
        tracker.update(0, 4, Some(10));
        assert_eq!(before[0].downloaded_bytes, 0, "handed-out snapshot must not change");

        let after = tracker.snapshot();
        assert_eq!(after[0].status, Status::Running);
        assert_eq!(after[0].downloaded_bytes, 4);
        assert_eq!(after[0].progress, Some(0.4));
        assert_eq!(tracker.overall(), 0.2);
    }

    #[test]
    fn complete_forces_full_progress_when_size_known() {
        let tracker = ProgressTracker::new();
        tracker.init(&[DownloadChunk::ranged("a", 0, 9)]);
        tracker.update(0, 7, None);
        tracker.complete(0, 7, None);

        let chunk = &tracker.snapshot()[0];
        assert_eq!(chunk.status, Status::Success);
        assert_eq!(chunk.progress, Some(1.0));
        assert_eq!(chunk.downloaded_bytes, 10);
        assert!(chunk.is_complete());
    }

    #[test]
    fn complete_leaves_unknown_progress_as_is() {
        let tracker = ProgressTracker::new();
        tracker.init(&[DownloadChunk::whole_file("a")]);
        tracker.update(0, 123, None);
        tracker.complete(0, 123, None);

        let chunk = &tracker.snapshot()[0];
        assert_eq!(chunk.status, Status::Success);
        assert_eq!(chunk.progress, None);
        assert_eq!(chunk.downloaded_bytes, 123);
        assert_eq!(tracker.overall(), 1.0);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let tracker = ProgressTracker::new();
        tracker.init(&[DownloadChunk::ranged("a", 0, 9)]);
        tracker.update(5, 1, Some(1));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.downloaded_bytes(), 0);
    }

    #[test]
    fn concurrent_writers_never_tear_entries() {
        let tracker = Arc::new(ProgressTracker::new());
        tracker.init(&[DownloadChunk::ranged("a", 0, 999)]);

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for downloaded in 0..=1000u64 {
                        tracker.update(0, downloaded, Some(1000));
                    }
                })
            })
            .collect();

        for _ in 0..1000 {
            let chunk = &tracker.snapshot()[0];
            assert_eq!(chunk.progress, fraction(chunk.downloaded_bytes, Some(1000)));
        }
        for writer in writers {
            writer.join().unwrap();
        }
    }
}
