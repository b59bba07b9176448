//! Chunk reconciliation and checksum verification.

use md5::Context as Md5Context;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::DownloadChunk;

/// Suffix of the temporary file chunks are merged into
pub const ASSEMBLING_SUFFIX: &str = ".__assembling";

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Digest algorithm, inferred from the length of the expected hex string
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// 32 hex characters
    Md5,
    /// 64 hex characters
    Sha256,
}

impl ChecksumAlgorithm {
    /// SHA-256 for 64-character digests, MD5 otherwise
    pub fn for_hex(hex: &str) -> Self {
        if hex.trim().len() == 64 {
            ChecksumAlgorithm::Sha256
        } else {
            ChecksumAlgorithm::Md5
        }
    }
}

/// Merge chunk files into `final_name`, in byte order
///
/// Chunks are sorted by `start` (a whole-file chunk sorts first) and appended to
/// `final_name + ".__assembling"`, which is then renamed over `final_name`. Chunk files
/// are deleted afterwards. An empty chunk list does nothing and returns `Ok(None)`.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if a chunk file is missing or unreadable, or
/// the final file cannot be written. The temporary file is removed first and no final
/// file is produced.
pub async fn reconcile(
    dir: &Path,
    final_name: &str,
    chunks: &[DownloadChunk],
) -> Result<Option<PathBuf>> {
    if chunks.is_empty() {
        return Ok(None);
    }

    let mut ordered: Vec<&DownloadChunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.start.unwrap_or(0));

    let final_path = dir.join(final_name);
    let temp_path = dir.join(format!("{final_name}{ASSEMBLING_SUFFIX}"));

    if let Err(e) = merge_into(&temp_path, dir, &ordered).await {
        if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove temporary file");
        }
        return Err(e.into());
    }

    tokio::fs::rename(&temp_path, &final_path).await?;

    for chunk in &ordered {
        let chunk_path = dir.join(&chunk.name);
        if let Err(e) = tokio::fs::remove_file(&chunk_path).await {
            warn!(path = %chunk_path.display(), error = %e, "Failed to delete chunk file");
        }
    }

    info!(path = %final_path.display(), chunks = ordered.len(), "Assembled file");
    Ok(Some(final_path))
}

async fn merge_into(temp_path: &Path, dir: &Path, ordered: &[&DownloadChunk]) -> std::io::Result<()> {
    let mut output = tokio::fs::File::create(temp_path).await?;
    for chunk in ordered {
        let chunk_path = dir.join(&chunk.name);
        let mut input = tokio::fs::File::open(&chunk_path).await.map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("chunk file {} unavailable: {}", chunk_path.display(), e),
            )
        })?;
        let copied = tokio::io::copy(&mut input, &mut output).await?;
        debug!(chunk = %chunk.name, bytes = copied, "Appended chunk");
    }
    output.flush().await?;
    output.sync_all().await?;
    Ok(())
}

/// Hex digest of a file, streamed in 64 KiB reads
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if the file cannot be read.
pub async fn checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut context = Md5Context::new();
            loop {
                let read = file.read(&mut buffer).await?;
                if read == 0 {
                    break;
                }
                context.consume(&buffer[..read]);
            }
            Ok(format!("{:x}", context.compute()))
        }
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let read = file.read(&mut buffer).await?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        }
    }
}

/// Check a file against an expected hex digest, ignoring case
///
/// A missing or blank `expected` means verification was not requested and passes.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if the file cannot be read.
pub async fn verify(path: &Path, expected: Option<&str>) -> Result<bool> {
    let Some(expected) = expected.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(true);
    };
    let actual = checksum(path, ChecksumAlgorithm::for_hex(expected)).await?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    // md5("foobarbaz") / sha256("foobarbaz")
    const FOOBARBAZ_MD5: &str = "6df23dc03f9b54cc38a0fc1483df6e21";
    const FOOBARBAZ_SHA256: &str =
        "97df3588b5a3f24babc3851b372f0ba71a9dcdded43b14b9d06961bfc1707d9d";

    async fn write_chunks(dir: &Path) -> Vec<DownloadChunk> {
        tokio::fs::write(dir.join("out.txt.part1-of-3"), b"foo").await.unwrap();
        tokio::fs::write(dir.join("out.txt.part2-of-3"), b"bar").await.unwrap();
        tokio::fs::write(dir.join("out.txt.part3-of-3"), b"baz").await.unwrap();
        // deliberately out of order
        vec![
            DownloadChunk::ranged("out.txt.part3-of-3", 6, 8),
            DownloadChunk::ranged("out.txt.part1-of-3", 0, 2),
            DownloadChunk::ranged("out.txt.part2-of-3", 3, 5),
        ]
    }

    #[tokio::test]
    async fn reconcile_merges_in_byte_order_and_deletes_chunks() {
        let dir = TempDir::new().unwrap();
        let chunks = write_chunks(dir.path()).await;

        let path = reconcile(dir.path(), "out.txt", &chunks).await.unwrap().unwrap();

        assert_eq!(path, dir.path().join("out.txt"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"foobarbaz");
        for chunk in &chunks {
            assert!(!dir.path().join(&chunk.name).exists(), "{} not deleted", chunk.name);
        }
        assert!(!dir.path().join("out.txt.__assembling").exists());
    }

    #[tokio::test]
    async fn reconcile_replaces_existing_final_file() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("out.txt"), b"old contents, much longer")
            .await
            .unwrap();
        let chunks = write_chunks(dir.path()).await;

        reconcile(dir.path(), "out.txt", &chunks).await.unwrap();

        assert_eq!(
            tokio::fs::read(dir.path().join("out.txt")).await.unwrap(),
            b"foobarbaz"
        );
    }

    #[tokio::test]
    async fn missing_chunk_fails_without_leaving_files_behind() {
        let dir = TempDir::new().unwrap();
        let chunks = write_chunks(dir.path()).await;
        tokio::fs::remove_file(dir.path().join("out.txt.part2-of-3"))
            .await
            .unwrap();

        let err = reconcile(dir.path(), "out.txt", &chunks).await.unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert!(!dir.path().join("out.txt").exists());
        assert!(!dir.path().join("out.txt.__assembling").exists());
    }

    #[tokio::test]
    async fn empty_chunk_list_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        assert_eq!(reconcile(dir.path(), "out.txt", &[]).await.unwrap(), None);
        assert!(!dir.path().join("out.txt").exists());
    }

    #[tokio::test]
    async fn whole_file_chunk_is_renamed_into_place() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.bin.part1-of-1"), b"payload")
            .await
            .unwrap();

        let chunks = [DownloadChunk::whole_file("a.bin.part1-of-1")];
        reconcile(dir.path(), "a.bin", &chunks).await.unwrap();

        assert_eq!(tokio::fs::read(dir.path().join("a.bin")).await.unwrap(), b"payload");
        assert!(!dir.path().join("a.bin.part1-of-1").exists());
    }

    #[tokio::test]
    async fn verify_passes_when_no_checksum_requested() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        tokio::fs::write(&file, b"anything").await.unwrap();

        assert!(verify(&file, None).await.unwrap());
        assert!(verify(&file, Some("")).await.unwrap());
        assert!(verify(&file, Some("   ")).await.unwrap());
    }

    #[tokio::test]
    async fn verify_compares_md5_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        tokio::fs::write(&file, b"foobarbaz").await.unwrap();

        assert!(verify(&file, Some(FOOBARBAZ_MD5)).await.unwrap());
        assert!(verify(&file, Some(&FOOBARBAZ_MD5.to_uppercase())).await.unwrap());
        assert!(!verify(&file, Some("00000000000000000000000000000000")).await.unwrap());
    }

    #[tokio::test]
    async fn verify_uses_sha256_for_long_digests() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        tokio::fs::write(&file, b"foobarbaz").await.unwrap();

        assert_eq!(
            checksum(&file, ChecksumAlgorithm::Sha256).await.unwrap(),
            FOOBARBAZ_SHA256
        );
        assert!(verify(&file, Some(&FOOBARBAZ_SHA256.to_uppercase())).await.unwrap());
    }

    #[tokio::test]
    async fn verify_of_missing_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let result = verify(&dir.path().join("nope"), Some(FOOBARBAZ_MD5)).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
