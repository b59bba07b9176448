//! Download finalization: assemble chunk files and verify the result.

use std::path::{Path, PathBuf};

use crate::assembler::{ChecksumAlgorithm, checksum, reconcile};
use crate::error::{Error, Result};
use crate::types::DownloadChunk;

use super::context::DownloadTaskContext;

/// Merge the fetched chunks into the destination file and check its digest.
///
/// `expected_checksum` is enforced: a mismatch fails the download but leaves the
/// assembled file in place. `etag_digest` is only compared and logged.
pub(super) async fn assemble_and_verify(
    ctx: &DownloadTaskContext,
    chunks: &[DownloadChunk],
    expected_checksum: Option<&str>,
    etag_digest: Option<&str>,
) -> Result<PathBuf> {
    let request = &ctx.request;
    let path = reconcile(&request.destination_dir, &request.file_name, chunks)
        .await?
        .ok_or_else(|| Error::Other("no chunks to assemble".to_string()))?;

    if let Some(expected) = expected_checksum.map(str::trim).filter(|c| !c.is_empty()) {
        let actual = digest_of(&path, expected).await?;
        if !actual.eq_ignore_ascii_case(expected) {
            tracing::warn!(
                download_id = ctx.id.0,
                expected,
                actual = %actual,
                "Checksum mismatch"
            );
            return Err(Error::ChecksumMismatch {
                path,
                expected: expected.to_string(),
                actual,
            });
        }
        tracing::info!(download_id = ctx.id.0, "Checksum verified");
    } else if let Some(etag) = etag_digest {
        let actual = digest_of(&path, etag).await?;
        if actual.eq_ignore_ascii_case(etag) {
            tracing::debug!(download_id = ctx.id.0, "ETag matches file digest");
        } else {
            tracing::warn!(
                download_id = ctx.id.0,
                etag,
                actual = %actual,
                "ETag does not match file digest, keeping file"
            );
        }
    }

    Ok(path)
}

async fn digest_of(path: &Path, expected_hex: &str) -> Result<String> {
    checksum(path, ChecksumAlgorithm::for_hex(expected_hex)).await
}
