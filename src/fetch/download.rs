//! Streams a response body to disk while hashing it.

use std::path::Path;

use futures_util::StreamExt;
use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::fetch::{BodyStream, BoxFuture, Digests, Downloader};
use crate::{AppError, Result};

/// [`Downloader`] that writes to the local filesystem.
///
/// The target file is created (or truncated) before the first chunk arrives
/// and removed again if the transfer fails part way.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileDownloader;

impl Downloader for FileDownloader {
    fn persist<'a>(&'a self, body: BodyStream, path: &'a Path) -> BoxFuture<'a, Result<Digests>> {
        Box::pin(async move {
            match write_body(body, path).await {
                Ok(digests) => {
                    debug!(path = %path.display(), size = digests.size, "download: complete");
                    Ok(digests)
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "download: failed, removing partial file");
                    if let Err(rm) = tokio::fs::remove_file(path).await {
                        debug!(path = %path.display(), error = %rm, "download: nothing to remove");
                    }
                    Err(err)
                }
            }
        })
    }
}

async fn write_body(mut body: BodyStream, path: &Path) -> Result<Digests> {
    let file = File::create(path)
        .await
        .map_err(|e| AppError::Download(format!("cannot create {}: {e}", path.display())))?;
    let mut out = BufWriter::new(file);

    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut size: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        md5.update(&chunk);
        sha256.update(&chunk);
        size += chunk.len() as u64;
        out.write_all(&chunk)
            .await
            .map_err(|e| AppError::Download(format!("write to {} failed: {e}", path.display())))?;
    }

    out.flush()
        .await
        .map_err(|e| AppError::Download(format!("flush of {} failed: {e}", path.display())))?;

    Ok(Digests {
        size,
        md5: format!("{:x}", md5.finalize()),
        sha256: format!("{:x}", sha256.finalize()),
    })
}
