//! Pull-model file download.

use futures::Stream;
use std::path::{Path, PathBuf};

use super::{chunk_size_for, TransferError, TransferResult};
use crate::vfs::{FileHandle, OpenMode, VolumeOps};

/// An in-flight download.
///
/// The file stays open while the download is live. It is closed when the
/// end-of-stream chunk is produced, when a read fails, on [`abort`], or
/// when the download is dropped.
///
/// [`abort`]: Download::abort
pub struct Download {
    handle: Option<Box<dyn FileHandle>>,
    path: PathBuf,
    total_size: u64,
    bytes_sent: u64,
    chunk_size: usize,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("path", &self.path)
            .field("total_size", &self.total_size)
            .field("bytes_sent", &self.bytes_sent)
            .field("chunk_size", &self.chunk_size)
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl Download {
    /// Open `path` for download and size the chunks for it.
    pub async fn open(volume: &dyn VolumeOps, path: &Path) -> TransferResult<Self> {
        let mut handle = volume.open(path, OpenMode::Read).await?;
        let total_size = match handle.size().await {
            Ok(size) => size,
            Err(e) => {
                if let Err(close_err) = handle.close().await {
                    tracing::warn!("close {} failed: {}", path.display(), close_err);
                }
                return Err(e.into());
            }
        };

        tracing::debug!("download {} ({} bytes) started", path.display(), total_size);
        Ok(Self {
            handle: Some(handle),
            path: path.to_path_buf(),
            total_size,
            bytes_sent: 0,
            chunk_size: chunk_size_for(total_size),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// True while the file handle is held.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Produce the next chunk of at most `max_len` bytes.
    ///
    /// Returns an empty chunk exactly once, after the last byte, and
    /// closes the file at that point. Any later call fails with
    /// [`TransferError::Closed`]. A failed read closes the file before
    /// the error is returned.
    pub async fn next_chunk(&mut self, max_len: usize) -> TransferResult<Vec<u8>> {
        if self.handle.is_none() {
            return Err(TransferError::Closed);
        }

        if self.bytes_sent >= self.total_size {
            self.release().await;
            tracing::debug!("download {} complete", self.path.display());
            return Ok(Vec::new());
        }

        let remaining = self.total_size - self.bytes_sent;
        let want = (max_len.max(1).min(self.chunk_size) as u64).min(remaining) as usize;

        let result = match self.handle.as_mut() {
            Some(handle) => handle.read(want).await,
            None => return Err(TransferError::Closed),
        };

        match result {
            Ok(chunk) if chunk.len() == want => {
                self.bytes_sent += want as u64;
                Ok(chunk)
            }
            Ok(chunk) => {
                self.release().await;
                Err(TransferError::ShortRead {
                    expected: want,
                    got: chunk.len(),
                })
            }
            Err(e) => {
                self.release().await;
                Err(e.into())
            }
        }
    }

    /// Stop the download early and close the file.
    pub async fn abort(mut self) {
        tracing::debug!(
            "download {} aborted after {} of {} bytes",
            self.path.display(),
            self.bytes_sent,
            self.total_size
        );
        self.release().await;
    }

    /// Turn the download into a stream of chunks of at most `max_len`
    /// bytes.
    ///
    /// The stream ends after the last chunk or after the first error.
    /// Dropping the stream drops the download and closes the file.
    pub fn into_stream(self, max_len: usize) -> impl Stream<Item = TransferResult<Vec<u8>>> + Send {
        futures::stream::unfold(Some(self), move |state| async move {
            let mut download = state?;
            match download.next_chunk(max_len).await {
                Ok(chunk) if chunk.is_empty() => None,
                Ok(chunk) => Some((Ok(chunk), Some(download))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    async fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.close().await {
                tracing::warn!("close {} failed: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for Download {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::debug!(
                "download {} dropped after {} of {} bytes",
                self.path.display(),
                self.bytes_sent,
                self.total_size
            );
        }
    }
}
