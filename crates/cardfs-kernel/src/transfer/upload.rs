//! Push-model file upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{TransferError, TransferResult};
use crate::vfs::{FileHandle, OpenMode, VolumeOps};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Space checked, file not opened yet.
    Pending,
    /// File open, bytes arriving.
    Writing,
    /// All declared bytes stored and the file closed.
    Complete,
    /// Cleaned up after an error or abort.
    Failed,
}

/// An in-flight upload.
///
/// Free space is checked before anything touches the volume. The target
/// is opened (and truncated) on the first pushed bytes. When the declared
/// length has been received the file is closed and the upload is
/// complete. Any error, an [`abort`], or dropping an unfinished upload
/// closes the file and removes the partial content.
///
/// [`abort`]: Upload::abort
pub struct Upload {
    volume: Arc<dyn VolumeOps>,
    path: PathBuf,
    expected: u64,
    received: u64,
    handle: Option<Box<dyn FileHandle>>,
    phase: Phase,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("path", &self.path)
            .field("expected", &self.expected)
            .field("received", &self.received)
            .field("phase", &self.phase)
            .finish()
    }
}

impl Upload {
    /// Start an upload of `expected` bytes to `path`.
    ///
    /// Fails with [`TransferError::InsufficientStorage`] when the volume
    /// has less free space than `expected`; the file is never opened in
    /// that case.
    pub async fn begin(
        volume: Arc<dyn VolumeOps>,
        path: impl Into<PathBuf>,
        expected: u64,
    ) -> TransferResult<Self> {
        let path = path.into();
        let available = volume.statfs().await?.free_bytes();
        if expected > available {
            tracing::debug!(
                "upload {} refused: {} bytes declared, {} free",
                path.display(),
                expected,
                available
            );
            return Err(TransferError::InsufficientStorage {
                required: expected,
                available,
            });
        }

        tracing::debug!("upload {} ({} bytes) started", path.display(), expected);
        Ok(Self {
            volume,
            path,
            expected,
            received: 0,
            handle: None,
            phase: Phase::Pending,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Write the next piece of the body.
    ///
    /// Bytes beyond the declared length are discarded. Reaching the
    /// declared length closes the file and completes the upload. On error
    /// the partial file has been removed by the time this returns.
    pub async fn push(&mut self, data: &[u8]) -> TransferResult<()> {
        match self.phase {
            Phase::Pending => self.open().await?,
            Phase::Writing => {}
            Phase::Complete => {
                if !data.is_empty() {
                    tracing::warn!(
                        "upload {}: discarding {} bytes past declared length",
                        self.path.display(),
                        data.len()
                    );
                }
                return Ok(());
            }
            Phase::Failed => return Err(TransferError::Closed),
        }

        let room = self.expected - self.received;
        let data = if data.len() as u64 > room {
            tracing::warn!(
                "upload {}: discarding {} bytes past declared length",
                self.path.display(),
                data.len() as u64 - room
            );
            &data[..room as usize]
        } else {
            data
        };

        if !data.is_empty() {
            let result = match self.handle.as_mut() {
                Some(handle) => handle.write(data).await,
                None => return Err(TransferError::Closed),
            };
            match result {
                Ok(written) if written == data.len() => self.received += written as u64,
                Ok(written) => {
                    self.cleanup().await;
                    return Err(TransferError::ShortWrite {
                        written,
                        offered: data.len(),
                    });
                }
                Err(e) => {
                    self.cleanup().await;
                    return Err(e.into());
                }
            }
        }

        if self.received >= self.expected {
            self.complete().await?;
        }
        Ok(())
    }

    /// Finish after the body ended.
    ///
    /// Returns the number of bytes stored. If fewer than the declared
    /// bytes arrived, the partial file is removed and
    /// [`TransferError::Incomplete`] is returned.
    pub async fn finish(mut self) -> TransferResult<u64> {
        match self.phase {
            Phase::Complete => Ok(self.received),
            // Empty body with a zero declared length still creates the file
            Phase::Pending if self.expected == 0 => {
                self.open().await?;
                self.complete().await?;
                Ok(0)
            }
            Phase::Pending | Phase::Writing => {
                self.cleanup().await;
                Err(TransferError::Incomplete {
                    expected: self.expected,
                    received: self.received,
                })
            }
            Phase::Failed => Err(TransferError::Closed),
        }
    }

    /// Abandon the upload and remove any partial file.
    ///
    /// A completed upload is left in place.
    pub async fn abort(mut self) {
        if matches!(self.phase, Phase::Pending | Phase::Writing) {
            tracing::debug!(
                "upload {} aborted after {} of {} bytes",
                self.path.display(),
                self.received,
                self.expected
            );
            self.cleanup().await;
        }
    }

    async fn open(&mut self) -> TransferResult<()> {
        match self.volume.open(&self.path, OpenMode::Write).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.phase = Phase::Writing;
                Ok(())
            }
            Err(e) => {
                self.phase = Phase::Failed;
                Err(TransferError::OpenFailed(e))
            }
        }
    }

    async fn complete(&mut self) -> TransferResult<()> {
        // Taken first so a failed close is not retried by cleanup
        let closed = match self.handle.take() {
            Some(mut handle) => handle.close().await,
            None => Ok(()),
        };
        if let Err(e) = closed {
            self.cleanup().await;
            return Err(e.into());
        }
        self.phase = Phase::Complete;
        tracing::info!("stored {} ({} bytes)", self.path.display(), self.received);
        Ok(())
    }

    /// Close the handle if open and remove whatever was written.
    async fn cleanup(&mut self) {
        let opened = self.phase == Phase::Writing;
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.close().await {
                tracing::warn!("close {} failed: {}", self.path.display(), e);
            }
        }
        if opened {
            match self.volume.remove(&self.path).await {
                Ok(()) => tracing::debug!("removed partial {}", self.path.display()),
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::warn!("remove partial {} failed: {}", self.path.display(), e),
            }
        }
        self.phase = Phase::Failed;
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        if self.phase != Phase::Writing {
            return;
        }
        // Close before removing
        drop(self.handle.take());

        let volume = Arc::clone(&self.volume);
        let path = std::mem::take(&mut self.path);
        tracing::debug!(
            "upload {} dropped after {} of {} bytes",
            path.display(),
            self.received,
            self.expected
        );
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = volume.remove(&path).await {
                        if !e.is_not_found() {
                            tracing::warn!("remove partial {} failed: {}", path.display(), e);
                        }
                    }
                });
            }
            Err(_) => tracing::warn!("no runtime to remove partial {}", path.display()),
        }
    }
}
