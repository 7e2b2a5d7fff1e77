//! Storage driver traits.
//!
//! [`VolumeOps`] is the only way the rest of the crate touches a mounted
//! volume. Paths are always relative to the volume root; [`crate::Card`]
//! translates mount-point paths before calling in.
//!
//! Streaming goes through [`FileHandle`], which owns an open file and its
//! cursor. Dropping a handle closes the underlying file.

use async_trait::async_trait;
use std::path::Path;

use super::types::{DirEntry, FileAttr, OpenMode, StatFs};
use super::VfsResult;

/// An open file on the volume.
///
/// Reads and writes are sequential from the handle's cursor. A handle is
/// owned by exactly one transfer; it is never shared.
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// Path the handle was opened with (volume-relative).
    fn path(&self) -> &Path;

    /// Current file size in bytes.
    async fn size(&self) -> VfsResult<u64>;

    /// Read up to `len` bytes from the cursor, advancing it.
    ///
    /// Keeps reading until `len` bytes are gathered or end of file is
    /// reached, so a short result means end of file.
    async fn read(&mut self, len: usize) -> VfsResult<Vec<u8>>;

    /// Seek to `offset` and read up to `len` bytes.
    ///
    /// Fails with [`VfsError::OffsetOutOfRange`](super::VfsError) if
    /// `offset` lies beyond the end of the file.
    async fn read_at(&mut self, offset: u64, len: usize) -> VfsResult<Vec<u8>>;

    /// Write `data` at the cursor.
    ///
    /// Returns the number of bytes actually written. A short count is not
    /// an error at this layer; callers decide what it means.
    async fn write(&mut self, data: &[u8]) -> VfsResult<usize>;

    /// Flush pending data to the medium.
    ///
    /// The handle should be dropped afterwards.
    async fn close(&mut self) -> VfsResult<()>;
}

/// Core storage driver operations.
#[async_trait]
pub trait VolumeOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    async fn stat(&self, path: &Path) -> VfsResult<FileAttr>;

    /// List the direct children of a directory.
    ///
    /// Dot-prefixed entries are never returned.
    async fn list_one_level(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Open a file.
    ///
    /// `Read` fails if the file is missing. `Write` truncates, `Append`
    /// keeps existing content; both fail if the parent directory is missing.
    async fn open(&self, path: &Path, mode: OpenMode) -> VfsResult<Box<dyn FileHandle>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a directory. The parent must exist.
    async fn mkdir(&self, path: &Path) -> VfsResult<()>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &Path) -> VfsResult<()>;

    /// Remove a file.
    async fn remove(&self, path: &Path) -> VfsResult<()>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns true if this volume is read-only.
    fn read_only(&self) -> bool;

    /// Get volume statistics.
    async fn statfs(&self) -> VfsResult<StatFs>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Read entire file contents.
    async fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let mut handle = self.open(path, OpenMode::Read).await?;
        let size = handle.size().await?;
        let data = handle.read(size as usize).await?;
        handle.close().await?;
        Ok(data)
    }

    /// Replace a file's contents.
    async fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        self.write_with_mode(path, data, OpenMode::Write).await
    }

    /// Append to a file, creating it if missing.
    async fn append(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        self.write_with_mode(path, data, OpenMode::Append).await
    }

    #[doc(hidden)]
    async fn write_with_mode(&self, path: &Path, data: &[u8], mode: OpenMode) -> VfsResult<()> {
        let mut handle = self.open(path, mode).await?;
        let written = handle.write(data).await?;
        handle.close().await?;
        if written < data.len() {
            return Err(super::VfsError::StorageFull);
        }
        Ok(())
    }
}
