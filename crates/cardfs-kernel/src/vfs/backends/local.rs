//! Local directory backend.
//!
//! Serves a host directory as the card's filesystem: either the directory
//! where the card is mounted by the OS, or any directory used as a stand-in
//! during development. Path security prevents escaping the root.

use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{FileHandle, VolumeOps};
use crate::vfs::types::{is_hidden, DirEntry, FileAttr, FileType, OpenMode, StatFs};

/// Local directory backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/media/sdcard`, then `open("DCIM/img.jpg")` opens
/// `/media/sdcard/DCIM/img.jpg`.
///
/// Path security is enforced: attempts to escape via `..` or symlinks are
/// blocked.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    read_only: bool,
}

impl LocalBackend {
    /// Create a new local backend rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            read_only: false,
        }
    }

    /// Create a read-only local backend.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        let mut backend = Self::new(root);
        backend.read_only = true;
        backend
    }

    /// Set whether this backend is read-only.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// Returns an error if the path escapes the root.
    fn resolve(&self, path: &Path) -> VfsResult<PathBuf> {
        // Strip leading slash if present
        let path = path.strip_prefix("/").unwrap_or(path);

        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(VfsError::path_escapes_root(path.display().to_string()));
        }

        // Handle empty path (root)
        if path.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }

        let full = self.root.join(path);

        // Canonicalize to resolve symlinks.
        // For non-existent paths, we need to check the parent
        let canonical = if full.exists() {
            dunce::canonicalize(&full)?
        } else {
            let parent = full
                .parent()
                .ok_or_else(|| VfsError::invalid_path("no parent"))?;
            let filename = full
                .file_name()
                .ok_or_else(|| VfsError::invalid_path("no filename"))?;

            if parent.exists() {
                dunce::canonicalize(parent)?.join(filename)
            } else {
                // Parent doesn't exist, will fail on actual operation
                full
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(VfsError::path_escapes_root(path.display().to_string()));
        }

        Ok(canonical)
    }

    /// Check if write operations are allowed.
    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Convert std::fs::Metadata to FileAttr.
    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };

        FileAttr {
            size: if meta.is_dir() { 0 } else { meta.len() },
            kind,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        }
    }
}

#[async_trait]
impl VolumeOps for LocalBackend {
    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path).await?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn list_one_level(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!("skipping {}: {}", name, e);
                    continue;
                }
            };
            let attr = Self::metadata_to_attr(&meta);
            entries.push(DirEntry::new(name, attr.kind, attr.size));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open(&self, path: &Path, mode: OpenMode) -> VfsResult<Box<dyn FileHandle>> {
        if mode.is_write() {
            self.check_writable()?;
        }
        let full_path = self.resolve(path)?;

        let mut options = fs::OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
        };

        let file = options.open(&full_path).await?;
        if file.metadata().await?.is_dir() {
            return Err(VfsError::is_a_directory(path.display().to_string()));
        }

        Ok(Box::new(LocalFileHandle {
            file,
            path: path.to_path_buf(),
        }))
    }

    async fn mkdir(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        fs::create_dir(&full_path).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        if full_path == self.root {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        fs::remove_dir(&full_path).await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        fs::remove_file(&full_path).await?;
        Ok(())
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn statfs(&self) -> VfsResult<StatFs> {
        #[cfg(unix)]
        {
            use rustix::fs::statvfs;

            let stat = statvfs(&self.root).map_err(|e| VfsError::Io(e.into()))?;

            Ok(StatFs {
                blocks: stat.f_blocks,
                bfree: stat.f_bfree,
                bavail: stat.f_bavail,
                bsize: stat.f_bsize as u32,
                namelen: stat.f_namemax as u32,
                frsize: stat.f_frsize as u32,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(StatFs::default())
        }
    }
}

/// Open file under a [`LocalBackend`] root.
#[derive(Debug)]
struct LocalFileHandle {
    file: fs::File,
    path: PathBuf,
}

#[async_trait]
impl FileHandle for LocalFileHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn size(&self) -> VfsResult<u64> {
        Ok(self.file.metadata().await?.len())
    }

    async fn read(&mut self, len: usize) -> VfsResult<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.file.read(&mut buffer[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> VfsResult<Vec<u8>> {
        let size = self.size().await?;
        if offset > size {
            return Err(VfsError::OffsetOutOfRange { offset, size });
        }
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.read(len).await
    }

    async fn write(&mut self, data: &[u8]) -> VfsResult<usize> {
        let mut written = 0;
        while written < data.len() {
            match self.file.write(&data[written..]).await {
                Ok(0) => break,
                Ok(n) => written += n,
                // Report what made it out; the caller sees the short count
                Err(e) if written > 0 => {
                    tracing::warn!("write to {} stopped early: {}", self.path.display(), e);
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(written)
    }

    async fn close(&mut self) -> VfsResult<()> {
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        (backend, dir)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (backend, _dir) = setup();

        backend
            .write_all(Path::new("test.txt"), b"hello world")
            .await
            .unwrap();

        let data = backend.read_all(Path::new("test.txt")).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_read_at() {
        let (backend, _dir) = setup();
        backend
            .write_all(Path::new("test.txt"), b"hello world")
            .await
            .unwrap();

        let mut handle = backend
            .open(Path::new("test.txt"), OpenMode::Read)
            .await
            .unwrap();
        assert_eq!(handle.read_at(6, 5).await.unwrap(), b"world");
        assert!(matches!(
            handle.read_at(100, 1).await,
            Err(VfsError::OffsetOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_sequential_reads_advance_cursor() {
        let (backend, _dir) = setup();
        backend
            .write_all(Path::new("seq.txt"), b"abcdef")
            .await
            .unwrap();

        let mut handle = backend
            .open(Path::new("seq.txt"), OpenMode::Read)
            .await
            .unwrap();
        assert_eq!(handle.read(2).await.unwrap(), b"ab");
        assert_eq!(handle.read(2).await.unwrap(), b"cd");
        assert_eq!(handle.read(10).await.unwrap(), b"ef");
        assert!(handle.read(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append() {
        let (backend, _dir) = setup();
        backend.append(Path::new("log.txt"), b"a").await.unwrap();
        backend.append(Path::new("log.txt"), b"b").await.unwrap();
        assert_eq!(backend.read_all(Path::new("log.txt")).await.unwrap(), b"ab");
    }

    #[tokio::test]
    async fn test_mkdir_and_list() {
        let (backend, dir) = setup();

        backend.mkdir(Path::new("subdir")).await.unwrap();
        backend
            .write_all(Path::new("subdir/file.txt"), b"1234")
            .await
            .unwrap();
        backend.write_all(Path::new("root.txt"), b"x").await.unwrap();
        std::fs::write(dir.path().join(".hidden"), "meta").unwrap();

        let entries = backend.list_one_level(Path::new("")).await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::file("root.txt", 1), DirEntry::directory("subdir")]
        );
    }

    #[tokio::test]
    async fn test_mkdir_missing_parent_fails() {
        let (backend, _dir) = setup();
        let err = backend.mkdir(Path::new("a/b")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_open_write_missing_parent_fails() {
        let (backend, _dir) = setup();
        let err = backend
            .open(Path::new("missing/a.txt"), OpenMode::Write)
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_and_rmdir() {
        let (backend, _dir) = setup();
        backend.mkdir(Path::new("d")).await.unwrap();
        backend.write_all(Path::new("d/f"), b"x").await.unwrap();

        assert!(backend.rmdir(Path::new("d")).await.is_err());
        backend.remove(Path::new("d/f")).await.unwrap();
        backend.rmdir(Path::new("d")).await.unwrap();
        assert!(backend.stat(Path::new("d")).await.unwrap_err().is_not_found());
        assert!(backend.remove(Path::new("d/f")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_read_only() {
        let (mut backend, _dir) = setup();
        backend.set_read_only(true);

        let result = backend.open(Path::new("test.txt"), OpenMode::Write).await;
        assert!(matches!(result, Err(VfsError::ReadOnly)));
        assert!(matches!(
            backend.mkdir(Path::new("d")).await,
            Err(VfsError::ReadOnly)
        ));
    }

    #[tokio::test]
    async fn test_path_escape_blocked() {
        let (backend, _dir) = setup();

        let result = backend.stat(Path::new("../../../etc/passwd")).await;
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_blocked() {
        let (backend, dir) = setup();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let result = backend.stat(Path::new("link/secret")).await;
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_statfs_reports_capacity() {
        let (backend, _dir) = setup();
        let stat = backend.statfs().await.unwrap();
        assert!(stat.total_bytes() > 0);
        assert!(stat.free_bytes() <= stat.total_bytes());
    }
}
