//! In-memory volume backend.
//!
//! Stands in for a card in tests and for `MemorySlot`. Capacity is fixed at
//! construction so "disk full" and short writes can be exercised, and open
//! handles are counted so leaks show up in assertions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{FileHandle, VolumeOps};
use crate::vfs::types::{is_hidden, DirEntry, FileAttr, FileType, OpenMode, StatFs};

/// Block size reported by [`MemoryBackend::statfs`].
const MEMORY_BLOCK_SIZE: u64 = 512;

/// Default capacity: 64 MiB.
pub const DEFAULT_MEMORY_CAPACITY: u64 = 64 * 1024 * 1024;

/// Entry in the memory volume.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, mtime: SystemTime },
    Directory { mtime: SystemTime },
}

impl Entry {
    fn attr(&self) -> FileAttr {
        match self {
            Entry::File { data, mtime } => FileAttr {
                size: data.len() as u64,
                kind: FileType::File,
                mtime: *mtime,
            },
            Entry::Directory { mtime } => FileAttr {
                size: 0,
                kind: FileType::Directory,
                mtime: *mtime,
            },
        }
    }
}

type EntryMap = Arc<RwLock<HashMap<PathBuf, Entry>>>;

/// In-memory volume backend.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    entries: EntryMap,
    capacity: u64,
    open_handles: Arc<AtomicUsize>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty volume with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Create a new empty volume holding at most `capacity` bytes of file data.
    pub fn with_capacity(capacity: u64) -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::new(),
            Entry::Directory {
                mtime: SystemTime::now(),
            },
        );
        Self {
            entries: Arc::new(RwLock::new(entries)),
            capacity,
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of file handles currently open.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Bytes of file data stored.
    pub fn used_bytes(&self) -> u64 {
        self.entries
            .read()
            .map(|entries| used_bytes(&entries))
            .unwrap_or(0)
    }

    /// Normalize a path: drop the root and `.` components.
    ///
    /// `..` is rejected rather than resolved; callers resolve paths before
    /// they reach the driver.
    fn normalize(path: &Path) -> VfsResult<PathBuf> {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    return Err(VfsError::path_escapes_root(path.display().to_string()));
                }
                Component::Normal(s) => result.push(s),
            }
        }
        Ok(result)
    }

    /// Get the path string for error messages.
    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }

    /// Check that `path`'s parent exists and is a directory.
    fn check_parent(entries: &HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        match entries.get(parent) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(VfsError::not_a_directory(Self::path_str(parent))),
            None => Err(VfsError::not_found(Self::path_str(parent))),
        }
    }
}

fn used_bytes(entries: &HashMap<PathBuf, Entry>) -> u64 {
    entries
        .values()
        .map(|e| match e {
            Entry::File { data, .. } => data.len() as u64,
            Entry::Directory { .. } => 0,
        })
        .sum()
}

fn poisoned() -> VfsError {
    VfsError::other("lock poisoned")
}

#[async_trait]
impl VolumeOps for MemoryBackend {
    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path)?;
        let entries = self.entries.read().map_err(|_| poisoned())?;

        entries
            .get(&normalized)
            .map(Entry::attr)
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    async fn list_one_level(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let normalized = Self::normalize(path)?;
        let entries = self.entries.read().map_err(|_| poisoned())?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(VfsError::not_a_directory(Self::path_str(&normalized)));
            }
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        let mut result = Vec::new();
        for (entry_path, entry) in entries.iter() {
            if entry_path == &normalized || entry_path.parent() != Some(normalized.as_path()) {
                continue;
            }
            let Some(name) = entry_path.file_name() else {
                continue;
            };
            let name = name.to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }
            let attr = entry.attr();
            result.push(DirEntry::new(name, attr.kind, attr.size));
        }

        // HashMap order is arbitrary; sort so listings are reproducible
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn open(&self, path: &Path, mode: OpenMode) -> VfsResult<Box<dyn FileHandle>> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        let cursor = match (mode, entries.get_mut(&normalized)) {
            (_, Some(Entry::Directory { .. })) => {
                return Err(VfsError::is_a_directory(Self::path_str(&normalized)));
            }
            (OpenMode::Read, Some(Entry::File { .. })) => 0,
            (OpenMode::Read, None) => {
                return Err(VfsError::not_found(Self::path_str(&normalized)));
            }
            (OpenMode::Write, Some(Entry::File { data, mtime })) => {
                data.clear();
                *mtime = SystemTime::now();
                0
            }
            (OpenMode::Append, Some(Entry::File { data, .. })) => data.len() as u64,
            (OpenMode::Write | OpenMode::Append, None) => {
                Self::check_parent(&entries, &normalized)?;
                entries.insert(
                    normalized.clone(),
                    Entry::File {
                        data: Vec::new(),
                        mtime: SystemTime::now(),
                    },
                );
                0
            }
        };

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryFileHandle {
            entries: Arc::clone(&self.entries),
            open_handles: Arc::clone(&self.open_handles),
            capacity: self.capacity,
            path: normalized,
            cursor,
        }))
    }

    async fn mkdir(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }
        Self::check_parent(&entries, &normalized)?;

        entries.insert(
            normalized,
            Entry::Directory {
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;

        if normalized.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(VfsError::not_a_directory(Self::path_str(&normalized)));
            }
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        let has_children = entries
            .keys()
            .any(|k| k.parent() == Some(normalized.as_path()) && k != &normalized);
        if has_children {
            return Err(VfsError::directory_not_empty(Self::path_str(&normalized)));
        }

        entries.remove(&normalized);
        Ok(())
    }

    async fn remove(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path)?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::File { .. }) => {
                entries.remove(&normalized);
                Ok(())
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn statfs(&self) -> VfsResult<StatFs> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let free = self.capacity.saturating_sub(used_bytes(&entries));
        Ok(StatFs {
            blocks: self.capacity / MEMORY_BLOCK_SIZE,
            bfree: free / MEMORY_BLOCK_SIZE,
            bavail: free / MEMORY_BLOCK_SIZE,
            bsize: MEMORY_BLOCK_SIZE as u32,
            namelen: 255,
            frsize: MEMORY_BLOCK_SIZE as u32,
        })
    }
}

/// Open file on a [`MemoryBackend`].
#[derive(Debug)]
struct MemoryFileHandle {
    entries: EntryMap,
    open_handles: Arc<AtomicUsize>,
    capacity: u64,
    path: PathBuf,
    cursor: u64,
}

impl MemoryFileHandle {
    fn read_from(&self, offset: u64, len: usize) -> VfsResult<Vec<u8>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        match entries.get(&self.path) {
            Some(Entry::File { data, .. }) => {
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(len).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(self.path.display().to_string()))
            }
            None => Err(VfsError::not_found(self.path.display().to_string())),
        }
    }
}

#[async_trait]
impl FileHandle for MemoryFileHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn size(&self) -> VfsResult<u64> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        match entries.get(&self.path) {
            Some(entry) => Ok(entry.attr().size),
            None => Err(VfsError::not_found(self.path.display().to_string())),
        }
    }

    async fn read(&mut self, len: usize) -> VfsResult<Vec<u8>> {
        let data = self.read_from(self.cursor, len)?;
        self.cursor += data.len() as u64;
        Ok(data)
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> VfsResult<Vec<u8>> {
        let size = self.size().await?;
        if offset > size {
            return Err(VfsError::OffsetOutOfRange { offset, size });
        }
        self.cursor = offset;
        self.read(len).await
    }

    async fn write(&mut self, data: &[u8]) -> VfsResult<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let free = self.capacity.saturating_sub(used_bytes(&entries));

        let Some(Entry::File {
            data: file_data,
            mtime,
        }) = entries.get_mut(&self.path)
        else {
            return Err(VfsError::not_found(self.path.display().to_string()));
        };

        let offset = self.cursor as usize;
        let end = offset + data.len();
        let growth = end.saturating_sub(file_data.len()) as u64;
        // Overwriting existing bytes is free; only growth counts against capacity
        let writable = if growth > free {
            data.len().saturating_sub((growth - free) as usize)
        } else {
            data.len()
        };

        let end = offset + writable;
        if end > file_data.len() {
            file_data.resize(end, 0);
        }
        file_data[offset..end].copy_from_slice(&data[..writable]);
        *mtime = SystemTime::now();
        self.cursor = end as u64;
        Ok(writable)
    }

    async fn close(&mut self) -> VfsResult<()> {
        Ok(())
    }
}

impl Drop for MemoryFileHandle {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryBackend::new();
        fs.write_all(Path::new("test.txt"), b"hello world")
            .await
            .unwrap();

        let data = fs.read_all(Path::new("test.txt")).await.unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(fs.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_read_at() {
        let fs = MemoryBackend::new();
        fs.write_all(Path::new("test.txt"), b"hello world")
            .await
            .unwrap();

        let mut handle = fs.open(Path::new("test.txt"), OpenMode::Read).await.unwrap();
        assert_eq!(handle.read_at(6, 5).await.unwrap(), b"world");
        assert_eq!(handle.read_at(0, 5).await.unwrap(), b"hello");
        assert!(matches!(
            handle.read_at(12, 1).await,
            Err(VfsError::OffsetOutOfRange { offset: 12, size: 11 })
        ));
    }

    #[tokio::test]
    async fn test_append_keeps_content() {
        let fs = MemoryBackend::new();
        fs.write_all(Path::new("log.txt"), b"one\n").await.unwrap();
        fs.append(Path::new("log.txt"), b"two\n").await.unwrap();

        let data = fs.read_all(Path::new("log.txt")).await.unwrap();
        assert_eq!(data, b"one\ntwo\n");
    }

    #[tokio::test]
    async fn test_write_mode_truncates() {
        let fs = MemoryBackend::new();
        fs.write_all(Path::new("a.txt"), b"long content").await.unwrap();
        fs.write_all(Path::new("a.txt"), b"short").await.unwrap();
        assert_eq!(fs.read_all(Path::new("a.txt")).await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_open_missing_parent_fails() {
        let fs = MemoryBackend::new();
        let result = fs.open(Path::new("nope/a.txt"), OpenMode::Write).await;
        assert!(result.err().unwrap().is_not_found());
        assert_eq!(fs.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_mkdir_and_list() {
        let fs = MemoryBackend::new();
        fs.mkdir(Path::new("subdir")).await.unwrap();
        fs.write_all(Path::new("subdir/file.txt"), b"1234")
            .await
            .unwrap();
        fs.write_all(Path::new("root.txt"), b"x").await.unwrap();

        let entries = fs.list_one_level(Path::new("")).await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::file("root.txt", 1), DirEntry::directory("subdir")]
        );

        let sub = fs.list_one_level(Path::new("subdir")).await.unwrap();
        assert_eq!(sub, vec![DirEntry::file("file.txt", 4)]);
    }

    #[tokio::test]
    async fn test_mkdir_requires_parent_and_rejects_existing() {
        let fs = MemoryBackend::new();
        assert!(fs.mkdir(Path::new("a/b")).await.unwrap_err().is_not_found());
        fs.mkdir(Path::new("a")).await.unwrap();
        assert!(fs.mkdir(Path::new("a")).await.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn test_hidden_entries_not_listed() {
        let fs = MemoryBackend::new();
        fs.mkdir(Path::new(".Trashes")).await.unwrap();
        fs.write_all(Path::new("visible.txt"), b"v").await.unwrap();

        let entries = fs.list_one_level(Path::new("/")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "visible.txt");
    }

    #[tokio::test]
    async fn test_remove_and_rmdir() {
        let fs = MemoryBackend::new();
        fs.mkdir(Path::new("dir")).await.unwrap();
        fs.write_all(Path::new("dir/f"), b"x").await.unwrap();

        assert!(matches!(
            fs.rmdir(Path::new("dir")).await,
            Err(VfsError::DirectoryNotEmpty(_))
        ));
        assert!(matches!(
            fs.remove(Path::new("dir")).await,
            Err(VfsError::IsADirectory(_))
        ));

        fs.remove(Path::new("dir/f")).await.unwrap();
        fs.rmdir(Path::new("dir")).await.unwrap();
        assert!(fs.stat(Path::new("dir")).await.unwrap_err().is_not_found());
        assert!(fs.remove(Path::new("dir/f")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_capacity_short_write() {
        let fs = MemoryBackend::with_capacity(8);
        let mut handle = fs.open(Path::new("big.bin"), OpenMode::Write).await.unwrap();

        assert_eq!(handle.write(b"12345").await.unwrap(), 5);
        assert_eq!(handle.write(b"67890").await.unwrap(), 3);
        assert_eq!(handle.write(b"x").await.unwrap(), 0);
        drop(handle);

        assert_eq!(fs.read_all(Path::new("big.bin")).await.unwrap(), b"12345678");
        assert_eq!(fs.statfs().await.unwrap().free_bytes(), 0);
    }

    #[tokio::test]
    async fn test_statfs_tracks_usage() {
        let fs = MemoryBackend::with_capacity(4096);
        fs.write_all(Path::new("a"), &[0u8; 1024]).await.unwrap();

        let stat = fs.statfs().await.unwrap();
        assert_eq!(stat.total_bytes(), 4096);
        assert_eq!(stat.free_bytes(), 3072);
        assert_eq!(stat.used_bytes(), 1024);
    }

    #[tokio::test]
    async fn test_handles_counted_until_dropped() {
        let fs = MemoryBackend::new();
        fs.write_all(Path::new("a"), b"x").await.unwrap();

        let first = fs.open(Path::new("a"), OpenMode::Read).await.unwrap();
        let second = fs.open(Path::new("a"), OpenMode::Read).await.unwrap();
        assert_eq!(fs.open_handles(), 2);
        drop(first);
        assert_eq!(fs.open_handles(), 1);
        drop(second);
        assert_eq!(fs.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_parent_segments_rejected() {
        let fs = MemoryBackend::new();
        let result = fs.stat(Path::new("a/../b")).await;
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
    }

    #[tokio::test]
    async fn test_path_normalization() {
        let fs = MemoryBackend::new();
        fs.mkdir(Path::new("/a")).await.unwrap();
        fs.write_all(Path::new("/a/c.txt"), b"c").await.unwrap();

        assert!(fs.stat(Path::new("a/c.txt")).await.is_ok());
        assert!(fs.stat(Path::new("/a/c.txt")).await.is_ok());
        assert!(fs.stat(Path::new("a/./c.txt")).await.is_ok());
    }
}
