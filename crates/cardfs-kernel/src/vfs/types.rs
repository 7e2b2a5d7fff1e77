//! Core storage types.
//!
//! Everything here is plain data: attributes, directory entries, open
//! modes and volume statistics. Symbolic links are not modelled; the card
//! formats we serve (FAT/exFAT) have none.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Last modification time.
    pub mtime: SystemTime,
}

impl FileAttr {
    /// Create attributes for a new file.
    pub fn file(size: u64) -> Self {
        Self {
            size,
            kind: FileType::File,
            mtime: SystemTime::now(),
        }
    }

    /// Create attributes for a new directory.
    pub fn directory() -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            mtime: SystemTime::now(),
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// One direct child of a directory, as enumerated by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, FileType::File, size)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory, 0)
    }
}

/// A listed or stat'ed entry, path relative to the point it was listed from.
///
/// Paths use `/` separators and never start with one: listing `/sdcard`
/// yields `a.txt`, `sub` and `sub/b.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, size: u64, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            size,
            is_directory,
        }
    }

    /// Build an entry from stat attributes.
    pub fn from_attr(path: impl Into<String>, attr: &FileAttr) -> Self {
        Self::new(path, attr.size, attr.is_dir())
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Number of path components (1 for a direct child).
    pub fn depth(&self) -> usize {
        self.path.split('/').filter(|s| !s.is_empty()).count()
    }
}

/// Volume statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatFs {
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Available blocks (to non-root).
    pub bavail: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
}

impl StatFs {
    /// Total capacity in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.blocks.saturating_mul(self.frsize as u64)
    }

    /// Bytes available for new data.
    pub fn free_bytes(&self) -> u64 {
        self.bavail.saturating_mul(self.frsize as u64)
    }

    /// Bytes in use.
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes().saturating_sub(self.free_bytes())
    }
}

impl Default for StatFs {
    fn default() -> Self {
        Self {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            bsize: 512,
            namelen: 255,
            frsize: 512,
        }
    }
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read from the start; the file must exist.
    Read,
    /// Create or truncate, then write.
    Write,
    /// Create if missing, write at the end.
    Append,
}

impl OpenMode {
    /// Returns true if the mode mutates the volume.
    pub fn is_write(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// Dot-prefixed names are the volume's own bookkeeping and never listed.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
