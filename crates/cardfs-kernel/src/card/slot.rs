//! Card slots: where a card's filesystem comes from.
//!
//! A slot is the bring-up side of the card. On a board that means signal
//! lines and a controller; on a host it is a directory or an in-memory
//! volume standing in for the card.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::vfs::{LocalBackend, MemoryBackend, VfsError, VfsResult, VolumeOps};

/// Identity of an inserted card, as seen after attaching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    pub name: String,
    pub capacity_bytes: u64,
}

/// Bring-up boundary for a card slot.
///
/// [`Card::mount`](super::Card::mount) calls these in order and maps each
/// failure onto a [`MountErrorCode`](super::MountErrorCode).
#[async_trait]
pub trait CardSlot: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Configure the slot's signal lines.
    async fn configure(&self) -> VfsResult<()>;

    /// Attach the card's filesystem.
    async fn attach(&self) -> VfsResult<Arc<dyn VolumeOps>>;

    /// Detect the inserted media. `None` means no card.
    async fn probe(&self, volume: &dyn VolumeOps) -> Option<CardInfo>;
}

/// A host directory acting as the card's filesystem.
///
/// Typically the directory where the OS mounted the card, e.g.
/// `/media/sdcard`.
#[derive(Debug, Clone)]
pub struct DirectorySlot {
    root: PathBuf,
    read_only: bool,
}

impl DirectorySlot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

#[async_trait]
impl CardSlot for DirectorySlot {
    fn name(&self) -> &str {
        "directory"
    }

    async fn configure(&self) -> VfsResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(VfsError::invalid_path("empty slot directory"));
        }
        Ok(())
    }

    async fn attach(&self) -> VfsResult<Arc<dyn VolumeOps>> {
        let meta = tokio::fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(VfsError::not_a_directory(self.root.display().to_string()));
        }
        let mut backend = LocalBackend::new(&self.root);
        backend.set_read_only(self.read_only);
        Ok(Arc::new(backend))
    }

    async fn probe(&self, volume: &dyn VolumeOps) -> Option<CardInfo> {
        let stat = match volume.statfs().await {
            Ok(stat) => stat,
            Err(e) => {
                tracing::warn!("statfs on {} failed: {}", self.root.display(), e);
                return None;
            }
        };
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());
        Some(CardInfo {
            name,
            capacity_bytes: stat.total_bytes(),
        })
    }
}

/// An in-memory volume of fixed capacity.
///
/// Clones of the backend share storage, so tests can keep a handle to
/// inspect what the server wrote.
#[derive(Debug, Clone)]
pub struct MemorySlot {
    backend: MemoryBackend,
    present: bool,
}

impl MemorySlot {
    pub fn new(capacity: u64) -> Self {
        Self::from_backend(MemoryBackend::with_capacity(capacity))
    }

    pub fn from_backend(backend: MemoryBackend) -> Self {
        Self {
            backend,
            present: true,
        }
    }

    /// A slot with nothing inserted.
    pub fn empty() -> Self {
        Self {
            backend: MemoryBackend::new(),
            present: false,
        }
    }

    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }
}

#[async_trait]
impl CardSlot for MemorySlot {
    fn name(&self) -> &str {
        "memory"
    }

    async fn configure(&self) -> VfsResult<()> {
        Ok(())
    }

    async fn attach(&self) -> VfsResult<Arc<dyn VolumeOps>> {
        Ok(Arc::new(self.backend.clone()))
    }

    async fn probe(&self, _volume: &dyn VolumeOps) -> Option<CardInfo> {
        self.present.then(|| CardInfo {
            name: "memory".to_string(),
            capacity_bytes: self.backend.capacity(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_directory_slot_attaches_existing_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let slot = DirectorySlot::new(dir.path());
        slot.configure().await.unwrap();
        let volume = slot.attach().await.unwrap();
        assert_eq!(volume.read_all(Path::new("a.txt")).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_directory_slot_missing_dir_fails_attach() {
        let dir = TempDir::new().unwrap();
        let slot = DirectorySlot::new(dir.path().join("nope"));
        assert!(slot.attach().await.is_err());
    }

    #[tokio::test]
    async fn test_directory_slot_read_only() {
        let dir = TempDir::new().unwrap();
        let slot = DirectorySlot::new(dir.path()).with_read_only(true);
        let volume = slot.attach().await.unwrap();
        assert!(volume.read_only());
    }

    #[tokio::test]
    async fn test_memory_slot_probe() {
        let slot = MemorySlot::new(4096);
        let volume = slot.attach().await.unwrap();
        let info = slot.probe(volume.as_ref()).await.unwrap();
        assert_eq!(info.capacity_bytes, 4096);

        let empty = MemorySlot::empty();
        let volume = empty.attach().await.unwrap();
        assert!(empty.probe(volume.as_ref()).await.is_none());
    }
}
