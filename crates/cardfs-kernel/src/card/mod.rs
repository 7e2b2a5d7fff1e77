//! The mounted card.
//!
//! [`Card`] owns the volume for the life of the process. It is created
//! unmounted, mounted once through a [`CardSlot`], and handed to every
//! component that touches storage. A failed mount is final: the card
//! stays in the failed state and every storage operation reports
//! [`VfsError::NotMounted`].

mod capacity;
mod slot;

pub use capacity::{convert_bytes, CapacityReport, CardType, MemoryUnit};
pub use slot::{CardInfo, CardSlot, DirectorySlot, MemorySlot};

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum::Display;
use thiserror::Error;

use crate::vfs::{VfsError, VfsResult, VolumeOps};

/// Why the card could not be mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MountErrorCode {
    #[strum(to_string = "No error")]
    None,
    #[strum(to_string = "Failed to set up pins")]
    PinSetupFailed,
    #[strum(to_string = "Failed to mount card")]
    MountFailed,
    #[strum(to_string = "No card found")]
    NoCardPresent,
}

/// Mount-time failure.
#[derive(Debug, Error)]
#[error("{code}: {detail}")]
pub struct MountError {
    pub code: MountErrorCode,
    pub detail: String,
}

impl MountError {
    pub fn new(code: MountErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

enum MountState {
    Unmounted,
    Mounted {
        volume: Arc<dyn VolumeOps>,
        info: CardInfo,
    },
    Failed(MountErrorCode),
}

/// The card and its mount state.
pub struct Card {
    mount_point: PathBuf,
    state: RwLock<MountState>,
}

impl std::fmt::Debug for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Card")
            .field("mount_point", &self.mount_point)
            .field("error_code", &self.error_code())
            .finish()
    }
}

impl Card {
    /// Create an unmounted card that will appear at `mount_point`
    /// (e.g. `/sdcard`).
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: normalize_mount_point(mount_point.into()),
            state: RwLock::new(MountState::Unmounted),
        }
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Bring the card up through `slot`.
    ///
    /// Mounting an already mounted card is a no-op. After a failure the
    /// card is not retried; later calls return the recorded error code.
    pub async fn mount(&self, slot: &dyn CardSlot) -> Result<(), MountError> {
        {
            let state = self.state.read();
            match &*state {
                MountState::Mounted { .. } => return Ok(()),
                MountState::Failed(code) => {
                    return Err(MountError::new(*code, "earlier mount failed"));
                }
                MountState::Unmounted => {}
            }
        }

        tracing::debug!("mounting card from {} slot", slot.name());
        match Self::bring_up(slot).await {
            Ok((volume, info)) => {
                tracing::info!(
                    "card {} mounted at {} ({} bytes, {})",
                    info.name,
                    self.mount_point.display(),
                    info.capacity_bytes,
                    CardType::from_capacity(info.capacity_bytes)
                );
                *self.state.write() = MountState::Mounted { volume, info };
                Ok(())
            }
            Err(err) => {
                tracing::error!("card mount failed: {}", err);
                *self.state.write() = MountState::Failed(err.code);
                Err(err)
            }
        }
    }

    async fn bring_up(slot: &dyn CardSlot) -> Result<(Arc<dyn VolumeOps>, CardInfo), MountError> {
        slot.configure()
            .await
            .map_err(|e| MountError::new(MountErrorCode::PinSetupFailed, e.to_string()))?;
        let volume = slot
            .attach()
            .await
            .map_err(|e| MountError::new(MountErrorCode::MountFailed, e.to_string()))?;
        let info = slot
            .probe(volume.as_ref())
            .await
            .ok_or_else(|| MountError::new(MountErrorCode::NoCardPresent, "no media detected"))?;
        Ok((volume, info))
    }

    /// Detach the volume. Returns `true` if a volume was mounted.
    ///
    /// Transfers already holding the volume keep it until they finish.
    pub fn unmount(&self) -> bool {
        let mut state = self.state.write();
        if matches!(*state, MountState::Mounted { .. }) {
            *state = MountState::Unmounted;
            tracing::info!("card unmounted from {}", self.mount_point.display());
            true
        } else {
            false
        }
    }

    pub fn is_mounted(&self) -> bool {
        matches!(*self.state.read(), MountState::Mounted { .. })
    }

    /// The mount-time error, `MountErrorCode::None` unless a mount failed.
    pub fn error_code(&self) -> MountErrorCode {
        match *self.state.read() {
            MountState::Failed(code) => code,
            _ => MountErrorCode::None,
        }
    }

    /// The mounted volume, or `NotMounted`.
    pub fn volume(&self) -> VfsResult<Arc<dyn VolumeOps>> {
        match &*self.state.read() {
            MountState::Mounted { volume, .. } => Ok(Arc::clone(volume)),
            _ => Err(VfsError::NotMounted),
        }
    }

    pub fn info(&self) -> Option<CardInfo> {
        match &*self.state.read() {
            MountState::Mounted { info, .. } => Some(info.clone()),
            _ => None,
        }
    }

    /// Translate an absolute path under the mount point into a
    /// volume-relative one.
    pub fn to_volume_relative(&self, path: &Path) -> VfsResult<PathBuf> {
        path.strip_prefix(&self.mount_point)
            .map(Path::to_path_buf)
            .map_err(|_| VfsError::path_escapes_root(path.display().to_string()))
    }

    /// Find the volume and the volume-relative path for an absolute path.
    pub fn route(&self, path: &Path) -> VfsResult<(Arc<dyn VolumeOps>, PathBuf)> {
        let volume = self.volume()?;
        let relative = self.to_volume_relative(path)?;
        Ok((volume, relative))
    }

    /// Capacity class of the inserted card, `Unknown` when unmounted.
    pub fn card_type(&self) -> CardType {
        self.info()
            .map(|info| CardType::from_capacity(info.capacity_bytes))
            .unwrap_or(CardType::Unknown)
    }

    /// Current used, total and free space. All zero when unmounted.
    pub async fn capacity(&self) -> CapacityReport {
        let Ok(volume) = self.volume() else {
            return CapacityReport::default();
        };
        match volume.statfs().await {
            Ok(stat) => CapacityReport::from_statfs(&stat),
            Err(e) => {
                tracing::warn!("capacity query failed: {}", e);
                CapacityReport::default()
            }
        }
    }

    /// Size of the file at an absolute path, 0 if missing or unmounted.
    pub async fn file_size(&self, path: &Path) -> u64 {
        let Ok((volume, relative)) = self.route(path) else {
            return 0;
        };
        match volume.stat(&relative).await {
            Ok(attr) => attr.size,
            Err(e) => {
                tracing::debug!("file size of {}: {}", path.display(), e);
                0
            }
        }
    }
}

/// Ensure the mount point starts with `/` and has no trailing slash.
fn normalize_mount_point(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    let s = s.trim_end_matches('/');
    if s.is_empty() {
        PathBuf::from("/")
    } else if !s.starts_with('/') {
        PathBuf::from(format!("/{}", s))
    } else {
        PathBuf::from(s)
    }
}
