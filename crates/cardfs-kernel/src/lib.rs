//! # cardfs-kernel
//!
//! Storage side of cardfs: the card, its volume, and the machinery that
//! moves files between the volume and the network.
//!
//! - [`vfs`] - the storage driver trait and its backends
//! - [`Card`] - the mounted card (mount state, capacity, card type)
//! - [`path`] - request path resolution with traversal rejection
//! - [`walker`] - depth-bounded recursive listing
//! - [`transfer`] - chunked download and upload state machines

pub mod card;
pub mod path;
pub mod transfer;
pub mod vfs;
pub mod walker;

pub use card::{
    convert_bytes, CapacityReport, Card, CardInfo, CardSlot, CardType, DirectorySlot, MemorySlot,
    MemoryUnit, MountError, MountErrorCode,
};
pub use path::PathError;
pub use transfer::{Download, TransferError, TransferResult, Upload};
pub use vfs::{
    backends::{LocalBackend, MemoryBackend},
    DirEntry, FileAttr, FileEntry, FileHandle, FileType, OpenMode, StatFs, VfsError, VfsResult,
    VolumeOps,
};
pub use walker::walk;
