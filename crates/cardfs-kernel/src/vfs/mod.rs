//! Storage driver layer.
//!
//! Everything above this module talks to the card through [`VolumeOps`].
//!
//! - [`VolumeOps`] - Core trait for volume operations
//! - [`FileHandle`] - An open file with its own cursor
//! - [`LocalBackend`] - A host directory (the OS-mounted card, with path security)
//! - [`MemoryBackend`] - In-memory volume with a fixed capacity (for testing)
//!
//! Paths given to a backend are relative to the volume root.

pub mod backends;
mod error;
mod ops;
mod types;

pub use backends::{LocalBackend, MemoryBackend, DEFAULT_MEMORY_CAPACITY};
pub use error::{VfsError, VfsResult};
pub use ops::{FileHandle, VolumeOps};
pub use types::{is_hidden, DirEntry, FileAttr, FileEntry, FileType, OpenMode, StatFs};
