//! Volume backends.
//!
//! Backends implement [`VolumeOps`](super::VolumeOps) for different storage types.

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::{MemoryBackend, DEFAULT_MEMORY_CAPACITY};
