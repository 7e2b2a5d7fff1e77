//! Chunked transfer engine.
//!
//! Moves file bytes between the volume and the network in bounded chunks.
//!
//! - [`Download`] is pulled: the network asks for the next chunk until it
//!   gets an empty one.
//! - [`Upload`] is pushed: the network hands over body bytes as they
//!   arrive, then finishes or aborts.
//!
//! Each transfer owns its file handle. The handle is closed exactly once,
//! either on completion, on error, on abort, or when the transfer is
//! dropped, and an unfinished upload never leaves a partial file behind.

mod download;
mod upload;

pub use download::Download;
pub use upload::Upload;

use thiserror::Error;

use crate::vfs::VfsError;

/// Files smaller than this are sent in one chunk.
pub const SMALL_FILE_LIMIT: u64 = 1024;
/// Files smaller than this use [`MEDIUM_CHUNK_SIZE`].
pub const MEDIUM_FILE_LIMIT: u64 = 1024 * 1024;
pub const MEDIUM_CHUNK_SIZE: usize = 4 * 1024;
pub const LARGE_CHUNK_SIZE: usize = 32 * 1024;

/// Chunk size for a file of `total_size` bytes.
pub fn chunk_size_for(total_size: u64) -> usize {
    if total_size < SMALL_FILE_LIMIT {
        (total_size as usize).max(1)
    } else if total_size < MEDIUM_FILE_LIMIT {
        MEDIUM_CHUNK_SIZE
    } else {
        LARGE_CHUNK_SIZE
    }
}

/// Transfer failure. Cleanup has already happened when one of these is
/// returned.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Not enough free space for the declared upload size.
    #[error("insufficient storage: {required} bytes required, {available} available")]
    InsufficientStorage { required: u64, available: u64 },

    /// The file ended before its recorded size.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    /// The medium accepted fewer bytes than offered.
    #[error("short write: {written} of {offered} bytes written")]
    ShortWrite { written: usize, offered: usize },

    /// The upload body ended before the declared length.
    #[error("incomplete upload: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: u64 },

    /// The upload target could not be opened for writing.
    #[error("cannot open upload target: {0}")]
    OpenFailed(#[source] VfsError),

    /// The transfer was abandoned by the client.
    #[error("transfer aborted")]
    Aborted,

    /// The transfer already finished; its handle is gone.
    #[error("transfer already closed")]
    Closed,

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// Transfer result type.
pub type TransferResult<T> = Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_tiers() {
        assert_eq!(chunk_size_for(0), 1);
        assert_eq!(chunk_size_for(12), 12);
        assert_eq!(chunk_size_for(1023), 1023);
        assert_eq!(chunk_size_for(1024), MEDIUM_CHUNK_SIZE);
        assert_eq!(chunk_size_for(MEDIUM_FILE_LIMIT - 1), MEDIUM_CHUNK_SIZE);
        assert_eq!(chunk_size_for(MEDIUM_FILE_LIMIT), LARGE_CHUNK_SIZE);
        assert_eq!(chunk_size_for(4 * 1024 * 1024 * 1024), LARGE_CHUNK_SIZE);
    }
}
