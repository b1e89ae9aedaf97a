//! Error kinds surfaced by the engine.

use thiserror::Error;

/// Every failure the engine can report.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path does not exist where existence was required.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path resolves to a file where a directory was required.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Path resolves to a directory where a file was required.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("cannot delete root directory")]
    RootDirectory,

    /// Block id 0 or an offset past the end of the block file.
    #[error("invalid block id: {0}")]
    InvalidBlockId(u32),

    #[error("no free blocks available")]
    CapacityExhausted,

    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),

    /// Cycle in an index chain, or an id/extent out of range.
    #[error("corrupt chain: {0}")]
    CorruptChain(String),

    #[error("payload of {len} bytes exceeds block capacity of {max}")]
    OversizedPayload { len: usize, max: usize },

    #[error("invalid volume format: {0}")]
    InvalidFormat(&'static str),

    #[error("decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, FsError>;
