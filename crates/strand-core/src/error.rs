//! Error types for the strand-core crate

use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in stream operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Read at the end of the stream, or a chunk is missing from the chain
    #[error("end of stream")]
    EndOfStream,

    /// A file's chunk chain points at directory metadata
    #[error("file chunk chain is linked to a directory")]
    LinkedToDirectory,

    /// Seek target beyond the end of the stream
    #[error("cannot seek to {offset} in a stream of {length} bytes")]
    InvalidSeek { offset: u64, length: u64 },

    /// First chunk does not have the length the stream requires
    #[error("initial chunk has {actual} bytes, expected {expected}")]
    InvalidInitialChunk { expected: usize, actual: usize },

    /// Chain-walked chunk node without a stored next pointer
    #[error("chunk node has no next pointer")]
    MissingNextPointer,

    /// Capability does not grant access to a location
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Block store error
    #[error("block store error: {0}")]
    BlockStore(#[from] strand_blockstore::BlockStoreError),

    /// Crypto error
    #[error("crypto error: {0}")]
    Crypto(#[from] strand_crypto::CryptoError),
}
