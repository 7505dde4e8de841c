//! Error types for the strand-blockstore crate

use cid::Cid;
use thiserror::Error;

/// Result type alias using `BlockStoreError`
pub type Result<T> = std::result::Result<T, BlockStoreError>;

/// Errors from block routing, object storage and the fallback node
#[derive(Error, Debug)]
pub enum BlockStoreError {
    /// A block every source agreed was absent
    #[error("block {0} not found")]
    NotFound(Cid),

    /// Object missing at a direct URL
    #[error("no object at {0}")]
    NotFoundAt(String),

    #[error("invalid CID: {0}")]
    InvalidCid(String),

    /// Object key that does not decode to a CID
    #[error("invalid object key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// Every read strategy failed; carries the last failure
    #[error("storage unavailable after {attempts} attempts: {last}")]
    StorageUnavailable {
        attempts: usize,
        last: Box<BlockStoreError>,
    },

    #[error("garbage collection is not supported by object storage")]
    GcUnsupported,

    /// Bulk results could not be matched back to their request positions
    #[error("index alignment fault: {0}")]
    IndexAlignmentFault(String),

    /// Request refused by the authenticating node or the object store
    #[error("authorization failed: {0}")]
    AuthFailed(String),

    #[error("transaction {0} is not open")]
    UnknownTransaction(String),

    /// Registry lookup failed or named no storage provider
    #[error("registry: {0}")]
    Registry(String),

    /// Block bytes that do not decode as DAG-CBOR
    #[error("undecodable block: {0}")]
    Deserialization(String),

    /// Uploaded bytes that do not hash to their key
    #[error("content of {expected} does not match: {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("unreachable: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// Non-success response not covered by a more specific variant
    #[error("http: {0}")]
    Http(String),

    #[error("crypto: {0}")]
    Crypto(#[from] strand_crypto::CryptoError),

    #[error("configuration: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for BlockStoreError {
    fn from(err: reqwest::Error) -> Self {
        let target = err.url().map(ToString::to_string).unwrap_or_default();
        if err.is_timeout() {
            BlockStoreError::Timeout(target)
        } else if err.is_connect() {
            BlockStoreError::Connection(format!("{target}: {err}"))
        } else {
            BlockStoreError::Http(err.to_string())
        }
    }
}

impl From<serde_ipld_dagcbor::DecodeError<std::convert::Infallible>> for BlockStoreError {
    fn from(err: serde_ipld_dagcbor::DecodeError<std::convert::Infallible>) -> Self {
        BlockStoreError::Deserialization(err.to_string())
    }
}

impl From<cid::Error> for BlockStoreError {
    fn from(err: cid::Error) -> Self {
        BlockStoreError::InvalidCid(err.to_string())
    }
}
