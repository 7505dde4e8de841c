//! Error types for the strand-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors from key handling, sealing and signatures
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("sealing failed")]
    Encryption,

    /// Wrong key, wrong nonce or tampered ciphertext
    #[error("ciphertext failed authentication")]
    Decryption,

    /// Shorter than an authentication tag
    #[error("sealed data truncated to {0} bytes")]
    Truncated(usize),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("nonce has {actual} bytes, expected {expected}")]
    InvalidNonce { expected: usize, actual: usize },

    #[error("signature verification failed")]
    SignatureVerification,

    /// Signed message too short to carry a signature
    #[error("signed message too short: {0} bytes")]
    SignedMessageTooShort(usize),
}
