//! # Strand Crypto
//!
//! Cryptographic building blocks for the Strand chunked file store.
//!
//! This crate provides:
//! - **Symmetric encryption**: ChaCha20-Poly1305 sealing of chunks and metadata
//! - **Hashing**: SHA2-256 behind an object-safe `Hasher`
//! - **Writer signatures**: ed25519 signed block hashes for authorized uploads
//! - **Stream-secret addressing**: deterministic chunk map keys
//!
//! ## Example
//!
//! ```rust,ignore
//! use strand_crypto::{SymmetricKey, symmetric::{encrypt, decrypt}};
//!
//! let key = SymmetricKey::generate();
//! let (nonce, sealed) = encrypt(&key, b"chunk")?;
//! let plain = decrypt(&key, &nonce, &sealed)?;
//! ```

pub mod addressing;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod symmetric;

pub use addressing::{chunk_location, next_chunk_location, BAT_SIZE, MAP_KEY_SIZE};
pub use error::{CryptoError, Result};
pub use hashing::{HashOutput, Hasher, Sha256Hasher};
pub use keys::{open_signed_message, StreamSecret, SymmetricKey, WriterKeyPair};
pub use symmetric::{Aead, Nonce};
