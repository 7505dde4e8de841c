//! Hashing behind a small object-safe trait
//!
//! Chunk addressing takes a `&dyn Hasher` so the derivation does not hard-code
//! its digest. The network facade supplies `Sha256Hasher`.

use sha2::{Digest, Sha256};

/// Size of a hash output in bytes (256 bits)
pub const HASH_BYTE_SIZE: usize = 32;

/// Type alias for hash output bytes
pub type HashOutput = [u8; HASH_BYTE_SIZE];

/// A hash function usable as `&dyn Hasher`
pub trait Hasher: Send + Sync {
    /// Hash a single buffer
    fn hash(&self, data: &[u8]) -> HashOutput;

    /// Hash several parts, each prefixed with its length so that
    /// `["ab", "c"]` and `["a", "bc"]` differ
    fn hash_parts(&self, parts: &[&[u8]]) -> HashOutput {
        let mut buf = Vec::with_capacity(parts.iter().map(|p| p.len() + 8).sum());
        for part in parts {
            buf.extend_from_slice(&(part.len() as u64).to_le_bytes());
            buf.extend_from_slice(part);
        }
        self.hash(&buf)
    }
}

/// SHA2-256 hasher
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> HashOutput {
        Sha256::digest(data).into()
    }
}
