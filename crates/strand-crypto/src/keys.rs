//! Key material for the Strand storage system
//!
//! - `SymmetricKey`: base key that decrypts every chunk of a file and its metadata
//! - `StreamSecret`: optional seed that makes chunk locations derivable
//! - `WriterKeyPair`: ed25519 key that signs the hashes of blocks a writer uploads

use crate::{CryptoError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 takes 96 bit nonces
pub const NONCE_SIZE: usize = 12;

pub const STREAM_SECRET_SIZE: usize = 32;

pub const SIGNATURE_SIZE: usize = 64;

pub const PUBLIC_KEY_SIZE: usize = 32;

fn random<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn exact<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("{what} must be {N} bytes, got {}", bytes.len())))
}

/// Base key of a file: seals every chunk and every chunk node
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    pub fn generate() -> Self {
        Self(random())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        exact(bytes, "symmetric key").map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Seed for deterministic chunk addressing.
///
/// With a stream secret the map key of chunk `n` is computed locally instead of
/// being read from chunk `n - 1`'s metadata.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct StreamSecret([u8; STREAM_SECRET_SIZE]);

impl StreamSecret {
    pub fn generate() -> Self {
        Self(random())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        exact(bytes, "stream secret").map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; STREAM_SECRET_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for StreamSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamSecret(..)")
    }
}

/// Signing key of a writer
#[derive(Clone)]
pub struct WriterKeyPair {
    signing: SigningKey,
}

impl WriterKeyPair {
    /// Generate a new random writer key
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let signing = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Self { signing }
    }

    /// Restore a writer key from its 32 byte seed
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = exact(seed, "signing seed")?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Public half of the key
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.signing.verifying_key().to_bytes()
    }

    /// Sign a message, returning `signature || message`
    pub fn sign_message(&self, message: &[u8]) -> Vec<u8> {
        let signature = self.signing.sign(message);
        let mut signed = Vec::with_capacity(SIGNATURE_SIZE + message.len());
        signed.extend_from_slice(&signature.to_bytes());
        signed.extend_from_slice(message);
        signed
    }
}

impl std::fmt::Debug for WriterKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WriterKeyPair({})", hex::encode(self.public_key()))
    }
}

/// Verify a `signature || message` blob against a public key, returning the message
pub fn open_signed_message<'a>(public_key: &[u8], signed: &'a [u8]) -> Result<&'a [u8]> {
    if signed.len() < SIGNATURE_SIZE {
        return Err(CryptoError::SignedMessageTooShort(signed.len()));
    }
    let key: [u8; PUBLIC_KEY_SIZE] = exact(public_key, "public key")?;
    let verifying =
        VerifyingKey::from_bytes(&key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let (sig_bytes, message) = signed.split_at(SIGNATURE_SIZE);
    let sig: [u8; SIGNATURE_SIZE] = exact(sig_bytes, "signature")?;
    verifying
        .verify(message, &Signature::from_bytes(&sig))
        .map_err(|_| CryptoError::SignatureVerification)?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_key_generation() {
        let key1 = SymmetricKey::generate();
        let key2 = SymmetricKey::generate();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_symmetric_key_wrong_length() {
        assert!(matches!(
            SymmetricKey::from_bytes(&[0u8; 16]),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = SymmetricKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        assert_eq!(format!("{:?}", key), "SymmetricKey(..)");
    }

    #[test]
    fn test_signed_message_roundtrip() {
        let writer = WriterKeyPair::generate();
        let signed = writer.sign_message(b"block hash");

        let opened = open_signed_message(&writer.public_key(), &signed).unwrap();
        assert_eq!(opened, b"block hash");
    }

    #[test]
    fn test_signed_message_wrong_key() {
        let writer = WriterKeyPair::generate();
        let other = WriterKeyPair::generate();
        let signed = writer.sign_message(b"block hash");

        let result = open_signed_message(&other.public_key(), &signed);
        assert!(matches!(result, Err(CryptoError::SignatureVerification)));
    }

    #[test]
    fn test_signed_message_tampered() {
        let writer = WriterKeyPair::generate();
        let mut signed = writer.sign_message(b"block hash");
        let last = signed.len() - 1;
        signed[last] ^= 1;

        assert!(open_signed_message(&writer.public_key(), &signed).is_err());
    }

    #[test]
    fn test_writer_from_seed_is_stable() {
        let a = WriterKeyPair::from_seed(&[3u8; 32]).unwrap();
        let b = WriterKeyPair::from_seed(&[3u8; 32]).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }
}
