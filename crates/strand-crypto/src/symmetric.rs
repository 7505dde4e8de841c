//! Sealing of chunk payloads and cryptree nodes
//!
//! A file's `SymmetricKey` seals both the chunk ciphertext and the node that
//! describes it. Each seal draws its own random nonce, which is stored next to
//! the sealed bytes.

use std::fmt;

use chacha20poly1305::aead::{self, Aead as _, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::keys::{SymmetricKey, NONCE_SIZE};
use crate::{CryptoError, Result};

/// Bytes an AEAD seal adds to its input
pub const TAG_SIZE: usize = 16;

/// Per-seal nonce
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Draw a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse a stored nonce
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| CryptoError::InvalidNonce { expected: NONCE_SIZE, actual: bytes.len() })
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.0))
    }
}

/// ChaCha20-Poly1305 bound to one key
pub struct Aead<'k> {
    key: &'k SymmetricKey,
}

impl<'k> Aead<'k> {
    pub fn new(key: &'k SymmetricKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(self.key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Seal `plaintext`; the result is `TAG_SIZE` bytes longer
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher()?
            .encrypt(aead::Nonce::<ChaCha20Poly1305>::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|_| CryptoError::Encryption)
    }

    /// Open `ciphertext`, failing if it was not sealed under this key and nonce
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::Truncated(ciphertext.len()));
        }
        self.cipher()?
            .decrypt(aead::Nonce::<ChaCha20Poly1305>::from_slice(nonce.as_bytes()), ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }
}

/// Seal with a fresh nonce
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::generate();
    let sealed = Aead::new(key).encrypt(&nonce, plaintext)?;
    Ok((nonce, sealed))
}

/// Open bytes sealed by [`encrypt`]
pub fn decrypt(key: &SymmetricKey, nonce: &Nonce, sealed: &[u8]) -> Result<Vec<u8>> {
    Aead::new(key).decrypt(nonce, sealed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_adds_one_tag() {
        let key = SymmetricKey::generate();
        let (nonce, sealed) = encrypt(&key, b"chunk payload").unwrap();

        assert_eq!(sealed.len(), b"chunk payload".len() + TAG_SIZE);
        assert_eq!(decrypt(&key, &nonce, &sealed).unwrap(), b"chunk payload");
    }

    #[test]
    fn test_empty_plaintext_is_just_a_tag() {
        let key = SymmetricKey::generate();
        let (nonce, sealed) = encrypt(&key, &[]).unwrap();

        assert_eq!(sealed.len(), TAG_SIZE);
        assert!(decrypt(&key, &nonce, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_explicit_nonce_roundtrip() {
        let key = SymmetricKey::generate();
        let nonce = Nonce::generate();
        let sealed = Aead::new(&key).encrypt(&nonce, b"node").unwrap();

        assert_eq!(decrypt(&key, &nonce, &sealed).unwrap(), b"node");
    }

    #[test]
    fn test_wrong_key_or_nonce() {
        let key = SymmetricKey::generate();
        let (nonce, sealed) = encrypt(&key, b"secret").unwrap();

        assert!(matches!(decrypt(&SymmetricKey::generate(), &nonce, &sealed), Err(CryptoError::Decryption)));
        assert!(matches!(decrypt(&key, &Nonce::generate(), &sealed), Err(CryptoError::Decryption)));
        assert!(matches!(decrypt(&key, &nonce, &sealed[..4]), Err(CryptoError::Truncated(4))));
    }

    #[test]
    fn test_nonce_length_checked() {
        assert!(matches!(
            Nonce::from_bytes(&[0u8; 8]),
            Err(CryptoError::InvalidNonce { expected: NONCE_SIZE, actual: 8 })
        ));
        let nonce = Nonce::generate();
        assert_eq!(Nonce::from_bytes(nonce.as_bytes()).unwrap(), nonce);
    }
}
