//! Capabilities and the locations they point at

use std::fmt;

use rand::RngCore;
use strand_blockstore::PublicKeyHash;
use strand_crypto::{SymmetricKey, BAT_SIZE, MAP_KEY_SIZE};

/// Opaque key of a chunk inside its writer's metadata map
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapKey([u8; MAP_KEY_SIZE]);

impl MapKey {
    /// Generate a random map key
    pub fn generate() -> Self {
        let mut bytes = [0u8; MAP_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; MAP_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; MAP_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapKey({})", hex::encode(&self.0[..8]))
    }
}

/// Batch access token gating reads of a location
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bat([u8; BAT_SIZE]);

impl Bat {
    /// Generate a random token
    pub fn generate() -> Self {
        let mut bytes = [0u8; BAT_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; BAT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; BAT_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Bat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Bat([REDACTED])")
    }
}

/// Where a chunk's metadata lives
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub owner: PublicKeyHash,
    pub writer: PublicKeyHash,
    pub map_key: MapKey,
}

impl Location {
    /// Create a location
    pub fn new(owner: PublicKeyHash, writer: PublicKeyHash, map_key: MapKey) -> Self {
        Self {
            owner,
            writer,
            map_key,
        }
    }

    /// Same owner and writer, different map key
    pub fn with_map_key(&self, map_key: MapKey) -> Self {
        Self {
            map_key,
            ..self.clone()
        }
    }
}

/// A location plus the key that decrypts what lives there
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbsoluteCapability {
    pub location: Location,
    pub bat: Option<Bat>,
    pub key: SymmetricKey,
}

impl AbsoluteCapability {
    /// Create a capability
    pub fn new(location: Location, bat: Option<Bat>, key: SymmetricKey) -> Self {
        Self { location, bat, key }
    }

    /// The capability for another chunk of the same file
    pub fn with_map_key(&self, map_key: MapKey, bat: Option<Bat>) -> Self {
        Self {
            location: self.location.with_map_key(map_key),
            bat,
            key: self.key.clone(),
        }
    }

    /// Map key of the location
    pub fn map_key(&self) -> &MapKey {
        &self.location.map_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability() -> AbsoluteCapability {
        let owner = PublicKeyHash::from_public_key(&[1u8; 32]);
        let writer = PublicKeyHash::from_public_key(&[2u8; 32]);
        AbsoluteCapability::new(
            Location::new(owner, writer, MapKey::generate()),
            Some(Bat::generate()),
            SymmetricKey::generate(),
        )
    }

    #[test]
    fn test_with_map_key_keeps_key_and_owners() {
        let cap = capability();
        let next = cap.with_map_key(MapKey::from_bytes([5u8; MAP_KEY_SIZE]), None);

        assert_eq!(next.key, cap.key);
        assert_eq!(next.location.owner, cap.location.owner);
        assert_eq!(next.location.writer, cap.location.writer);
        assert_eq!(next.map_key().as_bytes(), &[5u8; MAP_KEY_SIZE]);
        assert!(next.bat.is_none());
        // the source is untouched
        assert_ne!(cap.map_key(), next.map_key());
    }

    #[test]
    fn test_debug_hides_bat() {
        let cap = capability();
        assert!(format!("{:?}", cap.bat).contains("REDACTED"));
    }
}
