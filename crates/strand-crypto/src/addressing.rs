//! Stream-secret chunk addressing
//!
//! Chunk `n + 1`'s map key is `H(secret, map_key(n))`, so the map key of chunk
//! `n` is a pure function of the secret, the first map key and `n`. Computing
//! it costs `n` local hashes and no network round trips. The optional batch
//! access token of each chunk is derived alongside when the first chunk has one.

use crate::{hashing::Hasher, keys::StreamSecret};

/// Size of a chunk map key in bytes
pub const MAP_KEY_SIZE: usize = 32;

/// Size of a batch access token in bytes
pub const BAT_SIZE: usize = 32;

const MAP_KEY_DOMAIN: &[u8] = b"strand/chunk-map-key/v1";
const BAT_DOMAIN: &[u8] = b"strand/chunk-bat/v1";

/// Map key and optional batch access token of one chunk
pub type DerivedLocation = ([u8; MAP_KEY_SIZE], Option<[u8; BAT_SIZE]>);

/// Location of the chunk that follows `current_map_key`
pub fn next_chunk_location(
    hasher: &dyn Hasher,
    secret: &StreamSecret,
    current_map_key: &[u8; MAP_KEY_SIZE],
    current_bat: Option<&[u8; BAT_SIZE]>,
) -> DerivedLocation {
    let map_key = hasher.hash_parts(&[MAP_KEY_DOMAIN, secret.as_bytes(), current_map_key]);
    let bat = current_bat.map(|_| hasher.hash_parts(&[BAT_DOMAIN, secret.as_bytes(), &map_key]));
    (map_key, bat)
}

/// Location of chunk `chunk_index`, starting from the first chunk's location
pub fn chunk_location(
    hasher: &dyn Hasher,
    secret: &StreamSecret,
    first_map_key: &[u8; MAP_KEY_SIZE],
    first_bat: Option<&[u8; BAT_SIZE]>,
    chunk_index: u64,
) -> DerivedLocation {
    let mut location = (*first_map_key, first_bat.copied());
    for _ in 0..chunk_index {
        location = next_chunk_location(hasher, secret, &location.0, location.1.as_ref());
    }
    location
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Sha256Hasher;

    #[test]
    fn test_index_zero_is_first_location() {
        let secret = StreamSecret::generate();
        let first = [9u8; MAP_KEY_SIZE];
        let bat = [4u8; BAT_SIZE];

        let (map_key, derived_bat) = chunk_location(&Sha256Hasher, &secret, &first, Some(&bat), 0);
        assert_eq!(map_key, first);
        assert_eq!(derived_bat, Some(bat));
    }

    #[test]
    fn test_formula_matches_step_by_step() {
        let secret = StreamSecret::generate();
        let first = [1u8; MAP_KEY_SIZE];

        let mut walked = (first, None);
        for _ in 0..7 {
            walked = next_chunk_location(&Sha256Hasher, &secret, &walked.0, walked.1.as_ref());
        }
        let direct = chunk_location(&Sha256Hasher, &secret, &first, None, 7);
        assert_eq!(walked, direct);
        assert!(direct.1.is_none());
    }

    #[test]
    fn test_bat_follows_first_bat_presence() {
        let secret = StreamSecret::generate();
        let first = [1u8; MAP_KEY_SIZE];
        let (_, bat) = chunk_location(&Sha256Hasher, &secret, &first, Some(&[2u8; BAT_SIZE]), 3);
        assert!(bat.is_some());
    }

    #[test]
    fn test_different_secrets_diverge() {
        let first = [1u8; MAP_KEY_SIZE];
        let a = chunk_location(&Sha256Hasher, &StreamSecret::generate(), &first, None, 1);
        let b = chunk_location(&Sha256Hasher, &StreamSecret::generate(), &first, None, 1);
        assert_ne!(a.0, b.0);
    }
}
