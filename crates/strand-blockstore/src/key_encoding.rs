//! Object-storage key naming
//!
//! A block lives under the unpadded uppercase RFC 4648 base32 encoding of its
//! CID bytes. The encoding is shared with every node reading the same bucket.

use cid::multibase::Base;
use cid::Cid;

use crate::{BlockStoreError, Result};

/// Object key for a content hash
pub fn hash_to_key(hash: &Cid) -> String {
    let mut key = Base::Base32Upper.encode(hash.to_bytes());
    key.truncate(key.trim_end_matches('=').len());
    key
}

/// Content hash named by an object key
pub fn key_to_hash(key: &str) -> Result<Cid> {
    let invalid = |reason: String| BlockStoreError::InvalidKey {
        key: key.to_string(),
        reason,
    };
    let bytes = Base::Base32Upper
        .decode(key.trim_end_matches('='))
        .map_err(|e| invalid(e.to_string()))?;
    Cid::try_from(bytes.as_slice()).map_err(|e| invalid(e.to_string()))
}
