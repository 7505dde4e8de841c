//! Block-level value types exchanged with storage backends

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use cid::Cid;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cid_utils::ContentHashExt;
use crate::{BlockStoreError, Result};

/// A downloaded fragment paired with the hash it was requested under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentWithHash {
    /// The content identifier
    pub hash: Cid,
    /// The fragment bytes
    pub fragment: Bytes,
}

impl FragmentWithHash {
    /// Create a new fragment
    pub fn new(hash: Cid, fragment: Bytes) -> Self {
        Self { hash, fragment }
    }

    /// Materialize an identity hash without touching the network
    pub fn from_identity(hash: Cid) -> Option<Self> {
        hash.identity_payload()
            .map(|fragment| Self { hash, fragment })
    }

    /// Get the size of the fragment
    pub fn size(&self) -> usize {
        self.fragment.len()
    }
}

/// A time-limited URL authorizing one direct object-storage request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUrl {
    /// Request URL; its final path segment is the object key
    pub base: String,
    /// Headers that must accompany the request
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl PresignedUrl {
    /// Create a URL with no extra fields
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            fields: HashMap::new(),
        }
    }

    /// Add a required header
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// The object key this URL targets
    pub fn object_key(&self) -> Result<String> {
        let url = url::Url::parse(&self.base)
            .map_err(|e| BlockStoreError::Http(format!("bad presigned url {}: {e}", self.base)))?;
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BlockStoreError::Http(format!("presigned url {} has no key", self.base)))
    }
}

/// Identifier of an open write transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generate a fresh transaction id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid_utils::{identity_cid, CidCodec};

    #[test]
    fn test_object_key_ignores_query() {
        let url = PresignedUrl::new("http://bucket.local/blocks/AFKREIB?token=abc");
        assert_eq!(url.object_key().unwrap(), "AFKREIB");
    }

    #[test]
    fn test_object_key_requires_segment() {
        assert!(PresignedUrl::new("http://bucket.local/").object_key().is_err());
        assert!(PresignedUrl::new("not a url").object_key().is_err());
    }

    #[test]
    fn test_presigned_url_json() {
        let url = PresignedUrl::new("http://bucket.local/KEY").with_field("x-amz-meta-size", "12");
        let json = serde_json::to_string(&url).unwrap();
        let parsed: PresignedUrl = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, url);
    }

    #[test]
    fn test_identity_fragment() {
        let hash = identity_cid(b"abc", CidCodec::Raw).unwrap();
        let fragment = FragmentWithHash::from_identity(hash).unwrap();

        assert_eq!(fragment.fragment.as_ref(), b"abc");
        assert_eq!(fragment.size(), 3);
    }
}
