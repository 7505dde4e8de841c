//! Content hashes of blocks
//!
//! Content hashes are CIDv1 over SHA2-256. Blocks small enough to inline are
//! addressed with the identity multihash, whose digest *is* the block.

use std::fmt;

use bytes::Bytes;
use cid::Cid;
use multihash::Multihash;
use multihash_codetable::{Code, MultihashDigest};

use crate::{BlockStoreError, Result};

/// Multihash code of the identity hash
pub const IDENTITY_CODE: u64 = 0x00;

/// Largest payload inlined into an identity hash
pub const MAX_IDENTITY_SIZE: usize = 32;

/// Node identifiers are content hashes of the node's identity key
pub type NodeId = Cid;

const RAW_CODEC: u64 = 0x55;
const DAG_CBOR_CODEC: u64 = 0x71;

/// Codec of a stored block: raw fragments or DAG-CBOR cryptree nodes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CidCodec {
    #[default]
    Raw,
    DagCbor,
}

impl CidCodec {
    pub fn code(&self) -> u64 {
        match self {
            CidCodec::Raw => RAW_CODEC,
            CidCodec::DagCbor => DAG_CBOR_CODEC,
        }
    }

    /// `None` for codecs blocks are never stored under
    pub fn from_code(code: u64) -> Option<Self> {
        [CidCodec::Raw, CidCodec::DagCbor]
            .into_iter()
            .find(|codec| codec.code() == code)
    }

    /// Codec used for a block written through `put_raw` (`true`) or `put` (`false`)
    pub fn for_block(is_raw: bool) -> Self {
        if is_raw {
            CidCodec::Raw
        } else {
            CidCodec::DagCbor
        }
    }
}

/// Extension methods for content hashes
pub trait ContentHashExt {
    /// Whether the hash inlines its content
    fn is_identity(&self) -> bool;

    /// The inlined content of an identity hash
    fn identity_payload(&self) -> Option<Bytes>;
}

impl ContentHashExt for Cid {
    fn is_identity(&self) -> bool {
        self.hash().code() == IDENTITY_CODE
    }

    fn identity_payload(&self) -> Option<Bytes> {
        self.is_identity()
            .then(|| Bytes::copy_from_slice(self.hash().digest()))
    }
}

/// SHA2-256 content hash of `data`
pub fn create_cid(data: &[u8], codec: CidCodec) -> Cid {
    Cid::new_v1(codec.code(), Code::Sha2_256.digest(data))
}

/// Create an identity CID that carries `data` inline
pub fn identity_cid(data: &[u8], codec: CidCodec) -> Result<Cid> {
    if data.len() > MAX_IDENTITY_SIZE {
        return Err(BlockStoreError::InvalidCid(format!(
            "{} bytes is too large for an identity hash",
            data.len()
        )));
    }
    let multihash = Multihash::<64>::wrap(IDENTITY_CODE, data)
        .map_err(|e| BlockStoreError::InvalidCid(e.to_string()))?;
    Ok(Cid::new_v1(codec.code(), multihash))
}

/// Hash a block, inlining it when it is small enough
pub fn hash_block(data: &[u8], codec: CidCodec) -> Result<Cid> {
    if data.len() <= MAX_IDENTITY_SIZE {
        identity_cid(data, codec)
    } else {
        Ok(create_cid(data, codec))
    }
}

/// Whether `data` is the block `cid` names; identity hashes compare inline
pub fn verify_cid(data: &[u8], cid: &Cid) -> bool {
    if let Some(payload) = cid.identity_payload() {
        return payload.as_ref() == data;
    }
    match CidCodec::from_code(cid.codec()) {
        Some(codec) => create_cid(data, codec) == *cid,
        None => false,
    }
}

pub fn parse_cid(s: &str) -> Result<Cid> {
    s.parse()
        .map_err(|e: cid::Error| BlockStoreError::InvalidCid(e.to_string()))
}

/// Hash identifying an owner or writer: the identity hash of its ed25519 public key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PublicKeyHash(Cid);

impl PublicKeyHash {
    /// Wrap an ed25519 public key
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let multihash = Multihash::<64>::wrap(IDENTITY_CODE, public_key)
            .expect("32 bytes always fits a 64 byte multihash");
        Self(Cid::new_v1(CidCodec::Raw.code(), multihash))
    }

    /// Wrap an existing CID
    pub fn from_cid(cid: Cid) -> Self {
        Self(cid)
    }

    /// The public key bytes, when this hash inlines the key
    pub fn public_key(&self) -> Option<&[u8]> {
        self.0.is_identity().then(|| self.0.hash().digest())
    }

    /// Underlying CID
    pub fn cid(&self) -> &Cid {
        &self.0
    }
}

impl fmt::Display for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_cid() {
        let cid = create_cid(b"Hello, World!", CidCodec::Raw);

        assert_eq!(cid.version(), cid::Version::V1);
        assert_eq!(cid.codec(), CidCodec::Raw.code());
        assert!(!cid.is_identity());
    }

    #[test]
    fn test_different_data_different_cid() {
        let cid1 = create_cid(b"data1", CidCodec::Raw);
        let cid2 = create_cid(b"data2", CidCodec::Raw);

        assert_ne!(cid1, cid2);
    }

    #[test]
    fn test_identity_payload() {
        let cid = identity_cid(b"tiny", CidCodec::Raw).unwrap();

        assert!(cid.is_identity());
        assert_eq!(cid.identity_payload().unwrap().as_ref(), b"tiny");
        assert!(verify_cid(b"tiny", &cid));
    }

    #[test]
    fn test_identity_rejects_large_payload() {
        assert!(identity_cid(&[0u8; MAX_IDENTITY_SIZE + 1], CidCodec::Raw).is_err());
    }

    #[test]
    fn test_hash_block_threshold() {
        assert!(hash_block(&[1u8; MAX_IDENTITY_SIZE], CidCodec::Raw)
            .unwrap()
            .is_identity());
        assert!(!hash_block(&[1u8; MAX_IDENTITY_SIZE + 1], CidCodec::Raw)
            .unwrap()
            .is_identity());
    }

    #[test]
    fn test_verify_cid() {
        let data = b"verify me, I am longer than thirty-two bytes";
        let cid = create_cid(data, CidCodec::DagCbor);

        assert!(verify_cid(data, &cid));
        assert!(!verify_cid(b"wrong data", &cid));
    }

    #[test]
    fn test_public_key_hash() {
        let key = [7u8; 32];
        let owner = PublicKeyHash::from_public_key(&key);

        assert_eq!(owner.public_key().unwrap(), &key);
        assert_eq!(parse_cid(&owner.to_string()).unwrap(), *owner.cid());
    }
}
