//! Encrypted chunk metadata nodes
//!
//! A node is stored as a DAG-CBOR block `{nonce, ciphertext}`. The ciphertext
//! opens, under the capability key, to a DAG-CBOR body naming the chunk's
//! nonce, its fragment hashes and, for chain-walked files, the location of
//! the following chunk.

use bytes::Bytes;
use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use strand_blockstore::{create_cid, CidCodec};
use strand_crypto::{Aead, Hasher, Nonce, StreamSecret, SymmetricKey};

use crate::capability::{Bat, MapKey};
use crate::retriever::ChunkRetriever;
use crate::{CoreError, Result};

/// What a node describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(with = "serde_bytes")]
    nonce: Vec<u8>,
    #[serde(with = "serde_bytes")]
    ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct StoredPointer {
    #[serde(with = "serde_bytes")]
    map_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bat: Option<ByteBuf>,
}

#[derive(Serialize, Deserialize)]
struct NodeBody {
    kind: NodeKind,
    #[serde(with = "serde_bytes")]
    chunk_nonce: Vec<u8>,
    fragments: Vec<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next: Option<StoredPointer>,
}

/// A decrypted chunk metadata node
#[derive(Clone, Debug)]
pub struct CryptreeNode {
    hash: Cid,
    kind: NodeKind,
    chunk_nonce: Nonce,
    fragments: Vec<Cid>,
    next: Option<(MapKey, Option<Bat>)>,
}

impl CryptreeNode {
    /// Build a node and its sealed block
    pub fn seal(
        key: &SymmetricKey,
        kind: NodeKind,
        chunk_nonce: Nonce,
        fragments: Vec<Cid>,
        next: Option<(MapKey, Option<Bat>)>,
    ) -> Result<(Self, Bytes)> {
        let body = NodeBody {
            kind,
            chunk_nonce: chunk_nonce.as_bytes().to_vec(),
            fragments: fragments.iter().map(|cid| ByteBuf::from(cid.to_bytes())).collect(),
            next: next.map(|(map_key, bat)| StoredPointer {
                map_key: map_key.as_bytes().to_vec(),
                bat: bat.map(|b| ByteBuf::from(b.as_bytes().to_vec())),
            }),
        };
        let plaintext = serde_ipld_dagcbor::to_vec(&body)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;

        let nonce = Nonce::generate();
        let ciphertext = Aead::new(key).encrypt(&nonce, &plaintext)?;
        let block = serde_ipld_dagcbor::to_vec(&Envelope {
            nonce: nonce.as_bytes().to_vec(),
            ciphertext,
        })
        .map_err(|e| CoreError::Serialization(e.to_string()))?;

        let node = Self {
            hash: create_cid(&block, CidCodec::DagCbor),
            kind,
            chunk_nonce,
            fragments,
            next,
        };
        Ok((node, Bytes::from(block)))
    }

    /// Decrypt a stored node
    pub fn open(hash: Cid, block: &[u8], key: &SymmetricKey) -> Result<Self> {
        let envelope: Envelope = decode(block)?;
        let nonce = Nonce::from_bytes(&envelope.nonce)?;
        let plaintext = Aead::new(key).decrypt(&nonce, &envelope.ciphertext)?;
        let body: NodeBody = decode(&plaintext)?;

        let fragments = body
            .fragments
            .iter()
            .map(|bytes| {
                Cid::try_from(bytes.as_slice())
                    .map_err(|e| CoreError::Deserialization(format!("fragment hash: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let next = body
            .next
            .map(|pointer| -> Result<_> {
                let map_key = MapKey::from_bytes(fixed(&pointer.map_key, "map key")?);
                let bat = pointer
                    .bat
                    .map(|b| fixed(&b, "bat").map(Bat::from_bytes))
                    .transpose()?;
                Ok((map_key, bat))
            })
            .transpose()?;

        Ok(Self {
            hash,
            kind: body.kind,
            chunk_nonce: Nonce::from_bytes(&body.chunk_nonce)?,
            fragments,
            next,
        })
    }

    /// Whether this node describes a directory
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Hash of the stored block
    pub fn committed_hash(&self) -> Cid {
        self.hash
    }

    /// Fragment hashes in ciphertext order
    pub fn fragments(&self) -> &[Cid] {
        &self.fragments
    }

    /// Location of the chunk after this one
    ///
    /// With a stream secret the location is derived from the current one;
    /// otherwise it is read from the stored pointer.
    pub fn next_chunk_location(
        &self,
        stream_secret: Option<&StreamSecret>,
        current_map_key: &MapKey,
        current_bat: Option<&Bat>,
        hasher: &dyn Hasher,
    ) -> Result<(MapKey, Option<Bat>)> {
        match stream_secret {
            Some(secret) => {
                let (map_key, bat) = strand_crypto::next_chunk_location(
                    hasher,
                    secret,
                    current_map_key.as_bytes(),
                    current_bat.map(Bat::as_bytes),
                );
                Ok((MapKey::from_bytes(map_key), bat.map(Bat::from_bytes)))
            }
            None => self.next.ok_or(CoreError::MissingNextPointer),
        }
    }

    /// Retriever for this chunk's payload
    pub fn retriever(&self, base_key: &SymmetricKey) -> ChunkRetriever {
        ChunkRetriever::new(base_key.clone(), self.chunk_nonce.clone(), self.fragments.clone())
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| CoreError::Deserialization(format!("{what} has {} bytes, expected {N}", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_crypto::Sha256Hasher;

    fn fragment_hashes() -> Vec<Cid> {
        vec![
            create_cid(b"fragment one", CidCodec::Raw),
            create_cid(b"fragment two", CidCodec::Raw),
        ]
    }

    #[test]
    fn test_seal_then_open() {
        let key = SymmetricKey::generate();
        let next = (MapKey::generate(), Some(Bat::generate()));
        let (node, block) =
            CryptreeNode::seal(&key, NodeKind::File, Nonce::generate(), fragment_hashes(), Some(next)).unwrap();

        let opened = CryptreeNode::open(node.committed_hash(), &block, &key).unwrap();

        assert!(!opened.is_directory());
        assert_eq!(opened.fragments(), fragment_hashes().as_slice());
        assert_eq!(opened.committed_hash(), create_cid(&block, CidCodec::DagCbor));
        let location = opened
            .next_chunk_location(None, &MapKey::generate(), None, &Sha256Hasher)
            .unwrap();
        assert_eq!(location, next);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (node, block) =
            CryptreeNode::seal(&SymmetricKey::generate(), NodeKind::File, Nonce::generate(), vec![], None).unwrap();

        let result = CryptreeNode::open(node.committed_hash(), &block, &SymmetricKey::generate());
        assert!(matches!(result, Err(CoreError::Crypto(_))));
    }

    #[test]
    fn test_stream_secret_ignores_stored_pointer() {
        let key = SymmetricKey::generate();
        let (node, _) =
            CryptreeNode::seal(&key, NodeKind::File, Nonce::generate(), vec![], None).unwrap();
        let secret = StreamSecret::generate();
        let current = MapKey::generate();

        let derived = node
            .next_chunk_location(Some(&secret), &current, None, &Sha256Hasher)
            .unwrap();
        let (expected, _) =
            strand_crypto::next_chunk_location(&Sha256Hasher, &secret, current.as_bytes(), None);

        assert_eq!(derived.0.as_bytes(), &expected);
        assert!(matches!(
            node.next_chunk_location(None, &current, None, &Sha256Hasher),
            Err(CoreError::MissingNextPointer)
        ));
    }

    #[test]
    fn test_directory_kind() {
        let (node, _) = CryptreeNode::seal(
            &SymmetricKey::generate(),
            NodeKind::Directory,
            Nonce::generate(),
            vec![],
            None,
        )
        .unwrap();
        assert!(node.is_directory());
    }

    #[test]
    fn test_garbage_block() {
        let result = CryptreeNode::open(
            create_cid(b"x", CidCodec::DagCbor),
            b"definitely not cbor",
            &SymmetricKey::generate(),
        );
        assert!(matches!(result, Err(CoreError::Deserialization(_))));
    }
}
