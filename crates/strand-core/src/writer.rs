//! Chunk-chain upload
//!
//! Splits a file into chunks of `MAX_CHUNK_SIZE` plaintext bytes, encrypts
//! each padded chunk, stores its ciphertext as raw fragments and indexes a
//! cryptree node for it. Chain-walked files store every chunk's successor
//! location in its node; files with a stream secret store nothing and derive it.

use std::sync::Arc;

use bytes::Bytes;
use cid::Cid;
use strand_blockstore::{hash_block, CidCodec, ContentHashExt, PublicKeyHash, TransactionId};
use strand_crypto::{symmetric, StreamSecret, SymmetricKey, WriterKeyPair};
use tracing::{debug, info, instrument};

use crate::capability::{AbsoluteCapability, Bat, Location, MapKey};
use crate::chunk::{chunk_count, chunk_start, padded_length, FRAGMENT_SIZE, MAX_CHUNK_SIZE};
use crate::cryptree::{CryptreeNode, NodeKind};
use crate::network::NetworkAccess;
use crate::Result;

/// Everything a reader needs to open an uploaded file
#[derive(Clone, Debug)]
pub struct FileCapability {
    /// Capability of the first chunk
    pub capability: AbsoluteCapability,
    pub total_length: u64,
    /// Present when chunk locations are derived rather than stored
    pub stream_secret: Option<StreamSecret>,
}

/// Uploads files as chunk chains for one owner and writer
pub struct ChunkChainWriter {
    network: Arc<dyn NetworkAccess>,
    owner: PublicKeyHash,
    keys: WriterKeyPair,
    stream_secret: bool,
}

impl ChunkChainWriter {
    /// Create a writer storing under `owner`, signing with `keys`
    pub fn new(network: Arc<dyn NetworkAccess>, owner: PublicKeyHash, keys: WriterKeyPair) -> Self {
        Self {
            network,
            owner,
            keys,
            stream_secret: false,
        }
    }

    /// Derive chunk locations from a fresh stream secret
    pub fn with_stream_secret(mut self, enabled: bool) -> Self {
        self.stream_secret = enabled;
        self
    }

    fn writer(&self) -> PublicKeyHash {
        PublicKeyHash::from_public_key(&self.keys.public_key())
    }

    /// Upload `data`, returning the capability of its first chunk
    #[instrument(skip(self, data), fields(len = data.len(), stream_secret = self.stream_secret))]
    pub async fn upload(&self, data: &[u8]) -> Result<FileCapability> {
        let first = AbsoluteCapability::new(
            Location::new(self.owner, self.writer(), MapKey::generate()),
            Some(Bat::generate()),
            SymmetricKey::generate(),
        );
        let secret = self.stream_secret.then(StreamSecret::generate);

        let storage = self.network.storage();
        let tid = storage.start_transaction(&self.owner).await?;
        let result = self.write_chunks(data, &first, secret.as_ref(), &tid).await;
        let closed = storage.close_transaction(&self.owner, &tid).await;
        result?;
        closed?;

        info!(
            chunks = chunk_count(data.len() as u64),
            bytes = data.len(),
            "uploaded chunk chain"
        );
        Ok(FileCapability {
            capability: first,
            total_length: data.len() as u64,
            stream_secret: secret,
        })
    }

    async fn write_chunks(
        &self,
        data: &[u8],
        first: &AbsoluteCapability,
        secret: Option<&StreamSecret>,
        tid: &TransactionId,
    ) -> Result<()> {
        let total = data.len() as u64;
        let mut current = first.clone();

        for index in 0..chunk_count(total) {
            let start = chunk_start(index) as usize;
            let end = (start + MAX_CHUNK_SIZE).min(data.len());
            let next = match secret {
                Some(secret) => {
                    let (map_key, bat) = strand_crypto::next_chunk_location(
                        self.network.hasher(),
                        secret,
                        current.map_key().as_bytes(),
                        current.bat.as_ref().map(Bat::as_bytes),
                    );
                    (MapKey::from_bytes(map_key), bat.map(Bat::from_bytes))
                }
                None => (MapKey::generate(), Some(Bat::generate())),
            };

            let stored_next = secret.is_none().then_some(next);
            self.write_chunk(&current, &data[start..end], stored_next, tid).await?;
            current = current.with_map_key(next.0, next.1);
        }
        Ok(())
    }

    async fn write_chunk(
        &self,
        cap: &AbsoluteCapability,
        plaintext: &[u8],
        next: Option<(MapKey, Option<Bat>)>,
        tid: &TransactionId,
    ) -> Result<()> {
        let mut padded = plaintext.to_vec();
        padded.resize(padded_length(plaintext.len()), 0);
        let (nonce, ciphertext) = symmetric::encrypt(&cap.key, &padded)?;

        let pieces: Vec<Bytes> = ciphertext
            .chunks(FRAGMENT_SIZE)
            .map(Bytes::copy_from_slice)
            .collect();
        let hashes = pieces
            .iter()
            .map(|piece| hash_block(piece, CidCodec::Raw))
            .collect::<strand_blockstore::Result<Vec<Cid>>>()?;

        let (signed, stored): (Vec<Vec<u8>>, Vec<Bytes>) = hashes
            .iter()
            .zip(&pieces)
            .filter(|(hash, _)| !hash.is_identity())
            .map(|(hash, piece)| (self.keys.sign_message(&hash.to_bytes()), piece.clone()))
            .unzip();
        let storage = self.network.storage();
        let writer = self.writer();
        if !stored.is_empty() {
            storage.put_raw(&self.owner, &writer, &signed, &stored, tid).await?;
        }

        let (node, block) = CryptreeNode::seal(&cap.key, NodeKind::File, nonce, hashes, next)?;
        let signed_node = self.keys.sign_message(&node.committed_hash().to_bytes());
        storage.put(&self.owner, &writer, &[signed_node], &[block], tid).await?;
        self.network
            .set_metadata(&cap.location, cap.bat, node.committed_hash())
            .await?;

        debug!(
            map_key = ?cap.map_key(),
            fragments = node.fragments().len(),
            "wrote chunk"
        );
        Ok(())
    }
}
