//! Chunk payload retrieval

use bytes::{Bytes, BytesMut};
use cid::Cid;
use strand_blockstore::{ContentAddressedStorage, Progress};
use strand_crypto::{Aead, Nonce, SymmetricKey};
use tracing::{debug, instrument};

use crate::Result;

/// Stored fragments hold ciphertext, which the progress monitor reports as plaintext
pub const CIPHERTEXT_SPACE_FACTOR: f64 = 1.0;

/// Downloads, decrypts and truncates one chunk
#[derive(Clone)]
pub struct ChunkRetriever {
    key: SymmetricKey,
    nonce: Nonce,
    fragments: Vec<Cid>,
}

impl ChunkRetriever {
    /// Create a retriever for the chunk sealed under `key` and `nonce`
    pub fn new(key: SymmetricKey, nonce: Nonce, fragments: Vec<Cid>) -> Self {
        Self {
            key,
            nonce,
            fragments,
        }
    }

    /// Fetch the chunk, keeping at most `truncate_to` plaintext bytes
    #[instrument(skip(self, storage, monitor), fields(fragments = self.fragments.len()))]
    pub async fn get_chunk(
        &self,
        storage: &dyn ContentAddressedStorage,
        truncate_to: usize,
        monitor: &Progress,
    ) -> Result<Bytes> {
        let fragments = storage
            .download_fragments(&self.fragments, monitor, CIPHERTEXT_SPACE_FACTOR)
            .await?;

        let mut ciphertext = BytesMut::with_capacity(fragments.iter().map(|f| f.size()).sum());
        for fragment in &fragments {
            ciphertext.extend_from_slice(&fragment.fragment);
        }

        let mut plaintext = Aead::new(&self.key).decrypt(&self.nonce, &ciphertext)?;
        plaintext.truncate(truncate_to);
        debug!(bytes = plaintext.len(), "retrieved chunk");
        Ok(Bytes::from(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strand_blockstore::{
        create_cid, hash_block, ignore_progress, CidCodec, ContentHashExt, MemoryObjectStore,
        MemoryStorage, PublicKeyHash,
    };
    use strand_crypto::{symmetric::encrypt, WriterKeyPair};

    #[tokio::test]
    async fn test_reassembles_and_truncates() {
        let objects = Arc::new(MemoryObjectStore::new("http://objects.test/"));
        let storage = MemoryStorage::new(create_cid(b"node", CidCodec::Raw), objects);
        let keys = WriterKeyPair::generate();
        let owner = PublicKeyHash::from_public_key(&keys.public_key());

        let key = SymmetricKey::generate();
        let mut plaintext = b"hello chunk".to_vec();
        plaintext.resize(4096, 0);
        let (nonce, ciphertext) = encrypt(&key, &plaintext).unwrap();

        // uneven split with a tiny trailing fragment stored inline
        let split = ciphertext.len() - 20;
        let pieces = [
            Bytes::copy_from_slice(&ciphertext[..split]),
            Bytes::copy_from_slice(&ciphertext[split..]),
        ];
        let hashes: Vec<Cid> = pieces.iter().map(|p| hash_block(p, CidCodec::Raw).unwrap()).collect();
        assert!(!hashes[0].is_identity() && hashes[1].is_identity());

        let signed = vec![keys.sign_message(&hashes[0].to_bytes())];
        let tid = storage.start_transaction(&owner).await.unwrap();
        storage.put_raw(&owner, &owner, &signed, &pieces[..1], &tid).await.unwrap();

        let retriever = ChunkRetriever::new(key, nonce, hashes);
        let chunk = retriever.get_chunk(&storage, 11, &ignore_progress).await.unwrap();

        assert_eq!(chunk.as_ref(), b"hello chunk");
    }

    #[tokio::test]
    async fn test_missing_fragment() {
        let objects = Arc::new(MemoryObjectStore::new("http://objects.test/"));
        let storage = MemoryStorage::new(create_cid(b"node", CidCodec::Raw), objects);
        let missing = create_cid(&[7u8; 100], CidCodec::Raw);

        let retriever = ChunkRetriever::new(SymmetricKey::generate(), Nonce::generate(), vec![missing]);
        let result = retriever.get_chunk(&storage, 100, &ignore_progress).await;

        assert!(matches!(
            result,
            Err(crate::CoreError::BlockStore(strand_blockstore::BlockStoreError::NotFound(_)))
        ));
    }
}
