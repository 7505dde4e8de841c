//! # Strand Blockstore
//!
//! Content-addressed block storage for the Strand chunked file store.
//!
//! This crate provides:
//! - **Storage contract**: the `ContentAddressedStorage` trait every backend speaks
//! - **Direct routing**: `DirectBlockStore` sends reads and writes straight to
//!   object storage when the owner lives on this node, falling back to an
//!   authenticating node otherwise
//! - **Key naming**: base32 object keys derived from CIDs
//! - **Fragment download**: ordered, concurrent bulk retrieval
//! - **In-memory backends**: an object store and an authenticating node for tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Application Layer            │
//! ├─────────────────────────────────────────┤
//! │       ContentAddressedStorage Trait     │
//! ├─────────────────────┬───────────────────┤
//! │  DirectBlockStore   │   MemoryStorage   │
//! ├──────────┬──────────┴───────────────────┤
//! │DirectHttp│   fallback (authenticating)  │
//! ├──────────┴───────────────────────────────┤
//! │         S3-compatible object storage    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use strand_blockstore::{BlockStoreProperties, DirectBlockStore, ContentAddressedStorage};
//!
//! let store = DirectBlockStore::new(properties, direct, fallback, node_id, core)?;
//! let data = store.get_raw(&cid).await?;
//! ```

pub mod block;
pub mod cid_utils;
pub mod config;
pub mod direct;
pub mod error;
pub mod fallback;
pub mod fragments;
pub mod http;
pub mod key_encoding;
pub mod memory;
pub mod ownership;
pub mod registry;

pub use block::{FragmentWithHash, PresignedUrl, TransactionId};
pub use cid_utils::{create_cid, hash_block, identity_cid, CidCodec, ContentHashExt, NodeId, PublicKeyHash};
pub use config::BlockStoreProperties;
pub use direct::DirectBlockStore;
pub use error::{BlockStoreError, Result};
pub use fragments::{ignore_progress, Progress};
pub use http::{DirectHttp, HttpConfig, ReqwestHttp};
pub use key_encoding::{hash_to_key, key_to_hash};
pub use memory::{MemoryObjectStore, MemoryStorage};
pub use ownership::OwnershipCache;
pub use registry::{Claim, CoreNode, MemoryCoreNode, UserPublicKeyLink};

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use ipld_core::ipld::Ipld;

/// The storage contract shared by every block backend
///
/// Writes are authorized by per-block signatures: each signature is the
/// writer's ed25519 signature over the CID bytes of the block it covers.
#[async_trait]
pub trait ContentAddressedStorage: Send + Sync {
    /// Identity of the node serving this storage
    async fn id(&self) -> Result<NodeId>;

    /// Open a write transaction for `owner`
    async fn start_transaction(&self, owner: &PublicKeyHash) -> Result<TransactionId>;

    /// Close a write transaction, returning whether it was open
    async fn close_transaction(&self, owner: &PublicKeyHash, tid: &TransactionId) -> Result<bool>;

    /// Fetch raw block bytes; `None` when the block is absent
    async fn get_raw(&self, hash: &Cid) -> Result<Option<Bytes>>;

    /// Fetch and decode a DAG-CBOR block
    async fn get(&self, hash: &Cid) -> Result<Option<Ipld>> {
        match self.get_raw(hash).await? {
            Some(bytes) => Ok(Some(serde_ipld_dagcbor::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Size of a block without downloading it
    async fn get_size(&self, hash: &Cid) -> Result<Option<u64>>;

    /// Store DAG-CBOR blocks, returning their hashes in input order
    async fn put(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        blocks: &[Bytes],
        tid: &TransactionId,
    ) -> Result<Vec<Cid>>;

    /// Store raw blocks, returning their hashes in input order
    async fn put_raw(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        blocks: &[Bytes],
        tid: &TransactionId,
    ) -> Result<Vec<Cid>>;

    /// Presigned GET URLs, one per hash, in input order
    async fn auth_reads(&self, hashes: &[Cid]) -> Result<Vec<PresignedUrl>>;

    /// Presigned PUT URLs, one per block, in input order
    async fn auth_writes(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        block_sizes: &[usize],
        is_raw: bool,
        tid: &TransactionId,
    ) -> Result<Vec<PresignedUrl>>;

    /// Move a pin from `existing` to `updated`
    async fn pin_update(&self, owner: &PublicKeyHash, existing: &Cid, updated: &Cid) -> Result<Vec<Cid>>;

    /// Pin a block and everything reachable from it
    async fn recursive_pin(&self, owner: &PublicKeyHash, hash: &Cid) -> Result<Vec<Cid>>;

    /// Unpin a block and everything reachable from it
    async fn recursive_unpin(&self, owner: &PublicKeyHash, hash: &Cid) -> Result<Vec<Cid>>;

    /// Collect unreferenced blocks
    async fn gc(&self) -> Result<bool>;

    /// Download many fragments, results in input order
    ///
    /// `monitor` receives the plaintext-equivalent size of each fragment,
    /// i.e. its stored size divided by `space_factor`.
    async fn download_fragments(
        &self,
        hashes: &[Cid],
        monitor: &Progress,
        space_factor: f64,
    ) -> Result<Vec<FragmentWithHash>> {
        fragments::download_fragments(self, hashes, monitor, space_factor).await
    }
}
