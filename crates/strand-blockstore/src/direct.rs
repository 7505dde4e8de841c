//! Direct object-storage routing
//!
//! `DirectBlockStore` wraps an authenticating fallback node. For owners whose
//! data lives on this node it uploads straight to object storage through
//! presigned URLs, and it reads from the bucket directly when the deployment
//! allows. Everything else is delegated to the fallback unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use futures::future::try_join_all;
use futures::FutureExt;
use tracing::{debug, info, instrument};

use crate::block::{FragmentWithHash, PresignedUrl, TransactionId};
use crate::cid_utils::{ContentHashExt, NodeId, PublicKeyHash};
use crate::config::BlockStoreProperties;
use crate::fallback::{first_success, Attempt};
use crate::fragments::{self, reassemble, scaled_size, Progress};
use crate::http::DirectHttp;
use crate::key_encoding::{hash_to_key, key_to_hash};
use crate::ownership::OwnershipCache;
use crate::registry::CoreNode;
use crate::{BlockStoreError, ContentAddressedStorage, Result};

/// Routes block operations between object storage and a fallback node
pub struct DirectBlockStore {
    properties: BlockStoreProperties,
    direct: Arc<dyn DirectHttp>,
    fallback: Arc<dyn ContentAddressedStorage>,
    node_id: NodeId,
    core: Arc<dyn CoreNode>,
    owners: OwnershipCache,
}

impl DirectBlockStore {
    /// Create a router for the node `node_id`
    pub fn new(
        properties: BlockStoreProperties,
        direct: Arc<dyn DirectHttp>,
        fallback: Arc<dyn ContentAddressedStorage>,
        node_id: NodeId,
        core: Arc<dyn CoreNode>,
    ) -> Result<Self> {
        properties.validate()?;
        let owners = OwnershipCache::new(properties.cache_capacity()?, properties.ownership_ttl());
        info!(
            node = %node_id,
            direct_writes = properties.direct_writes,
            public_reads = properties.public_reads,
            authed_reads = properties.authed_reads,
            "direct block store configured"
        );
        Ok(Self {
            properties,
            direct,
            fallback,
            node_id,
            core,
            owners,
        })
    }

    /// Routing properties
    pub fn properties(&self) -> &BlockStoreProperties {
        &self.properties
    }

    /// The ownership cache
    pub fn ownership_cache(&self) -> &OwnershipCache {
        &self.owners
    }

    /// Whether `owner`'s primary storage node is this node
    ///
    /// The primary node is the first storage provider of the newest link in
    /// the owner's registry chain. Answers are cached per owner.
    pub async fn on_owners_node(&self, owner: &PublicKeyHash) -> Result<bool> {
        if let Some(node) = self.owners.get(owner) {
            return Ok(node == self.node_id);
        }

        let username = self.core.get_username(owner).await?;
        let chain = self.core.get_chain(&username).await?;
        let primary = chain
            .last()
            .and_then(|link| link.primary_storage())
            .ok_or_else(|| {
                BlockStoreError::Registry(format!("no storage provider declared for {username}"))
            })?;

        self.owners.insert(*owner, primary);
        info!(%owner, %username, storage = %primary, local = %self.node_id, "resolved owner storage node");
        Ok(primary == self.node_id)
    }

    async fn use_direct_writes(&self, owner: &PublicKeyHash) -> Result<bool> {
        Ok(self.properties.direct_writes && self.on_owners_node(owner).await?)
    }

    /// Upload blocks through presigned URLs, returning hashes in input order
    #[instrument(skip_all, fields(owner = %owner, blocks = blocks.len(), raw = is_raw))]
    async fn put_direct(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        blocks: &[Bytes],
        is_raw: bool,
        tid: &TransactionId,
    ) -> Result<Vec<Cid>> {
        let sizes: Vec<usize> = blocks.iter().map(Bytes::len).collect();
        let urls = self
            .fallback
            .auth_writes(owner, writer, signed_hashes, &sizes, is_raw, tid)
            .await?;
        if urls.len() != blocks.len() {
            return Err(BlockStoreError::IndexAlignmentFault(format!(
                "{} upload urls for {} blocks",
                urls.len(),
                blocks.len()
            )));
        }

        let uploads = urls.iter().zip(blocks).map(|(url, block)| async move {
            let target = key_to_hash(&url.object_key()?)?;
            self.direct.put(&url.base, block.clone(), &url.fields).await?;
            Ok::<_, BlockStoreError>(target)
        });
        let hashes = try_join_all(uploads).await?;
        debug!(count = hashes.len(), "uploaded blocks directly");
        Ok(hashes)
    }

    async fn get_public(&self, base_url: &str, hash: &Cid) -> Result<Option<Bytes>> {
        let url = format!("{base_url}{}", hash_to_key(hash));
        Ok(Some(self.direct.get(&url).await?))
    }

    async fn get_presigned(&self, hash: &Cid) -> Result<Option<Bytes>> {
        let urls = self.fallback.auth_reads(std::slice::from_ref(hash)).await?;
        let url: &PresignedUrl = urls.first().ok_or_else(|| {
            BlockStoreError::IndexAlignmentFault(format!("no read url returned for {hash}"))
        })?;
        Ok(Some(self.direct.get(&url.base).await?))
    }
}

#[async_trait]
impl ContentAddressedStorage for DirectBlockStore {
    async fn id(&self) -> Result<NodeId> {
        self.fallback.id().await
    }

    async fn start_transaction(&self, owner: &PublicKeyHash) -> Result<TransactionId> {
        self.fallback.start_transaction(owner).await
    }

    async fn close_transaction(&self, owner: &PublicKeyHash, tid: &TransactionId) -> Result<bool> {
        self.fallback.close_transaction(owner, tid).await
    }

    #[instrument(skip(self), fields(hash = %hash))]
    async fn get_raw(&self, hash: &Cid) -> Result<Option<Bytes>> {
        if let Some(inline) = hash.identity_payload() {
            return Ok(Some(inline));
        }
        if !self.properties.public_reads && !self.properties.authed_reads {
            return self.fallback.get_raw(hash).await;
        }

        let mut attempts = Vec::with_capacity(3);
        if self.properties.public_reads {
            if let Some(base_url) = self.properties.base_url.as_deref() {
                attempts.push(Attempt::new("public", self.get_public(base_url, hash).boxed()));
            }
        }
        attempts.push(Attempt::new("presigned", self.get_presigned(hash).boxed()));
        attempts.push(Attempt::new("fallback", self.fallback.get_raw(hash)));
        first_success(attempts).await
    }

    async fn get_size(&self, hash: &Cid) -> Result<Option<u64>> {
        if let Some(inline) = hash.identity_payload() {
            return Ok(Some(inline.len() as u64));
        }
        self.fallback.get_size(hash).await
    }

    async fn put(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        blocks: &[Bytes],
        tid: &TransactionId,
    ) -> Result<Vec<Cid>> {
        if self.use_direct_writes(owner).await? {
            return self.put_direct(owner, writer, signed_hashes, blocks, false, tid).await;
        }
        self.fallback.put(owner, writer, signed_hashes, blocks, tid).await
    }

    async fn put_raw(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        blocks: &[Bytes],
        tid: &TransactionId,
    ) -> Result<Vec<Cid>> {
        if self.use_direct_writes(owner).await? {
            return self.put_direct(owner, writer, signed_hashes, blocks, true, tid).await;
        }
        self.fallback.put_raw(owner, writer, signed_hashes, blocks, tid).await
    }

    async fn auth_reads(&self, hashes: &[Cid]) -> Result<Vec<PresignedUrl>> {
        self.fallback.auth_reads(hashes).await
    }

    async fn auth_writes(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        block_sizes: &[usize],
        is_raw: bool,
        tid: &TransactionId,
    ) -> Result<Vec<PresignedUrl>> {
        self.fallback
            .auth_writes(owner, writer, signed_hashes, block_sizes, is_raw, tid)
            .await
    }

    /// Object storage keeps every block; pins only report the requested change
    async fn pin_update(&self, _owner: &PublicKeyHash, _existing: &Cid, updated: &Cid) -> Result<Vec<Cid>> {
        Ok(vec![*updated])
    }

    async fn recursive_pin(&self, _owner: &PublicKeyHash, hash: &Cid) -> Result<Vec<Cid>> {
        Ok(vec![*hash])
    }

    async fn recursive_unpin(&self, _owner: &PublicKeyHash, hash: &Cid) -> Result<Vec<Cid>> {
        Ok(vec![*hash])
    }

    async fn gc(&self) -> Result<bool> {
        Err(BlockStoreError::GcUnsupported)
    }

    #[instrument(skip(self, hashes, monitor), fields(count = hashes.len()))]
    async fn download_fragments(
        &self,
        hashes: &[Cid],
        monitor: &Progress,
        space_factor: f64,
    ) -> Result<Vec<FragmentWithHash>> {
        if self.properties.public_reads || !self.properties.authed_reads {
            return fragments::download_fragments(self, hashes, monitor, space_factor).await;
        }

        let wanted: Vec<(usize, Cid)> = hashes
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, hash)| !hash.is_identity())
            .collect();
        if wanted.is_empty() {
            return reassemble(hashes, Vec::new());
        }

        let targets: Vec<Cid> = wanted.iter().map(|(_, hash)| *hash).collect();
        let urls = self.fallback.auth_reads(&targets).await?;
        if urls.len() != wanted.len() {
            return Err(BlockStoreError::IndexAlignmentFault(format!(
                "{} read urls for {} fragments",
                urls.len(),
                wanted.len()
            )));
        }

        let downloads = urls.iter().zip(&wanted).map(|(url, &(index, hash))| async move {
            let data = self.direct.get(&url.base).await?;
            monitor(scaled_size(data.len(), space_factor));
            Ok::<_, BlockStoreError>((index, FragmentWithHash::new(hash, data)))
        });
        let retrieved = try_join_all(downloads).await?;
        reassemble(hashes, retrieved)
    }
}
