//! In-memory backends for testing
//!
//! `MemoryObjectStore` stands in for an S3-compatible bucket reached over
//! `DirectHttp`. `MemoryStorage` is an authenticating storage node writing to
//! the same bucket: it checks writer signatures, issues single-use presigned
//! URLs, and tracks transactions and pins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use dashmap::DashMap;
use rand::Rng;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::block::{PresignedUrl, TransactionId};
use crate::cid_utils::{verify_cid, CidCodec, ContentHashExt, NodeId, PublicKeyHash};
use crate::http::DirectHttp;
use crate::key_encoding::{hash_to_key, key_to_hash};
use crate::{BlockStoreError, ContentAddressedStorage, Result};

/// Header carrying the exact size a presigned PUT was issued for
pub const SIZE_FIELD: &str = "x-amz-meta-size";

/// Lifetime of a presigned URL
const GRANT_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Read,
    Write { size: usize },
}

struct Grant {
    key: String,
    access: Access,
    expires: Instant,
}

/// An in-memory object bucket speaking `DirectHttp`
///
/// Presigned URLs expire after `GRANT_TTL`. Expired grants are swept whenever
/// a new URL is issued, so URLs that are never redeemed do not pile up.
pub struct MemoryObjectStore {
    endpoint: String,
    objects: DashMap<String, Bytes>,
    grants: DashMap<String, Grant>,
    grant_ttl: Duration,
    public_reads: AtomicBool,
    online: AtomicBool,
    jitter: Option<Duration>,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    /// Create a private bucket served under `endpoint`, which must end in `/`
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            objects: DashMap::new(),
            grants: DashMap::new(),
            grant_ttl: GRANT_TTL,
            public_reads: AtomicBool::new(false),
            online: AtomicBool::new(true),
            jitter: None,
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    /// Delay every request by a random duration up to `max`
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.jitter = Some(max);
        self
    }

    /// Allow or deny anonymous GETs
    pub fn set_public_reads(&self, enabled: bool) {
        self.public_reads.store(enabled, Ordering::SeqCst);
    }

    /// Simulate the bucket going offline
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Stored bytes for a hash
    pub fn object(&self, hash: &Cid) -> Option<Bytes> {
        self.objects.get(&hash_to_key(hash)).map(|entry| entry.value().clone())
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of GET requests received
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of PUT requests received
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn presign(&self, hash: &Cid, access: Access) -> PresignedUrl {
        let key = hash_to_key(hash);
        let token = Uuid::new_v4().simple().to_string();
        let url = PresignedUrl::new(format!("{}{}?token={}", self.endpoint, key, token));
        let now = Instant::now();
        self.grants.retain(|_, grant| grant.expires > now);
        self.grants.insert(
            token,
            Grant {
                key,
                access,
                expires: now + self.grant_ttl,
            },
        );
        match access {
            Access::Read => url,
            Access::Write { size } => url.with_field(SIZE_FIELD, size.to_string()),
        }
    }

    fn store(&self, hash: &Cid, data: Bytes) {
        self.objects.insert(hash_to_key(hash), data);
    }

    async fn before_request(&self) -> Result<()> {
        if let Some(max) = self.jitter {
            let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(BlockStoreError::Connection(format!("{} unreachable", self.endpoint)));
        }
        Ok(())
    }

    /// Split a request URL into object key and optional token
    fn parse(&self, url: &str) -> Result<(String, Option<String>)> {
        if !url.starts_with(&self.endpoint) {
            return Err(BlockStoreError::NotFoundAt(url.to_string()));
        }
        let parsed = Url::parse(url).map_err(|e| BlockStoreError::Http(format!("{url}: {e}")))?;
        let key = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        let token = parsed
            .query_pairs()
            .find(|(name, _)| name == "token")
            .map(|(_, value)| value.into_owned());
        Ok((key, token))
    }

    fn redeem(&self, token: &str, key: &str) -> Result<Access> {
        let (_, grant) = self
            .grants
            .remove(token)
            .ok_or_else(|| BlockStoreError::AuthFailed("unknown or spent token".to_string()))?;
        if grant.expires <= Instant::now() {
            return Err(BlockStoreError::AuthFailed("token expired".to_string()));
        }
        if grant.key != key {
            return Err(BlockStoreError::AuthFailed(format!(
                "token issued for {} used on {key}",
                grant.key
            )));
        }
        Ok(grant.access)
    }
}

#[async_trait]
impl DirectHttp for MemoryObjectStore {
    async fn get(&self, url: &str) -> Result<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.before_request().await?;

        let (key, token) = self.parse(url)?;
        match token {
            Some(token) => {
                if self.redeem(&token, &key)? != Access::Read {
                    return Err(BlockStoreError::AuthFailed("write token used for read".to_string()));
                }
            }
            // private buckets answer anonymous reads as if nothing were there
            None if !self.public_reads.load(Ordering::SeqCst) => {
                return Err(BlockStoreError::NotFoundAt(url.to_string()));
            }
            None => {}
        }

        self.objects
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BlockStoreError::NotFoundAt(url.to_string()))
    }

    async fn put(&self, url: &str, data: Bytes, extra_fields: &HashMap<String, String>) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.before_request().await?;

        let (key, token) = self.parse(url)?;
        let token = token.ok_or_else(|| BlockStoreError::AuthFailed("anonymous write".to_string()))?;
        let Access::Write { size } = self.redeem(&token, &key)? else {
            return Err(BlockStoreError::AuthFailed("read token used for write".to_string()));
        };
        if extra_fields.get(SIZE_FIELD) != Some(&size.to_string()) || data.len() != size {
            return Err(BlockStoreError::AuthFailed(format!(
                "upload of {} bytes does not match signed size {size}",
                data.len()
            )));
        }

        let hash = key_to_hash(&key)?;
        if !verify_cid(&data, &hash) {
            return Err(BlockStoreError::HashMismatch {
                expected: hash.to_string(),
                actual: format!("{} bytes of other content", data.len()),
            });
        }
        self.objects.insert(key, data);
        Ok(())
    }
}

/// Snapshot of calls received by a `MemoryStorage`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_raw: usize,
    pub put: usize,
    pub auth_reads: usize,
    pub auth_writes: usize,
}

#[derive(Default)]
struct Counters {
    get_raw: AtomicUsize,
    put: AtomicUsize,
    auth_reads: AtomicUsize,
    auth_writes: AtomicUsize,
}

/// An authenticating storage node backed by a `MemoryObjectStore`
pub struct MemoryStorage {
    node_id: NodeId,
    objects: Arc<MemoryObjectStore>,
    transactions: DashMap<TransactionId, PublicKeyHash>,
    pins: DashMap<Cid, PublicKeyHash>,
    online: AtomicBool,
    counters: Counters,
}

impl MemoryStorage {
    /// Create a node identified by `node_id` writing into `objects`
    pub fn new(node_id: NodeId, objects: Arc<MemoryObjectStore>) -> Self {
        Self {
            node_id,
            objects,
            transactions: DashMap::new(),
            pins: DashMap::new(),
            online: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    /// Simulate the node going offline
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Calls received so far
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            get_raw: self.counters.get_raw.load(Ordering::SeqCst),
            put: self.counters.put.load(Ordering::SeqCst),
            auth_reads: self.counters.auth_reads.load(Ordering::SeqCst),
            auth_writes: self.counters.auth_writes.load(Ordering::SeqCst),
        }
    }

    /// Whether `hash` is pinned
    pub fn is_pinned(&self, hash: &Cid) -> bool {
        self.pins.contains_key(hash)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BlockStoreError::Connection(format!("storage node {} unreachable", self.node_id)))
        }
    }

    fn ensure_transaction(&self, owner: &PublicKeyHash, tid: &TransactionId) -> Result<()> {
        match self.transactions.get(tid) {
            Some(entry) if entry.value() == owner => Ok(()),
            _ => Err(BlockStoreError::UnknownTransaction(tid.to_string())),
        }
    }

    /// Open each signed hash against the writer key
    fn verify_signed_hashes(
        &self,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        codec: CidCodec,
    ) -> Result<Vec<Cid>> {
        let public_key = writer
            .public_key()
            .ok_or_else(|| BlockStoreError::AuthFailed(format!("writer {writer} has no inline key")))?;
        signed_hashes
            .iter()
            .map(|signed| {
                let message = strand_crypto::open_signed_message(public_key, signed)
                    .map_err(|e| BlockStoreError::AuthFailed(e.to_string()))?;
                let hash = Cid::try_from(message)?;
                if hash.codec() != codec.code() {
                    return Err(BlockStoreError::AuthFailed(format!(
                        "{hash} signed with codec {:#x}, expected {:#x}",
                        hash.codec(),
                        codec.code()
                    )));
                }
                Ok(hash)
            })
            .collect()
    }

    fn store_blocks(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        blocks: &[Bytes],
        codec: CidCodec,
        tid: &TransactionId,
    ) -> Result<Vec<Cid>> {
        self.counters.put.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        self.ensure_transaction(owner, tid)?;
        if signed_hashes.len() != blocks.len() {
            return Err(BlockStoreError::AuthFailed(format!(
                "{} signatures for {} blocks",
                signed_hashes.len(),
                blocks.len()
            )));
        }

        let hashes = self.verify_signed_hashes(writer, signed_hashes, codec)?;
        for (hash, block) in hashes.iter().zip(blocks) {
            if !verify_cid(block, hash) {
                return Err(BlockStoreError::HashMismatch {
                    expected: hash.to_string(),
                    actual: format!("{} bytes of other content", block.len()),
                });
            }
        }
        for (hash, block) in hashes.iter().zip(blocks) {
            if !hash.is_identity() {
                self.objects.store(hash, block.clone());
            }
        }
        debug!(count = hashes.len(), node = %self.node_id, "stored blocks");
        Ok(hashes)
    }
}

#[async_trait]
impl ContentAddressedStorage for MemoryStorage {
    async fn id(&self) -> Result<NodeId> {
        Ok(self.node_id)
    }

    async fn start_transaction(&self, owner: &PublicKeyHash) -> Result<TransactionId> {
        self.ensure_online()?;
        let tid = TransactionId::generate();
        self.transactions.insert(tid, *owner);
        Ok(tid)
    }

    async fn close_transaction(&self, owner: &PublicKeyHash, tid: &TransactionId) -> Result<bool> {
        self.ensure_online()?;
        Ok(self
            .transactions
            .remove_if(tid, |_, holder| holder == owner)
            .is_some())
    }

    async fn get_raw(&self, hash: &Cid) -> Result<Option<Bytes>> {
        self.counters.get_raw.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        if let Some(inline) = hash.identity_payload() {
            return Ok(Some(inline));
        }
        Ok(self.objects.object(hash))
    }

    async fn get_size(&self, hash: &Cid) -> Result<Option<u64>> {
        self.ensure_online()?;
        if let Some(inline) = hash.identity_payload() {
            return Ok(Some(inline.len() as u64));
        }
        Ok(self.objects.object(hash).map(|data| data.len() as u64))
    }

    async fn put(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        blocks: &[Bytes],
        tid: &TransactionId,
    ) -> Result<Vec<Cid>> {
        self.store_blocks(owner, writer, signed_hashes, blocks, CidCodec::DagCbor, tid)
    }

    async fn put_raw(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        signed_hashes: &[Vec<u8>],
        blocks: &[Bytes],
        tid: &TransactionId,
    ) -> Result<Vec<Cid>> {
        self.store_blocks(owner, writer, signed_hashes, blocks, CidCodec::Raw, tid)
    }

    async fn auth_reads(&self, hashes: &[Cid]) -> Result<Vec<PresignedUrl>> {
        self.counters.auth_reads.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        Ok(hashes
            .iter()
            .map(|hash| self.objects.presign(hash, Access::Read))
            .collect())
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
        self.counters.auth_writes.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        self.ensure_transaction(owner, tid)?;
        if signed_hashes.len() != block_sizes.len() {
            return Err(BlockStoreError::AuthFailed(format!(
                "{} signatures for {} blocks",
                signed_hashes.len(),
                block_sizes.len()
            )));
        }

        let hashes = self.verify_signed_hashes(writer, signed_hashes, CidCodec::for_block(is_raw))?;
        Ok(hashes
            .iter()
            .zip(block_sizes)
            .map(|(hash, &size)| self.objects.presign(hash, Access::Write { size }))
            .collect())
    }

    async fn pin_update(&self, owner: &PublicKeyHash, existing: &Cid, updated: &Cid) -> Result<Vec<Cid>> {
        self.ensure_online()?;
        self.pins.remove(existing);
        self.pins.insert(*updated, *owner);
        Ok(vec![*updated])
    }

    async fn recursive_pin(&self, owner: &PublicKeyHash, hash: &Cid) -> Result<Vec<Cid>> {
        self.ensure_online()?;
        self.pins.insert(*hash, *owner);
        Ok(vec![*hash])
    }

    async fn recursive_unpin(&self, _owner: &PublicKeyHash, hash: &Cid) -> Result<Vec<Cid>> {
        self.ensure_online()?;
        self.pins.remove(hash);
        Ok(vec![*hash])
    }

    /// Blocks are only removed explicitly, so there is never anything to collect
    async fn gc(&self) -> Result<bool> {
        self.ensure_online()?;
        Ok(true)
    }
}
