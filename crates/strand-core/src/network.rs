//! Network facade used by readers and writers
//!
//! Couples block storage with the metadata index that maps a chunk location
//! to the hash of its cryptree node.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cid::Cid;
use dashmap::DashMap;
use strand_blockstore::ContentAddressedStorage;
use strand_crypto::{Hasher, Sha256Hasher};
use tracing::{debug, instrument};

use crate::capability::{AbsoluteCapability, Bat, Location};
use crate::cryptree::CryptreeNode;
use crate::{CoreError, Result};

/// Storage and metadata access for chunk chains
#[async_trait]
pub trait NetworkAccess: Send + Sync {
    /// Block storage holding nodes and fragments
    fn storage(&self) -> &dyn ContentAddressedStorage;

    /// Hasher used for stream-secret addressing
    fn hasher(&self) -> &dyn Hasher;

    /// Resolve and decrypt the node at a capability; `None` when nothing is there
    async fn get_metadata(&self, cap: &AbsoluteCapability) -> Result<Option<CryptreeNode>>;

    /// Point `location` at the node stored under `hash`
    async fn set_metadata(&self, location: &Location, bat: Option<Bat>, hash: Cid) -> Result<()>;
}

#[derive(Clone, Copy)]
struct IndexEntry {
    hash: Cid,
    bat: Option<Bat>,
}

/// Network facade with an in-memory metadata index
pub struct MemoryNetwork {
    storage: Arc<dyn ContentAddressedStorage>,
    hasher: Arc<dyn Hasher>,
    index: DashMap<Location, IndexEntry>,
    lookups: AtomicUsize,
}

impl MemoryNetwork {
    /// Create a facade over `storage` using SHA2-256 addressing
    pub fn new(storage: Arc<dyn ContentAddressedStorage>) -> Self {
        Self {
            storage,
            hasher: Arc::new(Sha256Hasher),
            index: DashMap::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Number of metadata lookups served
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of indexed locations
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[async_trait]
impl NetworkAccess for MemoryNetwork {
    fn storage(&self) -> &dyn ContentAddressedStorage {
        self.storage.as_ref()
    }

    fn hasher(&self) -> &dyn Hasher {
        self.hasher.as_ref()
    }

    #[instrument(skip(self, cap), fields(map_key = ?cap.map_key()))]
    async fn get_metadata(&self, cap: &AbsoluteCapability) -> Result<Option<CryptreeNode>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let Some(entry) = self.index.get(&cap.location).map(|e| *e.value()) else {
            debug!("no metadata at location");
            return Ok(None);
        };
        if entry.bat.is_some() && entry.bat != cap.bat {
            return Err(CoreError::AccessDenied("batch access token mismatch".to_string()));
        }

        match self.storage.get_raw(&entry.hash).await? {
            Some(block) => Ok(Some(CryptreeNode::open(entry.hash, &block, &cap.key)?)),
            None => Ok(None),
        }
    }

    async fn set_metadata(&self, location: &Location, bat: Option<Bat>, hash: Cid) -> Result<()> {
        self.index.insert(location.clone(), IndexEntry { hash, bat });
        Ok(())
    }
}
