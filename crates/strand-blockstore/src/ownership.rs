//! Bounded cache of which node stores each owner's data

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::cid_utils::{NodeId, PublicKeyHash};

#[derive(Clone, Copy)]
struct CachedOwner {
    node: NodeId,
    resolved_at: Instant,
}

/// LRU map from owner to primary storage node
///
/// Entries are not invalidated when an account migrates; with a TTL they
/// are re-resolved once they age out.
pub struct OwnershipCache {
    entries: Mutex<LruCache<PublicKeyHash, CachedOwner>>,
    ttl: Option<Duration>,
}

impl OwnershipCache {
    /// Create a cache holding at most `capacity` owners
    pub fn new(capacity: NonZeroUsize, ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Cached storage node for `owner`, if present and fresh
    pub fn get(&self, owner: &PublicKeyHash) -> Option<NodeId> {
        let mut entries = self.entries.lock();
        let cached = *entries.get(owner)?;
        if self.ttl.is_some_and(|ttl| cached.resolved_at.elapsed() >= ttl) {
            entries.pop(owner);
            return None;
        }
        Some(cached.node)
    }

    /// Record the storage node for `owner`
    pub fn insert(&self, owner: PublicKeyHash, node: NodeId) {
        self.entries.lock().put(
            owner,
            CachedOwner {
                node,
                resolved_at: Instant::now(),
            },
        );
    }

    /// Number of cached owners
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid_utils::{create_cid, CidCodec};

    fn owner(n: u8) -> PublicKeyHash {
        PublicKeyHash::from_public_key(&[n; 32])
    }

    #[test]
    fn test_evicts_least_recent() {
        let cache = OwnershipCache::new(NonZeroUsize::new(2).unwrap(), None);
        let node = create_cid(b"node", CidCodec::Raw);

        cache.insert(owner(1), node);
        cache.insert(owner(2), node);
        assert!(cache.get(&owner(1)).is_some());
        cache.insert(owner(3), node);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&owner(2)).is_none());
        assert!(cache.get(&owner(1)).is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = OwnershipCache::new(NonZeroUsize::new(4).unwrap(), Some(Duration::ZERO));
        cache.insert(owner(1), create_cid(b"node", CidCodec::Raw));

        assert!(cache.get(&owner(1)).is_none());
        assert!(cache.is_empty());
    }
}
