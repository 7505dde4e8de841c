//! Identity registry lookups
//!
//! The registry maps an owner key to a username, and a username to its chain
//! of public-key links. The newest link names the user's storage providers.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cid_utils::{NodeId, PublicKeyHash};
use crate::{BlockStoreError, Result};

/// A user's claim over a username
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    /// Username being claimed
    pub username: String,
    /// Storage nodes serving the user, primary first
    pub storage_providers: Vec<NodeId>,
}

/// One link in a username's key chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserPublicKeyLink {
    /// Key that owns the username at this point in the chain
    pub owner: PublicKeyHash,
    /// The signed claim
    pub claim: Claim,
}

impl UserPublicKeyLink {
    /// Primary storage node of this link
    pub fn primary_storage(&self) -> Option<NodeId> {
        self.claim.storage_providers.first().copied()
    }
}

/// Registry queries needed for ownership resolution
#[async_trait]
pub trait CoreNode: Send + Sync {
    /// Username registered for an owner key
    async fn get_username(&self, owner: &PublicKeyHash) -> Result<String>;

    /// The username's key chain, oldest link first
    async fn get_chain(&self, username: &str) -> Result<Vec<UserPublicKeyLink>>;
}

/// In-memory registry
#[derive(Default)]
pub struct MemoryCoreNode {
    usernames: DashMap<PublicKeyHash, String>,
    chains: DashMap<String, Vec<UserPublicKeyLink>>,
    lookups: AtomicUsize,
}

impl MemoryCoreNode {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user stored on `storage_providers`
    pub fn register(&self, username: &str, owner: PublicKeyHash, storage_providers: Vec<NodeId>) {
        self.usernames.insert(owner, username.to_string());
        self.chains.insert(
            username.to_string(),
            vec![UserPublicKeyLink {
                owner,
                claim: Claim {
                    username: username.to_string(),
                    storage_providers,
                },
            }],
        );
    }

    /// Move a user to new storage providers by appending a link
    pub fn migrate(&self, username: &str, storage_providers: Vec<NodeId>) -> Result<()> {
        let mut chain = self
            .chains
            .get_mut(username)
            .ok_or_else(|| BlockStoreError::Registry(format!("unknown user {username}")))?;
        let owner = chain
            .last()
            .map(|link| link.owner)
            .ok_or_else(|| BlockStoreError::Registry(format!("empty chain for {username}")))?;
        chain.push(UserPublicKeyLink {
            owner,
            claim: Claim {
                username: username.to_string(),
                storage_providers,
            },
        });
        Ok(())
    }

    /// Number of username lookups served
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoreNode for MemoryCoreNode {
    async fn get_username(&self, owner: &PublicKeyHash) -> Result<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.usernames
            .get(owner)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BlockStoreError::Registry(format!("no username for {owner}")))
    }

    async fn get_chain(&self, username: &str) -> Result<Vec<UserPublicKeyLink>> {
        Ok(self
            .chains
            .get(username)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid_utils::{create_cid, CidCodec};

    #[tokio::test]
    async fn test_migration_appends_link() {
        let registry = MemoryCoreNode::new();
        let owner = PublicKeyHash::from_public_key(&[1u8; 32]);
        let first = create_cid(b"node-a", CidCodec::Raw);
        let second = create_cid(b"node-b", CidCodec::Raw);

        registry.register("alice", owner, vec![first]);
        registry.migrate("alice", vec![second, first]).unwrap();

        let chain = registry.get_chain("alice").await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.last().unwrap().primary_storage(), Some(second));
        assert_eq!(registry.get_username(&owner).await.unwrap(), "alice");
        assert_eq!(registry.lookups(), 1);
    }

    #[tokio::test]
    async fn test_unknown_owner() {
        let registry = MemoryCoreNode::new();
        let owner = PublicKeyHash::from_public_key(&[2u8; 32]);

        assert!(registry.get_username(&owner).await.is_err());
        assert!(registry.migrate("nobody", vec![]).is_err());
    }
}
