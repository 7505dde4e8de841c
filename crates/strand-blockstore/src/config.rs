//! Block store routing configuration

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BlockStoreError, Result};

/// Default number of owners kept in the ownership cache
pub const DEFAULT_OWNERSHIP_CACHE_SIZE: usize = 100;

/// Routing properties of a `DirectBlockStore`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStoreProperties {
    /// Upload straight to object storage for owners stored on this node
    pub direct_writes: bool,
    /// The bucket serves anonymous GETs at `base_url`
    pub public_reads: bool,
    /// Read through presigned GET URLs
    pub authed_reads: bool,
    /// Public bucket URL, ending in `/`; required when `public_reads` is set
    pub base_url: Option<String>,
    /// Capacity of the ownership cache
    pub ownership_cache_size: usize,
    /// Seconds before a cached ownership entry is re-resolved; `None` keeps entries until evicted
    pub ownership_ttl_secs: Option<u64>,
}

impl Default for BlockStoreProperties {
    fn default() -> Self {
        Self {
            direct_writes: false,
            public_reads: false,
            authed_reads: false,
            base_url: None,
            ownership_cache_size: DEFAULT_OWNERSHIP_CACHE_SIZE,
            ownership_ttl_secs: None,
        }
    }
}

impl BlockStoreProperties {
    /// Enable or disable direct writes
    pub fn with_direct_writes(mut self, enabled: bool) -> Self {
        self.direct_writes = enabled;
        self
    }

    /// Serve reads anonymously from `base_url`
    pub fn with_public_reads(mut self, base_url: impl Into<String>) -> Self {
        self.public_reads = true;
        self.base_url = Some(base_url.into());
        self
    }

    /// Enable or disable presigned reads
    pub fn with_authed_reads(mut self, enabled: bool) -> Self {
        self.authed_reads = enabled;
        self
    }

    /// Bound the age of ownership cache entries; partial seconds round up
    pub fn with_ownership_ttl(mut self, ttl: Duration) -> Self {
        self.ownership_ttl_secs = Some(ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0));
        self
    }

    /// Load from `STRAND_*` environment variables, defaulting unset ones
    pub fn from_env() -> Result<Self> {
        let mut properties = Self::default();
        if let Some(value) = env_var("STRAND_DIRECT_WRITES") {
            properties.direct_writes = parse_flag("STRAND_DIRECT_WRITES", &value)?;
        }
        if let Some(value) = env_var("STRAND_PUBLIC_READS") {
            properties.public_reads = parse_flag("STRAND_PUBLIC_READS", &value)?;
        }
        if let Some(value) = env_var("STRAND_AUTHED_READS") {
            properties.authed_reads = parse_flag("STRAND_AUTHED_READS", &value)?;
        }
        properties.base_url = env_var("STRAND_BLOCK_BASE_URL");
        if let Some(value) = env_var("STRAND_OWNERSHIP_CACHE_SIZE") {
            properties.ownership_cache_size = value.parse().map_err(|_| {
                BlockStoreError::Configuration(format!("STRAND_OWNERSHIP_CACHE_SIZE: not a number: {value}"))
            })?;
        }
        if let Some(value) = env_var("STRAND_OWNERSHIP_TTL_SECS") {
            properties.ownership_ttl_secs = Some(value.parse().map_err(|_| {
                BlockStoreError::Configuration(format!("STRAND_OWNERSHIP_TTL_SECS: not a number: {value}"))
            })?);
        }
        properties.validate()?;
        Ok(properties)
    }

    /// Check that the properties describe a usable router
    pub fn validate(&self) -> Result<()> {
        if self.public_reads {
            let base = self.base_url.as_deref().ok_or_else(|| {
                BlockStoreError::Configuration("public reads need a base url".to_string())
            })?;
            url::Url::parse(base)
                .map_err(|e| BlockStoreError::Configuration(format!("bad base url {base}: {e}")))?;
            if !base.ends_with('/') {
                return Err(BlockStoreError::Configuration(format!(
                    "base url must end with '/': {base}"
                )));
            }
        }
        self.cache_capacity()?;
        Ok(())
    }

    pub(crate) fn cache_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.ownership_cache_size).ok_or_else(|| {
            BlockStoreError::Configuration("ownership cache size must be positive".to_string())
        })
    }

    pub(crate) fn ownership_ttl(&self) -> Option<Duration> {
        self.ownership_ttl_secs.map(Duration::from_secs)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BlockStoreError::Configuration(format!("{name}: not a boolean: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_fallback_only() {
        let properties = BlockStoreProperties::default();

        assert!(!properties.direct_writes && !properties.public_reads && !properties.authed_reads);
        assert_eq!(properties.ownership_cache_size, 100);
        assert!(properties.validate().is_ok());
    }

    #[test]
    fn test_public_reads_need_base_url() {
        let mut properties = BlockStoreProperties::default();
        properties.public_reads = true;
        assert!(properties.validate().is_err());

        let properties = BlockStoreProperties::default().with_public_reads("http://bucket.local/blocks/");
        assert!(properties.validate().is_ok());

        let properties = BlockStoreProperties::default().with_public_reads("http://bucket.local/blocks");
        assert!(properties.validate().is_err());
    }

    #[test]
    fn test_zero_cache_rejected() {
        let properties = BlockStoreProperties {
            ownership_cache_size: 0,
            ..Default::default()
        };
        assert!(properties.validate().is_err());
    }

    #[test]
    fn test_json_with_missing_fields() {
        let properties: BlockStoreProperties =
            serde_json::from_str(r#"{"direct_writes": true, "ownership_ttl_secs": 60}"#).unwrap();

        assert!(properties.direct_writes);
        assert_eq!(properties.ownership_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(properties.ownership_cache_size, DEFAULT_OWNERSHIP_CACHE_SIZE);
    }

    #[test]
    fn test_sub_second_ttl_rounds_up() {
        let ttl = |d| BlockStoreProperties::default().with_ownership_ttl(d).ownership_ttl();

        assert_eq!(ttl(Duration::from_millis(500)), Some(Duration::from_secs(1)));
        assert_eq!(ttl(Duration::from_millis(1500)), Some(Duration::from_secs(2)));
        assert_eq!(ttl(Duration::from_secs(3)), Some(Duration::from_secs(3)));
        assert_eq!(ttl(Duration::ZERO), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("X", "TRUE").unwrap());
        assert!(!parse_flag("X", "off").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }
}
