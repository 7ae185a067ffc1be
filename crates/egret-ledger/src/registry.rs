//! Metadata label registry.
//!
//! Transaction metadata labels must belong to the published registry. The
//! registry JSON is fetched over HTTP, cached on disk, and loaded from the
//! cache when the network is unavailable. Label validation happens at the
//! job-acceptance boundary, not inside the engine.

use crate::error::LedgerError;
use std::collections::HashSet;
use std::path::Path;

/// Published registry of recognized metadata labels.
pub const REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/cardano-foundation/CIPs/master/CIP-0010/registry.json";

#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    labels: HashSet<u64>,
}

impl MetadataRegistry {
    /// Parse the registry document.
    ///
    /// Entries carry `transaction_metadatum_label` as a number (or a
    /// numeric string in older snapshots); unparseable entries are skipped.
    pub fn parse(document: &str) -> Result<Self, LedgerError> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(document)
            .map_err(|e| LedgerError::Registry(format!("parse: {e}")))?;

        let mut labels = HashSet::new();
        for entry in &entries {
            let raw = entry.get("transaction_metadatum_label");
            let label = match raw {
                Some(serde_json::Value::Number(n)) => n.as_u64(),
                Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
                _ => None,
            };
            if let Some(label) = label {
                labels.insert(label);
            }
        }
        log::info!("loaded {} metadata labels", labels.len());
        Ok(MetadataRegistry { labels })
    }

    /// Load from the on-disk cache.
    pub fn from_cache(path: &Path) -> Result<Self, LedgerError> {
        let document = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Registry(format!("cache read: {e}")))?;
        Self::parse(&document)
    }

    /// Fetch the registry, writing the cache; fall back to the cache on
    /// fetch failure.
    pub async fn load(url: &str, cache_path: &Path) -> Result<Self, LedgerError> {
        match Self::fetch(url, cache_path).await {
            Ok(registry) => Ok(registry),
            Err(e) => {
                log::warn!("registry fetch failed ({e}), trying cache");
                Self::from_cache(cache_path)
            }
        }
    }

    async fn fetch(url: &str, cache_path: &Path) -> Result<Self, LedgerError> {
        let document = reqwest::get(url)
            .await
            .map_err(|e| LedgerError::Registry(format!("fetch: {e}")))?
            .error_for_status()
            .map_err(|e| LedgerError::Registry(format!("fetch: {e}")))?
            .text()
            .await
            .map_err(|e| LedgerError::Registry(format!("fetch body: {e}")))?;

        let registry = Self::parse(&document)?;
        if let Err(e) = std::fs::write(cache_path, &document) {
            log::warn!("failed to write registry cache: {e}");
        }
        Ok(registry)
    }

    pub fn is_known(&self, label: u64) -> bool {
        self.labels.contains(&label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
