//! TTL-checked translation cache over an injected key-value store
//!
//! The backing store has no built-in expiry; entries carry their write
//! timestamp and are lazily invalidated on read once older than 24 hours.

use crate::{Result, SessionError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hours a cached translation stays valid
pub const TRANSLATION_TTL_HOURS: i64 = 24;

/// Async key-value storage collaborator
///
/// No expiry semantics of its own; the cache layer enforces the TTL from the
/// stored timestamp.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the raw value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// One cached translation run
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CachedTranslation {
    /// Translated display units, in order
    pub translated_units: Vec<String>,
    /// When the translation was stored
    pub timestamp: DateTime<Utc>,
}

/// Translation cache keyed by page, source language, and target language
#[derive(Clone)]
pub struct TranslationCache {
    store: Arc<dyn CacheStore>,
}

impl TranslationCache {
    /// Create a cache over the given store
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Build the storage key for a translation run
    pub fn key(url: &str, source: &str, target: &str) -> String {
        format!("translation:{}:{}:{}", url, source, target)
    }

    /// Look up a cached translation, treating expired entries as absent
    pub async fn lookup(
        &self,
        url: &str,
        source: &str,
        target: &str,
    ) -> Result<Option<Vec<String>>> {
        let key = Self::key(url, source, target);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let entry: CachedTranslation = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%key, error = %e, "discarding unreadable cache entry");
                return Ok(None);
            }
        };

        let age = Utc::now() - entry.timestamp;
        if age > Duration::hours(TRANSLATION_TTL_HOURS) {
            debug!(%key, age_hours = age.num_hours(), "cache entry expired");
            return Ok(None);
        }

        debug!(%key, units = entry.translated_units.len(), "translation cache hit");
        Ok(Some(entry.translated_units))
    }

    /// Store a fully successful translation run
    pub async fn store(
        &self,
        url: &str,
        source: &str,
        target: &str,
        translated_units: Vec<String>,
    ) -> Result<()> {
        let key = Self::key(url, source, target);
        let entry = CachedTranslation {
            translated_units,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&entry)
            .map_err(|e| SessionError::Config(format!("failed to encode cache entry: {}", e)))?;
        self.store.set(&key, value).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// In-memory store for tests
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        entries: Mutex<HashMap<String, serde_json::Value>>,
    }

    #[async_trait]
    impl CacheStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
            Ok(self.entries.lock().get(key).cloned())
        }

        async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
            self.entries.lock().insert(key.to_string(), value);
            Ok(())
        }
    }

    fn cache_with_store() -> (TranslationCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (TranslationCache::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_round_trip_within_ttl() {
        let (cache, _store) = cache_with_store();
        let units = vec!["eka".to_string(), "toka".to_string()];

        cache
            .store("https://example.com/a", "en", "fi", units.clone())
            .await
            .unwrap();

        let found = cache
            .lookup("https://example.com/a", "en", "fi")
            .await
            .unwrap();
        assert_eq!(found, Some(units));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let (cache, store) = cache_with_store();
        let key = TranslationCache::key("https://example.com/a", "en", "fi");
        let stale = CachedTranslation {
            translated_units: vec!["vanha".to_string()],
            timestamp: Utc::now() - Duration::hours(TRANSLATION_TTL_HOURS + 1),
        };
        store
            .set(&key, serde_json::to_value(&stale).unwrap())
            .await
            .unwrap();

        let found = cache
            .lookup("https://example.com/a", "en", "fi")
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_key_distinguishes_languages() {
        let (cache, _store) = cache_with_store();
        cache
            .store("https://example.com/a", "en", "fi", vec!["fi".to_string()])
            .await
            .unwrap();

        let other = cache
            .lookup("https://example.com/a", "en", "sv")
            .await
            .unwrap();
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_a_miss() {
        let (cache, store) = cache_with_store();
        let key = TranslationCache::key("https://example.com/a", "en", "fi");
        store
            .set(&key, serde_json::json!({"not": "a cache entry"}))
            .await
            .unwrap();

        let found = cache
            .lookup("https://example.com/a", "en", "fi")
            .await
            .unwrap();
        assert_eq!(found, None);
    }
}
