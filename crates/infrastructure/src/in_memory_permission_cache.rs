use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use gatehouse_application::PermissionCache;
use gatehouse_core::AppResult;

#[derive(Debug, Clone)]
struct PermissionCacheEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local permission cache.
///
/// Entries live in a sharded map, so writes to one key never block readers
/// or writers of keys on other shards. Expired entries are dropped lazily.
#[derive(Debug, Default)]
pub struct InMemoryPermissionCache {
    entries: DashMap<String, PermissionCacheEntry>,
}

impl InMemoryPermissionCache {
    /// Creates an empty in-memory permission cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u32) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);

        self.entries
            .insert(key.to_owned(), PermissionCacheEntry { value, expires_at });

        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        let mut removed = 0_u64;
        self.entries.retain(|key, _| {
            let matches = key.starts_with(prefix);
            if matches {
                removed += 1;
            }
            !matches
        });

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use gatehouse_application::PermissionCache;

    use super::InMemoryPermissionCache;

    #[tokio::test]
    async fn stores_and_reads_values() {
        let cache = InMemoryPermissionCache::new();

        let stored = cache.set("authz:role:1", "payload".to_owned(), 60).await;
        let loaded = cache.get("authz:role:1").await;

        assert!(stored.is_ok());
        assert_eq!(loaded.unwrap_or_default(), Some("payload".to_owned()));
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let cache = InMemoryPermissionCache::new();

        assert!(cache.set("authz:role:1", "payload".to_owned(), 0).await.is_ok());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn prefix_delete_only_removes_matching_keys() {
        let cache = InMemoryPermissionCache::new();
        for key in [
            "authz:user:ann:all",
            "authz:user:ann:project:p1",
            "authz:user:anna:all",
            "authz:role:1",
        ] {
            assert!(cache.set(key, "x".to_owned(), 60).await.is_ok());
        }

        let removed = cache.delete_prefix("authz:user:ann:").await;

        assert_eq!(removed.unwrap_or_default(), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("authz:user:anna:all").await.unwrap_or_default().is_some());
    }

    #[tokio::test]
    async fn delete_removes_single_key() {
        let cache = InMemoryPermissionCache::new();
        assert!(cache.set("authz:role:1", "x".to_owned(), 60).await.is_ok());

        assert!(cache.delete("authz:role:1").await.is_ok());
        assert!(cache.delete("authz:role:missing").await.is_ok());
        assert!(cache.is_empty());
    }
}
