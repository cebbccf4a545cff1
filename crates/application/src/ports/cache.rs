use async_trait::async_trait;
use gatehouse_core::AppResult;

/// Distributed cache port for aggregated permission sets.
///
/// Values are opaque strings. Implementations report backend outages as
/// `AppError::CacheUnavailable`.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Returns the cached value for one key.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Stores a value with ttl. A zero ttl stores nothing.
    async fn set(&self, key: &str, value: String, ttl_seconds: u32) -> AppResult<()>;

    /// Removes one key.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Removes every key starting with `prefix` and returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64>;
}
