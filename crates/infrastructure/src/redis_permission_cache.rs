//! Redis-backed permission cache.

use async_trait::async_trait;
use gatehouse_application::PermissionCache;
use gatehouse_core::{AppError, AppResult};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::debug;

const SCAN_BATCH_SIZE: usize = 500;

/// Redis implementation of the permission cache port.
///
/// Keys passed in are namespaced once more with `key_prefix`, so several
/// deployments can share one Redis database.
#[derive(Clone)]
pub struct RedisPermissionCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisPermissionCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            return key.to_owned();
        }

        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| {
                AppError::CacheUnavailable(format!("failed to connect to redis: {error}"))
            })
    }
}

#[async_trait]
impl PermissionCache for RedisPermissionCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection().await?;

        connection.get(self.key_for(key)).await.map_err(|error| {
            AppError::CacheUnavailable(format!(
                "failed to read permission cache entry '{key}': {error}"
            ))
        })
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u32) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let mut connection = self.connection().await?;

        connection
            .set_ex(self.key_for(key), value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::CacheUnavailable(format!(
                    "failed to write permission cache entry '{key}': {error}"
                ))
            })
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;

        connection.del(self.key_for(key)).await.map_err(|error| {
            AppError::CacheUnavailable(format!(
                "failed to delete permission cache entry '{key}': {error}"
            ))
        })
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        let full_prefix = self.key_for(prefix);
        let pattern = format!("{}*", escape_glob(&full_prefix));
        let mut connection = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut connection)
                .await
                .map_err(|error| {
                    AppError::CacheUnavailable(format!(
                        "failed to scan permission cache prefix '{prefix}': {error}"
                    ))
                })?;

            let keys: Vec<String> = keys
                .into_iter()
                .filter(|key| key.starts_with(&full_prefix))
                .collect();
            if !keys.is_empty() {
                let deleted: u64 = connection.del(&keys).await.map_err(|error| {
                    AppError::CacheUnavailable(format!(
                        "failed to delete permission cache prefix '{prefix}': {error}"
                    ))
                })?;
                removed += deleted;
            }

            if next_cursor == 0 {
                debug!(prefix, removed, "evicted permission cache prefix");
                return Ok(removed);
            }
            cursor = next_cursor;
        }
    }
}

fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        if matches!(character, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}
