use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::{AppError, AppResult, PermissionId, RoleId};
use gatehouse_domain::{AssignmentScope, UserRole};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{AccessStore, AuthorizationConfig, CacheKeys, PermissionCache, RoleHierarchyService};

/// Counts of cache entries evicted by one cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Role permission sets evicted.
    pub roles_evicted: usize,
    /// Users whose cached permission sets were evicted.
    pub users_evicted: usize,
}

/// Evicts cached permission sets after access data changes.
///
/// Each affected entry first gets a fresh generation token, so a resolution
/// that read the store before the change can no longer publish its set.
/// The entry is then deleted. Every cache write here is retried; a cascade
/// returns only once all of them succeeded, or fails with `CacheUnavailable`.
#[derive(Clone)]
pub struct InvalidationService {
    store: Arc<dyn AccessStore>,
    cache: Arc<dyn PermissionCache>,
    hierarchy: RoleHierarchyService,
    keys: CacheKeys,
    generation_ttl_seconds: u32,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl InvalidationService {
    /// Creates an invalidation service sharing the aggregator's key layout.
    #[must_use]
    pub fn new(
        store: Arc<dyn AccessStore>,
        cache: Arc<dyn PermissionCache>,
        hierarchy: RoleHierarchyService,
        config: &AuthorizationConfig,
    ) -> Self {
        Self {
            store,
            cache,
            hierarchy,
            keys: CacheKeys::new(config.cache_key_prefix.clone()),
            generation_ttl_seconds: config.cache_ttl_seconds.saturating_mul(2),
            max_attempts: config.invalidation_max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.invalidation_retry_backoff_ms),
        }
    }

    /// Evicts a role, every descendant, and every user assigned to any of them.
    pub async fn invalidate_role(&self, role_id: RoleId) -> AppResult<InvalidationReport> {
        self.invalidate_roles(&[role_id]).await
    }

    /// Evicts several roles as one cascade.
    pub async fn invalidate_roles(&self, role_ids: &[RoleId]) -> AppResult<InvalidationReport> {
        let mut closure: BTreeSet<RoleId> = role_ids.iter().copied().collect();
        for role_id in role_ids {
            for descendant in self.hierarchy.get_all_descendants(*role_id).await? {
                closure.insert(descendant.id());
            }
        }

        for role_id in &closure {
            self.replace_generation(&self.keys.role_generation(*role_id))
                .await?;
            let key = self.keys.role(*role_id);
            self.with_retry(&key, || self.cache.delete(&key)).await?;
        }

        let closure: Vec<RoleId> = closure.into_iter().collect();
        let users: BTreeSet<String> = self
            .store
            .find_active_assignments_for_roles(&closure)
            .await?
            .iter()
            .map(|assignment| assignment.user_id().to_owned())
            .collect();

        for user_id in &users {
            self.evict_user(user_id).await?;
        }

        let report = InvalidationReport {
            roles_evicted: closure.len(),
            users_evicted: users.len(),
        };
        info!(
            roles = report.roles_evicted,
            users = report.users_evicted,
            "role permission cascade evicted"
        );
        Ok(report)
    }

    /// Evicts every role holding a link to a permission, with their cascades.
    pub async fn invalidate_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<InvalidationReport> {
        let role_ids = self
            .store
            .find_roles_granting_permission(permission_id)
            .await?;
        if role_ids.is_empty() {
            return Ok(InvalidationReport::default());
        }

        self.invalidate_roles(&role_ids).await
    }

    /// Evicts every cached query of one user.
    pub async fn invalidate_user(&self, user_id: &str) -> AppResult<()> {
        self.evict_user(user_id).await?;
        info!(user_id, "user permission cache evicted");
        Ok(())
    }

    /// Evicts the cached queries an assignment change can affect.
    ///
    /// A global assignment participates in every query of the user; a scoped
    /// one only in the unscoped query, its scope wildcard and its instance.
    pub async fn invalidate_assignment(&self, assignment: &UserRole) -> AppResult<()> {
        if assignment.scope() == AssignmentScope::Global {
            return self.invalidate_user(assignment.user_id()).await;
        }

        let user_id = assignment.user_id();
        let queries = [
            (None, None),
            (Some(assignment.scope()), None),
            (Some(assignment.scope()), assignment.scope_id()),
        ];
        for (scope, scope_id) in queries {
            self.replace_generation(&self.keys.query_generation(user_id, scope, scope_id))
                .await?;
            let key = self.keys.user(user_id, scope, scope_id);
            self.with_retry(&key, || self.cache.delete(&key)).await?;
        }

        info!(
            user_id,
            scope = %assignment.scope(),
            scope_id = assignment.scope_id().unwrap_or_default(),
            "user scope permission cache evicted"
        );
        Ok(())
    }

    async fn evict_user(&self, user_id: &str) -> AppResult<()> {
        self.replace_generation(&self.keys.user_generation(user_id))
            .await?;
        let prefix = self.keys.user_prefix(user_id);
        self.with_retry(&prefix, || self.cache.delete_prefix(&prefix))
            .await
            .map(|_| ())
    }

    async fn replace_generation(&self, key: &str) -> AppResult<()> {
        let token = Uuid::new_v4().simple().to_string();
        self.with_retry(key, || {
            self.cache
                .set(key, token.clone(), self.generation_ttl_seconds)
        })
        .await
    }

    async fn with_retry<T, F, Fut>(&self, target: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.max_attempts => {
                    warn!(target_key = target, attempt, error = %error, "cache invalidation write failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(AppError::CacheUnavailable(format!(
                        "failed to invalidate '{target}' after {attempt} attempts: {error}"
                    )));
                }
            }
        }
    }
}
