mod cache_keys;

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatehouse_core::{AppError, AppResult, PermissionId, RoleId};
use gatehouse_domain::{AssignmentScope, ConstraintSet, Permission, PermissionAction, Role};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{AccessStore, AuthorizationConfig, PermissionCache, RoleGrant};

pub use cache_keys::CacheKeys;

/// One permission in a role's aggregated set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePermission {
    /// Granted permission.
    pub permission: Permission,
    /// Constraints in force for this grant.
    pub constraints: ConstraintSet,
    /// Role whose link supplied the grant.
    pub granted_by_role_id: RoleId,
    /// Whether the grant was inherited from an ancestor.
    pub inherited: bool,
}

/// Aggregated direct and inherited permissions of one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePermissionSet {
    /// Resolved role.
    pub role_id: RoleId,
    /// Depth of the role when the set was computed.
    pub level: u32,
    /// Permissions ordered by `resource:action`.
    pub permissions: Vec<EffectivePermission>,
}

impl RolePermissionSet {
    fn empty(role_id: RoleId) -> Self {
        Self {
            role_id,
            level: 0,
            permissions: Vec::new(),
        }
    }

    /// Folds a role's direct grants over the set inherited from its parent.
    /// Direct grants replace inherited entries for the same permission.
    fn fold(role: &Role, grants: Vec<RoleGrant>, inherited: Vec<EffectivePermission>) -> Self {
        let mut by_permission: BTreeMap<PermissionId, EffectivePermission> = inherited
            .into_iter()
            .map(|entry| {
                (
                    entry.permission.id(),
                    EffectivePermission {
                        inherited: true,
                        ..entry
                    },
                )
            })
            .collect();

        let mut grants: Vec<RoleGrant> = grants
            .into_iter()
            .filter(|grant| grant.link.is_active() && grant.permission.is_active())
            .collect();
        grants.sort_by_key(|grant| grant.link.id());

        let mut direct_seen = HashSet::new();
        for RoleGrant { link, permission } in grants {
            if !direct_seen.insert(permission.id()) {
                continue;
            }

            let constraints = link.effective_constraints(permission.constraints());
            by_permission.insert(
                permission.id(),
                EffectivePermission {
                    permission,
                    constraints,
                    granted_by_role_id: role.id(),
                    inherited: false,
                },
            );
        }

        let mut permissions: Vec<EffectivePermission> = by_permission.into_values().collect();
        permissions.sort_by_key(|entry| entry.permission.key());

        Self {
            role_id: role.id(),
            level: role.level(),
            permissions,
        }
    }
}

/// One permission in a user's effective set, with the assignment it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPermission {
    /// Granted permission.
    pub permission: Permission,
    /// Constraints in force for this grant.
    pub constraints: ConstraintSet,
    /// Role assigned to the user that yields this grant.
    pub granting_role_id: RoleId,
    /// Role in the assigned role's chain whose link supplied the grant.
    pub granted_by_role_id: RoleId,
    /// Scope of the winning assignment.
    pub scope: AssignmentScope,
    /// Scope instance of the winning assignment.
    pub scope_id: Option<String>,
}

/// Effective permissions of a user for one scope query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPermissionSet {
    /// Resolved user.
    pub user_id: String,
    /// Instant the set was computed.
    pub computed_at: DateTime<Utc>,
    /// Earliest instant at which an assignment crosses a validity bound.
    pub stale_after: Option<DateTime<Utc>>,
    /// Winning grant of each permission, ordered by `resource:action`.
    pub permissions: Vec<UserPermission>,
    /// Lower-ranked grants of permissions already listed, best first.
    #[serde(default)]
    pub alternatives: Vec<UserPermission>,
}

impl UserPermissionSet {
    /// Finds the winning entry granting one permission.
    #[must_use]
    pub fn find(&self, permission_id: PermissionId) -> Option<&UserPermission> {
        self.permissions
            .iter()
            .find(|entry| entry.permission.id() == permission_id)
    }

    /// Every grant of one permission, winner first.
    pub fn grants(&self, permission_id: PermissionId) -> impl Iterator<Item = &UserPermission> {
        self.permissions
            .iter()
            .chain(&self.alternatives)
            .filter(move |entry| entry.permission.id() == permission_id)
    }

    /// Every grant of exactly `action` on `resource`, winner first.
    pub fn grants_by_key<'s>(
        &'s self,
        resource: &str,
        action: PermissionAction,
    ) -> impl Iterator<Item = &'s UserPermission> {
        self.permissions
            .iter()
            .chain(&self.alternatives)
            .filter(move |entry| {
                entry.permission.resource() == resource && entry.permission.action() == action
            })
    }

    fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.stale_after.is_none_or(|stale_after| now < stale_after)
    }
}

/// Ordering key for competing grants of one permission: most specific
/// scope, then deepest role, then lowest role id.
type GrantRank = (u8, u32, Reverse<RoleId>);

/// Cache envelope tagging a value with the generation it was computed under.
#[derive(Serialize, Deserialize)]
struct CachedEntry<T> {
    generation: String,
    value: T,
}

/// Generation tokens observed before reading the store.
struct Generation {
    keys: Vec<String>,
    token: String,
}

/// Resolves role and user permission sets through the permission cache.
///
/// Cache failures never fail a resolution; they are logged and the set is
/// recomputed from the store. Store failures propagate.
///
/// Entries are tagged with the generation tokens read before the store was
/// consulted. An entry whose tokens were replaced by an invalidation is
/// never written, and never served if the write raced the replacement.
#[derive(Clone)]
pub struct PermissionAggregator {
    store: Arc<dyn AccessStore>,
    cache: Arc<dyn PermissionCache>,
    keys: CacheKeys,
    ttl_seconds: u32,
}

impl PermissionAggregator {
    /// Creates an aggregator over a store and cache.
    #[must_use]
    pub fn new(
        store: Arc<dyn AccessStore>,
        cache: Arc<dyn PermissionCache>,
        config: &AuthorizationConfig,
    ) -> Self {
        Self {
            store,
            cache,
            keys: CacheKeys::new(config.cache_key_prefix.clone()),
            ttl_seconds: config.cache_ttl_seconds,
        }
    }

    /// Returns the cache key layout in use.
    #[must_use]
    pub fn cache_keys(&self) -> &CacheKeys {
        &self.keys
    }

    /// Resolves the direct and inherited permissions of a role.
    ///
    /// Missing or inactive roles resolve to an empty set, and an inactive
    /// ancestor ends inheritance. Every role computed along the way is cached.
    pub async fn resolve_role_permissions(&self, role_id: RoleId) -> AppResult<RolePermissionSet> {
        let generation = self
            .observe_generation(vec![self.keys.role_generation(role_id)])
            .await;
        if let Some(generation) = &generation
            && let Some(cached) = self
                .read_cached::<RolePermissionSet>(&self.keys.role(role_id), generation)
                .await
        {
            return Ok(cached);
        }

        let mut chain: Vec<(Role, Option<Generation>)> = Vec::new();
        let mut visited = HashSet::new();
        let mut inherited = Vec::new();
        let mut cursor = Some((role_id, generation));

        while let Some((current, generation)) = cursor.take() {
            if !visited.insert(current) {
                return Err(AppError::Validation(format!(
                    "role hierarchy cycle detected at role '{current}'"
                )));
            }

            if current != role_id
                && let Some(generation) = &generation
                && let Some(cached) = self
                    .read_cached::<RolePermissionSet>(&self.keys.role(current), generation)
                    .await
            {
                inherited = cached.permissions;
                break;
            }

            match self.store.find_role(current).await? {
                Some(role) if role.is_active() => {
                    if let Some(parent_id) = role.parent_id() {
                        let parent_generation = self
                            .observe_generation(vec![self.keys.role_generation(parent_id)])
                            .await;
                        cursor = Some((parent_id, parent_generation));
                    }
                    chain.push((role, generation));
                }
                _ => break,
            }
        }

        let mut resolved = None;
        for (role, generation) in chain.into_iter().rev() {
            let grants = self.store.find_active_grants_for_role(role.id()).await?;
            let set = RolePermissionSet::fold(&role, grants, inherited);
            if let Some(generation) = &generation {
                self.write_cached(&self.keys.role(role.id()), generation, &set, self.ttl_seconds)
                    .await;
            }
            inherited = set.permissions.clone();
            resolved = Some(set);
        }

        Ok(resolved.unwrap_or_else(|| RolePermissionSet::empty(role_id)))
    }

    /// Resolves the effective permissions of a user.
    ///
    /// `None` scope includes every valid assignment. A scoped query includes
    /// global assignments plus assignments in that scope, narrowed to
    /// `scope_id` when supplied.
    pub async fn resolve_user_permissions(
        &self,
        user_id: &str,
        scope: Option<AssignmentScope>,
        scope_id: Option<&str>,
    ) -> AppResult<UserPermissionSet> {
        let key = self.keys.user(user_id, scope, scope_id);
        let now = Utc::now();
        let generation = self
            .observe_generation(vec![
                self.keys.user_generation(user_id),
                self.keys.query_generation(user_id, scope, scope_id),
            ])
            .await;
        if let Some(generation) = &generation
            && let Some(cached) = self.read_cached::<UserPermissionSet>(&key, generation).await
        {
            if cached.is_fresh_at(now) {
                return Ok(cached);
            }
            debug!(cache_key = %key, "cached user permissions crossed a validity bound");
        }

        let assignments: Vec<_> = self
            .store
            .find_active_assignments_for_user(user_id)
            .await?
            .into_iter()
            .filter(|assignment| assignment.applies_to(scope, scope_id))
            .collect();

        let stale_after = assignments
            .iter()
            .filter_map(|assignment| assignment.next_validity_change(now))
            .min();

        let mut competing: BTreeMap<PermissionId, Vec<(GrantRank, UserPermission)>> =
            BTreeMap::new();
        for assignment in assignments
            .iter()
            .filter(|assignment| assignment.is_valid_at(now))
        {
            let role_set = self
                .resolve_role_permissions(assignment.role_id())
                .await?;
            let rank: GrantRank = (
                assignment.scope().specificity(),
                role_set.level,
                Reverse(assignment.role_id()),
            );

            for entry in role_set.permissions {
                let candidate = UserPermission {
                    constraints: entry.constraints,
                    granting_role_id: assignment.role_id(),
                    granted_by_role_id: entry.granted_by_role_id,
                    scope: assignment.scope(),
                    scope_id: assignment.scope_id().map(str::to_owned),
                    permission: entry.permission,
                };

                competing
                    .entry(candidate.permission.id())
                    .or_default()
                    .push((rank, candidate));
            }
        }

        let mut permissions = Vec::with_capacity(competing.len());
        let mut alternatives = Vec::new();
        for mut grants in competing.into_values() {
            grants.sort_by(|left, right| right.0.cmp(&left.0));
            let mut grants = grants.into_iter().map(|(_, entry)| entry);
            let Some(winner) = grants.next() else {
                continue;
            };
            let mut kept: Vec<UserPermission> = Vec::new();
            for entry in grants {
                let redundant = entry.constraints == winner.constraints
                    || kept.iter().any(|other| other.constraints == entry.constraints);
                if !redundant {
                    kept.push(entry);
                }
            }
            permissions.push(winner);
            alternatives.extend(kept);
        }
        permissions.sort_by_key(|entry| entry.permission.key());
        alternatives.sort_by_key(|entry| entry.permission.key());

        let set = UserPermissionSet {
            user_id: user_id.to_owned(),
            computed_at: now,
            stale_after,
            permissions,
            alternatives,
        };

        let ttl_seconds = match stale_after {
            Some(stale_after) => {
                let remaining = (stale_after - now).num_seconds().max(0);
                u32::try_from(remaining)
                    .unwrap_or(u32::MAX)
                    .min(self.ttl_seconds)
            }
            None => self.ttl_seconds,
        };
        if let Some(generation) = &generation {
            self.write_cached(&key, generation, &set, ttl_seconds).await;
        }

        Ok(set)
    }

    /// Reads the generation tokens guarding an entry. `None` means the cache
    /// could not be read and must be bypassed for this resolution.
    async fn observe_generation(&self, keys: Vec<String>) -> Option<Generation> {
        let mut tokens = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.cache.get(key).await {
                Ok(token) => tokens.push(token.unwrap_or_default()),
                Err(error) => {
                    warn!(cache_key = %key, error = %error, "permission cache read failed, recomputing from store");
                    return None;
                }
            }
        }

        Some(Generation {
            keys,
            token: tokens.join("/"),
        })
    }

    async fn read_cached<T: DeserializeOwned>(
        &self,
        key: &str,
        generation: &Generation,
    ) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<CachedEntry<T>>(&raw) {
                Ok(entry) if entry.generation == generation.token => {
                    debug!(cache_key = %key, "permission cache hit");
                    Some(entry.value)
                }
                Ok(_) => {
                    debug!(cache_key = %key, "discarding permission cache entry from a replaced generation");
                    None
                }
                Err(error) => {
                    warn!(cache_key = %key, error = %error, "discarding unreadable permission cache entry");
                    None
                }
            },
            Ok(None) => {
                debug!(cache_key = %key, "permission cache miss");
                None
            }
            Err(error) => {
                warn!(cache_key = %key, error = %error, "permission cache read failed, recomputing from store");
                None
            }
        }
    }

    async fn write_cached<T: Serialize>(
        &self,
        key: &str,
        generation: &Generation,
        value: &T,
        ttl_seconds: u32,
    ) {
        if ttl_seconds == 0 {
            return;
        }

        let current = self.observe_generation(generation.keys.clone()).await;
        if current.is_none_or(|current| current.token != generation.token) {
            debug!(cache_key = %key, "generation replaced during resolution, skipping cache write");
            return;
        }

        let entry = CachedEntry {
            generation: generation.token.clone(),
            value,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(cache_key = %key, error = %error, "failed to serialize permission cache entry");
                return;
            }
        };

        if let Err(error) = self.cache.set(key, raw, ttl_seconds).await {
            warn!(cache_key = %key, error = %error, "permission cache write failed");
        }
    }
}
