use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use gatehouse_core::{
    AppError, AppResult, PermissionId, RoleId, RolePermissionId, UserIdentity, UserRoleId,
};
use gatehouse_domain::{
    AssignmentScope, ConstraintSet, Permission, PermissionAction, Role, RolePermission, UserRole,
    UserRoleInput,
};
use tokio::sync::{Mutex, Notify, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    AccessAdminService, AccessAdminStore, AccessStore, AuditEvent, AuditSink,
    AuthorizationConfig, AuthorizationService, InvalidationService, OwnershipResolver,
    PermissionAggregator, PermissionCache, RoleGrant, RoleHierarchyService,
};

#[derive(Default)]
struct FakeState {
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
    links: HashMap<RolePermissionId, RolePermission>,
    assignments: HashMap<UserRoleId, UserRole>,
}

/// Plain map-backed store. Uniqueness is enforced by the admin service, so
/// every write here is an unconditional upsert.
#[derive(Default)]
pub(crate) struct FakeAccessStore {
    state: RwLock<FakeState>,
    unavailable: AtomicBool,
    role_reads: AtomicUsize,
}

impl FakeAccessStore {
    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn role_reads(&self) -> usize {
        self.role_reads.load(Ordering::SeqCst)
    }

    pub(crate) async fn put_role(&self, role: Role) {
        self.state.write().await.roles.insert(role.id(), role);
    }

    pub(crate) async fn put_assignment(&self, assignment: UserRole) {
        self.state
            .write()
            .await
            .assignments
            .insert(assignment.id(), assignment);
    }

    async fn read(&self) -> AppResult<RwLockReadGuard<'_, FakeState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("fake store is offline".to_owned()));
        }

        Ok(self.state.read().await)
    }

    async fn write(&self) -> AppResult<RwLockWriteGuard<'_, FakeState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("fake store is offline".to_owned()));
        }

        Ok(self.state.write().await)
    }
}

#[async_trait]
impl AccessStore for FakeAccessStore {
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let state = self.read().await?;
        self.role_reads.fetch_add(1, Ordering::SeqCst);
        Ok(state.roles.get(&role_id).cloned())
    }

    async fn find_children(&self, role_id: RoleId) -> AppResult<Vec<Role>> {
        let state = self.read().await?;
        Ok(state
            .roles
            .values()
            .filter(|role| role.parent_id() == Some(role_id))
            .cloned()
            .collect())
    }

    async fn find_permission(&self, permission_id: PermissionId) -> AppResult<Option<Permission>> {
        Ok(self.read().await?.permissions.get(&permission_id).cloned())
    }

    async fn find_permission_by_key(
        &self,
        resource: &str,
        action: PermissionAction,
    ) -> AppResult<Option<Permission>> {
        let state = self.read().await?;
        Ok(state
            .permissions
            .values()
            .find(|permission| permission.resource() == resource && permission.action() == action)
            .cloned())
    }

    async fn find_active_grants_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleGrant>> {
        let state = self.read().await?;
        Ok(state
            .links
            .values()
            .filter(|link| link.role_id() == role_id && link.is_active())
            .filter_map(|link| {
                state.permissions.get(&link.permission_id()).map(|permission| RoleGrant {
                    link: link.clone(),
                    permission: permission.clone(),
                })
            })
            .collect())
    }

    async fn find_roles_granting_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Vec<RoleId>> {
        let state = self.read().await?;
        Ok(state
            .links
            .values()
            .filter(|link| link.permission_id() == permission_id && link.is_active())
            .map(RolePermission::role_id)
            .collect())
    }

    async fn find_active_assignments_for_user(&self, user_id: &str) -> AppResult<Vec<UserRole>> {
        let state = self.read().await?;
        Ok(state
            .assignments
            .values()
            .filter(|assignment| assignment.user_id() == user_id && assignment.is_active())
            .cloned()
            .collect())
    }

    async fn find_active_assignments_for_roles(
        &self,
        role_ids: &[RoleId],
    ) -> AppResult<Vec<UserRole>> {
        let state = self.read().await?;
        Ok(state
            .assignments
            .values()
            .filter(|assignment| {
                assignment.is_active() && role_ids.contains(&assignment.role_id())
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AccessAdminStore for FakeAccessStore {
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let state = self.read().await?;
        Ok(state.roles.values().find(|role| role.name() == name).cloned())
    }

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        let state = self.read().await?;
        Ok(state
            .permissions
            .values()
            .find(|permission| permission.name() == name)
            .cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<()> {
        self.update_roles(vec![role]).await
    }

    async fn update_roles(&self, roles: Vec<Role>) -> AppResult<()> {
        let mut state = self.write().await?;
        state.roles.extend(roles.into_iter().map(|role| (role.id(), role)));
        Ok(())
    }

    async fn insert_permission(&self, permission: Permission) -> AppResult<()> {
        self.update_permission(permission).await
    }

    async fn update_permission(&self, permission: Permission) -> AppResult<()> {
        let mut state = self.write().await?;
        state.permissions.insert(permission.id(), permission);
        Ok(())
    }

    async fn find_active_grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<Option<RolePermission>> {
        let state = self.read().await?;
        Ok(state
            .links
            .values()
            .find(|link| {
                link.role_id() == role_id && link.permission_id() == permission_id && link.is_active()
            })
            .cloned())
    }

    async fn save_role_permission(&self, link: RolePermission) -> AppResult<()> {
        let mut state = self.write().await?;
        state.links.insert(link.id(), link);
        Ok(())
    }

    async fn find_assignment(&self, assignment_id: UserRoleId) -> AppResult<Option<UserRole>> {
        Ok(self.read().await?.assignments.get(&assignment_id).cloned())
    }

    async fn save_assignments(&self, assignments: Vec<UserRole>) -> AppResult<()> {
        let mut state = self.write().await?;
        state.assignments.extend(
            assignments
                .into_iter()
                .map(|assignment| (assignment.id(), assignment)),
        );
        Ok(())
    }
}

/// Store wrapper that holds the first `find_active_grants_for_role` call
/// after it has read the store, until the test releases it.
pub(crate) struct PausingAccessStore {
    inner: Arc<FakeAccessStore>,
    armed: AtomicBool,
    paused: Notify,
    resume: Notify,
}

impl PausingAccessStore {
    pub(crate) fn new(inner: Arc<FakeAccessStore>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            paused: Notify::new(),
            resume: Notify::new(),
        }
    }

    pub(crate) async fn wait_until_paused(&self) {
        self.paused.notified().await;
    }

    pub(crate) fn resume(&self) {
        self.resume.notify_one();
    }
}

#[async_trait]
impl AccessStore for PausingAccessStore {
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        self.inner.find_role(role_id).await
    }

    async fn find_children(&self, role_id: RoleId) -> AppResult<Vec<Role>> {
        self.inner.find_children(role_id).await
    }

    async fn find_permission(&self, permission_id: PermissionId) -> AppResult<Option<Permission>> {
        self.inner.find_permission(permission_id).await
    }

    async fn find_permission_by_key(
        &self,
        resource: &str,
        action: PermissionAction,
    ) -> AppResult<Option<Permission>> {
        self.inner.find_permission_by_key(resource, action).await
    }

    async fn find_active_grants_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleGrant>> {
        let grants = self.inner.find_active_grants_for_role(role_id).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.paused.notify_one();
            self.resume.notified().await;
        }
        Ok(grants)
    }

    async fn find_roles_granting_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Vec<RoleId>> {
        self.inner.find_roles_granting_permission(permission_id).await
    }

    async fn find_active_assignments_for_user(&self, user_id: &str) -> AppResult<Vec<UserRole>> {
        self.inner.find_active_assignments_for_user(user_id).await
    }

    async fn find_active_assignments_for_roles(
        &self,
        role_ids: &[RoleId],
    ) -> AppResult<Vec<UserRole>> {
        self.inner.find_active_assignments_for_roles(role_ids).await
    }
}

#[derive(Default)]
pub(crate) struct FakePermissionCache {
    entries: Mutex<BTreeMap<String, (String, u32)>>,
    unavailable: AtomicBool,
    failing_deletes: AtomicU32,
}

impl FakePermissionCache {
    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_deletes(&self, count: u32) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    pub(crate) async fn keys(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }

    pub(crate) async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    pub(crate) async fn value_of(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).map(|(value, _)| value.clone())
    }

    pub(crate) async fn ttl_of(&self, key: &str) -> Option<u32> {
        self.entries.lock().await.get(key).map(|(_, ttl)| *ttl)
    }

    pub(crate) async fn put_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .await
            .insert(key.to_owned(), (value.to_owned(), 60));
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::CacheUnavailable(
                "fake cache is offline".to_owned(),
            ));
        }

        Ok(())
    }

    fn check_delete(&self) -> AppResult<()> {
        self.check_available()?;
        let remaining = self.failing_deletes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_deletes.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::CacheUnavailable(
                "fake cache rejected delete".to_owned(),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl PermissionCache for FakePermissionCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check_available()?;
        Ok(self
            .entries
            .lock()
            .await
            .get(key)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u32) -> AppResult<()> {
        self.check_available()?;
        if ttl_seconds > 0 {
            self.entries
                .lock()
                .await
                .insert(key.to_owned(), (value, ttl_seconds));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.check_delete()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        self.check_delete()?;
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(u64::try_from(before - entries.len()).unwrap_or(u64::MAX))
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditSink {
    pub(crate) events: Mutex<Vec<AuditEvent>>,
    failing: AtomicBool,
}

impl FakeAuditSink {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditSink for FakeAuditSink {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Internal("fake audit sink failed".to_owned()));
        }

        self.events.lock().await.push(event);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeOwnershipResolver {
    owners: HashSet<(String, String)>,
}

impl FakeOwnershipResolver {
    pub(crate) fn owning(user_id: &str, resource_id: &str) -> Self {
        Self {
            owners: HashSet::from([(user_id.to_owned(), resource_id.to_owned())]),
        }
    }
}

#[async_trait]
impl OwnershipResolver for FakeOwnershipResolver {
    async fn is_owner(&self, user_id: &str, resource_id: &str) -> AppResult<bool> {
        Ok(self
            .owners
            .contains(&(user_id.to_owned(), resource_id.to_owned())))
    }
}

/// Fakes plus service wiring shared by service tests.
pub(crate) struct Harness {
    pub(crate) store: Arc<FakeAccessStore>,
    pub(crate) cache: Arc<FakePermissionCache>,
    pub(crate) audit: Arc<FakeAuditSink>,
    pub(crate) config: AuthorizationConfig,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_config(AuthorizationConfig::default().with_invalidation_retries(2, 0))
    }

    pub(crate) fn with_config(config: AuthorizationConfig) -> Self {
        Self {
            store: Arc::new(FakeAccessStore::default()),
            cache: Arc::new(FakePermissionCache::default()),
            audit: Arc::new(FakeAuditSink::default()),
            config,
        }
    }

    pub(crate) fn aggregator(&self) -> PermissionAggregator {
        PermissionAggregator::new(self.store.clone(), self.cache.clone(), &self.config)
    }

    pub(crate) fn hierarchy(&self) -> RoleHierarchyService {
        RoleHierarchyService::new(self.store.clone())
    }

    pub(crate) fn invalidation(&self) -> InvalidationService {
        InvalidationService::new(
            self.store.clone(),
            self.cache.clone(),
            self.hierarchy(),
            &self.config,
        )
    }

    pub(crate) fn authorization(&self) -> AuthorizationService {
        AuthorizationService::new(
            self.store.clone(),
            self.aggregator(),
            self.audit.clone(),
            &self.config,
        )
    }

    pub(crate) fn admin(&self) -> AccessAdminService {
        AccessAdminService::new(
            self.store.clone(),
            self.hierarchy(),
            self.invalidation(),
            self.audit.clone(),
        )
    }

    pub(crate) async fn role(&self, name: &str, parent: Option<&Role>) -> Role {
        let role = match parent {
            Some(parent) => Role::new_child(name, parent),
            None => Role::new_root(name),
        }
        .unwrap_or_else(|_| unreachable!());
        self.store.put_role(role.clone()).await;
        role
    }

    pub(crate) async fn permission(
        &self,
        resource: &str,
        action: PermissionAction,
        constraints: ConstraintSet,
    ) -> Permission {
        let permission = Permission::new(
            resource,
            action,
            format!("{resource}.{action}"),
            constraints,
        )
        .unwrap_or_else(|_| unreachable!());
        self.store
            .state
            .write()
            .await
            .permissions
            .insert(permission.id(), permission.clone());
        permission
    }

    pub(crate) async fn grant(
        &self,
        role: &Role,
        permission: &Permission,
        constraints_override: Option<ConstraintSet>,
    ) -> RolePermission {
        let link = RolePermission::new(role.id(), permission.id(), constraints_override);
        self.store
            .state
            .write()
            .await
            .links
            .insert(link.id(), link.clone());
        link
    }

    pub(crate) async fn assign(
        &self,
        user_id: &str,
        role: &Role,
        scope: AssignmentScope,
        scope_id: Option<&str>,
    ) -> UserRole {
        self.assign_input(UserRoleInput {
            user_id: user_id.to_owned(),
            role_id: role.id(),
            scope,
            scope_id: scope_id.map(str::to_owned),
            is_primary: false,
            valid_from: None,
            valid_until: None,
        })
        .await
    }

    pub(crate) async fn assign_input(&self, input: UserRoleInput) -> UserRole {
        let assignment = UserRole::new(input).unwrap_or_else(|_| unreachable!());
        self.store.put_assignment(assignment.clone()).await;
        assignment
    }
}

pub(crate) fn actor() -> UserIdentity {
    UserIdentity::new("admin", "Administrator")
}
