use std::collections::BTreeMap;

use async_trait::async_trait;
use gatehouse_application::{AccessAdminStore, AccessStore, RoleGrant};
use gatehouse_core::{
    AppError, AppResult, PermissionId, RoleId, RolePermissionId, UserRoleId,
};
use gatehouse_domain::{Permission, PermissionAction, Role, RolePermission, UserRole};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct AccessState {
    roles: BTreeMap<RoleId, Role>,
    permissions: BTreeMap<PermissionId, Permission>,
    links: BTreeMap<RolePermissionId, RolePermission>,
    assignments: BTreeMap<UserRoleId, UserRole>,
}

impl AccessState {
    fn role_name_taken(&self, name: &str, except: Option<RoleId>) -> bool {
        self.roles
            .values()
            .any(|role| role.name() == name && Some(role.id()) != except)
    }

    fn require_role(&self, role_id: RoleId) -> AppResult<()> {
        if self.roles.contains_key(&role_id) {
            return Ok(());
        }

        Err(AppError::Validation(format!(
            "role '{role_id}' does not exist"
        )))
    }
}

/// In-memory implementation of the access store ports.
///
/// All collections sit behind one lock so multi-row writes are applied
/// atomically.
#[derive(Debug, Default)]
pub struct InMemoryAccessStore {
    state: RwLock<AccessState>,
}

impl InMemoryAccessStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessStore for InMemoryAccessStore {
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(&role_id).cloned())
    }

    async fn find_children(&self, role_id: RoleId) -> AppResult<Vec<Role>> {
        Ok(self
            .state
            .read()
            .await
            .roles
            .values()
            .filter(|role| role.parent_id() == Some(role_id))
            .cloned()
            .collect())
    }

    async fn find_permission(&self, permission_id: PermissionId) -> AppResult<Option<Permission>> {
        Ok(self
            .state
            .read()
            .await
            .permissions
            .get(&permission_id)
            .cloned())
    }

    async fn find_permission_by_key(
        &self,
        resource: &str,
        action: PermissionAction,
    ) -> AppResult<Option<Permission>> {
        Ok(self
            .state
            .read()
            .await
            .permissions
            .values()
            .find(|permission| permission.resource() == resource && permission.action() == action)
            .cloned())
    }

    async fn find_active_grants_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleGrant>> {
        let state = self.state.read().await;
        Ok(state
            .links
            .values()
            .filter(|link| link.role_id() == role_id && link.is_active())
            .filter_map(|link| {
                state
                    .permissions
                    .get(&link.permission_id())
                    .map(|permission| RoleGrant {
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
        let state = self.state.read().await;
        let mut role_ids: Vec<RoleId> = state
            .links
            .values()
            .filter(|link| link.permission_id() == permission_id && link.is_active())
            .map(RolePermission::role_id)
            .collect();
        role_ids.sort();
        role_ids.dedup();

        Ok(role_ids)
    }

    async fn find_active_assignments_for_user(&self, user_id: &str) -> AppResult<Vec<UserRole>> {
        Ok(self
            .state
            .read()
            .await
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
        Ok(self
            .state
            .read()
            .await
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
impl AccessAdminStore for InMemoryAccessStore {
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self
            .state
            .read()
            .await
            .roles
            .values()
            .find(|role| role.name() == name)
            .cloned())
    }

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        Ok(self
            .state
            .read()
            .await
            .permissions
            .values()
            .find(|permission| permission.name() == name)
            .cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<()> {
        let mut state = self.state.write().await;

        if state.roles.contains_key(&role.id()) || state.role_name_taken(role.name(), None) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name()
            )));
        }
        if let Some(parent_id) = role.parent_id() {
            state.require_role(parent_id)?;
        }

        state.roles.insert(role.id(), role);
        Ok(())
    }

    async fn update_roles(&self, roles: Vec<Role>) -> AppResult<()> {
        let mut state = self.state.write().await;

        for role in &roles {
            if !state.roles.contains_key(&role.id()) {
                return Err(AppError::NotFound(format!(
                    "role '{}' does not exist",
                    role.id()
                )));
            }
            if state.role_name_taken(role.name(), Some(role.id())) {
                return Err(AppError::Conflict(format!(
                    "role '{}' already exists",
                    role.name()
                )));
            }
        }

        for role in roles {
            state.roles.insert(role.id(), role);
        }

        Ok(())
    }

    async fn insert_permission(&self, permission: Permission) -> AppResult<()> {
        let mut state = self.state.write().await;

        let duplicate = state.permissions.values().any(|existing| {
            existing.id() == permission.id()
                || existing.name() == permission.name()
                || existing.key() == permission.key()
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                permission.key()
            )));
        }

        state.permissions.insert(permission.id(), permission);
        Ok(())
    }

    async fn update_permission(&self, permission: Permission) -> AppResult<()> {
        let mut state = self.state.write().await;

        let Some(existing) = state.permissions.get_mut(&permission.id()) else {
            return Err(AppError::NotFound(format!(
                "permission '{}' does not exist",
                permission.id()
            )));
        };

        *existing = permission;
        Ok(())
    }

    async fn find_active_grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<Option<RolePermission>> {
        Ok(self
            .state
            .read()
            .await
            .links
            .values()
            .find(|link| {
                link.role_id() == role_id && link.permission_id() == permission_id && link.is_active()
            })
            .cloned())
    }

    async fn save_role_permission(&self, link: RolePermission) -> AppResult<()> {
        let mut state = self.state.write().await;

        state.require_role(link.role_id())?;
        if !state.permissions.contains_key(&link.permission_id()) {
            return Err(AppError::Validation(format!(
                "permission '{}' does not exist",
                link.permission_id()
            )));
        }

        let duplicate_active_pair = link.is_active()
            && state.links.values().any(|existing| {
                existing.id() != link.id()
                    && existing.is_active()
                    && existing.role_id() == link.role_id()
                    && existing.permission_id() == link.permission_id()
            });
        if duplicate_active_pair {
            return Err(AppError::Conflict(format!(
                "role '{}' already holds permission '{}'",
                link.role_id(),
                link.permission_id()
            )));
        }

        state.links.insert(link.id(), link);
        Ok(())
    }

    async fn find_assignment(&self, assignment_id: UserRoleId) -> AppResult<Option<UserRole>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .get(&assignment_id)
            .cloned())
    }

    async fn save_assignments(&self, assignments: Vec<UserRole>) -> AppResult<()> {
        let mut state = self.state.write().await;

        for assignment in &assignments {
            state.require_role(assignment.role_id())?;
        }

        for assignment in assignments {
            state.assignments.insert(assignment.id(), assignment);
        }

        Ok(())
    }
}
