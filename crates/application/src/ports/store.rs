use async_trait::async_trait;
use gatehouse_core::{AppResult, PermissionId, RoleId, UserRoleId};
use gatehouse_domain::{Permission, PermissionAction, Role, RolePermission, UserRole};

/// Role-to-permission link joined with the permission it grants.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleGrant {
    /// The link row.
    pub link: RolePermission,
    /// The linked permission.
    pub permission: Permission,
}

/// Read port over roles, permissions and their links.
///
/// Backend outages are reported as `AppError::StoreUnavailable`.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Finds one role.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Lists direct children of a role, active or not.
    async fn find_children(&self, role_id: RoleId) -> AppResult<Vec<Role>>;

    /// Finds one permission.
    async fn find_permission(&self, permission_id: PermissionId) -> AppResult<Option<Permission>>;

    /// Finds the permission defined for a `(resource, action)` pair.
    async fn find_permission_by_key(
        &self,
        resource: &str,
        action: PermissionAction,
    ) -> AppResult<Option<Permission>>;

    /// Lists active links held directly by a role, joined with their permissions.
    async fn find_active_grants_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleGrant>>;

    /// Lists roles holding an active link to a permission.
    async fn find_roles_granting_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Vec<RoleId>>;

    /// Lists active assignments held by a user, regardless of validity window.
    async fn find_active_assignments_for_user(&self, user_id: &str) -> AppResult<Vec<UserRole>>;

    /// Lists active assignments referencing any of the given roles.
    async fn find_active_assignments_for_roles(
        &self,
        role_ids: &[RoleId],
    ) -> AppResult<Vec<UserRole>>;
}

/// Write port used by administrative mutations.
#[async_trait]
pub trait AccessAdminStore: AccessStore {
    /// Finds a role by its unique name.
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    /// Finds a permission by its unique name.
    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>>;

    /// Inserts a new role. Duplicate names are a conflict.
    async fn insert_role(&self, role: Role) -> AppResult<()>;

    /// Updates existing roles atomically.
    async fn update_roles(&self, roles: Vec<Role>) -> AppResult<()>;

    /// Inserts a new permission. Duplicate names or keys are a conflict.
    async fn insert_permission(&self, permission: Permission) -> AppResult<()>;

    /// Updates an existing permission.
    async fn update_permission(&self, permission: Permission) -> AppResult<()>;

    /// Finds the active link between a role and a permission.
    async fn find_active_grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<Option<RolePermission>>;

    /// Inserts or updates one link.
    async fn save_role_permission(&self, link: RolePermission) -> AppResult<()>;

    /// Finds one assignment.
    async fn find_assignment(&self, assignment_id: UserRoleId) -> AppResult<Option<UserRole>>;

    /// Inserts or updates assignments atomically.
    async fn save_assignments(&self, assignments: Vec<UserRole>) -> AppResult<()>;
}
