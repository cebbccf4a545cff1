use std::sync::Arc;

use gatehouse_core::{AppError, AppResult, PermissionId, RoleId, UserIdentity, UserRoleId};
use gatehouse_domain::{
    AuditAction, ConstraintSet, Permission, PermissionAction, Role, RolePermission, UserRole,
    UserRoleInput,
};
use serde_json::{Value, json};
use tracing::warn;

use crate::{AccessAdminStore, AuditEvent, AuditSink, InvalidationService, RoleHierarchyService};

mod assignments;
mod permissions;
mod roles;

/// Input payload for defining a permission.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePermissionInput {
    /// Resource namespace.
    pub resource: String,
    /// Granted action.
    pub action: PermissionAction,
    /// Unique permission name.
    pub name: String,
    /// Default constraints for every grant.
    pub constraints: ConstraintSet,
}

/// Partial update of a permission definition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdatePermissionInput {
    /// Replacement default constraints.
    pub constraints: Option<ConstraintSet>,
    /// Replacement active flag.
    pub is_active: Option<bool>,
}

/// Mutation surface over roles, permissions and their links.
///
/// Each mutation persists, runs its invalidation cascade to completion and
/// records an audit event before returning.
#[derive(Clone)]
pub struct AccessAdminService {
    store: Arc<dyn AccessAdminStore>,
    hierarchy: RoleHierarchyService,
    invalidation: InvalidationService,
    audit_sink: Arc<dyn AuditSink>,
}

impl AccessAdminService {
    /// Creates an admin service.
    #[must_use]
    pub fn new(
        store: Arc<dyn AccessAdminStore>,
        hierarchy: RoleHierarchyService,
        invalidation: InvalidationService,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            hierarchy,
            invalidation,
            audit_sink,
        }
    }

    async fn load_role(&self, role_id: RoleId) -> AppResult<Role> {
        self.store
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))
    }

    async fn load_mutable_role(&self, role_id: RoleId) -> AppResult<Role> {
        let role = self.load_role(role_id).await?;
        if role.is_system() {
            return Err(AppError::Validation(format!(
                "system role '{}' cannot be modified",
                role.name()
            )));
        }

        Ok(role)
    }

    async fn load_permission(&self, permission_id: PermissionId) -> AppResult<Permission> {
        self.store
            .find_permission(permission_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("permission '{permission_id}' does not exist"))
            })
    }

    async fn append_audit(
        &self,
        actor: &UserIdentity,
        action: AuditAction,
        resource_type: &str,
        resource_id: String,
        detail: Value,
    ) {
        let event = AuditEvent {
            subject: actor.subject().to_owned(),
            action,
            resource_type: resource_type.to_owned(),
            resource_id,
            detail: Some(detail),
        };

        if let Err(error) = self.audit_sink.append_event(event).await {
            warn!(action = action.as_str(), error = %error, "failed to record access administration event");
        }
    }
}
