use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by the authorization core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted for every authorization decision, allow or deny.
    AuthorizationDecided,
    /// Emitted when a role is created.
    RoleCreated,
    /// Emitted when a role is renamed.
    RoleRenamed,
    /// Emitted when a role moves in the hierarchy.
    RoleReparented,
    /// Emitted when a role is activated or deactivated.
    RoleActivationChanged,
    /// Emitted when a permission is created.
    PermissionCreated,
    /// Emitted when a permission definition changes.
    PermissionUpdated,
    /// Emitted when a permission is granted to a role.
    PermissionGranted,
    /// Emitted when a permission grant is revoked from a role.
    PermissionRevoked,
    /// Emitted when a role is assigned to a user.
    RoleAssigned,
    /// Emitted when a user role assignment is revoked.
    RoleAssignmentRevoked,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationDecided => "authorization.decided",
            Self::RoleCreated => "security.role.created",
            Self::RoleRenamed => "security.role.renamed",
            Self::RoleReparented => "security.role.reparented",
            Self::RoleActivationChanged => "security.role.activation_changed",
            Self::PermissionCreated => "security.permission.created",
            Self::PermissionUpdated => "security.permission.updated",
            Self::PermissionGranted => "security.permission.granted",
            Self::PermissionRevoked => "security.permission.revoked",
            Self::RoleAssigned => "security.role.assigned",
            Self::RoleAssignmentRevoked => "security.role.assignment_revoked",
        }
    }
}
