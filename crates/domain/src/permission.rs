use std::fmt::{Display, Formatter};
use std::str::FromStr;

use gatehouse_core::{AppError, AppResult, NonEmptyString, PermissionId};
use serde::{Deserialize, Serialize};

use crate::ConstraintSet;

/// Closed set of actions a permission can grant on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    /// Create new resource instances.
    Create,
    /// Read resource instances.
    Read,
    /// Update resource instances.
    Update,
    /// Delete resource instances.
    Delete,
    /// Superset action satisfying every other action on the same resource.
    Manage,
    /// Execute resource operations.
    Execute,
}

impl PermissionAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Manage => "manage",
            Self::Execute => "execute",
        }
    }

    /// Returns all known actions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[PermissionAction] = &[
            PermissionAction::Create,
            PermissionAction::Read,
            PermissionAction::Update,
            PermissionAction::Delete,
            PermissionAction::Manage,
            PermissionAction::Execute,
        ];

        ALL
    }
}

impl Display for PermissionAction {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for PermissionAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "manage" => Ok(Self::Manage),
            "execute" => Ok(Self::Execute),
            _ => Err(AppError::Validation(format!(
                "unknown permission action '{value}'"
            ))),
        }
    }
}

/// An atomic `(resource, action)` capability, optionally gated by constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    id: PermissionId,
    resource: NonEmptyString,
    action: PermissionAction,
    name: NonEmptyString,
    constraints: ConstraintSet,
    is_active: bool,
    is_system: bool,
}

impl Permission {
    /// Creates an active, non-system permission.
    pub fn new(
        resource: impl Into<String>,
        action: PermissionAction,
        name: impl Into<String>,
        constraints: ConstraintSet,
    ) -> AppResult<Self> {
        let resource = NonEmptyString::new(resource)?;
        if resource.as_str().contains(char::is_whitespace) {
            return Err(AppError::Validation(format!(
                "permission resource '{resource}' must not contain whitespace"
            )));
        }

        Ok(Self {
            id: PermissionId::new(),
            resource,
            action,
            name: NonEmptyString::new(name)?,
            constraints,
            is_active: true,
            is_system: false,
        })
    }

    /// Rebuilds a permission from persisted state.
    pub fn restore(
        id: PermissionId,
        resource: impl Into<String>,
        action: PermissionAction,
        name: impl Into<String>,
        constraints: ConstraintSet,
        is_active: bool,
        is_system: bool,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            resource: NonEmptyString::new(resource)?,
            action,
            name: NonEmptyString::new(name)?,
            constraints,
            is_active,
            is_system,
        })
    }

    /// Marks the permission as system-managed.
    #[must_use]
    pub fn into_system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// Returns the permission identifier.
    #[must_use]
    pub fn id(&self) -> PermissionId {
        self.id
    }

    /// Returns the resource namespace.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the granted action.
    #[must_use]
    pub fn action(&self) -> PermissionAction {
        self.action
    }

    /// Returns the unique permission name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the permission's own constraints.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Returns whether the permission is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns whether the permission is protected from mutation.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// Returns the `resource:action` key of this permission.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }

    /// Returns whether this permission grants `action` on `resource`,
    /// honouring the `manage` superset.
    #[must_use]
    pub fn covers(&self, resource: &str, action: PermissionAction) -> bool {
        self.resource.as_str() == resource
            && (self.action == action || self.action == PermissionAction::Manage)
    }

    /// Replaces the permission's constraints.
    pub fn set_constraints(&mut self, constraints: ConstraintSet) {
        self.constraints = constraints;
    }

    /// Activates or deactivates the permission.
    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }
}
