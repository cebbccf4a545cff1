use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use gatehouse_core::{
    AppError, AppResult, NonEmptyString, PermissionId, RoleId, RolePermissionId, UserRoleId,
};
use serde::{Deserialize, Serialize};

use crate::ConstraintSet;

/// Organizational boundary a role assignment applies within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentScope {
    /// Applies everywhere.
    Global,
    /// Applies within one organization.
    Organization,
    /// Applies within one department.
    Department,
    /// Applies within one project.
    Project,
}

impl AssignmentScope {
    /// Returns a stable storage value for this scope.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Organization => "organization",
            Self::Department => "department",
            Self::Project => "project",
        }
    }

    /// Returns how narrow the scope is; higher values are more specific.
    #[must_use]
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Global => 0,
            Self::Organization => 1,
            Self::Department => 2,
            Self::Project => 3,
        }
    }
}

impl Display for AssignmentScope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for AssignmentScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "global" => Ok(Self::Global),
            "organization" => Ok(Self::Organization),
            "department" => Ok(Self::Department),
            "project" => Ok(Self::Project),
            _ => Err(AppError::Validation(format!(
                "unknown assignment scope '{value}'"
            ))),
        }
    }
}

/// Link granting one permission to one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePermission {
    id: RolePermissionId,
    role_id: RoleId,
    permission_id: PermissionId,
    constraints_override: Option<ConstraintSet>,
    is_active: bool,
}

impl RolePermission {
    /// Creates an active link.
    #[must_use]
    pub fn new(
        role_id: RoleId,
        permission_id: PermissionId,
        constraints_override: Option<ConstraintSet>,
    ) -> Self {
        Self {
            id: RolePermissionId::new(),
            role_id,
            permission_id,
            constraints_override,
            is_active: true,
        }
    }

    /// Rebuilds a link from persisted state.
    #[must_use]
    pub fn restore(
        id: RolePermissionId,
        role_id: RoleId,
        permission_id: PermissionId,
        constraints_override: Option<ConstraintSet>,
        is_active: bool,
    ) -> Self {
        Self {
            id,
            role_id,
            permission_id,
            constraints_override,
            is_active,
        }
    }

    /// Returns the link identifier.
    #[must_use]
    pub fn id(&self) -> RolePermissionId {
        self.id
    }

    /// Returns the linked role.
    #[must_use]
    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    /// Returns the linked permission.
    #[must_use]
    pub fn permission_id(&self) -> PermissionId {
        self.permission_id
    }

    /// Returns the grant-specific constraint override.
    #[must_use]
    pub fn constraints_override(&self) -> Option<&ConstraintSet> {
        self.constraints_override.as_ref()
    }

    /// Returns whether the link is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the constraints that apply to this grant: the override when
    /// present, otherwise the permission's own.
    #[must_use]
    pub fn effective_constraints(&self, permission_constraints: &ConstraintSet) -> ConstraintSet {
        self.constraints_override
            .clone()
            .unwrap_or_else(|| permission_constraints.clone())
    }

    /// Replaces the constraint override.
    pub fn set_constraints_override(&mut self, constraints_override: Option<ConstraintSet>) {
        self.constraints_override = constraints_override;
    }

    /// Soft-revokes the link.
    pub fn revoke(&mut self) {
        self.is_active = false;
    }
}

/// Input payload for constructing a user role assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRoleInput {
    /// Opaque user identifier.
    pub user_id: String,
    /// Assigned role.
    pub role_id: RoleId,
    /// Assignment scope.
    pub scope: AssignmentScope,
    /// Scope instance; required for every scope except global.
    pub scope_id: Option<String>,
    /// Whether this is the user's primary assignment for the scope.
    pub is_primary: bool,
    /// Start of the validity window.
    pub valid_from: Option<DateTime<Utc>>,
    /// End of the validity window (inclusive).
    pub valid_until: Option<DateTime<Utc>>,
}

/// Link assigning one role to one user within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    id: UserRoleId,
    user_id: NonEmptyString,
    role_id: RoleId,
    scope: AssignmentScope,
    scope_id: Option<NonEmptyString>,
    is_primary: bool,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
}

impl UserRole {
    /// Creates a validated active assignment.
    pub fn new(input: UserRoleInput) -> AppResult<Self> {
        Self::restore(UserRoleId::new(), input, true)
    }

    /// Rebuilds an assignment from persisted state.
    pub fn restore(id: UserRoleId, input: UserRoleInput, is_active: bool) -> AppResult<Self> {
        let UserRoleInput {
            user_id,
            role_id,
            scope,
            scope_id,
            is_primary,
            valid_from,
            valid_until,
        } = input;

        let scope_id = scope_id.map(NonEmptyString::new).transpose()?;
        match (scope, scope_id.is_some()) {
            (AssignmentScope::Global, true) => {
                return Err(AppError::Validation(
                    "global assignments must not carry a scope id".to_owned(),
                ));
            }
            (AssignmentScope::Global, false) | (_, true) => {}
            (scope, false) => {
                return Err(AppError::Validation(format!(
                    "{scope} assignments require a scope id"
                )));
            }
        }

        if let (Some(valid_from), Some(valid_until)) = (valid_from, valid_until)
            && valid_from > valid_until
        {
            return Err(AppError::Validation(
                "assignment valid_from must not be after valid_until".to_owned(),
            ));
        }

        Ok(Self {
            id,
            user_id: NonEmptyString::new(user_id)?,
            role_id,
            scope,
            scope_id,
            is_primary,
            valid_from,
            valid_until,
            is_active,
        })
    }

    /// Returns the assignment identifier.
    #[must_use]
    pub fn id(&self) -> UserRoleId {
        self.id
    }

    /// Returns the assigned user.
    #[must_use]
    pub fn user_id(&self) -> &str {
        self.user_id.as_str()
    }

    /// Returns the assigned role.
    #[must_use]
    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    /// Returns the assignment scope.
    #[must_use]
    pub fn scope(&self) -> AssignmentScope {
        self.scope
    }

    /// Returns the scope instance.
    #[must_use]
    pub fn scope_id(&self) -> Option<&str> {
        self.scope_id.as_ref().map(NonEmptyString::as_str)
    }

    /// Returns whether this is the primary assignment for its scope.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Returns the start of the validity window.
    #[must_use]
    pub fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.valid_from
    }

    /// Returns the inclusive end of the validity window.
    #[must_use]
    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }

    /// Returns whether the assignment is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns whether the assignment is active and inside its validity window now.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Returns whether the assignment is active and inside its validity window at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.valid_from.is_none_or(|valid_from| valid_from <= now)
            && self.valid_until.is_none_or(|valid_until| now <= valid_until)
    }

    /// Returns the next instant after `now` at which validity changes, if any.
    #[must_use]
    pub fn next_validity_change(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_active {
            return None;
        }

        match (self.valid_from, self.valid_until) {
            (Some(valid_from), _) if valid_from > now => Some(valid_from),
            (_, Some(valid_until)) if valid_until >= now => Some(valid_until),
            _ => None,
        }
    }

    /// Returns whether the assignment participates in a scoped query.
    ///
    /// Global assignments participate in every query. A query without a
    /// scope matches every assignment; a query without a scope id matches
    /// every instance of the scope.
    #[must_use]
    pub fn applies_to(&self, scope: Option<AssignmentScope>, scope_id: Option<&str>) -> bool {
        if self.scope == AssignmentScope::Global {
            return true;
        }

        let Some(scope) = scope else {
            return true;
        };

        self.scope == scope && scope_id.is_none_or(|scope_id| self.scope_id() == Some(scope_id))
    }

    /// Returns whether both assignments share user, scope and scope id.
    #[must_use]
    pub fn shares_scope_with(&self, other: &UserRole) -> bool {
        self.user_id == other.user_id && self.scope == other.scope && self.scope_id == other.scope_id
    }

    /// Sets the primary flag.
    pub fn set_primary(&mut self, is_primary: bool) {
        self.is_primary = is_primary;
    }

    /// Soft-revokes the assignment.
    pub fn revoke(&mut self) {
        self.is_active = false;
        self.is_primary = false;
    }
}
