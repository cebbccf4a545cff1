use gatehouse_core::{AppError, RoleId};
use gatehouse_domain::{AccessContext, ConstraintEvaluation, PermissionAction};
use serde::Serialize;

/// Every intermediate result of one authorization check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionDetail {
    /// Checked user.
    pub user_id: String,
    /// Checked resource namespace.
    pub resource: String,
    /// Checked action.
    pub action: PermissionAction,
    /// Context presented with the check.
    pub context: AccessContext,
    /// Whether an active permission exists for `(resource, action)`.
    pub permission_defined: bool,
    /// Whether the user holds the exact permission.
    pub specific_grant: bool,
    /// Whether the user holds `manage` on the resource.
    pub manage_grant: bool,
    /// Whether the context asked for ownership.
    pub ownership_required: bool,
    /// Whether ownership was established or not needed.
    pub ownership_valid: bool,
    /// Whether the selected grant's constraints passed.
    pub constraints_satisfied: bool,
    /// Constraint evaluation of the selected grant.
    pub constraint_evaluation: Option<ConstraintEvaluation>,
    /// Assigned role that supplied the selected grant.
    pub granting_role_id: Option<RoleId>,
    /// Final outcome.
    pub granted: bool,
    /// Error that forced a deny, if any.
    pub error: Option<String>,
    #[serde(skip)]
    failure: Option<AppError>,
}

impl DecisionDetail {
    pub(super) fn new(
        user_id: &str,
        resource: &str,
        action: PermissionAction,
        context: &AccessContext,
    ) -> Self {
        Self {
            user_id: user_id.to_owned(),
            resource: resource.to_owned(),
            action,
            context: context.clone(),
            permission_defined: false,
            specific_grant: false,
            manage_grant: false,
            ownership_required: context.requires_ownership(),
            ownership_valid: false,
            constraints_satisfied: false,
            constraint_evaluation: None,
            granting_role_id: None,
            granted: false,
            error: None,
            failure: None,
        }
    }

    pub(super) fn fail_closed(&mut self, error: &AppError) {
        self.granted = false;
        self.record_failure(error.clone());
    }

    pub(super) fn record_failure(&mut self, error: AppError) {
        self.error = Some(error.to_string());
        self.failure = Some(error);
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationDecision {
    /// Whether access is granted.
    pub granted: bool,
    /// How the outcome was reached.
    pub detail: DecisionDetail,
}

impl AuthorizationDecision {
    pub(super) fn from_detail(detail: DecisionDetail) -> Self {
        Self {
            granted: detail.granted,
            detail,
        }
    }

    /// Returns whether the deny was forced by an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.detail.error.is_some()
    }

    /// Returns the error that forced the deny, with its original kind.
    #[must_use]
    pub fn failure(&self) -> Option<&AppError> {
        self.detail.failure.as_ref()
    }
}
