mod decision;

use std::sync::Arc;

use gatehouse_core::{AppError, AppResult, UserIdentity};
use gatehouse_domain::{
    AccessContext, AssignmentScope, AuditAction, ConstraintEvaluation, MissingContextKeyPolicy,
    PermissionAction,
};
use tracing::{debug, warn};

use crate::{
    AccessStore, AuditEvent, AuditSink, AuthorizationConfig, IdentitySource, OwnershipRegistry,
    PermissionAggregator, UserPermission,
};

pub use decision::{AuthorizationDecision, DecisionDetail};

/// Answers "may this user perform this action on this resource".
///
/// Every decision, allow or deny, is recorded through the audit sink. Store
/// failures deny with an error; cache failures only cost a recomputation.
#[derive(Clone)]
pub struct AuthorizationService {
    store: Arc<dyn AccessStore>,
    aggregator: PermissionAggregator,
    ownership: OwnershipRegistry,
    audit_sink: Arc<dyn AuditSink>,
    missing_context_key_policy: MissingContextKeyPolicy,
}

impl AuthorizationService {
    /// Creates a decision service with an empty ownership registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn AccessStore>,
        aggregator: PermissionAggregator,
        audit_sink: Arc<dyn AuditSink>,
        config: &AuthorizationConfig,
    ) -> Self {
        Self {
            store,
            aggregator,
            ownership: OwnershipRegistry::default(),
            audit_sink,
            missing_context_key_policy: config.missing_context_key_policy,
        }
    }

    /// Replaces the ownership resolver registry.
    #[must_use]
    pub fn with_ownership_registry(mut self, ownership: OwnershipRegistry) -> Self {
        self.ownership = ownership;
        self
    }

    /// Decides whether a user may perform `action` on `resource`.
    pub async fn has_permission(
        &self,
        user_id: &str,
        resource: &str,
        action: PermissionAction,
        context: &AccessContext,
    ) -> AuthorizationDecision {
        let mut detail = DecisionDetail::new(user_id, resource, action, context);
        if let Err(error) = self.decide(&mut detail).await {
            warn!(user_id, resource, action = %action, error = %error, "authorization check failed closed");
            detail.fail_closed(&error);
        }

        self.record_decision(&detail).await;
        AuthorizationDecision::from_detail(detail)
    }

    /// Same as [`Self::has_permission`] for an already resolved identity.
    pub async fn has_permission_for_identity(
        &self,
        identity: &UserIdentity,
        resource: &str,
        action: PermissionAction,
        context: &AccessContext,
    ) -> AuthorizationDecision {
        self.has_permission(identity.subject(), resource, action, context)
            .await
    }

    /// Resolves the caller through an identity source, then decides.
    ///
    /// Unknown credentials are denied.
    pub async fn has_permission_for_credential(
        &self,
        identity_source: &dyn IdentitySource,
        credential: &str,
        resource: &str,
        action: PermissionAction,
        context: &AccessContext,
    ) -> AppResult<AuthorizationDecision> {
        let identity = identity_source
            .resolve_identity(credential)
            .await?
            .ok_or_else(|| {
                AppError::Forbidden("credential does not resolve to a known identity".to_owned())
            })?;

        Ok(self
            .has_permission_for_identity(&identity, resource, action, context)
            .await)
    }

    /// Ensures a user may perform `action` on `resource`.
    ///
    /// Returns `Forbidden` on deny, or the store error that caused the deny.
    pub async fn require_permission(
        &self,
        user_id: &str,
        resource: &str,
        action: PermissionAction,
        context: &AccessContext,
    ) -> AppResult<()> {
        let mut detail = DecisionDetail::new(user_id, resource, action, context);
        let outcome = self.decide(&mut detail).await;
        if let Err(error) = &outcome {
            detail.fail_closed(error);
        }
        self.record_decision(&detail).await;
        outcome?;

        if detail.granted {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{user_id}' is missing permission '{resource}:{action}'"
        )))
    }

    /// Lists the effective permissions of a user for a scope query.
    pub async fn get_effective_permissions(
        &self,
        user_id: &str,
        scope: Option<AssignmentScope>,
        scope_id: Option<&str>,
    ) -> AppResult<Vec<UserPermission>> {
        Ok(self
            .aggregator
            .resolve_user_permissions(user_id, scope, scope_id)
            .await?
            .permissions)
    }

    async fn decide(&self, detail: &mut DecisionDetail) -> AppResult<()> {
        let Some(target) = self
            .store
            .find_permission_by_key(&detail.resource, detail.action)
            .await?
            .filter(|permission| permission.is_active())
        else {
            debug!(resource = %detail.resource, action = %detail.action, "permission is not defined");
            return Ok(());
        };
        detail.permission_defined = true;

        let effective = self
            .aggregator
            .resolve_user_permissions(&detail.user_id, None, None)
            .await?;

        let specific: Vec<&UserPermission> = effective.grants(target.id()).collect();
        let manage: Vec<&UserPermission> = effective
            .grants_by_key(&detail.resource, PermissionAction::Manage)
            .collect();
        detail.specific_grant = !specific.is_empty();
        detail.manage_grant = !manage.is_empty();

        // Manage grants only supply constraints when no specific grant exists.
        let candidates = if specific.is_empty() { manage } else { specific };
        if candidates.is_empty() {
            return Ok(());
        }

        detail.ownership_valid = if detail.ownership_required && !detail.manage_grant {
            self.check_ownership(detail).await
        } else {
            true
        };

        // Competing grants are tried in rank order. The first one whose
        // constraints pass is selected; if none pass, the winner is reported.
        let mut selected = None;
        for grant in candidates {
            let evaluation = self.evaluate_constraints(detail, grant);
            let satisfied = evaluation.satisfied;
            if satisfied || selected.is_none() {
                selected = Some((grant, evaluation));
            }
            if satisfied {
                break;
            }
        }
        let Some((grant, evaluation)) = selected else {
            return Ok(());
        };

        detail.granting_role_id = Some(grant.granting_role_id);
        detail.constraints_satisfied = evaluation.satisfied;
        detail.constraint_evaluation = Some(evaluation);

        detail.granted = detail.ownership_valid && detail.constraints_satisfied;
        Ok(())
    }

    fn evaluate_constraints(
        &self,
        detail: &DecisionDetail,
        grant: &UserPermission,
    ) -> ConstraintEvaluation {
        let evaluation = grant
            .constraints
            .evaluate(detail.context.attributes(), self.missing_context_key_policy);
        if !evaluation.skipped_keys.is_empty() {
            debug!(
                user_id = %detail.user_id,
                granting_role_id = %grant.granting_role_id,
                skipped_keys = ?evaluation.skipped_keys,
                "constraint keys absent from context were skipped"
            );
        }
        evaluation
    }

    async fn check_ownership(&self, detail: &mut DecisionDetail) -> bool {
        let Some(resolver) = self.ownership.resolver_for(&detail.resource) else {
            debug!(resource = %detail.resource, "no ownership resolver registered");
            return false;
        };
        let Some(resource_id) = detail.context.resource_id() else {
            return false;
        };

        match resolver.is_owner(&detail.user_id, resource_id).await {
            Ok(is_owner) => is_owner,
            Err(error) => {
                warn!(resource = %detail.resource, resource_id, error = %error, "ownership resolution failed");
                detail.record_failure(error);
                false
            }
        }
    }

    async fn record_decision(&self, detail: &DecisionDetail) {
        let payload = match serde_json::to_value(detail) {
            Ok(payload) => Some(payload),
            Err(error) => {
                warn!(error = %error, "failed to serialize authorization decision");
                None
            }
        };

        let event = AuditEvent {
            subject: detail.user_id.clone(),
            action: AuditAction::AuthorizationDecided,
            resource_type: detail.resource.clone(),
            resource_id: detail
                .context
                .resource_id()
                .map_or_else(|| "*".to_owned(), str::to_owned),
            detail: payload,
        };

        if let Err(error) = self.audit_sink.append_event(event).await {
            warn!(user_id = %detail.user_id, error = %error, "failed to record authorization decision");
        }
    }
}

#[cfg(test)]
mod tests;
