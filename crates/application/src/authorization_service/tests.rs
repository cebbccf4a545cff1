use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_core::{AppError, AppResult, UserIdentity};
use gatehouse_domain::{
    AccessContext, AssignmentScope, AuditAction, ConstraintOperator, ConstraintSet,
    MissingContextKeyPolicy, PermissionAction,
};
use serde_json::json;

use crate::testing::{FakeOwnershipResolver, Harness};
use crate::{AuthorizationConfig, IdentitySource, OwnershipRegistry, OwnershipResolver};

fn amount_at_most(limit: i64) -> ConstraintSet {
    ConstraintSet::unconstrained().with("amount", ConstraintOperator::Lte(json!(limit)))
}

#[tokio::test]
async fn undefined_permission_is_denied() {
    let harness = Harness::new();
    let role = harness.role("Admin", None).await;
    let manage = harness
        .permission("invoice", PermissionAction::Manage, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &manage, None).await;
    harness.assign("alice", &role, AssignmentScope::Global, None).await;

    let decision = harness
        .authorization()
        .has_permission("alice", "invoice", PermissionAction::Delete, &AccessContext::new())
        .await;

    assert!(!decision.granted);
    assert!(!decision.detail.permission_defined);
    assert!(!decision.is_error());
}

#[tokio::test]
async fn inherited_grant_is_honoured() {
    let harness = Harness::new();
    let manager = harness.role("Manager", None).await;
    let supervisor = harness.role("Supervisor", Some(&manager)).await;
    let read = harness
        .permission("invoice", PermissionAction::Read, ConstraintSet::unconstrained())
        .await;
    harness.grant(&manager, &read, None).await;
    harness
        .assign("alice", &supervisor, AssignmentScope::Global, None)
        .await;

    let decision = harness
        .authorization()
        .has_permission("alice", "invoice", PermissionAction::Read, &AccessContext::new())
        .await;

    assert!(decision.granted);
    assert!(decision.detail.specific_grant);
    assert_eq!(decision.detail.granting_role_id, Some(supervisor.id()));
}

#[tokio::test]
async fn manage_grant_satisfies_other_actions() {
    let harness = Harness::new();
    let role = harness.role("Owner", None).await;
    let manage = harness
        .permission("order", PermissionAction::Manage, ConstraintSet::unconstrained())
        .await;
    harness
        .permission("order", PermissionAction::Delete, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &manage, None).await;
    harness.assign("bob", &role, AssignmentScope::Global, None).await;

    let decision = harness
        .authorization()
        .has_permission("bob", "order", PermissionAction::Delete, &AccessContext::new())
        .await;

    assert!(decision.granted);
    assert!(!decision.detail.specific_grant);
    assert!(decision.detail.manage_grant);
}

#[tokio::test]
async fn constraint_override_gates_the_grant() {
    let harness = Harness::new();
    let role = harness.role("Approver", None).await;
    let approve = harness
        .permission("expense", PermissionAction::Update, ConstraintSet::unconstrained())
        .await;
    harness
        .grant(&role, &approve, Some(amount_at_most(1_000)))
        .await;
    harness.assign("carol", &role, AssignmentScope::Global, None).await;
    let service = harness.authorization();

    let within = service
        .has_permission(
            "carol",
            "expense",
            PermissionAction::Update,
            &AccessContext::new().with_attribute("amount", 500),
        )
        .await;
    let over = service
        .has_permission(
            "carol",
            "expense",
            PermissionAction::Update,
            &AccessContext::new().with_attribute("amount", 5_000),
        )
        .await;

    assert!(within.granted);
    assert!(!over.granted);
    assert!(!over.detail.constraints_satisfied);
    assert_eq!(
        over.detail
            .constraint_evaluation
            .and_then(|evaluation| evaluation.failed_key),
        Some("amount".to_owned())
    );
}

#[tokio::test]
async fn specific_grant_constraints_take_precedence_over_manage() {
    let harness = Harness::new();
    let role = harness.role("Editor", None).await;
    let update = harness
        .permission("doc", PermissionAction::Update, ConstraintSet::unconstrained())
        .await;
    let manage = harness
        .permission("doc", PermissionAction::Manage, ConstraintSet::unconstrained())
        .await;
    harness
        .grant(&role, &update, Some(amount_at_most(10)))
        .await;
    harness.grant(&role, &manage, None).await;
    harness.assign("dana", &role, AssignmentScope::Global, None).await;

    let decision = harness
        .authorization()
        .has_permission(
            "dana",
            "doc",
            PermissionAction::Update,
            &AccessContext::new().with_attribute("amount", 50),
        )
        .await;

    assert!(!decision.granted);
    assert!(decision.detail.manage_grant);
}

#[tokio::test]
async fn missing_context_key_is_skipped_by_default() {
    let harness = Harness::new();
    let role = harness.role("Approver", None).await;
    let approve = harness
        .permission("expense", PermissionAction::Update, amount_at_most(1_000))
        .await;
    harness.grant(&role, &approve, None).await;
    harness.assign("erin", &role, AssignmentScope::Global, None).await;

    let decision = harness
        .authorization()
        .has_permission("erin", "expense", PermissionAction::Update, &AccessContext::new())
        .await;

    assert!(decision.granted);
    assert_eq!(
        decision
            .detail
            .constraint_evaluation
            .map(|evaluation| evaluation.skipped_keys),
        Some(vec!["amount".to_owned()])
    );
}

#[tokio::test]
async fn missing_context_key_denies_when_configured() {
    let harness = Harness::with_config(
        AuthorizationConfig::default()
            .with_missing_context_key_policy(MissingContextKeyPolicy::Deny),
    );
    let role = harness.role("Approver", None).await;
    let approve = harness
        .permission("expense", PermissionAction::Update, amount_at_most(1_000))
        .await;
    harness.grant(&role, &approve, None).await;
    harness.assign("erin", &role, AssignmentScope::Global, None).await;

    let decision = harness
        .authorization()
        .has_permission("erin", "expense", PermissionAction::Update, &AccessContext::new())
        .await;

    assert!(!decision.granted);
}

#[tokio::test]
async fn ownership_is_checked_through_registered_resolver() {
    let harness = Harness::new();
    let role = harness.role("Customer", None).await;
    let update = harness
        .permission("order", PermissionAction::Update, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &update, None).await;
    harness.assign("frank", &role, AssignmentScope::Global, None).await;
    let service = harness.authorization().with_ownership_registry(
        OwnershipRegistry::new().with_resolver(
            "order",
            Arc::new(FakeOwnershipResolver::owning("frank", "order-1")),
        ),
    );

    let own = service
        .has_permission(
            "frank",
            "order",
            PermissionAction::Update,
            &AccessContext::new().require_ownership_of("order-1"),
        )
        .await;
    let foreign = service
        .has_permission(
            "frank",
            "order",
            PermissionAction::Update,
            &AccessContext::new().require_ownership_of("order-2"),
        )
        .await;

    assert!(own.granted);
    assert!(!foreign.granted);
    assert!(foreign.detail.specific_grant);
    assert!(!foreign.detail.ownership_valid);
}

#[tokio::test]
async fn unregistered_resource_type_denies_ownership() {
    let harness = Harness::new();
    let role = harness.role("Customer", None).await;
    let update = harness
        .permission("ticket", PermissionAction::Update, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &update, None).await;
    harness.assign("gina", &role, AssignmentScope::Global, None).await;

    let decision = harness
        .authorization()
        .has_permission(
            "gina",
            "ticket",
            PermissionAction::Update,
            &AccessContext::new().require_ownership_of("ticket-9"),
        )
        .await;

    assert!(!decision.granted);
}

#[tokio::test]
async fn ownership_without_resource_id_is_denied() {
    let harness = Harness::new();
    let role = harness.role("Customer", None).await;
    let update = harness
        .permission("order", PermissionAction::Update, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &update, None).await;
    harness.assign("hank", &role, AssignmentScope::Global, None).await;
    let service = harness.authorization().with_ownership_registry(
        OwnershipRegistry::new().with_resolver(
            "order",
            Arc::new(FakeOwnershipResolver::owning("hank", "order-1")),
        ),
    );
    let context: AccessContext =
        serde_json::from_value(json!({"require_ownership": true})).unwrap_or_default();

    let decision = service
        .has_permission("hank", "order", PermissionAction::Update, &context)
        .await;

    assert!(context.requires_ownership());
    assert!(!decision.granted);
}

#[tokio::test]
async fn manage_grant_bypasses_ownership() {
    let harness = Harness::new();
    let role = harness.role("Support", None).await;
    let manage = harness
        .permission("order", PermissionAction::Manage, ConstraintSet::unconstrained())
        .await;
    harness
        .permission("order", PermissionAction::Update, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &manage, None).await;
    harness.assign("ivy", &role, AssignmentScope::Global, None).await;

    let decision = harness
        .authorization()
        .has_permission(
            "ivy",
            "order",
            PermissionAction::Update,
            &AccessContext::new().require_ownership_of("order-7"),
        )
        .await;

    assert!(decision.granted);
    assert!(decision.detail.ownership_valid);
}

#[tokio::test]
async fn store_outage_denies_with_error() {
    let harness = Harness::new();
    harness.store.set_unavailable(true);

    let decision = harness
        .authorization()
        .has_permission("alice", "invoice", PermissionAction::Read, &AccessContext::new())
        .await;

    assert!(!decision.granted);
    assert!(decision.is_error());
    assert!(matches!(decision.failure(), Some(AppError::StoreUnavailable(_))));
    assert_eq!(harness.audit.events.lock().await.len(), 1);
}

struct BrokenOwnershipResolver;

#[async_trait]
impl OwnershipResolver for BrokenOwnershipResolver {
    async fn is_owner(&self, _user_id: &str, _resource_id: &str) -> AppResult<bool> {
        Err(AppError::Internal("ownership lookup crashed".to_owned()))
    }
}

#[tokio::test]
async fn ownership_resolver_failure_keeps_its_error_kind() {
    let harness = Harness::new();
    let role = harness.role("Customer", None).await;
    let update = harness
        .permission("order", PermissionAction::Update, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &update, None).await;
    harness.assign("quinn", &role, AssignmentScope::Global, None).await;
    let service = harness.authorization().with_ownership_registry(
        OwnershipRegistry::new().with_resolver("order", Arc::new(BrokenOwnershipResolver)),
    );

    let decision = service
        .has_permission(
            "quinn",
            "order",
            PermissionAction::Update,
            &AccessContext::new().require_ownership_of("order-9"),
        )
        .await;

    assert!(!decision.granted);
    assert!(!decision.detail.ownership_valid);
    assert!(matches!(decision.failure(), Some(AppError::Internal(_))));
}

#[tokio::test]
async fn cache_outage_does_not_change_the_outcome() {
    let harness = Harness::new();
    let role = harness.role("Clerk", None).await;
    let read = harness
        .permission("invoice", PermissionAction::Read, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &read, None).await;
    harness.assign("jack", &role, AssignmentScope::Global, None).await;
    harness.cache.set_unavailable(true);

    let decision = harness
        .authorization()
        .has_permission("jack", "invoice", PermissionAction::Read, &AccessContext::new())
        .await;

    assert!(decision.granted);
    assert!(!decision.is_error());
}

#[tokio::test]
async fn every_decision_is_audited() {
    let harness = Harness::new();
    let role = harness.role("Clerk", None).await;
    let read = harness
        .permission("invoice", PermissionAction::Read, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &read, None).await;
    harness.assign("kim", &role, AssignmentScope::Global, None).await;
    let service = harness.authorization();

    let allowed = service
        .has_permission(
            "kim",
            "invoice",
            PermissionAction::Read,
            &AccessContext::new().with_resource_id("inv-1"),
        )
        .await;
    let denied = service
        .has_permission("kim", "invoice", PermissionAction::Delete, &AccessContext::new())
        .await;

    assert!(allowed.granted);
    assert!(!denied.granted);

    let events = harness.audit.events.lock().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, AuditAction::AuthorizationDecided);
    assert_eq!(events[0].resource_id, "inv-1");
    assert_eq!(events[1].resource_id, "*");
    assert_eq!(
        events[0]
            .detail
            .as_ref()
            .and_then(|detail| detail.get("granted"))
            .cloned(),
        Some(json!(true))
    );
}

#[tokio::test]
async fn audit_failure_does_not_change_the_outcome() {
    let harness = Harness::new();
    let role = harness.role("Clerk", None).await;
    let read = harness
        .permission("invoice", PermissionAction::Read, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &read, None).await;
    harness.assign("lee", &role, AssignmentScope::Global, None).await;
    harness.audit.set_failing(true);

    let decision = harness
        .authorization()
        .has_permission("lee", "invoice", PermissionAction::Read, &AccessContext::new())
        .await;

    assert!(decision.granted);
}

#[tokio::test]
async fn require_permission_maps_outcomes_to_errors() {
    let harness = Harness::new();
    let role = harness.role("Clerk", None).await;
    let read = harness
        .permission("invoice", PermissionAction::Read, ConstraintSet::unconstrained())
        .await;
    harness
        .permission("invoice", PermissionAction::Delete, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &read, None).await;
    harness.assign("mia", &role, AssignmentScope::Global, None).await;
    let service = harness.authorization();
    let context = AccessContext::new();

    let allowed = service
        .require_permission("mia", "invoice", PermissionAction::Read, &context)
        .await;
    let denied = service
        .require_permission("mia", "invoice", PermissionAction::Delete, &context)
        .await;
    harness.store.set_unavailable(true);
    let failed = service
        .require_permission("mia", "invoice", PermissionAction::Read, &context)
        .await;

    assert!(allowed.is_ok());
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
    assert!(matches!(failed, Err(AppError::StoreUnavailable(_))));
}

#[tokio::test]
async fn revoked_assignment_loses_access() {
    let harness = Harness::new();
    let role = harness.role("Clerk", None).await;
    let read = harness
        .permission("invoice", PermissionAction::Read, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &read, None).await;
    let mut assignment = harness.assign("nia", &role, AssignmentScope::Global, None).await;
    assignment.revoke();
    harness.store.put_assignment(assignment).await;

    let decision = harness
        .authorization()
        .has_permission("nia", "invoice", PermissionAction::Read, &AccessContext::new())
        .await;

    assert!(!decision.granted);
}

struct StaticIdentitySource;

#[async_trait]
impl IdentitySource for StaticIdentitySource {
    async fn resolve_identity(&self, credential: &str) -> AppResult<Option<UserIdentity>> {
        Ok((credential == "token-alice").then(|| UserIdentity::new("alice", "Alice")))
    }
}

#[tokio::test]
async fn credential_checks_resolve_identity_first() {
    let harness = Harness::new();
    let role = harness.role("Clerk", None).await;
    let read = harness
        .permission("invoice", PermissionAction::Read, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &read, None).await;
    harness.assign("alice", &role, AssignmentScope::Global, None).await;
    let service = harness.authorization();

    let known = service
        .has_permission_for_credential(
            &StaticIdentitySource,
            "token-alice",
            "invoice",
            PermissionAction::Read,
            &AccessContext::new(),
        )
        .await;
    let unknown = service
        .has_permission_for_credential(
            &StaticIdentitySource,
            "token-mallory",
            "invoice",
            PermissionAction::Read,
            &AccessContext::new(),
        )
        .await;

    assert!(known.map(|decision| decision.granted).unwrap_or(false));
    assert!(matches!(unknown, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn effective_permissions_are_listed_for_scope() {
    let harness = Harness::new();
    let role = harness.role("Clerk", None).await;
    let read = harness
        .permission("invoice", PermissionAction::Read, ConstraintSet::unconstrained())
        .await;
    harness.grant(&role, &read, None).await;
    harness
        .assign("omar", &role, AssignmentScope::Project, Some("apollo"))
        .await;
    let service = harness.authorization();

    let apollo = service
        .get_effective_permissions("omar", Some(AssignmentScope::Project), Some("apollo"))
        .await
        .unwrap_or_default();
    let zeus = service
        .get_effective_permissions("omar", Some(AssignmentScope::Project), Some("zeus"))
        .await
        .unwrap_or_default();

    assert_eq!(apollo.len(), 1);
    assert!(zeus.is_empty());
}

#[tokio::test]
async fn extra_scoped_role_does_not_narrow_a_global_grant() {
    let harness = Harness::new();
    let auditor = harness.role("Auditor", None).await;
    let regional_lead = harness.role("RegionalLead", None).await;
    let report_read = harness
        .permission("report", PermissionAction::Read, ConstraintSet::unconstrained())
        .await;
    harness.grant(&auditor, &report_read, None).await;
    let east_only =
        ConstraintSet::unconstrained().with("region", ConstraintOperator::Eq(json!("east")));
    harness
        .grant(&regional_lead, &report_read, Some(east_only))
        .await;
    harness
        .assign("alice", &auditor, AssignmentScope::Global, None)
        .await;
    harness
        .assign(
            "alice",
            &regional_lead,
            AssignmentScope::Organization,
            Some("east"),
        )
        .await;
    let service = harness.authorization();

    let west = service
        .has_permission(
            "alice",
            "report",
            PermissionAction::Read,
            &AccessContext::new().with_attribute("region", "west"),
        )
        .await;
    let east = service
        .has_permission(
            "alice",
            "report",
            PermissionAction::Read,
            &AccessContext::new().with_attribute("region", "east"),
        )
        .await;

    assert!(west.granted);
    assert_eq!(west.detail.granting_role_id, Some(auditor.id()));
    assert!(east.granted);
    assert_eq!(east.detail.granting_role_id, Some(regional_lead.id()));
}

#[tokio::test]
async fn failing_grants_report_the_top_ranked_one() {
    let harness = Harness::new();
    let deep_root = harness.role("Staff", None).await;
    let deep = harness.role("Specialist", Some(&deep_root)).await;
    let shallow = harness.role("Contractor", None).await;
    let approve = harness
        .permission("expense", PermissionAction::Update, ConstraintSet::unconstrained())
        .await;
    harness.grant(&deep, &approve, Some(amount_at_most(10))).await;
    harness.grant(&shallow, &approve, Some(amount_at_most(100))).await;
    harness.assign("pat", &deep, AssignmentScope::Global, None).await;
    harness.assign("pat", &shallow, AssignmentScope::Global, None).await;
    let service = harness.authorization();

    let fifty = service
        .has_permission(
            "pat",
            "expense",
            PermissionAction::Update,
            &AccessContext::new().with_attribute("amount", 50),
        )
        .await;
    let five_hundred = service
        .has_permission(
            "pat",
            "expense",
            PermissionAction::Update,
            &AccessContext::new().with_attribute("amount", 500),
        )
        .await;

    assert!(fifty.granted);
    assert_eq!(fifty.detail.granting_role_id, Some(shallow.id()));
    assert!(!five_hundred.granted);
    assert_eq!(five_hundred.detail.granting_role_id, Some(deep.id()));
}
