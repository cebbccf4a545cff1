use gatehouse_application::{AccessAdminService, CreatePermissionInput};
use gatehouse_core::{AppError, AppResult, UserIdentity};
use gatehouse_domain::{
    AssignmentScope, ConstraintOperator, ConstraintSet, Permission, PermissionAction,
    UserRoleInput,
};
use serde_json::json;
use tracing::info;

const SEED_ACTOR_SUBJECT: &str = "gatehouse-seed";
const SEED_ROOT_ROLE: &str = "manager";

/// Seeds a small role tree with permissions and assignments.
///
/// Returns `false` when the data was already present.
pub async fn run(admin: &AccessAdminService) -> AppResult<bool> {
    let actor = UserIdentity::new(SEED_ACTOR_SUBJECT, "Seed");

    let manager = match admin.create_role(&actor, SEED_ROOT_ROLE, None).await {
        Ok(role) => role,
        Err(AppError::Conflict(_)) => {
            info!("demo data already present; skipping seed");
            return Ok(false);
        }
        Err(error) => return Err(error),
    };
    let supervisor = admin
        .create_role(&actor, "supervisor", Some(manager.id()))
        .await?;
    let clerk = admin
        .create_role(&actor, "clerk", Some(supervisor.id()))
        .await?;

    let invoice_read = create_permission(admin, &actor, "invoice", PermissionAction::Read, None)
        .await?;
    let invoice_update = create_permission(
        admin,
        &actor,
        "invoice",
        PermissionAction::Update,
        Some(ConstraintSet::unconstrained().with("amount", ConstraintOperator::Lte(json!(10_000)))),
    )
    .await?;
    let invoice_delete =
        create_permission(admin, &actor, "invoice", PermissionAction::Delete, None).await?;
    let report_manage =
        create_permission(admin, &actor, "report", PermissionAction::Manage, None).await?;

    admin
        .grant_permission(&actor, clerk.id(), invoice_read.id(), None)
        .await?;
    admin
        .grant_permission(
            &actor,
            clerk.id(),
            invoice_update.id(),
            Some(
                ConstraintSet::unconstrained()
                    .with("amount", ConstraintOperator::Lte(json!(1_000))),
            ),
        )
        .await?;
    admin
        .grant_permission(&actor, supervisor.id(), invoice_update.id(), None)
        .await?;
    admin
        .grant_permission(&actor, manager.id(), invoice_delete.id(), None)
        .await?;
    admin
        .grant_permission(&actor, manager.id(), report_manage.id(), None)
        .await?;

    for (user_id, role_id, scope, scope_id) in [
        ("alice", manager.id(), AssignmentScope::Global, None),
        ("bob", clerk.id(), AssignmentScope::Project, Some("apollo")),
        ("carol", supervisor.id(), AssignmentScope::Department, Some("finance")),
    ] {
        admin
            .assign_role(
                &actor,
                UserRoleInput {
                    user_id: user_id.to_owned(),
                    role_id,
                    scope,
                    scope_id: scope_id.map(str::to_owned),
                    is_primary: true,
                    valid_from: None,
                    valid_until: None,
                },
            )
            .await?;
    }

    info!("seeded demo roles, permissions and assignments");
    Ok(true)
}

async fn create_permission(
    admin: &AccessAdminService,
    actor: &UserIdentity,
    resource: &str,
    action: PermissionAction,
    constraints: Option<ConstraintSet>,
) -> AppResult<Permission> {
    admin
        .create_permission(
            actor,
            CreatePermissionInput {
                resource: resource.to_owned(),
                action,
                name: format!("{resource}.{action}"),
                constraints: constraints.unwrap_or_default(),
            },
        )
        .await
}
