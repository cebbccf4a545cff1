use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_application::{AccessStore, RoleGrant};
use gatehouse_core::{
    AppError, AppResult, PermissionId, RoleId, RolePermissionId, UserRoleId,
};
use gatehouse_domain::{
    AssignmentScope, ConstraintSet, Permission, PermissionAction, Role, RolePermission, UserRole,
    UserRoleInput,
};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

mod admin;

/// PostgreSQL-backed store for roles, permissions, links and assignments.
#[derive(Clone)]
pub struct PostgresAccessStore {
    pool: PgPool,
}

impl PostgresAccessStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: uuid::Uuid,
    name: String,
    parent_id: Option<uuid::Uuid>,
    level: i32,
    is_active: bool,
    is_system: bool,
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    id: uuid::Uuid,
    resource: String,
    action: String,
    name: String,
    constraints: Json<Value>,
    is_active: bool,
    is_system: bool,
}

#[derive(Debug, FromRow)]
struct RolePermissionRow {
    id: uuid::Uuid,
    role_id: uuid::Uuid,
    permission_id: uuid::Uuid,
    constraints_override: Option<Json<Value>>,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct RoleGrantRow {
    link_id: uuid::Uuid,
    role_id: uuid::Uuid,
    permission_id: uuid::Uuid,
    constraints_override: Option<Json<Value>>,
    link_is_active: bool,
    resource: String,
    action: String,
    name: String,
    constraints: Json<Value>,
    is_active: bool,
    is_system: bool,
}

#[derive(Debug, FromRow)]
struct UserRoleRow {
    id: uuid::Uuid,
    user_id: String,
    role_id: uuid::Uuid,
    scope: String,
    scope_id: Option<String>,
    is_primary: bool,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
}

const ROLE_COLUMNS: &str = "id, name, parent_id, level, is_active, is_system";
const PERMISSION_COLUMNS: &str = "id, resource, action, name, constraints, is_active, is_system";
const ROLE_PERMISSION_COLUMNS: &str =
    "id, role_id, permission_id, constraints_override, is_active";
const USER_ROLE_COLUMNS: &str =
    "id, user_id, role_id, scope, scope_id, is_primary, valid_from, valid_until, is_active";

#[async_trait]
impl AccessStore for PostgresAccessStore {
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM authz_roles WHERE id = $1"
        ))
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error("find role", error))?
        .map(role_from_row)
        .transpose()
    }

    async fn find_children(&self, role_id: RoleId) -> AppResult<Vec<Role>> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM authz_roles WHERE parent_id = $1 ORDER BY name"
        ))
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list child roles", error))?
        .into_iter()
        .map(role_from_row)
        .collect()
    }

    async fn find_permission(&self, permission_id: PermissionId) -> AppResult<Option<Permission>> {
        sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM authz_permissions WHERE id = $1"
        ))
        .bind(permission_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error("find permission", error))?
        .map(permission_from_row)
        .transpose()
    }

    async fn find_permission_by_key(
        &self,
        resource: &str,
        action: PermissionAction,
    ) -> AppResult<Option<Permission>> {
        sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM authz_permissions WHERE resource = $1 AND action = $2"
        ))
        .bind(resource)
        .bind(action.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error("find permission by key", error))?
        .map(permission_from_row)
        .transpose()
    }

    async fn find_active_grants_for_role(&self, role_id: RoleId) -> AppResult<Vec<RoleGrant>> {
        sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT
                links.id AS link_id,
                links.role_id,
                links.permission_id,
                links.constraints_override,
                links.is_active AS link_is_active,
                permissions.resource,
                permissions.action,
                permissions.name,
                permissions.constraints,
                permissions.is_active,
                permissions.is_system
            FROM authz_role_permissions AS links
            INNER JOIN authz_permissions AS permissions
                ON permissions.id = links.permission_id
            WHERE links.role_id = $1
                AND links.is_active
            ORDER BY links.id
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list role grants", error))?
        .into_iter()
        .map(grant_from_row)
        .collect()
    }

    async fn find_roles_granting_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Vec<RoleId>> {
        let role_ids = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT DISTINCT role_id
            FROM authz_role_permissions
            WHERE permission_id = $1
                AND is_active
            "#,
        )
        .bind(permission_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list roles granting permission", error))?;

        Ok(role_ids.into_iter().map(RoleId::from_uuid).collect())
    }

    async fn find_active_assignments_for_user(&self, user_id: &str) -> AppResult<Vec<UserRole>> {
        sqlx::query_as::<_, UserRoleRow>(&format!(
            "SELECT {USER_ROLE_COLUMNS} FROM authz_user_roles \
             WHERE user_id = $1 AND is_active ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list user assignments", error))?
        .into_iter()
        .map(user_role_from_row)
        .collect()
    }

    async fn find_active_assignments_for_roles(
        &self,
        role_ids: &[RoleId],
    ) -> AppResult<Vec<UserRole>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let role_ids: Vec<uuid::Uuid> = role_ids.iter().map(RoleId::as_uuid).collect();
        sqlx::query_as::<_, UserRoleRow>(&format!(
            "SELECT {USER_ROLE_COLUMNS} FROM authz_user_roles \
             WHERE role_id = ANY($1) AND is_active ORDER BY user_id, id"
        ))
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error("list role assignments", error))?
        .into_iter()
        .map(user_role_from_row)
        .collect()
    }
}

fn role_from_row(row: RoleRow) -> AppResult<Role> {
    let level = u32::try_from(row.level).map_err(|error| {
        AppError::Internal(format!("role '{}' has invalid level: {error}", row.id))
    })?;

    Role::restore(
        RoleId::from_uuid(row.id),
        row.name,
        row.parent_id.map(RoleId::from_uuid),
        level,
        row.is_active,
        row.is_system,
    )
}

fn permission_from_row(row: PermissionRow) -> AppResult<Permission> {
    Permission::restore(
        PermissionId::from_uuid(row.id),
        row.resource,
        PermissionAction::from_str(&row.action)?,
        row.name,
        ConstraintSet::from_json(&row.constraints.0)?,
        row.is_active,
        row.is_system,
    )
}

fn role_permission_from_row(row: RolePermissionRow) -> AppResult<RolePermission> {
    Ok(RolePermission::restore(
        RolePermissionId::from_uuid(row.id),
        RoleId::from_uuid(row.role_id),
        PermissionId::from_uuid(row.permission_id),
        parse_override(row.constraints_override)?,
        row.is_active,
    ))
}

fn grant_from_row(row: RoleGrantRow) -> AppResult<RoleGrant> {
    let permission = permission_from_row(PermissionRow {
        id: row.permission_id,
        resource: row.resource,
        action: row.action,
        name: row.name,
        constraints: row.constraints,
        is_active: row.is_active,
        is_system: row.is_system,
    })?;
    let link = role_permission_from_row(RolePermissionRow {
        id: row.link_id,
        role_id: row.role_id,
        permission_id: row.permission_id,
        constraints_override: row.constraints_override,
        is_active: row.link_is_active,
    })?;

    Ok(RoleGrant { link, permission })
}

fn user_role_from_row(row: UserRoleRow) -> AppResult<UserRole> {
    UserRole::restore(
        UserRoleId::from_uuid(row.id),
        UserRoleInput {
            user_id: row.user_id,
            role_id: RoleId::from_uuid(row.role_id),
            scope: AssignmentScope::from_str(&row.scope)?,
            scope_id: row.scope_id,
            is_primary: row.is_primary,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
        },
        row.is_active,
    )
}

fn parse_override(value: Option<Json<Value>>) -> AppResult<Option<ConstraintSet>> {
    value
        .map(|Json(value)| ConstraintSet::from_json(&value))
        .transpose()
}

fn level_column(role: &Role) -> AppResult<i32> {
    i32::try_from(role.level()).map_err(|error| {
        AppError::Validation(format!("role '{}' level is out of range: {error}", role.name()))
    })
}

/// Maps driver errors: connectivity to `StoreUnavailable`, unique
/// violations to `Conflict`, everything else to `Internal`.
fn store_error(operation: &str, error: sqlx::Error) -> AppError {
    match &error {
        sqlx::Error::Database(database_error)
            if database_error.code().as_deref() == Some("23505") =>
        {
            AppError::Conflict(format!(
                "failed to {operation}: {}",
                database_error.message()
            ))
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            AppError::StoreUnavailable(format!("failed to {operation}: {error}"))
        }
        _ => AppError::Internal(format!("failed to {operation}: {error}")),
    }
}
