use gatehouse_application::AccessAdminStore;

use super::*;

#[async_trait]
impl AccessAdminStore for PostgresAccessStore {
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM authz_roles WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error("find role by name", error))?
        .map(role_from_row)
        .transpose()
    }

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM authz_permissions WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error("find permission by name", error))?
        .map(permission_from_row)
        .transpose()
    }

    async fn insert_role(&self, role: Role) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_roles (id, name, parent_id, level, is_active, is_system)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(role.name())
        .bind(role.parent_id().map(|parent_id| parent_id.as_uuid()))
        .bind(level_column(&role)?)
        .bind(role.is_active())
        .bind(role.is_system())
        .execute(&self.pool)
        .await
        .map_err(|error| store_error("create role", error))?;

        Ok(())
    }

    async fn update_roles(&self, roles: Vec<Role>) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| store_error("begin transaction", error))?;

        for role in &roles {
            let rows_affected = sqlx::query(
                r#"
                UPDATE authz_roles
                SET name = $2,
                    parent_id = $3,
                    level = $4,
                    is_active = $5,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(role.id().as_uuid())
            .bind(role.name())
            .bind(role.parent_id().map(|parent_id| parent_id.as_uuid()))
            .bind(level_column(role)?)
            .bind(role.is_active())
            .execute(&mut *transaction)
            .await
            .map_err(|error| store_error("update role", error))?
            .rows_affected();

            if rows_affected == 0 {
                return Err(AppError::NotFound(format!(
                    "role '{}' does not exist",
                    role.id()
                )));
            }
        }

        transaction
            .commit()
            .await
            .map_err(|error| store_error("commit transaction", error))
    }

    async fn insert_permission(&self, permission: Permission) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_permissions (
                id,
                resource,
                action,
                name,
                constraints,
                is_active,
                is_system
            )
            VALUES ($1, $2, $3, $4, $5::jsonb, $6, $7)
            "#,
        )
        .bind(permission.id().as_uuid())
        .bind(permission.resource())
        .bind(permission.action().as_str())
        .bind(permission.name())
        .bind(permission.constraints().to_json().to_string())
        .bind(permission.is_active())
        .bind(permission.is_system())
        .execute(&self.pool)
        .await
        .map_err(|error| store_error("create permission", error))?;

        Ok(())
    }

    async fn update_permission(&self, permission: Permission) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE authz_permissions
            SET name = $2,
                constraints = $3::jsonb,
                is_active = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(permission.id().as_uuid())
        .bind(permission.name())
        .bind(permission.constraints().to_json().to_string())
        .bind(permission.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| store_error("update permission", error))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "permission '{}' does not exist",
                permission.id()
            )));
        }

        Ok(())
    }

    async fn find_active_grant(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<Option<RolePermission>> {
        sqlx::query_as::<_, RolePermissionRow>(&format!(
            "SELECT {ROLE_PERMISSION_COLUMNS} FROM authz_role_permissions \
             WHERE role_id = $1 AND permission_id = $2 AND is_active"
        ))
        .bind(role_id.as_uuid())
        .bind(permission_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error("find role grant", error))?
        .map(role_permission_from_row)
        .transpose()
    }

    async fn save_role_permission(&self, link: RolePermission) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authz_role_permissions (
                id,
                role_id,
                permission_id,
                constraints_override,
                is_active
            )
            VALUES ($1, $2, $3, $4::jsonb, $5)
            ON CONFLICT (id) DO UPDATE
            SET constraints_override = EXCLUDED.constraints_override,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            "#,
        )
        .bind(link.id().as_uuid())
        .bind(link.role_id().as_uuid())
        .bind(link.permission_id().as_uuid())
        .bind(
            link.constraints_override()
                .map(|constraints| constraints.to_json().to_string()),
        )
        .bind(link.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| store_error("save role grant", error))?;

        Ok(())
    }

    async fn find_assignment(&self, assignment_id: UserRoleId) -> AppResult<Option<UserRole>> {
        sqlx::query_as::<_, UserRoleRow>(&format!(
            "SELECT {USER_ROLE_COLUMNS} FROM authz_user_roles WHERE id = $1"
        ))
        .bind(assignment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error("find assignment", error))?
        .map(user_role_from_row)
        .transpose()
    }

    async fn save_assignments(&self, assignments: Vec<UserRole>) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| store_error("begin transaction", error))?;

        for assignment in &assignments {
            sqlx::query(
                r#"
                INSERT INTO authz_user_roles (
                    id,
                    user_id,
                    role_id,
                    scope,
                    scope_id,
                    is_primary,
                    valid_from,
                    valid_until,
                    is_active
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO UPDATE
                SET is_primary = EXCLUDED.is_primary,
                    valid_from = EXCLUDED.valid_from,
                    valid_until = EXCLUDED.valid_until,
                    is_active = EXCLUDED.is_active,
                    updated_at = now()
                "#,
            )
            .bind(assignment.id().as_uuid())
            .bind(assignment.user_id())
            .bind(assignment.role_id().as_uuid())
            .bind(assignment.scope().as_str())
            .bind(assignment.scope_id())
            .bind(assignment.is_primary())
            .bind(assignment.valid_from())
            .bind(assignment.valid_until())
            .bind(assignment.is_active())
            .execute(&mut *transaction)
            .await
            .map_err(|error| store_error("save assignment", error))?;
        }

        transaction
            .commit()
            .await
            .map_err(|error| store_error("commit transaction", error))
    }
}
