use super::*;

impl AccessAdminService {
    /// Defines a permission. Names and `(resource, action)` pairs are unique.
    pub async fn create_permission(
        &self,
        actor: &UserIdentity,
        input: CreatePermissionInput,
    ) -> AppResult<Permission> {
        let permission = Permission::new(
            input.resource,
            input.action,
            input.name,
            input.constraints,
        )?;

        if self
            .store
            .find_permission_by_name(permission.name())
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "permission name '{}' is already in use",
                permission.name()
            )));
        }
        if self
            .store
            .find_permission_by_key(permission.resource(), permission.action())
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "permission '{}' is already defined",
                permission.key()
            )));
        }

        self.store.insert_permission(permission.clone()).await?;

        self.append_audit(
            actor,
            AuditAction::PermissionCreated,
            "rbac_permission",
            permission.id().to_string(),
            json!({ "key": permission.key(), "name": permission.name() }),
        )
        .await;

        Ok(permission)
    }

    /// Changes a permission's default constraints or active flag and evicts
    /// every role linked to it.
    pub async fn update_permission(
        &self,
        actor: &UserIdentity,
        permission_id: PermissionId,
        input: UpdatePermissionInput,
    ) -> AppResult<Permission> {
        let mut permission = self.load_permission(permission_id).await?;
        if permission.is_system() {
            return Err(AppError::Validation(format!(
                "system permission '{}' cannot be modified",
                permission.name()
            )));
        }

        if let Some(constraints) = input.constraints {
            permission.set_constraints(constraints);
        }
        if let Some(is_active) = input.is_active {
            permission.set_active(is_active);
        }
        self.store.update_permission(permission.clone()).await?;

        self.invalidation.invalidate_permission(permission_id).await?;

        self.append_audit(
            actor,
            AuditAction::PermissionUpdated,
            "rbac_permission",
            permission_id.to_string(),
            json!({
                "key": permission.key(),
                "constraints": permission.constraints().to_json(),
                "is_active": permission.is_active(),
            }),
        )
        .await;

        Ok(permission)
    }

    /// Grants a permission to a role. An existing active grant is updated in place.
    pub async fn grant_permission(
        &self,
        actor: &UserIdentity,
        role_id: RoleId,
        permission_id: PermissionId,
        constraints_override: Option<ConstraintSet>,
    ) -> AppResult<RolePermission> {
        self.load_role(role_id).await?;
        let permission = self.load_permission(permission_id).await?;

        let link = match self.store.find_active_grant(role_id, permission_id).await? {
            Some(mut existing) => {
                existing.set_constraints_override(constraints_override);
                existing
            }
            None => RolePermission::new(role_id, permission_id, constraints_override),
        };
        self.store.save_role_permission(link.clone()).await?;

        self.invalidation.invalidate_role(role_id).await?;

        self.append_audit(
            actor,
            AuditAction::PermissionGranted,
            "rbac_role_permission",
            link.id().to_string(),
            json!({
                "role_id": role_id,
                "permission": permission.key(),
                "constraints_override": link.constraints_override().map(ConstraintSet::to_json),
            }),
        )
        .await;

        Ok(link)
    }

    /// Soft-revokes the active grant of a permission to a role.
    pub async fn revoke_permission(
        &self,
        actor: &UserIdentity,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> AppResult<RolePermission> {
        let mut link = self
            .store
            .find_active_grant(role_id, permission_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "role '{role_id}' holds no active grant of permission '{permission_id}'"
                ))
            })?;
        link.revoke();
        self.store.save_role_permission(link.clone()).await?;

        self.invalidation.invalidate_role(role_id).await?;

        self.append_audit(
            actor,
            AuditAction::PermissionRevoked,
            "rbac_role_permission",
            link.id().to_string(),
            json!({ "role_id": role_id, "permission_id": permission_id }),
        )
        .await;

        Ok(link)
    }
}
