use super::*;

impl AccessAdminService {
    /// Assigns a role to a user within a scope.
    ///
    /// A primary assignment demotes any other primary assignment the user
    /// holds for the same scope instance.
    pub async fn assign_role(
        &self,
        actor: &UserIdentity,
        input: UserRoleInput,
    ) -> AppResult<UserRole> {
        self.load_role(input.role_id).await?;
        let assignment = UserRole::new(input)?;

        let mut batch = vec![assignment.clone()];
        if assignment.is_primary() {
            let demoted = self
                .store
                .find_active_assignments_for_user(assignment.user_id())
                .await?
                .into_iter()
                .filter(|existing| existing.is_primary() && existing.shares_scope_with(&assignment))
                .map(|mut existing| {
                    existing.set_primary(false);
                    existing
                });
            batch.extend(demoted);
        }
        self.store.save_assignments(batch).await?;

        self.invalidation.invalidate_assignment(&assignment).await?;

        self.append_audit(
            actor,
            AuditAction::RoleAssigned,
            "rbac_user_role",
            assignment.id().to_string(),
            json!({
                "user_id": assignment.user_id(),
                "role_id": assignment.role_id(),
                "scope": assignment.scope(),
                "scope_id": assignment.scope_id(),
                "is_primary": assignment.is_primary(),
                "valid_from": assignment.valid_from(),
                "valid_until": assignment.valid_until(),
            }),
        )
        .await;

        Ok(assignment)
    }

    /// Soft-revokes an assignment.
    pub async fn revoke_assignment(
        &self,
        actor: &UserIdentity,
        assignment_id: UserRoleId,
    ) -> AppResult<UserRole> {
        let mut assignment = self
            .store
            .find_assignment(assignment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("assignment '{assignment_id}' does not exist"))
            })?;
        assignment.revoke();
        self.store
            .save_assignments(vec![assignment.clone()])
            .await?;

        self.invalidation.invalidate_assignment(&assignment).await?;

        self.append_audit(
            actor,
            AuditAction::RoleAssignmentRevoked,
            "rbac_user_role",
            assignment_id.to_string(),
            json!({ "user_id": assignment.user_id(), "role_id": assignment.role_id() }),
        )
        .await;

        Ok(assignment)
    }
}
