use super::*;

impl AccessAdminService {
    /// Creates a role below `parent_id`, or a root role.
    pub async fn create_role(
        &self,
        actor: &UserIdentity,
        name: &str,
        parent_id: Option<RoleId>,
    ) -> AppResult<Role> {
        self.ensure_role_name_available(name, None).await?;

        let role = match parent_id {
            Some(parent_id) => Role::new_child(name, &self.load_role(parent_id).await?)?,
            None => Role::new_root(name)?,
        };
        self.store.insert_role(role.clone()).await?;

        self.append_audit(
            actor,
            AuditAction::RoleCreated,
            "rbac_role",
            role.id().to_string(),
            json!({ "name": role.name(), "parent_id": role.parent_id(), "level": role.level() }),
        )
        .await;

        Ok(role)
    }

    /// Renames a role and repairs the levels of its subtree.
    pub async fn rename_role(
        &self,
        actor: &UserIdentity,
        role_id: RoleId,
        name: &str,
    ) -> AppResult<Role> {
        let mut role = self.load_mutable_role(role_id).await?;
        self.ensure_role_name_available(name, Some(role_id)).await?;
        let previous_name = role.name().to_owned();
        role.rename(name)?;

        let relevelled = self.hierarchy.recompute_levels(&role).await?;
        let levels_changed = !relevelled.is_empty();
        let mut updated = vec![role.clone()];
        updated.extend(relevelled);
        self.store.update_roles(updated).await?;

        if levels_changed {
            self.invalidation.invalidate_role(role_id).await?;
        }

        self.append_audit(
            actor,
            AuditAction::RoleRenamed,
            "rbac_role",
            role_id.to_string(),
            json!({ "from": previous_name, "to": role.name() }),
        )
        .await;

        Ok(role)
    }

    /// Moves a role below `new_parent_id`, or to the root.
    ///
    /// Rejects moves below the role itself or one of its descendants, then
    /// saves the role and its relevelled subtree in one batch.
    pub async fn reparent_role(
        &self,
        actor: &UserIdentity,
        role_id: RoleId,
        new_parent_id: Option<RoleId>,
    ) -> AppResult<Role> {
        let mut role = self.load_mutable_role(role_id).await?;
        let previous_parent_id = role.parent_id();

        let new_parent = match new_parent_id {
            Some(parent_id) if parent_id == role_id => {
                return Err(AppError::Validation(format!(
                    "role '{}' cannot be its own parent",
                    role.name()
                )));
            }
            Some(parent_id) => {
                let descendants = self.hierarchy.get_all_descendants(role_id).await?;
                if descendants.iter().any(|descendant| descendant.id() == parent_id) {
                    return Err(AppError::Validation(format!(
                        "role '{}' cannot move below its own descendant '{parent_id}'",
                        role.name()
                    )));
                }
                Some(self.load_role(parent_id).await?)
            }
            None => None,
        };

        role.attach_to(new_parent.as_ref())?;
        let mut updated = vec![role.clone()];
        updated.extend(self.hierarchy.recompute_levels(&role).await?);
        self.store.update_roles(updated).await?;

        self.invalidation.invalidate_role(role_id).await?;

        self.append_audit(
            actor,
            AuditAction::RoleReparented,
            "rbac_role",
            role_id.to_string(),
            json!({
                "from_parent_id": previous_parent_id,
                "to_parent_id": role.parent_id(),
                "level": role.level(),
            }),
        )
        .await;

        Ok(role)
    }

    /// Activates or deactivates a role.
    pub async fn set_role_active(
        &self,
        actor: &UserIdentity,
        role_id: RoleId,
        is_active: bool,
    ) -> AppResult<Role> {
        let mut role = self.load_mutable_role(role_id).await?;
        role.set_active(is_active);
        self.store.update_roles(vec![role.clone()]).await?;

        self.invalidation.invalidate_role(role_id).await?;

        self.append_audit(
            actor,
            AuditAction::RoleActivationChanged,
            "rbac_role",
            role_id.to_string(),
            json!({ "is_active": is_active }),
        )
        .await;

        Ok(role)
    }

    async fn ensure_role_name_available(
        &self,
        name: &str,
        except: Option<RoleId>,
    ) -> AppResult<()> {
        match self.store.find_role_by_name(name.trim()).await? {
            Some(existing) if Some(existing.id()) != except => Err(AppError::Conflict(format!(
                "role name '{}' is already in use",
                name.trim()
            ))),
            _ => Ok(()),
        }
    }
}
