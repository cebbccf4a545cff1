use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use gatehouse_core::{AppError, AppResult, RoleId};
use gatehouse_domain::Role;

use crate::AccessStore;

/// Read-side traversal of the role forest.
///
/// Traversals are iterative and track visited ids, so corrupted parent links
/// surface as validation errors instead of unbounded recursion.
#[derive(Clone)]
pub struct RoleHierarchyService {
    store: Arc<dyn AccessStore>,
}

impl RoleHierarchyService {
    /// Creates a hierarchy service over a store.
    #[must_use]
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Lists direct children of a role ordered by name.
    pub async fn get_children(&self, role_id: RoleId) -> AppResult<Vec<Role>> {
        let mut children = self.store.find_children(role_id).await?;
        children.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(children)
    }

    /// Lists every transitive descendant in breadth-first order.
    pub async fn get_all_descendants(&self, role_id: RoleId) -> AppResult<Vec<Role>> {
        let mut visited = HashSet::from([role_id]);
        let mut queue = VecDeque::from([role_id]);
        let mut descendants = Vec::new();

        while let Some(current) = queue.pop_front() {
            for child in self.get_children(current).await? {
                if visited.insert(child.id()) {
                    queue.push_back(child.id());
                    descendants.push(child);
                }
            }
        }

        Ok(descendants)
    }

    /// Lists ancestors of a role, nearest parent first.
    ///
    /// A dangling parent reference ends the chain.
    pub async fn get_all_ancestors(&self, role_id: RoleId) -> AppResult<Vec<Role>> {
        let role = self
            .store
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;

        let mut visited = HashSet::from([role_id]);
        let mut ancestors = Vec::new();
        let mut cursor = role.parent_id();

        while let Some(parent_id) = cursor {
            if !visited.insert(parent_id) {
                return Err(AppError::Validation(format!(
                    "role hierarchy cycle detected at role '{parent_id}'"
                )));
            }

            let Some(parent) = self.store.find_role(parent_id).await? else {
                break;
            };
            cursor = parent.parent_id();
            ancestors.push(parent);
        }

        Ok(ancestors)
    }

    /// Returns whether `candidate` sits anywhere below `ancestor_id`.
    pub async fn is_descendant_of(&self, candidate: RoleId, ancestor_id: RoleId) -> AppResult<bool> {
        if candidate == ancestor_id {
            return Ok(false);
        }

        Ok(self
            .get_all_ancestors(candidate)
            .await?
            .iter()
            .any(|ancestor| ancestor.id() == ancestor_id))
    }

    /// Recomputes cached levels for every descendant of `root`, using the
    /// level `root` currently carries. Returns only the roles whose level
    /// changed.
    pub async fn recompute_levels(&self, root: &Role) -> AppResult<Vec<Role>> {
        let mut visited = HashSet::from([root.id()]);
        let mut queue = VecDeque::from([(root.id(), root.child_level()?)]);
        let mut changed = Vec::new();

        while let Some((parent_id, child_level)) = queue.pop_front() {
            for mut child in self.store.find_children(parent_id).await? {
                if !visited.insert(child.id()) {
                    continue;
                }

                if child.level() != child_level {
                    child.set_level(child_level);
                    changed.push(child.clone());
                }
                queue.push_back((child.id(), child.child_level()?));
            }
        }

        Ok(changed)
    }
}
