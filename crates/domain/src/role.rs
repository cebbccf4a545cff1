use gatehouse_core::{AppError, AppResult, NonEmptyString, RoleId};
use serde::{Deserialize, Serialize};

/// A named node in a single-parent role forest.
///
/// Roles reference each other only by id. `level` is a cached depth derived
/// from the parent chain and is recomputed whenever the chain changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: NonEmptyString,
    parent_id: Option<RoleId>,
    level: u32,
    is_active: bool,
    is_system: bool,
}

impl Role {
    /// Creates an active root role.
    pub fn new_root(name: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            id: RoleId::new(),
            name: NonEmptyString::new(name)?,
            parent_id: None,
            level: 0,
            is_active: true,
            is_system: false,
        })
    }

    /// Creates an active role below `parent`.
    pub fn new_child(name: impl Into<String>, parent: &Role) -> AppResult<Self> {
        Ok(Self {
            id: RoleId::new(),
            name: NonEmptyString::new(name)?,
            parent_id: Some(parent.id),
            level: parent.child_level()?,
            is_active: true,
            is_system: false,
        })
    }

    /// Rebuilds a role from persisted state.
    pub fn restore(
        id: RoleId,
        name: impl Into<String>,
        parent_id: Option<RoleId>,
        level: u32,
        is_active: bool,
        is_system: bool,
    ) -> AppResult<Self> {
        if parent_id == Some(id) {
            return Err(AppError::Validation(format!(
                "role '{id}' cannot be its own parent"
            )));
        }

        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
            parent_id,
            level,
            is_active,
            is_system,
        })
    }

    /// Marks the role as system-managed.
    #[must_use]
    pub fn into_system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the unique role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the parent role, if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<RoleId> {
        self.parent_id
    }

    /// Returns the cached tree depth, `0` for roots.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Returns whether the role is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns whether the role is protected from mutation.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// Returns the level a direct child of this role must carry.
    pub fn child_level(&self) -> AppResult<u32> {
        self.level.checked_add(1).ok_or_else(|| {
            AppError::Validation(format!("role '{}' hierarchy is too deep", self.name))
        })
    }

    /// Renames the role.
    pub fn rename(&mut self, name: impl Into<String>) -> AppResult<()> {
        self.name = NonEmptyString::new(name)?;
        Ok(())
    }

    /// Moves the role below `parent` (or to the root) and updates its level.
    ///
    /// Callers are responsible for rejecting cycles and for updating the
    /// levels of the moved subtree.
    pub fn attach_to(&mut self, parent: Option<&Role>) -> AppResult<()> {
        match parent {
            Some(parent) if parent.id == self.id => Err(AppError::Validation(format!(
                "role '{}' cannot be its own parent",
                self.name
            ))),
            Some(parent) => {
                self.level = parent.child_level()?;
                self.parent_id = Some(parent.id);
                Ok(())
            }
            None => {
                self.level = 0;
                self.parent_id = None;
                Ok(())
            }
        }
    }

    /// Overwrites the cached level.
    pub fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    /// Activates or deactivates the role.
    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }
}
