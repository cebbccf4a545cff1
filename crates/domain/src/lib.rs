//! Domain entities and invariants for role-based authorization.

#![forbid(unsafe_code)]

mod assignment;
mod constraint;
mod context;
mod permission;
mod role;
mod security;

pub use assignment::{AssignmentScope, RolePermission, UserRole, UserRoleInput};
pub use constraint::{
    ConstraintEvaluation, ConstraintOperator, ConstraintSet, MissingContextKeyPolicy,
};
pub use context::AccessContext;
pub use permission::{Permission, PermissionAction};
pub use role::Role;
pub use security::AuditAction;
