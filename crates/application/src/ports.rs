mod audit;
mod cache;
mod identity;
mod ownership;
mod store;

pub use audit::{AuditEvent, AuditSink};
pub use cache::PermissionCache;
pub use identity::IdentitySource;
pub use ownership::{OwnershipRegistry, OwnershipResolver};
pub use store::{AccessAdminStore, AccessStore, RoleGrant};
