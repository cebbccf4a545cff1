//! Application services and ports.

#![forbid(unsafe_code)]

mod access_admin_service;
mod authorization_service;
mod config;
mod invalidation_service;
mod permission_aggregator;
mod ports;
mod role_hierarchy_service;

#[cfg(test)]
mod testing;

pub use access_admin_service::{AccessAdminService, CreatePermissionInput, UpdatePermissionInput};
pub use authorization_service::{AuthorizationDecision, AuthorizationService, DecisionDetail};
pub use config::{AuthorizationConfig, DEFAULT_CACHE_KEY_PREFIX, DEFAULT_CACHE_TTL_SECONDS};
pub use invalidation_service::{InvalidationReport, InvalidationService};
pub use permission_aggregator::{
    CacheKeys, EffectivePermission, PermissionAggregator, RolePermissionSet, UserPermission,
    UserPermissionSet,
};
pub use ports::{
    AccessAdminStore, AccessStore, AuditEvent, AuditSink, IdentitySource, OwnershipRegistry,
    OwnershipResolver, PermissionCache, RoleGrant,
};
pub use role_hierarchy_service::RoleHierarchyService;
