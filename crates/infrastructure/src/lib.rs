//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_access_store;
mod in_memory_permission_cache;
mod postgres_access_store;
mod postgres_audit_sink;
mod redis_permission_cache;
mod tracing_audit_sink;

pub use in_memory_access_store::InMemoryAccessStore;
pub use in_memory_permission_cache::InMemoryPermissionCache;
pub use postgres_access_store::PostgresAccessStore;
pub use postgres_audit_sink::PostgresAuditSink;
pub use redis_permission_cache::RedisPermissionCache;
pub use tracing_audit_sink::TracingAuditSink;
