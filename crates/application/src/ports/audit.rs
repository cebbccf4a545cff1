use async_trait::async_trait;
use gatehouse_core::AppResult;
use gatehouse_domain::AuditAction;
use serde_json::Value;

/// Immutable audit event payload emitted by application services.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// Subject that performed or requested the action.
    pub subject: String,
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Optional structured detail payload.
    pub detail: Option<Value>,
}

/// Port for recording decision and mutation events.
///
/// Failures are logged by callers and never change an authorization outcome.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one audit event.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}
