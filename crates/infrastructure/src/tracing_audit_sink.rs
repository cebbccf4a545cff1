use async_trait::async_trait;
use tracing::info;

use gatehouse_application::{AuditEvent, AuditSink};
use gatehouse_core::AppResult;

/// Audit sink that writes each event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Creates a tracing-backed sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        let detail = event
            .detail
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        info!(
            target: "gatehouse::audit",
            subject = %event.subject,
            action = event.action.as_str(),
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            detail = %detail,
            "audit event"
        );

        Ok(())
    }
}
