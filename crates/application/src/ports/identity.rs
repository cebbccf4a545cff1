use async_trait::async_trait;
use gatehouse_core::{AppResult, UserIdentity};

/// Port supplying the authenticated caller of a request.
///
/// Verification of the credential happens inside the implementation; this
/// core only consumes the resolved identity.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Resolves a request credential into an identity, or `None` when unknown.
    async fn resolve_identity(&self, credential: &str) -> AppResult<Option<UserIdentity>>;
}
