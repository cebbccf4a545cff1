use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_core::AppResult;

/// Per-resource-type ownership predicate supplied by the hosting application.
#[async_trait]
pub trait OwnershipResolver: Send + Sync {
    /// Returns whether `user_id` owns the resource instance `resource_id`.
    async fn is_owner(&self, user_id: &str, resource_id: &str) -> AppResult<bool>;
}

/// Registry of ownership resolvers keyed by resource namespace.
///
/// Resource types without a resolver never establish ownership.
#[derive(Clone, Default)]
pub struct OwnershipRegistry {
    resolvers: HashMap<String, Arc<dyn OwnershipResolver>>,
}

impl OwnershipRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the resolver for one resource namespace.
    #[must_use]
    pub fn with_resolver(
        mut self,
        resource: impl Into<String>,
        resolver: Arc<dyn OwnershipResolver>,
    ) -> Self {
        self.resolvers.insert(resource.into(), resolver);
        self
    }

    /// Returns the resolver registered for a resource namespace.
    #[must_use]
    pub fn resolver_for(&self, resource: &str) -> Option<&Arc<dyn OwnershipResolver>> {
        self.resolvers.get(resource)
    }
}

impl std::fmt::Debug for OwnershipRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut resources: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        resources.sort_unstable();
        formatter
            .debug_struct("OwnershipRegistry")
            .field("resources", &resources)
            .finish()
    }
}
