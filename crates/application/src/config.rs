use gatehouse_domain::MissingContextKeyPolicy;

/// Default lifetime of cached permission sets.
pub const DEFAULT_CACHE_TTL_SECONDS: u32 = 3_600;

/// Default namespace for permission cache keys.
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "gatehouse:authz";

/// Tuning for permission aggregation, decisions and cache invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationConfig {
    /// Lifetime of cached role and user permission sets; `0` disables cache writes.
    pub cache_ttl_seconds: u32,
    /// Namespace prepended to every cache key.
    pub cache_key_prefix: String,
    /// Behaviour for constraint keys absent from the request context.
    pub missing_context_key_policy: MissingContextKeyPolicy,
    /// Attempts per cache eviction before a cascade reports failure.
    pub invalidation_max_attempts: u32,
    /// Base delay between eviction attempts, multiplied by the attempt number.
    pub invalidation_retry_backoff_ms: u64,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            cache_key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_owned(),
            missing_context_key_policy: MissingContextKeyPolicy::Skip,
            invalidation_max_attempts: 3,
            invalidation_retry_backoff_ms: 50,
        }
    }
}

impl AuthorizationConfig {
    /// Sets the cache entry lifetime.
    #[must_use]
    pub fn with_cache_ttl_seconds(mut self, cache_ttl_seconds: u32) -> Self {
        self.cache_ttl_seconds = cache_ttl_seconds;
        self
    }

    /// Sets the cache key namespace.
    #[must_use]
    pub fn with_cache_key_prefix(mut self, cache_key_prefix: impl Into<String>) -> Self {
        self.cache_key_prefix = cache_key_prefix.into();
        self
    }

    /// Sets the missing context key policy.
    #[must_use]
    pub fn with_missing_context_key_policy(mut self, policy: MissingContextKeyPolicy) -> Self {
        self.missing_context_key_policy = policy;
        self
    }

    /// Sets eviction retry behaviour. At least one attempt is always made.
    #[must_use]
    pub fn with_invalidation_retries(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.invalidation_max_attempts = max_attempts.max(1);
        self.invalidation_retry_backoff_ms = backoff_ms;
        self
    }
}
