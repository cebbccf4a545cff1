use std::env;
use std::str::FromStr;

use gatehouse_application::AuthorizationConfig;
use gatehouse_core::{AppError, AppResult};
use gatehouse_domain::MissingContextKeyPolicy;
use tracing_subscriber::EnvFilter;

/// Where permission sets are cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendConfig {
    InMemory,
    Redis { redis_url: String },
}

/// Where audit events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSinkConfig {
    Tracing,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub database_url: Option<String>,
    pub cache_backend: CacheBackendConfig,
    pub audit_sink: AuditSinkConfig,
    pub authorization: AuthorizationConfig,
}

impl CliConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = optional("DATABASE_URL");

        let cache_backend = match optional("AUTHZ_CACHE_BACKEND")
            .unwrap_or_else(|| "in_memory".to_owned())
            .as_str()
        {
            "in_memory" => CacheBackendConfig::InMemory,
            "redis" => CacheBackendConfig::Redis {
                redis_url: optional("REDIS_URL").ok_or_else(|| {
                    AppError::Validation(
                        "REDIS_URL is required when AUTHZ_CACHE_BACKEND is 'redis'".to_owned(),
                    )
                })?,
            },
            other => {
                return Err(AppError::Validation(format!(
                    "AUTHZ_CACHE_BACKEND must be either 'in_memory' or 'redis', got '{other}'"
                )));
            }
        };

        let audit_sink = match optional("AUTHZ_AUDIT_SINK")
            .unwrap_or_else(|| "tracing".to_owned())
            .as_str()
        {
            "tracing" => AuditSinkConfig::Tracing,
            "postgres" if database_url.is_some() => AuditSinkConfig::Postgres,
            "postgres" => {
                return Err(AppError::Validation(
                    "DATABASE_URL is required when AUTHZ_AUDIT_SINK is 'postgres'".to_owned(),
                ));
            }
            other => {
                return Err(AppError::Validation(format!(
                    "AUTHZ_AUDIT_SINK must be either 'tracing' or 'postgres', got '{other}'"
                )));
            }
        };

        let mut authorization = AuthorizationConfig::default();
        if let Some(ttl) = optional("AUTHZ_CACHE_TTL_SECONDS") {
            authorization = authorization
                .with_cache_ttl_seconds(parse_env("AUTHZ_CACHE_TTL_SECONDS", ttl.as_str())?);
        }
        if let Some(prefix) = optional("AUTHZ_CACHE_KEY_PREFIX") {
            authorization = authorization.with_cache_key_prefix(prefix);
        }
        if let Some(policy) = optional("AUTHZ_MISSING_CONTEXT_KEY_POLICY") {
            let policy = MissingContextKeyPolicy::from_str(policy.as_str()).map_err(|error| {
                AppError::Validation(format!("invalid AUTHZ_MISSING_CONTEXT_KEY_POLICY: {error}"))
            })?;
            authorization = authorization.with_missing_context_key_policy(policy);
        }
        if let Some(attempts) = optional("AUTHZ_INVALIDATION_MAX_ATTEMPTS") {
            let backoff_ms = authorization.invalidation_retry_backoff_ms;
            authorization = authorization.with_invalidation_retries(
                parse_env("AUTHZ_INVALIDATION_MAX_ATTEMPTS", attempts.as_str())?,
                backoff_ms,
            );
        }

        Ok(Self {
            database_url,
            cache_backend,
            audit_sink,
            authorization,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_env<T>(name: &str, value: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))
}
