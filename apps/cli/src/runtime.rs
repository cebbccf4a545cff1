use std::sync::Arc;

use gatehouse_application::{
    AccessAdminService, AccessAdminStore, AccessStore, AuditSink, AuthorizationService,
    InvalidationService, PermissionAggregator, PermissionCache, RoleHierarchyService,
};
use gatehouse_core::{AppError, AppResult};
use gatehouse_infrastructure::{
    InMemoryAccessStore, InMemoryPermissionCache, PostgresAccessStore, PostgresAuditSink,
    RedisPermissionCache, TracingAuditSink,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::cli_config::{AuditSinkConfig, CacheBackendConfig, CliConfig};

/// Services wired against the adapters selected by configuration.
pub struct Runtime {
    pub authorization: AuthorizationService,
    pub invalidation: InvalidationService,
    pub admin: AccessAdminService,
    pub persistent: bool,
}

pub async fn connect_and_migrate(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| {
            AppError::StoreUnavailable(format!("failed to connect to database: {error}"))
        })?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

pub async fn build_runtime(config: &CliConfig) -> AppResult<Runtime> {
    let pool = match config.database_url.as_deref() {
        Some(database_url) => Some(connect_and_migrate(database_url).await?),
        None => None,
    };

    let (store, admin_store) = match &pool {
        Some(pool) => store_ports(Arc::new(PostgresAccessStore::new(pool.clone()))),
        None => {
            info!("DATABASE_URL not set; using the in-memory access store");
            store_ports(Arc::new(InMemoryAccessStore::new()))
        }
    };

    let cache: Arc<dyn PermissionCache> = match &config.cache_backend {
        CacheBackendConfig::InMemory => Arc::new(InMemoryPermissionCache::new()),
        CacheBackendConfig::Redis { redis_url } => {
            let client = redis::Client::open(redis_url.as_str()).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL: {error}"))
            })?;
            // Cache keys already carry the configured namespace.
            Arc::new(RedisPermissionCache::new(client, ""))
        }
    };

    let audit_sink: Arc<dyn AuditSink> = match (config.audit_sink, &pool) {
        (AuditSinkConfig::Postgres, Some(pool)) => Arc::new(PostgresAuditSink::new(pool.clone())),
        (AuditSinkConfig::Postgres, None) => {
            return Err(AppError::Validation(
                "DATABASE_URL is required when AUTHZ_AUDIT_SINK is 'postgres'".to_owned(),
            ));
        }
        (AuditSinkConfig::Tracing, _) => Arc::new(TracingAuditSink::new()),
    };

    let authorization_config = &config.authorization;
    let hierarchy = RoleHierarchyService::new(store.clone());
    let aggregator = PermissionAggregator::new(store.clone(), cache.clone(), authorization_config);
    let invalidation = InvalidationService::new(
        store.clone(),
        cache,
        hierarchy.clone(),
        authorization_config,
    );
    let authorization = AuthorizationService::new(
        store,
        aggregator,
        audit_sink.clone(),
        authorization_config,
    );
    let admin = AccessAdminService::new(admin_store, hierarchy, invalidation.clone(), audit_sink);

    Ok(Runtime {
        authorization,
        invalidation,
        admin,
        persistent: pool.is_some(),
    })
}

fn store_ports<S>(store: Arc<S>) -> (Arc<dyn AccessStore>, Arc<dyn AccessAdminStore>)
where
    S: AccessAdminStore + 'static,
{
    let read_store: Arc<dyn AccessStore> = store.clone();
    let admin_store: Arc<dyn AccessAdminStore> = store;
    (read_store, admin_store)
}
