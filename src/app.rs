/*
 * Responsibility
 * - config -> dependencies -> router
 * - router-level middleware (http, cors, security headers)
 * - axum::serve() with graceful shutdown
 */
use anyhow::Context;
use axum::{Router, routing::get};
use sqlx::postgres::PgPoolOptions;
use std::{panic, process, sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::health::health;
use crate::config::Config;
use crate::middleware;
use crate::repos::{directory_repo::DirectoryRepo, role_catalog_repo::RoleCatalogRepo};
use crate::services::audit::{AuditSink, TracingAuditSink};
use crate::services::auth::{
    directory::Directory,
    error::AuthError,
    jwt::JwtCodec,
    login_service::LoginService,
    token_issuer::{TokenIssuer, TokenLifetimes},
};
use crate::services::cache::{CacheClient, ValkeyClient};
use crate::services::rbac::{catalog::RoleCatalog, resolver::PermissionResolver};
use crate::services::session::{cache::SessionCache, manager::SessionManager};
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG wins; e.g. RUST_LOG=info,auth_hub=debug,audit=info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash loudly. Production: default hook, keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting auth hub in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("auth hub stopped");
    Ok(())
}

async fn build_state(config: &Config) -> anyhow::Result<AppState<ValkeyClient>> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        tracing::info!("migrations applied");
    }

    let cache = ValkeyClient::new(&config.valkey_url)
        .await
        .context("failed to connect to Valkey")?;

    let state = wire(
        config,
        cache,
        Arc::new(DirectoryRepo::new(pool.clone())),
        Arc::new(RoleCatalogRepo::new(pool)),
        Arc::new(TracingAuditSink),
    )?;
    Ok(state)
}

/// Assemble the service graph over the given collaborators.
///
/// Everything is built once here and passed down; nothing is global.
pub fn wire<C: CacheClient>(
    config: &Config,
    cache: C,
    directory: Arc<dyn Directory>,
    catalog: Arc<dyn RoleCatalog>,
    audit: Arc<dyn AuditSink>,
) -> Result<AppState<C>, AuthError> {
    let jwt = JwtCodec::new(
        config.jwt_secret.as_bytes(),
        config.issuer.clone(),
        config.token_leeway_seconds,
    )?;
    let lifetimes = TokenLifetimes {
        access: config.access_token_ttl(),
        refresh: config.refresh_token_ttl(),
    };
    let issuer = TokenIssuer::new(jwt, lifetimes);

    // Indexes must outlive every session they list.
    let index_ttl = lifetimes.longest() + Duration::from_secs(config.token_leeway_seconds);
    let session_cache = SessionCache::new(Arc::new(cache), config.cache_key_prefix.clone(), index_ttl);
    tracing::info!(backend = session_cache.backend_name(), "session cache ready");

    let sessions = SessionManager::new(issuer, session_cache, audit.clone(), config.blacklist_ttl());
    let auth = LoginService::new(
        directory,
        PermissionResolver::new(catalog),
        Arc::new(sessions),
        audit,
    );

    Ok(AppState::new(Arc::new(auth)))
}

pub fn build_router<C: CacheClient>(state: AppState<C>, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api::v1::routes())
        .with_state(state);

    let router = middleware::security_headers::apply(router);
    let router = middleware::cors::apply(router, config);
    middleware::http::apply(router, config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
