//! casgate: a CAS 2.0 client service.
//!
//! Validates service and proxy tickets against a remote CAS server, opens
//! local sessions, keeps proxy-granting tickets for later proxy ticket
//! requests, and honours single sign-out notifications.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod auth;
pub mod cas;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod retention;
pub mod routes;

use crate::{
    auth::{CasBackend, MemorySessionStore, SharedSessionStore},
    cas::{CasServices, CasSetupError},
    config::CasgateConfig,
    db::{DbError, DbPool},
};

/// Failure to assemble the application from configuration.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("database setup failed: {0}")]
    Database(#[from] DbError),

    #[error("CAS client setup failed: {0}")]
    Cas(#[from] CasSetupError),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CasgateConfig>,
    pub db: Arc<DbPool>,
    pub cas: Arc<CasServices>,
    pub backend: Arc<CasBackend>,
    pub sessions: SharedSessionStore,
}

impl AppState {
    /// Connect to the configured database and build every component.
    pub async fn new(config: CasgateConfig) -> Result<Self, StartupError> {
        let db = DbPool::from_config(&config.database).await?;
        Self::with_db(config, db)
    }

    /// Build every component on top of an existing pool.
    pub fn with_db(config: CasgateConfig, db: DbPool) -> Result<Self, StartupError> {
        let cas = CasServices::from_config(&config.cas, &db)?;

        tracing::debug!(
            cas_server = %config.cas.server_url,
            timeout_secs = config.cas.http.timeout_secs,
            proxy_enabled = config.cas.proxy_enabled(),
            single_sign_out = config.cas.single_sign_out,
            database = db.backend_name(),
            "CAS client configured"
        );

        let backend = CasBackend::new(
            Arc::clone(&cas.validator),
            db.users(),
            db.session_tickets(),
            config.cas.single_sign_out,
        );

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            cas: Arc::new(cas),
            backend: Arc::new(backend),
            sessions: Arc::new(MemorySessionStore::new()),
        })
    }
}

pub fn build_app(config: &CasgateConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness));

    if config.observability.metrics.enabled {
        app = app.route("/metrics", get(routes::health::metrics));
    }

    app.nest("/cas", routes::cas_routes())
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(tower_cookies::CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}
