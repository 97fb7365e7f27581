use anyhow::Context;
use axum::http::HeaderValue;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::crypto::CredentialCipher;
use crate::database::connection::PgConnectionFactory;
use crate::database::provision::{PgTenantProvisioner, ProvisioningJobs};
use crate::database::registry::{spawn_idle_eviction, ConnectionRegistry};
use crate::handlers::{self, AppState};
use crate::middleware::{AuthState, TenantExtractionConfig};
use crate::tenancy::resolver::TenantResolver;
use crate::tenancy::store::{PgTenantStore, TenantStore};

pub async fn handle(config: &AppConfig) -> anyhow::Result<()> {
    config.validate().map_err(anyhow::Error::msg)?;
    info!("Starting tenant-db-router in {:?} mode", config.environment);

    // Lazy so the process comes up (and reports 503 on /health) while the master store is down
    let master = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
        .connect_lazy(&config.database.url)
        .context("invalid DATABASE_URL")?;

    let store: Arc<dyn TenantStore> = Arc::new(PgTenantStore::new(master.clone()));
    let cipher = Arc::new(CredentialCipher::new(&config.security.encryption_key)?);
    let registry = Arc::new(ConnectionRegistry::new(
        PgConnectionFactory::new(config.tenant_pool.pool_config()),
        config.tenant_pool.registry_config(),
    ));
    let resolver = Arc::new(TenantResolver::new(store.clone(), registry.clone(), cipher));

    let provisioner = PgTenantProvisioner::new(&config.database.url, config.tenancy.template_database.clone())?;
    let jobs = Arc::new(ProvisioningJobs::new(store, Arc::new(provisioner)));

    let idle_eviction = Duration::from_secs(config.tenancy.idle_eviction_secs);
    let state = AppState {
        resolver,
        jobs,
        extraction: Arc::new(TenantExtractionConfig::from(&config.tenancy)),
        auth: AuthState::new(&config.security.jwt_secret),
        idle_eviction,
    };

    let eviction = spawn_idle_eviction(
        registry.clone(),
        idle_eviction,
        Duration::from_secs(config.tenancy.eviction_interval_secs.max(1)),
    );

    let mut app = handlers::router(state).layer(TraceLayer::new_for_http());
    if config.security.enable_cors {
        app = app.layer(cors_layer(config));
    }

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    eviction.abort();
    let closed = registry.close_all().await;
    master.close().await;
    info!("Shutdown complete, closed {} tenant connection(s)", closed);
    Ok(())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.is_production() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
