// Three tiers, same as the middleware stack applied to them:
// public (no auth) -> protected (JWT + tenant resolution) -> elevated (JWT + root)
pub mod elevated;
pub mod protected;
pub mod public;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;

use crate::database::connection::{ConnectionFactory, PgConnectionFactory};
use crate::database::provision::ProvisioningJobs;
use crate::middleware::{
    jwt_auth_middleware, require_root_middleware, resolve_tenant_middleware, AuthState,
    TenantExtractionConfig, TenantState,
};
use crate::tenancy::resolver::TenantResolver;

/// Shared state for every route
pub struct AppState<F: ConnectionFactory = PgConnectionFactory> {
    pub resolver: Arc<TenantResolver<F>>,
    pub jobs: Arc<ProvisioningJobs>,
    pub extraction: Arc<TenantExtractionConfig>,
    pub auth: AuthState,
    /// Default threshold for on-demand eviction
    pub idle_eviction: Duration,
}

impl<F: ConnectionFactory> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            jobs: self.jobs.clone(),
            extraction: self.extraction.clone(),
            auth: self.auth.clone(),
            idle_eviction: self.idle_eviction,
        }
    }
}

impl<F: ConnectionFactory> AppState<F> {
    pub fn tenant_state(&self) -> TenantState<F> {
        TenantState {
            resolver: self.resolver.clone(),
            extraction: self.extraction.clone(),
        }
    }
}

pub fn router<F: ConnectionFactory>(state: AppState<F>) -> Router {
    let tenant_scoped = Router::new()
        .route("/api/whoami", get(protected::whoami::<F>))
        .route("/api/t/:tenant/whoami", get(protected::whoami::<F>))
        .route_layer(middleware::from_fn_with_state(
            state.tenant_state(),
            resolve_tenant_middleware::<F>,
        ));

    let root = Router::new()
        .route("/api/root/connections", get(elevated::connections::list::<F>))
        .route("/api/root/connections/evict", post(elevated::connections::evict::<F>))
        .route(
            "/api/root/tenant/:id/connection",
            delete(elevated::tenant::close_connection::<F>),
        )
        .route(
            "/api/root/tenant/:id/connection/refresh",
            post(elevated::tenant::refresh_connection::<F>),
        )
        .route("/api/root/tenant/:id/status", put(elevated::tenant::update_status::<F>))
        .route(
            "/api/root/tenant/:id/provision",
            post(elevated::tenant::provision_start::<F>).get(elevated::tenant::provision_status::<F>),
        )
        .route_layer(middleware::from_fn(require_root_middleware));

    let api = tenant_scoped
        .merge(root)
        .route_layer(middleware::from_fn_with_state(state.auth.clone(), jwt_auth_middleware));

    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health::<F>))
        .merge(api)
        .with_state(state)
}
