use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use super::AppState;
use crate::database::connection::ConnectionFactory;
use crate::tenancy::store::with_timeout;

/// GET / - service information
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "tenant-db-router",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Routes authenticated requests to per-tenant PostgreSQL pools",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "whoami": "/api/whoami, /api/t/:tenant/whoami (JWT + tenant)",
                "root": "/api/root/* (JWT with root access)",
            }
        }
    }))
}

/// GET /health - master store reachability plus cached pool health.
/// Unhealthy tenant pools are reported but do not fail the check.
pub async fn health<F: ConnectionFactory>(State(state): State<AppState<F>>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let registry = state.resolver.registry();

    let master = with_timeout(registry.connect_timeout(), state.resolver.store().ping()).await;
    let failures = registry.health_check_all().await;
    let active = registry.active_connections_count().await;
    let unhealthy: Vec<_> = failures.keys().collect();

    match master {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": if unhealthy.is_empty() { "ok" } else { "degraded" },
                    "timestamp": now,
                    "master_store": "ok",
                    "active_connections": active,
                    "unhealthy_tenants": unhealthy,
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check: master store unreachable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": true,
                    "message": "Tenant registry unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "unavailable",
                        "timestamp": now,
                        "master_store": "unavailable",
                        "active_connections": active,
                        "unhealthy_tenants": unhealthy,
                    }
                })),
            )
        }
    }
}
