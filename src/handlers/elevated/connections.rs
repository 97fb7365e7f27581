use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::database::registry::ConnectionStats;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct ConnectionList {
    pub count: usize,
    pub connections: Vec<ConnectionStats>,
}

/// GET /api/root/connections
pub async fn list<F: ConnectionFactory>(State(state): State<AppState<F>>) -> ApiResult<ConnectionList> {
    let connections = state.resolver.registry().snapshot().await;
    Ok(ApiResponse::success(ConnectionList {
        count: connections.len(),
        connections,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct EvictRequest {
    pub max_idle_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct EvictResult {
    pub max_idle_secs: u64,
    pub evicted: Vec<Uuid>,
    pub remaining: usize,
}

/// POST /api/root/connections/evict
pub async fn evict<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    body: Option<Json<EvictRequest>>,
) -> ApiResult<EvictResult> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let max_idle = request
        .max_idle_secs
        .map(Duration::from_secs)
        .unwrap_or(state.idle_eviction);

    let registry = state.resolver.registry();
    let evicted = registry.evict_idle(max_idle).await;
    tracing::info!("Root eviction (idle >= {:?}) removed {} connection(s)", max_idle, evicted.len());

    Ok(ApiResponse::success(EvictResult {
        max_idle_secs: max_idle.as_secs(),
        evicted,
        remaining: registry.active_connections_count().await,
    }))
}
