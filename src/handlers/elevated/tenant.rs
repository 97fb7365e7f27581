use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::database::provision::ProvisioningJob;
use crate::database::registry::ConnectionStats;
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::models::{TenantRecord, TenantStatus};
use crate::tenancy::resolver::ResolutionError;

async fn load_tenant<F: ConnectionFactory>(state: &AppState<F>, id: Uuid) -> Result<TenantRecord, ApiError> {
    state
        .resolver
        .store()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            message: "Tenant not found".to_string(),
            code: "TENANT_NOT_FOUND",
        })
}

#[derive(Debug, Serialize)]
pub struct CloseResult {
    pub tenant_id: Uuid,
    pub closed: bool,
}

/// DELETE /api/root/tenant/:id/connection
pub async fn close_connection<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(id): Path<Uuid>,
) -> ApiResult<CloseResult> {
    let closed = state.resolver.registry().close(id).await;
    Ok(ApiResponse::success(CloseResult { tenant_id: id, closed }))
}

/// POST /api/root/tenant/:id/connection/refresh
///
/// Reconnects with whatever credentials the master store holds now.
pub async fn refresh_connection<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(id): Path<Uuid>,
) -> ApiResult<ConnectionStats> {
    let tenant = load_tenant(&state, id).await?;
    if !tenant.status.is_active() {
        return Err(ResolutionError::TenantNotActive {
            slug: tenant.slug,
            status: tenant.status,
        }
        .into());
    }

    state.resolver.refresh(&tenant).await?;
    tracing::info!("Refreshed connection for tenant {} ({})", tenant.slug, tenant.id);

    let stats = state
        .resolver
        .registry()
        .snapshot()
        .await
        .into_iter()
        .find(|s| s.tenant_id == id)
        .ok_or_else(|| ApiError::service_unavailable(crate::error::TENANT_DB_UNAVAILABLE))?;
    Ok(ApiResponse::success(stats))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: TenantStatus,
}

#[derive(Debug, Serialize)]
pub struct StatusResult {
    pub tenant_id: Uuid,
    pub status: TenantStatus,
    pub connection_closed: bool,
}

/// PUT /api/root/tenant/:id/status
///
/// Leaving `active` drops the cached connection so in-flight credentials
/// stop being reused.
pub async fn update_status<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<StatusResult> {
    state.resolver.store().set_status(id, update.status).await?;

    let connection_closed = if update.status.is_active() {
        false
    } else {
        state.resolver.registry().close(id).await
    };
    tracing::info!("Tenant {} status set to {}", id, update.status);

    Ok(ApiResponse::success(StatusResult {
        tenant_id: id,
        status: update.status,
        connection_closed,
    }))
}

/// POST /api/root/tenant/:id/provision
pub async fn provision_start<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProvisioningJob> {
    let job = state.jobs.start(id).await?;
    Ok(ApiResponse::accepted(job))
}

#[derive(Debug, Serialize)]
pub struct ProvisionStatus {
    pub tenant_id: Uuid,
    pub tenant_status: Option<TenantStatus>,
    pub job: Option<ProvisioningJob>,
}

/// GET /api/root/tenant/:id/provision
pub async fn provision_status<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProvisionStatus> {
    let job = state.jobs.status(id).await;
    let tenant = state.resolver.store().find_by_id(id).await?;

    if job.is_none() && tenant.is_none() {
        return Err(ApiError::NotFound {
            message: "Tenant not found".to_string(),
            code: "TENANT_NOT_FOUND",
        });
    }

    Ok(ApiResponse::success(ProvisionStatus {
        tenant_id: id,
        tenant_status: tenant.map(|t| t.status),
        job,
    }))
}
