use axum::extract::{Extension, State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::AppState;
use crate::database::connection::ConnectionFactory;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::models::TenantContext;
use crate::tenancy::resolver::ResolutionError;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub tenant_id: Uuid,
    pub tenant_slug: String,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub database: String,
    pub resolved_at: DateTime<Utc>,
}

/// GET /api/whoami, /api/t/:tenant/whoami
///
/// Runs one round trip on the tenant connection so callers can confirm
/// which database their requests land in.
pub async fn whoami<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Extension(context): Extension<TenantContext<F::Handle>>,
) -> ApiResult<WhoAmI> {
    let database = state
        .resolver
        .registry()
        .factory()
        .current_database(&context.connection)
        .await
        .map_err(|e| ApiError::from(ResolutionError::from(e)))?;

    Ok(ApiResponse::success(WhoAmI {
        tenant_id: context.tenant_id,
        tenant_slug: context.tenant_slug,
        organization_id: context.organization_id,
        user_id: context.user_id,
        role: context.role,
        database,
        resolved_at: context.resolved_at,
    }))
}
