use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::models::{MembershipRecord, MembershipStatus, TenantRecord, TenantStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Tenant not found: {0}")]
    TenantNotFound(Uuid),

    #[error("Malformed master store row: {0}")]
    Corrupt(String),

    #[error("Master store did not answer within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Bound a master store call; an elapsed deadline is a store failure
pub async fn with_timeout<T, Fut>(limit: Duration, call: Fut) -> Result<T, StoreError>
where
    Fut: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Read path into the master store (plus the status write used by provisioning
/// and administration). No caching: every call reads the store.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn resolve_by_slug(
        &self,
        organization_id: Uuid,
        slug: &str,
    ) -> Result<Option<TenantRecord>, StoreError>;

    async fn find_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError>;

    async fn get_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<MembershipRecord>, StoreError>;

    async fn set_status(&self, tenant_id: Uuid, status: TenantStatus) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

const TENANT_COLUMNS: &str = r#"
    id, organization_id, slug, status,
    db_host, db_port, db_user, db_name, db_ssl_mode, encrypted_password
"#;

/// Master store on PostgreSQL.
///
/// Expects `tenants(id, organization_id, slug, status, db_host, db_port,
/// db_user, db_name, db_ssl_mode, encrypted_password)` and
/// `tenant_memberships(user_id, tenant_id, role, status)`.
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn tenant_from_row(row: &PgRow) -> Result<TenantRecord, StoreError> {
        let status: String = row.try_get("status")?;
        let port: i32 = row.try_get("db_port")?;

        Ok(TenantRecord {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            slug: row.try_get("slug")?,
            status: status.parse().map_err(StoreError::Corrupt)?,
            db_host: row.try_get("db_host")?,
            db_port: u16::try_from(port)
                .map_err(|_| StoreError::Corrupt(format!("db_port out of range: {}", port)))?,
            db_user: row.try_get("db_user")?,
            db_name: row.try_get("db_name")?,
            db_ssl_mode: row.try_get("db_ssl_mode")?,
            encrypted_password: row.try_get("encrypted_password")?,
        })
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn resolve_by_slug(
        &self,
        organization_id: Uuid,
        slug: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        let query = format!(
            "SELECT {} FROM tenants WHERE organization_id = $1 AND slug = $2",
            TENANT_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(organization_id)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::tenant_from_row).transpose()
    }

    async fn find_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        let query = format!("SELECT {} FROM tenants WHERE id = $1", TENANT_COLUMNS);

        let row = sqlx::query(&query)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::tenant_from_row).transpose()
    }

    async fn get_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<MembershipRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, tenant_id, role, status
            FROM tenant_memberships
            WHERE user_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        Ok(Some(MembershipRecord {
            user_id: row.try_get("user_id")?,
            tenant_id: row.try_get("tenant_id")?,
            role: row.try_get("role")?,
            status: status.parse::<MembershipStatus>().map_err(StoreError::Corrupt)?,
        }))
    }

    async fn set_status(&self, tenant_id: Uuid, status: TenantStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE tenants SET status = $2 WHERE id = $1")
            .bind(tenant_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TenantNotFound(tenant_id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
