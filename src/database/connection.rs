use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::CipherError;

/// Errors raised while building or opening a tenant connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Invalid connection parameters: {0}")]
    InvalidParameters(String),

    #[error("Credential decryption failed: {0}")]
    Credential(#[from] CipherError),

    #[error("Tenant database unavailable: {0}")]
    Unavailable(String),

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Decrypted database password. Never printed by Debug.
#[derive(Clone)]
pub struct DbPassword(String);

impl DbPassword {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DbPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DbPassword(***)")
    }
}

/// Everything needed to open one tenant pool. Built per creation attempt, never stored.
#[derive(Debug, Clone)]
pub struct TenantConnectionInfo {
    pub tenant_id: Uuid,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: DbPassword,
    pub database: String,
    pub ssl_mode: String,
}

impl TenantConnectionInfo {
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.host.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters("empty host".to_string()));
        }
        if self.port == 0 {
            return Err(ConnectionError::InvalidParameters("port must be non-zero".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters("empty user".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters("empty database name".to_string()));
        }
        Ok(())
    }

    /// DSN with the password masked, safe for logs
    pub fn redacted_dsn(&self) -> String {
        let base = format!("postgres://{}:{}/{}", self.host, self.port, self.database);
        match url::Url::parse(&base) {
            Ok(mut url) => {
                let _ = url.set_username(&self.user);
                let _ = url.set_password(Some("***"));
                url.query_pairs_mut().append_pair("sslmode", &self.ssl_mode);
                url.into()
            }
            Err(_) => base,
        }
    }
}

/// Opens, probes and closes physical tenant pools.
///
/// The registry is generic over this trait so the caching rules can be
/// exercised without a database.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    async fn open(&self, info: &TenantConnectionInfo) -> Result<Self::Handle, ConnectionError>;

    async fn ping(&self, handle: &Self::Handle) -> Result<(), ConnectionError>;

    async fn close(&self, handle: Self::Handle);

    /// Name of the database the handle is connected to, as the server reports it
    async fn current_database(&self, handle: &Self::Handle) -> Result<String, ConnectionError>;

    /// True while a request still holds a connection from this handle
    fn in_use(&self, _handle: &Self::Handle) -> bool {
        false
    }
}

/// Pool limits applied identically to every tenant
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(5 * 60),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// PostgreSQL implementation backed by sqlx pools
#[derive(Debug, Clone, Default)]
pub struct PgConnectionFactory {
    pool: PoolConfig,
}

impl PgConnectionFactory {
    pub fn new(pool: PoolConfig) -> Self {
        Self { pool }
    }

    fn connect_options(info: &TenantConnectionInfo) -> Result<PgConnectOptions, ConnectionError> {
        info.validate()?;
        let ssl_mode: PgSslMode = info.ssl_mode.parse().map_err(|_| {
            ConnectionError::InvalidParameters(format!("unknown sslmode '{}'", info.ssl_mode))
        })?;

        Ok(PgConnectOptions::new()
            .host(&info.host)
            .port(info.port)
            .username(&info.user)
            .password(info.password.expose())
            .database(&info.database)
            .ssl_mode(ssl_mode))
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Handle = PgPool;

    async fn open(&self, info: &TenantConnectionInfo) -> Result<PgPool, ConnectionError> {
        let options = Self::connect_options(info)?;
        debug!("Opening tenant pool {} -> {}", info.tenant_id, info.redacted_dsn());

        let pool = PgPoolOptions::new()
            .max_connections(self.pool.max_connections)
            .min_connections(self.pool.min_connections)
            .max_lifetime(self.pool.max_lifetime)
            .idle_timeout(self.pool.idle_timeout)
            .acquire_timeout(self.pool.acquire_timeout)
            .connect_with(options)
            .await?;

        info!("Opened tenant pool for {} ({})", info.tenant_id, info.database);
        Ok(pool)
    }

    async fn ping(&self, handle: &PgPool) -> Result<(), ConnectionError> {
        sqlx::query("SELECT 1").execute(handle).await?;
        Ok(())
    }

    async fn close(&self, handle: PgPool) {
        handle.close().await;
    }

    async fn current_database(&self, handle: &PgPool) -> Result<String, ConnectionError> {
        let (name,): (String,) = sqlx::query_as("SELECT current_database()")
            .fetch_one(handle)
            .await?;
        Ok(name)
    }

    fn in_use(&self, handle: &PgPool) -> bool {
        (handle.size() as usize) > handle.num_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> TenantConnectionInfo {
        TenantConnectionInfo {
            tenant_id: Uuid::new_v4(),
            host: "db.internal".to_string(),
            port: 5432,
            user: "acme_app".to_string(),
            password: DbPassword::new("s3cret"),
            database: "tenant_acme".to_string(),
            ssl_mode: "require".to_string(),
        }
    }

    #[test]
    fn redacted_dsn_hides_password() {
        let dsn = info().redacted_dsn();
        assert!(dsn.starts_with("postgres://acme_app:"));
        assert!(dsn.contains("@db.internal:5432/tenant_acme"));
        assert!(dsn.ends_with("sslmode=require"));
        assert!(!dsn.contains("s3cret"));
    }

    #[test]
    fn debug_hides_password() {
        let rendered = format!("{:?}", info());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("DbPassword(***)"));
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut bad = info();
        bad.host = String::new();
        assert!(matches!(bad.validate(), Err(ConnectionError::InvalidParameters(_))));

        let mut bad = info();
        bad.port = 0;
        assert!(bad.validate().is_err());

        let mut bad = info();
        bad.database = " ".to_string();
        assert!(bad.validate().is_err());

        assert!(info().validate().is_ok());
    }

    #[test]
    fn connect_options_reject_unknown_sslmode() {
        let mut bad = info();
        bad.ssl_mode = "sometimes".to_string();
        assert!(matches!(
            PgConnectionFactory::connect_options(&bad),
            Err(ConnectionError::InvalidParameters(_))
        ));
        assert!(PgConnectionFactory::connect_options(&info()).is_ok());
    }
}
