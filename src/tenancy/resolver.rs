use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{Identity, MembershipStatus, TenantContext, TenantRecord, TenantStatus};
use super::store::{with_timeout, StoreError, TenantStore};
use crate::crypto::{CipherError, CredentialCipher};
use crate::database::connection::{
    ConnectionError, ConnectionFactory, DbPassword, TenantConnectionInfo,
};
use crate::database::registry::ConnectionRegistry;

/// Why a request could not be routed to a tenant database
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Tenant not specified")]
    TenantNotSpecified,

    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Tenant '{slug}' is not active ({status})")]
    TenantNotActive { slug: String, status: TenantStatus },

    #[error("No membership for user {user_id} in tenant {tenant_id}")]
    MembershipNotFound { user_id: Uuid, tenant_id: Uuid },

    #[error("Membership for user {user_id} in tenant {tenant_id} is not active")]
    MembershipNotActive { user_id: Uuid, tenant_id: Uuid },

    #[error("Credential decryption failed: {0}")]
    CredentialDecryption(CipherError),

    #[error("Connection creation failed: {0}")]
    ConnectionCreation(ConnectionError),

    #[error("Tenant registry unavailable: {0}")]
    Store(#[from] StoreError),
}

impl From<ConnectionError> for ResolutionError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Credential(e) => ResolutionError::CredentialDecryption(e),
            other => ResolutionError::ConnectionCreation(other),
        }
    }
}

/// Decrypt the stored password and assemble connection parameters.
/// Only called from inside the registry's creation path.
pub fn build_connection_info(
    tenant: &TenantRecord,
    cipher: &CredentialCipher,
) -> Result<TenantConnectionInfo, ConnectionError> {
    let password = cipher.decrypt(&tenant.encrypted_password)?;
    Ok(TenantConnectionInfo {
        tenant_id: tenant.id,
        host: tenant.db_host.clone(),
        port: tenant.db_port,
        user: tenant.db_user.clone(),
        password: DbPassword::new(password),
        database: tenant.db_name.clone(),
        ssl_mode: tenant.db_ssl_mode.clone(),
    })
}

/// Turns `(identity, tenant slug)` into a `TenantContext` with a live handle
pub struct TenantResolver<F: ConnectionFactory> {
    store: Arc<dyn TenantStore>,
    registry: Arc<ConnectionRegistry<F>>,
    cipher: Arc<CredentialCipher>,
}

impl<F: ConnectionFactory> TenantResolver<F> {
    pub fn new(
        store: Arc<dyn TenantStore>,
        registry: Arc<ConnectionRegistry<F>>,
        cipher: Arc<CredentialCipher>,
    ) -> Self {
        Self {
            store,
            registry,
            cipher,
        }
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry<F>> {
        &self.registry
    }

    pub async fn resolve(
        &self,
        identity: &Identity,
        slug: &str,
    ) -> Result<TenantContext<F::Handle>, ResolutionError> {
        // Master store lookups share the creation deadline
        let limit = self.registry.connect_timeout();

        let tenant = with_timeout(limit, self.store.resolve_by_slug(identity.organization_id, slug))
            .await?
            .ok_or_else(|| ResolutionError::TenantNotFound(slug.to_string()))?;

        if !tenant.status.is_active() {
            return Err(ResolutionError::TenantNotActive {
                slug: tenant.slug,
                status: tenant.status,
            });
        }

        let membership = with_timeout(limit, self.store.get_membership(identity.user_id, tenant.id))
            .await?
            .ok_or(ResolutionError::MembershipNotFound {
                user_id: identity.user_id,
                tenant_id: tenant.id,
            })?;

        if membership.status != MembershipStatus::Active {
            warn!(
                "Membership of user {} in tenant {} is {}",
                identity.user_id,
                tenant.id,
                membership.status.as_str()
            );
            return Err(ResolutionError::MembershipNotActive {
                user_id: identity.user_id,
                tenant_id: tenant.id,
            });
        }

        let connection = self.connect(&tenant).await?;
        debug!("Resolved tenant '{}' ({}) for user {}", tenant.slug, tenant.id, identity.user_id);

        Ok(TenantContext {
            tenant_id: tenant.id,
            tenant_slug: tenant.slug,
            organization_id: tenant.organization_id,
            user_id: identity.user_id,
            role: membership.role,
            connection,
            resolved_at: Utc::now(),
        })
    }

    /// Cached handle for an already-authorized tenant
    pub async fn connect(&self, tenant: &TenantRecord) -> Result<F::Handle, ResolutionError> {
        let cipher = &self.cipher;
        let handle = self
            .registry
            .get_or_create(tenant.id, || async move { build_connection_info(tenant, cipher) })
            .await?;
        Ok(handle)
    }

    /// Drop the cached handle and reconnect with the current stored credentials
    pub async fn refresh(&self, tenant: &TenantRecord) -> Result<F::Handle, ResolutionError> {
        let cipher = &self.cipher;
        let handle = self
            .registry
            .refresh(tenant.id, || async move { build_connection_info(tenant, cipher) })
            .await?;
        Ok(handle)
    }
}
