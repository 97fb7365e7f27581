//! In-memory doubles for the connection factory and the master store.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::database::connection::{
    ConnectionError, ConnectionFactory, DbPassword, TenantConnectionInfo,
};
use crate::database::provision::{ProvisionError, TenantProvisioner};
use crate::tenancy::models::{MembershipRecord, TenantRecord, TenantStatus};
use crate::tenancy::store::{StoreError, TenantStore};

pub fn connection_info(tenant_id: Uuid) -> TenantConnectionInfo {
    TenantConnectionInfo {
        tenant_id,
        host: "localhost".to_string(),
        port: 5432,
        user: "tenant_app".to_string(),
        password: DbPassword::new("s3cret"),
        database: format!("tenant_{}", tenant_id.simple()),
        ssl_mode: "disable".to_string(),
    }
}

/// Stand-in for a pool; clones share state like PgPool clones do
#[derive(Debug, Clone)]
pub struct MockHandle {
    pub id: usize,
    pub tenant_id: Uuid,
    pub database: String,
    pub password: String,
    closed: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
}

impl MockHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockFactory {
    delay: Duration,
    close_delay: Duration,
    next_id: AtomicUsize,
    opens: Mutex<HashMap<Uuid, usize>>,
    unreachable: Mutex<HashSet<Uuid>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFactory {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Closing takes `delay`, like a pool draining checked-out connections
    pub fn with_close_delay(delay: Duration) -> Self {
        Self {
            close_delay: delay,
            ..Self::default()
        }
    }

    pub fn set_unreachable(&self, tenant_id: Uuid, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(tenant_id);
        } else {
            set.remove(&tenant_id);
        }
    }

    /// Completed open attempts, successful or not
    pub fn opens_for(&self, tenant_id: Uuid) -> usize {
        self.opens.lock().unwrap().get(&tenant_id).copied().unwrap_or(0)
    }

    pub fn max_concurrent_opens(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Handle = MockHandle;

    async fn open(&self, info: &TenantConnectionInfo) -> Result<MockHandle, ConnectionError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        *self.opens.lock().unwrap().entry(info.tenant_id).or_insert(0) += 1;

        if self.unreachable.lock().unwrap().contains(&info.tenant_id) {
            return Err(ConnectionError::Unavailable("connection refused".to_string()));
        }

        Ok(MockHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            tenant_id: info.tenant_id,
            database: info.database.clone(),
            password: info.password.expose().to_string(),
            closed: Arc::new(AtomicBool::new(false)),
            healthy: Arc::new(AtomicBool::new(true)),
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn ping(&self, handle: &MockHandle) -> Result<(), ConnectionError> {
        if handle.is_closed() || !handle.healthy.load(Ordering::SeqCst) {
            return Err(ConnectionError::Unavailable("ping failed".to_string()));
        }
        Ok(())
    }

    async fn close(&self, handle: MockHandle) {
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        handle.closed.store(true, Ordering::SeqCst);
    }

    async fn current_database(&self, handle: &MockHandle) -> Result<String, ConnectionError> {
        self.ping(handle).await?;
        Ok(handle.database.clone())
    }

    fn in_use(&self, handle: &MockHandle) -> bool {
        handle.busy.load(Ordering::SeqCst)
    }
}

/// Provisioner that succeeds without touching any database
pub struct InstantProvisioner;

#[async_trait]
impl TenantProvisioner for InstantProvisioner {
    async fn provision(&self, _tenant: &TenantRecord) -> Result<(), ProvisionError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: Mutex<HashMap<Uuid, TenantRecord>>,
    memberships: Mutex<HashMap<(Uuid, Uuid), MembershipRecord>>,
    unavailable: AtomicBool,
    stalled: AtomicBool,
}

impl InMemoryTenantStore {
    pub fn insert_tenant(
        &self,
        organization_id: Uuid,
        slug: &str,
        status: TenantStatus,
        encrypted_password: &str,
    ) -> TenantRecord {
        let record = TenantRecord {
            id: Uuid::new_v4(),
            organization_id,
            slug: slug.to_string(),
            status,
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_user: format!("{}_app", slug),
            db_name: format!("tenant_{}", slug),
            db_ssl_mode: "disable".to_string(),
            encrypted_password: encrypted_password.to_string(),
        };
        self.tenants.lock().unwrap().insert(record.id, record.clone());
        record
    }

    pub fn insert_membership(&self, membership: MembershipRecord) {
        self.memberships
            .lock()
            .unwrap()
            .insert((membership.user_id, membership.tenant_id), membership);
    }

    pub fn set_encrypted_password(&self, tenant_id: Uuid, value: &str) {
        if let Some(tenant) = self.tenants.lock().unwrap().get_mut(&tenant_id) {
            tenant.encrypted_password = value.to_string();
        }
    }

    pub fn status_of(&self, tenant_id: Uuid) -> Option<TenantStatus> {
        self.tenants.lock().unwrap().get(&tenant_id).map(|t| t.status)
    }

    /// Simulate the master store going away
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Simulate a master store that accepts queries but never answers
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    async fn stall_if_requested(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn resolve_by_slug(
        &self,
        organization_id: Uuid,
        slug: &str,
    ) -> Result<Option<TenantRecord>, StoreError> {
        self.stall_if_requested().await;
        self.check_available()?;
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .values()
            .find(|t| t.organization_id == organization_id && t.slug == slug)
            .cloned())
    }

    async fn find_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, StoreError> {
        self.check_available()?;
        Ok(self.tenants.lock().unwrap().get(&tenant_id).cloned())
    }

    async fn get_membership(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<MembershipRecord>, StoreError> {
        self.stall_if_requested().await;
        self.check_available()?;
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .get(&(user_id, tenant_id))
            .cloned())
    }

    async fn set_status(&self, tenant_id: Uuid, status: TenantStatus) -> Result<(), StoreError> {
        self.check_available()?;
        match self.tenants.lock().unwrap().get_mut(&tenant_id) {
            Some(tenant) => {
                tenant.status = status;
                Ok(())
            }
            None => Err(StoreError::TenantNotFound(tenant_id)),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.stall_if_requested().await;
        self.check_available()
    }
}
