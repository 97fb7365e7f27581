use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{ConnectionError, ConnectionFactory, TenantConnectionInfo};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound for one creation attempt (provider + open)
    pub connect_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// One live pool per tenant
struct CachedConnection<H> {
    tenant_id: Uuid,
    handle: H,
    created_at: DateTime<Utc>,
    // milliseconds since the registry epoch
    last_used: AtomicU64,
    // unix millis, 0 = never
    last_healthy_at: AtomicI64,
}

impl<H> CachedConnection<H> {
    fn touch(&self, now_ms: u64) {
        self.last_used.fetch_max(now_ms, Ordering::Relaxed);
    }

    fn mark_healthy(&self, at: DateTime<Utc>) {
        self.last_healthy_at.store(at.timestamp_millis(), Ordering::Relaxed);
    }
}

/// Per-tenant creation slot. Whoever holds the lock is the only caller
/// allowed to create (or close) that tenant's pool. Waiters that queued
/// behind a creator read its outcome instead of trying again.
struct CreationSlot<H> {
    outcome: Option<Result<H, String>>,
}

type Slot<H> = Arc<Mutex<CreationSlot<H>>>;

/// Point-in-time view of a cached connection, without the handle
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub tenant_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub last_healthy_at: Option<DateTime<Utc>>,
}

/// Concurrency-safe cache of tenant id -> live connection handle.
///
/// Lookups for cached tenants take only a shared read lock and never
/// perform I/O. Creation for one tenant is serialized through that
/// tenant's slot, so unrelated tenants open their pools in parallel.
pub struct ConnectionRegistry<F: ConnectionFactory> {
    factory: F,
    config: RegistryConfig,
    epoch: Instant,
    epoch_utc: DateTime<Utc>,
    connections: RwLock<HashMap<Uuid, Arc<CachedConnection<F::Handle>>>>,
    slots: Mutex<HashMap<Uuid, Slot<F::Handle>>>,
}

impl<F: ConnectionFactory> ConnectionRegistry<F> {
    pub fn new(factory: F, config: RegistryConfig) -> Self {
        Self {
            factory,
            config,
            epoch: Instant::now(),
            epoch_utc: Utc::now(),
            connections: RwLock::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn connect_timeout(&self) -> Duration {
        self.config.connect_timeout
    }

    /// Return the cached handle for `tenant_id`, creating it on first use.
    ///
    /// `provider` is only invoked on a cache miss, by exactly one caller at a
    /// time per tenant. A failed attempt leaves nothing behind, so the next
    /// call starts over.
    pub async fn get_or_create<P, Fut>(
        &self,
        tenant_id: Uuid,
        provider: P,
    ) -> Result<F::Handle, ConnectionError>
    where
        P: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<TenantConnectionInfo, ConnectionError>> + Send,
    {
        if let Some(handle) = self.lookup(tenant_id).await {
            return Ok(handle);
        }

        let slot = self.slot(tenant_id).await;
        let mut creation = slot.lock().await;

        if let Some(outcome) = creation.outcome.as_ref() {
            debug!("Reusing creation outcome for tenant {}", tenant_id);
            return outcome.clone().map_err(ConnectionError::Unavailable);
        }

        // Another caller may have finished while we waited for the slot
        if let Some(handle) = self.lookup(tenant_id).await {
            return Ok(handle);
        }

        let result = self.create(tenant_id, provider).await;

        creation.outcome = Some(match &result {
            Ok(handle) => Ok(handle.clone()),
            Err(e) => Err(e.to_string()),
        });

        // Retire the slot while still holding it: queued waiters read the
        // outcome, later arrivals get a fresh slot.
        {
            let mut slots = self.slots.lock().await;
            if slots.get(&tenant_id).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                slots.remove(&tenant_id);
            }
        }
        drop(creation);

        result
    }

    async fn create<P, Fut>(&self, tenant_id: Uuid, provider: P) -> Result<F::Handle, ConnectionError>
    where
        P: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<TenantConnectionInfo, ConnectionError>> + Send,
    {
        let attempt = async {
            let info = provider().await?;
            if info.tenant_id != tenant_id {
                return Err(ConnectionError::InvalidParameters(format!(
                    "connection info for {} supplied for tenant {}",
                    info.tenant_id, tenant_id
                )));
            }
            self.factory.open(&info).await
        };

        let handle = match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                warn!("Connection creation failed for tenant {}: {}", tenant_id, e);
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "Connection creation for tenant {} timed out after {:?}",
                    tenant_id, self.config.connect_timeout
                );
                return Err(ConnectionError::Timeout(self.config.connect_timeout));
            }
        };

        let now_ms = self.now_ms();
        let entry = Arc::new(CachedConnection {
            tenant_id,
            handle: handle.clone(),
            created_at: Utc::now(),
            last_used: AtomicU64::new(now_ms),
            last_healthy_at: AtomicI64::new(0),
        });
        entry.mark_healthy(Utc::now());

        self.connections.write().await.insert(tenant_id, entry);
        info!("Cached connection for tenant {}", tenant_id);
        Ok(handle)
    }

    async fn lookup(&self, tenant_id: Uuid) -> Option<F::Handle> {
        let connections = self.connections.read().await;
        connections.get(&tenant_id).map(|entry| {
            entry.touch(self.now_ms());
            entry.handle.clone()
        })
    }

    async fn slot(&self, tenant_id: Uuid) -> Slot<F::Handle> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Mutex::new(CreationSlot { outcome: None })))
            .clone()
    }

    /// Drop a slot nobody else is holding or waiting on
    async fn release_slot(&self, tenant_id: Uuid, slot: &Slot<F::Handle>) {
        let mut slots = self.slots.lock().await;
        if let Some(current) = slots.get(&tenant_id) {
            // map + caller
            if Arc::ptr_eq(current, slot) && Arc::strong_count(slot) == 2 {
                slots.remove(&tenant_id);
            }
        }
    }

    /// Remove and close a tenant's connection. The next `get_or_create`
    /// provisions from scratch. Returns whether anything was cached.
    pub async fn close(&self, tenant_id: Uuid) -> bool {
        let slot = self.slot(tenant_id).await;
        let guard = slot.lock().await;

        let removed = self.connections.write().await.remove(&tenant_id);
        drop(guard);
        self.release_slot(tenant_id, &slot).await;

        // Draining a pool waits for checked-out connections; new callers
        // must be able to create a fresh pool meanwhile.
        match removed {
            Some(entry) => {
                self.factory.close(entry.handle.clone()).await;
                info!("Closed connection for tenant {}", tenant_id);
                true
            }
            None => false,
        }
    }

    /// Close then recreate, e.g. after credential rotation
    pub async fn refresh<P, Fut>(
        &self,
        tenant_id: Uuid,
        provider: P,
    ) -> Result<F::Handle, ConnectionError>
    where
        P: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<TenantConnectionInfo, ConnectionError>> + Send,
    {
        self.close(tenant_id).await;
        self.get_or_create(tenant_id, provider).await
    }

    /// Close every cached connection. Safe to call more than once.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut connections = self.connections.write().await;
            connections.drain().collect()
        };

        let count = drained.len();
        for (tenant_id, entry) in drained {
            self.factory.close(entry.handle.clone()).await;
            info!("Closed connection for tenant {}", tenant_id);
        }
        count
    }

    /// Ping every cached handle. Failures are reported, not evicted.
    pub async fn health_check_all(&self) -> HashMap<Uuid, ConnectionError> {
        let entries: Vec<_> = self.connections.read().await.values().cloned().collect();
        let timeout = self.config.connect_timeout;

        let checks = entries.iter().map(|entry| async move {
            let result = match tokio::time::timeout(timeout, self.factory.ping(&entry.handle)).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Timeout(timeout)),
            };
            (entry, result)
        });

        let mut failures = HashMap::new();
        for (entry, result) in futures::future::join_all(checks).await {
            match result {
                Ok(()) => entry.mark_healthy(Utc::now()),
                Err(e) => {
                    warn!("Health check failed for tenant {}: {}", entry.tenant_id, e);
                    failures.insert(entry.tenant_id, e);
                }
            }
        }
        failures
    }

    /// Remove connections unused for at least `max_idle` whose pools have
    /// nothing checked out. Returns the evicted tenant ids.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<Uuid> {
        let now_ms = self.now_ms();
        let max_idle_ms = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);

        let evicted: Vec<_> = {
            let mut connections = self.connections.write().await;
            let stale: Vec<Uuid> = connections
                .iter()
                .filter(|(_, entry)| {
                    let idle = now_ms.saturating_sub(entry.last_used.load(Ordering::Relaxed));
                    idle >= max_idle_ms && !self.factory.in_use(&entry.handle)
                })
                .map(|(tenant_id, _)| *tenant_id)
                .collect();

            stale.iter().filter_map(|id| connections.remove(id)).collect()
        };

        let mut ids = Vec::with_capacity(evicted.len());
        for entry in evicted {
            self.factory.close(entry.handle.clone()).await;
            info!("Evicted idle connection for tenant {}", entry.tenant_id);
            ids.push(entry.tenant_id);
        }
        ids
    }

    pub async fn active_connections_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn contains(&self, tenant_id: Uuid) -> bool {
        self.connections.read().await.contains_key(&tenant_id)
    }

    pub async fn snapshot(&self) -> Vec<ConnectionStats> {
        let connections = self.connections.read().await;
        let mut stats: Vec<_> = connections
            .values()
            .map(|entry| {
                let last_used_ms = entry.last_used.load(Ordering::Relaxed);
                let healthy_ms = entry.last_healthy_at.load(Ordering::Relaxed);
                ConnectionStats {
                    tenant_id: entry.tenant_id,
                    created_at: entry.created_at,
                    last_used_at: self.epoch_utc
                        + ChronoDuration::milliseconds(i64::try_from(last_used_ms).unwrap_or(i64::MAX)),
                    last_healthy_at: (healthy_ms > 0)
                        .then(|| DateTime::<Utc>::from_timestamp_millis(healthy_ms))
                        .flatten(),
                }
            })
            .collect();
        stats.sort_by_key(|s| s.created_at);
        stats
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Periodically evict idle connections until the returned task is aborted
pub fn spawn_idle_eviction<F: ConnectionFactory>(
    registry: Arc<ConnectionRegistry<F>>,
    max_idle: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = registry.evict_idle(max_idle).await;
            if !evicted.is_empty() {
                debug!("Idle eviction removed {} connection(s)", evicted.len());
            }
        }
    })
}
