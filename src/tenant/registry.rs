//! Process-wide tenant table
//!
//! Lookups go through DashMap shard read locks and only touch atomics, so they
//! never block each other. Structural changes (admission and eviction) are
//! serialized by one coarse mutex. An entry with live bindings
//! (`active_refs > 0`) is never evicted: the ref increment happens under the
//! shard lock that `remove_if` also needs.

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::TenantContext;
use super::namespace::namespace_for;

/// Errors from tenant context handling and admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
    #[error("no tenant context bound to this execution unit")]
    NoContext,

    #[error("invalid tenant id '{0}': expected [A-Za-z0-9_-]+")]
    InvalidTenantId(String),

    #[error("tenant registry at capacity ({limit} tenants) and no entry can be evicted")]
    CapacityExceeded { limit: usize },
}

/// Check `tenant_id` against `^[A-Za-z0-9_-]+$`.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), TenantError> {
    let ok = !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(TenantError::InvalidTenantId(tenant_id.to_string()))
    }
}

/// Bounds applied to the tenant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantLimits {
    /// Admitting a tenant beyond this evicts the least recently accessed idle entry.
    pub max_active_tenants: usize,
    /// Hard bound; admission fails once reached and nothing is evictable.
    pub max_registry_size: usize,
    /// Entries idle longer than this are removed by the stale sweep.
    pub tenant_ttl: Duration,
    /// When false, admission never evicts or rejects.
    pub enforce_tenant_limits: bool,
}

impl Default for TenantLimits {
    fn default() -> Self {
        Self {
            max_active_tenants: 100,
            max_registry_size: 1000,
            tenant_ttl: Duration::from_secs(3600),
            enforce_tenant_limits: true,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TenantEntry {
    tenant_id: String,
    created_at: DateTime<Utc>,
    last_accessed_micros: AtomicI64,
    /// Registry-wide access sequence; orders entries for LRU eviction without ties.
    access_seq: AtomicU64,
    access_count: AtomicU64,
    active_refs: AtomicUsize,
    namespaces: Mutex<BTreeMap<String, String>>,
    attributes: Mutex<HashMap<String, String>>,
}

impl TenantEntry {
    fn new(tenant_id: &str, seq: u64) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.to_string(),
            created_at: now,
            last_accessed_micros: AtomicI64::new(now.timestamp_micros()),
            access_seq: AtomicU64::new(seq),
            access_count: AtomicU64::new(1),
            active_refs: AtomicUsize::new(0),
            namespaces: Mutex::new(BTreeMap::new()),
            attributes: Mutex::new(HashMap::new()),
        }
    }

    fn touch(&self, seq: u64) {
        self.last_accessed_micros
            .store(Utc::now().timestamp_micros(), Ordering::Relaxed);
        self.access_seq.fetch_max(seq, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    fn merge_attributes(&self, attrs: Option<HashMap<String, String>>) {
        if let Some(attrs) = attrs {
            self.attributes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(attrs);
        }
    }

    fn is_idle(&self) -> bool {
        self.active_refs.load(Ordering::Acquire) == 0
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        let last = self.last_accessed_micros.load(Ordering::Relaxed);
        let micros = now.timestamp_micros().saturating_sub(last).max(0);
        Duration::from_micros(micros as u64)
    }

    pub(crate) fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub(crate) fn snapshot(&self) -> TenantInfo {
        let last = self.last_accessed_micros.load(Ordering::Relaxed);
        TenantInfo {
            tenant_id: self.tenant_id.clone(),
            created_at: self.created_at,
            last_accessed: Utc
                .timestamp_micros(last)
                .single()
                .unwrap_or(self.created_at),
            access_count: self.access_count.load(Ordering::Relaxed),
            active_refs: self.active_refs.load(Ordering::Relaxed),
            namespace_map: self
                .namespaces
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            attributes: self
                .attributes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Point-in-time copy of a tenant entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantInfo {
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    /// Number of execution units currently bound to this tenant.
    pub active_refs: usize,
    /// Component type → derived namespace.
    pub namespace_map: BTreeMap<String, String>,
    pub attributes: HashMap<String, String>,
}

/// A live binding of one execution unit to a tenant entry.
///
/// Keeps the entry pinned against eviction until dropped.
#[derive(Debug)]
pub(crate) struct TenantLease {
    entry: Arc<TenantEntry>,
}

impl TenantLease {
    pub(crate) fn tenant_id(&self) -> &str {
        self.entry.tenant_id()
    }

    pub(crate) fn entry(&self) -> &TenantEntry {
        &self.entry
    }
}

impl Drop for TenantLease {
    fn drop(&mut self) {
        self.entry.active_refs.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Concurrency-safe table of tenant id → tenant state.
#[derive(Debug)]
pub struct TenantRegistry {
    tenants: DashMap<String, Arc<TenantEntry>>,
    structure: Mutex<()>,
    sequence: AtomicU64,
    limits: TenantLimits,
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new(TenantLimits::default())
    }
}

impl TenantRegistry {
    pub fn new(limits: TenantLimits) -> Self {
        Self {
            tenants: DashMap::new(),
            structure: Mutex::new(()),
            sequence: AtomicU64::new(0),
            limits,
        }
    }

    pub fn limits(&self) -> &TenantLimits {
        &self.limits
    }

    /// A fresh, unbound context for one execution unit.
    pub fn context(self: &Arc<Self>) -> TenantContext {
        TenantContext::new(self.clone())
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register `tenant_id` if unseen, otherwise refresh its access time.
    pub fn register(
        &self,
        tenant_id: &str,
        attrs: Option<HashMap<String, String>>,
    ) -> Result<TenantInfo, TenantError> {
        validate_tenant_id(tenant_id)?;
        let entry = self.admit(tenant_id, attrs, false)?;
        Ok(entry.snapshot())
    }

    /// Register or refresh `tenant_id` and pin it for the returned lease's lifetime.
    pub(crate) fn acquire(
        &self,
        tenant_id: &str,
        attrs: Option<HashMap<String, String>>,
    ) -> Result<TenantLease, TenantError> {
        validate_tenant_id(tenant_id)?;
        let entry = self.admit(tenant_id, attrs, true)?;
        Ok(TenantLease { entry })
    }

    fn lookup(
        &self,
        tenant_id: &str,
        attrs: &mut Option<HashMap<String, String>>,
        pin: bool,
    ) -> Option<Arc<TenantEntry>> {
        let guard = self.tenants.get(tenant_id)?;
        // Increment while the shard guard is held so a concurrent remove_if
        // either runs entirely before (and we miss) or sees the ref.
        if pin {
            guard.active_refs.fetch_add(1, Ordering::AcqRel);
        }
        guard.touch(self.next_seq());
        guard.merge_attributes(attrs.take());
        Some(guard.value().clone())
    }

    fn admit(
        &self,
        tenant_id: &str,
        mut attrs: Option<HashMap<String, String>>,
        pin: bool,
    ) -> Result<Arc<TenantEntry>, TenantError> {
        if let Some(entry) = self.lookup(tenant_id, &mut attrs, pin) {
            return Ok(entry);
        }

        let _structure = self.structure.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = self.lookup(tenant_id, &mut attrs, pin) {
            return Ok(entry);
        }

        if self.limits.enforce_tenant_limits {
            while self.tenants.len() >= self.limits.max_active_tenants {
                if self.evict_one_lru().is_none() {
                    break;
                }
            }
            if self.tenants.len() >= self.limits.max_registry_size {
                warn!(
                    tenant_id,
                    limit = self.limits.max_registry_size,
                    "tenant admission rejected: registry full"
                );
                return Err(TenantError::CapacityExceeded {
                    limit: self.limits.max_registry_size,
                });
            }
        }

        let entry = Arc::new(TenantEntry::new(tenant_id, self.next_seq()));
        if pin {
            entry.active_refs.store(1, Ordering::Release);
        }
        entry.merge_attributes(attrs);
        self.tenants.insert(tenant_id.to_string(), entry.clone());
        info!(tenant_id, active = self.tenants.len(), "tenant registered");
        Ok(entry)
    }

    /// Remove the least recently accessed idle entry. Caller holds the structure lock.
    fn evict_one_lru(&self) -> Option<String> {
        // Bounded retries: a candidate may become pinned between selection and removal.
        for _ in 0..8 {
            let candidate = self
                .tenants
                .iter()
                .filter(|e| e.is_idle())
                .min_by_key(|e| e.access_seq.load(Ordering::Relaxed))
                .map(|e| e.key().clone())?;
            if self
                .tenants
                .remove_if(&candidate, |_, e| e.is_idle())
                .is_some()
            {
                debug!(tenant_id = %candidate, "evicted least recently used tenant");
                return Some(candidate);
            }
        }
        None
    }

    /// Refresh a tenant's access time. Returns false if the tenant is unknown.
    pub fn touch(&self, tenant_id: &str) -> bool {
        match self.tenants.get(tenant_id) {
            Some(entry) => {
                entry.touch(self.next_seq());
                true
            }
            None => false,
        }
    }

    /// Snapshot of a tenant entry. Does not count as an access.
    pub fn get(&self, tenant_id: &str) -> Option<TenantInfo> {
        self.tenants.get(tenant_id).map(|e| e.snapshot())
    }

    pub fn contains(&self, tenant_id: &str) -> bool {
        self.tenants.contains_key(tenant_id)
    }

    /// Number of registered tenants.
    pub fn active_count(&self) -> usize {
        self.tenants.len()
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tenants.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Derive (and record) the namespace for one of a tenant's components.
    ///
    /// Registers the tenant if unseen.
    pub fn namespace(&self, tenant_id: &str, component_type: &str) -> Result<String, TenantError> {
        validate_tenant_id(tenant_id)?;
        let entry = self.admit(tenant_id, None, false)?;
        Ok(record_namespace(&entry, component_type))
    }

    /// Remove idle entries not accessed within `ttl`. Returns how many were removed.
    pub fn evict_stale(&self, ttl: Duration) -> usize {
        let _structure = self.structure.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let stale: Vec<String> = self
            .tenants
            .iter()
            .filter(|e| e.is_idle() && e.idle_for(now) > ttl)
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for tenant_id in stale {
            let gone = self
                .tenants
                .remove_if(&tenant_id, |_, e| e.is_idle() && e.idle_for(now) > ttl);
            if gone.is_some() {
                removed += 1;
                debug!(tenant_id = %tenant_id, "evicted stale tenant");
            }
        }
        if removed > 0 {
            info!(removed, remaining = self.tenants.len(), "stale tenant sweep");
        }
        removed
    }

    /// Evict least recently accessed idle entries until at most `max_active` remain.
    ///
    /// Pinned entries are never evicted; if they alone exceed `max_registry`
    /// the condition is logged and left for the next sweep.
    pub fn enforce_capacity(&self, max_active: usize, max_registry: usize) -> usize {
        let _structure = self.structure.lock().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        while self.tenants.len() > max_active {
            if self.evict_one_lru().is_none() {
                break;
            }
            removed += 1;
        }
        if self.tenants.len() > max_registry {
            warn!(
                active = self.tenants.len(),
                max_registry, "registry above capacity with every remaining tenant bound"
            );
        }
        if removed > 0 {
            info!(removed, remaining = self.tenants.len(), "capacity sweep");
        }
        removed
    }

    /// Run stale and capacity sweeps every `interval` until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let limits = registry.limits;
                registry.evict_stale(limits.tenant_ttl);
                if limits.enforce_tenant_limits {
                    registry.enforce_capacity(limits.max_active_tenants, limits.max_registry_size);
                }
            }
        })
    }
}

pub(crate) fn record_namespace(entry: &TenantEntry, component_type: &str) -> String {
    let namespace = namespace_for(&entry.tenant_id, component_type);
    entry
        .namespaces
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(component_type.to_string())
        .or_insert_with(|| namespace.clone());
    namespace
}
