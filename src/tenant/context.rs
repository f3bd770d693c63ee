//! Per-execution-unit tenant binding
//!
//! A `TenantContext` is owned by exactly one task or thread and handed by
//! `&mut` to whatever needs the ambient tenant. It is deliberately not
//! `Clone`: moving work to another unit means creating a new context there
//! and binding the tenant again.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::registry::{record_namespace, TenantError, TenantInfo, TenantLease, TenantRegistry};

#[derive(Debug)]
struct Binding {
    lease: TenantLease,
    session_id: String,
    bound_at: DateTime<Utc>,
}

/// The tenant currently bound to one execution unit.
#[derive(Debug)]
pub struct TenantContext {
    registry: Arc<TenantRegistry>,
    binding: Option<Binding>,
}

impl TenantContext {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        Self {
            registry,
            binding: None,
        }
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    /// Bind `tenant_id` to this context, registering or refreshing it.
    ///
    /// On error the previous binding is left untouched.
    pub fn set_current(
        &mut self,
        tenant_id: &str,
        attrs: Option<HashMap<String, String>>,
    ) -> Result<TenantInfo, TenantError> {
        let lease = self.registry.acquire(tenant_id, attrs)?;
        let info = lease.entry().snapshot();
        let session_id = Uuid::new_v4().to_string();
        debug!(tenant_id, session_id = %session_id, "tenant context bound");
        self.binding = Some(Binding {
            lease,
            session_id,
            bound_at: Utc::now(),
        });
        Ok(info)
    }

    /// The bound tenant id. Counts as an access.
    pub fn current(&self) -> Result<&str, TenantError> {
        let binding = self.binding.as_ref().ok_or(TenantError::NoContext)?;
        let tenant_id = binding.lease.tenant_id();
        self.registry.touch(tenant_id);
        Ok(tenant_id)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Session id of the current binding; fresh for every `set_current`.
    pub fn session_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.session_id.as_str())
    }

    pub fn bound_at(&self) -> Option<DateTime<Utc>> {
        self.binding.as_ref().map(|b| b.bound_at)
    }

    /// Drop the binding, releasing the tenant for eviction.
    pub fn clear(&mut self) {
        if let Some(binding) = self.binding.take() {
            debug!(tenant_id = binding.lease.tenant_id(), "tenant context cleared");
        }
    }

    /// Namespace of `component_type` for the bound tenant.
    pub fn namespace(&self, component_type: &str) -> Result<String, TenantError> {
        let binding = self.binding.as_ref().ok_or(TenantError::NoContext)?;
        self.registry.touch(binding.lease.tenant_id());
        Ok(record_namespace(binding.lease.entry(), component_type))
    }

    /// Bind `tenant_id` until the returned handle is dropped, then restore
    /// whatever was bound before (including nothing).
    pub fn scoped(&mut self, tenant_id: &str) -> Result<ScopedTenant<'_>, TenantError> {
        let lease = self.registry.acquire(tenant_id, None)?;
        let binding = Binding {
            lease,
            session_id: Uuid::new_v4().to_string(),
            bound_at: Utc::now(),
        };
        let previous = self.binding.replace(binding);
        debug!(tenant_id, "scoped tenant context entered");
        Ok(ScopedTenant {
            context: self,
            previous: Some(previous),
        })
    }
}

/// Scoped tenant binding; restores the prior binding on drop.
///
/// Dropping happens on normal return, on `?` propagation, and when an
/// enclosing future is cancelled, so the prior context always comes back.
#[derive(Debug)]
pub struct ScopedTenant<'a> {
    context: &'a mut TenantContext,
    previous: Option<Option<Binding>>,
}

impl Deref for ScopedTenant<'_> {
    type Target = TenantContext;

    fn deref(&self) -> &TenantContext {
        &*self.context
    }
}

impl DerefMut for ScopedTenant<'_> {
    fn deref_mut(&mut self) -> &mut TenantContext {
        &mut *self.context
    }
}

impl Drop for ScopedTenant<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.context.binding = previous;
            debug!("scoped tenant context restored");
        }
    }
}
