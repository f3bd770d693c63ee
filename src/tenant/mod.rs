//! Tenant registry, per-unit tenant context and namespace derivation

mod context;
mod namespace;
mod registry;

pub use context::{ScopedTenant, TenantContext};
pub use namespace::{namespace_for, ComponentType};
pub use registry::{validate_tenant_id, TenantError, TenantInfo, TenantLimits, TenantRegistry};
