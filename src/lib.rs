//! tenantgraph: multi-tenant storage coordination for graph and vector data
//!
//! Keeps a graph store and a vector store consistent for many isolated
//! tenants that share one process.
//!
//! # Core Concepts
//!
//! - **Metadata**: interaction records validated field by field, and the
//!   per-kind rules that derive node metadata from them
//! - **Tenants**: a bounded registry of active tenants and an explicit
//!   per-task context that scopes every storage call to one tenant
//! - **Transactions**: validated, ordered writes across both backends with
//!   compensating deletes when a write fails
//!
//! # Example
//!
//! ```
//! use tenantgraph::{StoreConfig, TenantGraphApi};
//!
//! let api = TenantGraphApi::from_config(StoreConfig::default()).unwrap();
//! let mut ctx = api.context();
//! ctx.set_current("tenant_acme", None).unwrap();
//! assert_eq!(ctx.namespace("embeddings").unwrap(), "tenant_acme_embeddings");
//! ```

pub mod api;
pub mod config;
pub mod metadata;
pub mod storage;
pub mod tenant;
pub mod transaction;

pub use api::{ApiError, TenantGraphApi};
pub use config::{BackendMode, ConfigError, ConfigResult, StoreConfig};
pub use metadata::{
    propagate, validate, DerivedMetadata, InteractionMetadata, NodeKind, ValidationError,
    ValidationMode, ValidationRules,
};
pub use storage::{
    BackendError, BackendResult, EdgeRecord, GraphBackend, NodeRecord, StorageRouter, VectorBackend,
};
pub use tenant::{namespace_for, ComponentType, TenantContext, TenantError, TenantRegistry};
pub use transaction::{
    CancellationToken, ConsistencyReport, Operation, TransactionCoordinator, TransactionError,
    TransactionOutcome, TransactionResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
