//! Transport-independent API layer.
//!
//! `TenantGraphApi` is the single entry point for consumer-facing operations.
//! Transports (CLI, services, direct embedding) call `TenantGraphApi` methods;
//! they never assemble a router, registry and coordinator themselves.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{ConfigError, StoreConfig};
use crate::metadata::{validate, InteractionMetadata, ValidationError};
use crate::storage::{BackendError, MetadataFilter, NodeRecord, StorageRouter, VectorMatch};
use crate::tenant::{TenantContext, TenantError, TenantRegistry};
use crate::transaction::{
    AuditEvent, CoordinatorSettings, ExecuteOptions, HealthSnapshot, JsonLinesReportSink, Operation,
    PurgeSummary, TransactionCoordinator, TransactionError, TransactionResult,
};

/// Errors assembling the API from configuration.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("storage setup failed: {0}")]
    Backend(#[from] BackendError),

    #[error("cannot open report file: {0}")]
    ReportSink(#[source] std::io::Error),
}

/// Single entry point for all consumer-facing operations.
pub struct TenantGraphApi {
    config: StoreConfig,
    registry: Arc<TenantRegistry>,
    coordinator: Arc<TransactionCoordinator>,
    sweeper: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TenantGraphApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantGraphApi")
            .field("coordinator", &self.coordinator)
            .field("tenants", &self.registry.active_count())
            .field("sweeping", &self.sweeper.is_some())
            .finish()
    }
}

impl TenantGraphApi {
    /// Load config from `path` (or defaults), apply env overrides and build
    /// the backends it selects.
    pub fn open(path: Option<&Path>) -> Result<Self, ApiError> {
        let config = StoreConfig::load_resolved(path)?;
        Self::from_config(config)
    }

    /// Build the API over the backends `config` selects.
    pub fn from_config(config: StoreConfig) -> Result<Self, ApiError> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems).into());
        }
        let router = StorageRouter::from_config(&config)?;
        Self::with_router(config, router)
    }

    /// Build the API over caller-supplied backends (networked mode, tests).
    pub fn with_router(config: StoreConfig, router: StorageRouter) -> Result<Self, ApiError> {
        let registry = Arc::new(TenantRegistry::new(config.tenants.limits()));
        let mut coordinator = TransactionCoordinator::new(router, CoordinatorSettings::from_config(&config));
        if let Some(path) = &config.report_path {
            let sink = JsonLinesReportSink::open(path).map_err(ApiError::ReportSink)?;
            info!(path = %path.display(), "appending consistency reports");
            coordinator = coordinator.with_sink(Arc::new(sink));
        }
        Ok(Self {
            config,
            registry,
            coordinator: Arc::new(coordinator),
            sweeper: None,
        })
    }

    /// Start the periodic tenant sweep. Needs a running tokio runtime.
    pub fn start_sweeper(&mut self) {
        if self.sweeper.is_none() {
            let interval = self.config.tenants.sweep_interval();
            self.sweeper = Some(self.registry.spawn_sweeper(interval));
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }

    /// A fresh, unbound tenant context for one execution unit.
    pub fn context(&self) -> TenantContext {
        self.registry.context()
    }

    // --- Metadata ---

    /// Every problem with `record` under the configured validation rules.
    pub fn validate_metadata(&self, record: &InteractionMetadata) -> Vec<ValidationError> {
        validate(record, &self.config.validation)
    }

    // --- Write ---

    pub async fn execute(&self, ctx: &TenantContext, operations: Vec<Operation>) -> TransactionResult {
        self.coordinator.execute(ctx, operations).await
    }

    pub async fn execute_with(
        &self,
        ctx: &TenantContext,
        operations: Vec<Operation>,
        options: ExecuteOptions,
    ) -> TransactionResult {
        self.coordinator.execute_with(ctx, operations, options).await
    }

    pub async fn add_node_with_embedding(
        &self,
        ctx: &TenantContext,
        node: NodeRecord,
        embedding: Vec<f32>,
    ) -> TransactionResult {
        self.coordinator.add_node_with_embedding(ctx, node, embedding).await
    }

    // --- Read ---

    pub async fn search(
        &self,
        ctx: &TenantContext,
        embedding: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, TransactionError> {
        self.coordinator.search(ctx, embedding, top_k, filter).await
    }

    /// Namespace of `component_type` for `tenant_id`; registers the tenant if unseen.
    pub fn namespace(&self, tenant_id: &str, component_type: &str) -> Result<String, TenantError> {
        self.registry.namespace(tenant_id, component_type)
    }

    // --- Maintenance ---

    /// Purge everything the context's tenant stored.
    pub async fn purge_tenant(&self, ctx: &TenantContext) -> Result<PurgeSummary, TransactionError> {
        self.coordinator.purge_tenant(ctx).await
    }

    /// Bind `tenant_id` on a private context and purge it.
    pub async fn clear_tenant(&self, tenant_id: &str) -> Result<PurgeSummary, TransactionError> {
        let mut ctx = self.context();
        ctx.set_current(tenant_id, None)?;
        self.coordinator.purge_tenant(&ctx).await
    }

    pub fn transaction_log(&self, limit: usize) -> Vec<AuditEvent> {
        self.coordinator.transaction_log(limit)
    }

    pub fn health(&self) -> HealthSnapshot {
        self.coordinator.health()
    }
}

impl Drop for TenantGraphApi {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendMode;
    use crate::metadata::{propagate, InteractionType, NodeKind, SourceSystem};
    use crate::transaction::TransactionOutcome;

    fn record(tenant: &str) -> InteractionMetadata {
        InteractionMetadata::new(
            tenant,
            "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8",
            "acc_3f2504e0-4f89-41d3-9a0c-0305e82c3301",
            "usr_7c9e6679-7425-40de-944b-e07fc1f90ae7",
            InteractionType::VoiceMemo,
            SourceSystem::VoiceMemo,
            "2024-01-15T10:30:00Z",
            "Follow up with procurement next week.",
        )
    }

    fn small_config() -> StoreConfig {
        StoreConfig {
            embedding_dimension: 3,
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn memory_api_commits_and_searches() {
        let api = TenantGraphApi::from_config(small_config()).unwrap();
        let mut ctx = api.context();
        ctx.set_current("tenant_acme", None).unwrap();

        let meta = propagate(&record("tenant_acme"), NodeKind::SemanticUnit).unwrap();
        let result = api
            .add_node_with_embedding(&ctx, NodeRecord::new("sem_1", meta), vec![1.0, 0.0, 0.0])
            .await;
        assert_eq!(result.report.outcome, TransactionOutcome::Committed);

        let hits = api
            .search(&ctx, &[1.0, 0.0, 0.0], 5, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(hits[0].id, "sem_1");
        assert_eq!(api.health().backend_mode, BackendMode::Memory);
    }

    #[test]
    fn inconsistent_config_is_rejected() {
        let config = StoreConfig {
            embedding_dimension: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(
            TenantGraphApi::from_config(config),
            Err(ApiError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn validate_metadata_uses_configured_rules() {
        let api = TenantGraphApi::from_config(small_config()).unwrap();
        assert!(api.validate_metadata(&record("tenant_acme")).is_empty());
        let mut broken = record("tenant_acme");
        broken.user_id = "not-a-user".into();
        assert!(!api.validate_metadata(&broken).is_empty());
    }

    #[tokio::test]
    async fn clear_tenant_purges_only_that_tenant() {
        let api = TenantGraphApi::from_config(small_config()).unwrap();
        for tenant in ["tenant_acme", "tenant_globex"] {
            let mut ctx = api.context();
            ctx.set_current(tenant, None).unwrap();
            let meta = propagate(&record(tenant), NodeKind::SemanticUnit).unwrap();
            let result = api
                .add_node_with_embedding(&ctx, NodeRecord::new("sem_1", meta), vec![0.0, 1.0, 0.0])
                .await;
            assert!(result.is_committed());
        }

        let summary = api.clear_tenant("tenant_acme").await.unwrap();
        assert_eq!(summary, PurgeSummary { nodes: 1, edges: 0, vectors: 1 });
        assert_eq!(api.namespace("tenant_globex", "graph").unwrap(), "tenant_globex_graph");
    }

    #[test]
    fn namespace_lookup_counts_one_access() {
        let api = TenantGraphApi::from_config(small_config()).unwrap();
        assert_eq!(api.namespace("tenant_acme", "graph").unwrap(), "tenant_acme_graph");
        assert_eq!(api.registry().get("tenant_acme").unwrap().access_count, 1);
        api.namespace("tenant_acme", "embeddings").unwrap();
        assert_eq!(api.registry().get("tenant_acme").unwrap().access_count, 2);
        assert!(matches!(
            api.namespace("bad tenant", "graph"),
            Err(TenantError::InvalidTenantId(_))
        ));
    }

    #[tokio::test]
    async fn report_file_receives_every_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            report_path: Some(dir.path().join("reports.jsonl")),
            ..small_config()
        };
        let mut api = TenantGraphApi::from_config(config).unwrap();
        api.start_sweeper();
        let mut ctx = api.context();
        ctx.set_current("tenant_acme", None).unwrap();
        let meta = propagate(&record("tenant_acme"), NodeKind::Entity).unwrap();
        api.execute(&ctx, vec![Operation::write_node(NodeRecord::new("ent_1", meta))])
            .await;

        let contents = std::fs::read_to_string(dir.path().join("reports.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
