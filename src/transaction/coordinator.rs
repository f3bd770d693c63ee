//! Transaction coordinator
//!
//! Single write path for graph and vector data:
//! 1. Validate every operation before any backend is touched
//! 2. Lock every target id for the tenant
//! 3. Write in declared order, recording each completed write
//! 4. On failure, timeout or cancellation, compensate completed writes in reverse
//! 5. Emit a consistency report to every sink

use super::audit::{AuditEvent, AuditEventKind, AuditLog};
use super::cancel::{wait_cancelled, CancellationToken};
use super::error::{CompensationFailure, TransactionError, TransactionResult};
use super::locks::{TargetGuard, TargetLocks};
use super::operation::{Backend, Operation, Payload};
use super::record::{OperationStatus, TransactionRecord, TransactionState};
use super::report::{ConsistencyReport, ReportSink, TracingReportSink};
use crate::config::{BackendMode, StoreConfig};
use crate::metadata::{NodeKind, ValidationError, ValidationRules};
use crate::storage::{BackendError, BackendResult, MetadataFilter, NodeRecord, StorageRouter, VectorMatch};
use crate::tenant::{ComponentType, TenantContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Knobs the coordinator runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    /// Dimension of the vector index; every embedding must match it.
    pub embedding_dimension: usize,
    pub validation: ValidationRules,
    /// Default per-transaction timeout.
    pub timeout: Duration,
    /// Attempts per compensating delete, first try included.
    pub compensation_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub compensation_backoff: Duration,
    /// Bound on a single compensating delete.
    pub compensation_timeout: Duration,
    /// Largest vector upsert batch when batching is enabled.
    pub vector_batch_size: usize,
    /// Bound on waiting for target locks; the transaction deadline applies regardless.
    pub lock_timeout: Option<Duration>,
}

impl CoordinatorSettings {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            embedding_dimension: config.embedding_dimension,
            validation: config.validation,
            timeout: config.transaction.timeout(),
            compensation_attempts: config.transaction.compensation_attempts,
            compensation_backoff: config.transaction.compensation_backoff(),
            compensation_timeout: config.transaction.compensation_timeout(),
            vector_batch_size: config.transaction.vector_batch_size,
            lock_timeout: config.transaction.lock_timeout(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

/// Per-call options for [`TransactionCoordinator::execute_with`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Overrides the configured transaction timeout.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    /// Group contiguous vector upserts into batches.
    pub batched: bool,
}

impl ExecuteOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn batched(mut self) -> Self {
        self.batched = true;
        self
    }
}

/// Counts removed by [`TransactionCoordinator::purge_tenant`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub nodes: usize,
    pub edges: usize,
    pub vectors: usize,
}

/// Point-in-time view of coordinator load.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub active_transactions: usize,
    pub audit_log_size: usize,
    pub backend_mode: BackendMode,
    pub graph_backend: String,
    pub vector_backend: String,
    pub locked_targets: usize,
}

/// A unit of work in the write phase.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Single(usize),
    /// Contiguous vector upserts sent in one call.
    VectorBatch(Vec<usize>),
}

impl Step {
    fn positions(&self) -> Vec<usize> {
        match self {
            Step::Single(position) => vec![*position],
            Step::VectorBatch(positions) => positions.clone(),
        }
    }
}

/// Split operations into write steps, preserving declared order.
fn plan_steps(operations: &[Operation], batched: bool, batch_size: usize) -> Vec<Step> {
    let batch_size = batch_size.max(1);
    let mut steps = Vec::new();
    let mut run: Vec<usize> = Vec::new();
    for (position, op) in operations.iter().enumerate() {
        if batched && op.backend() == Backend::Vector {
            run.push(position);
            if run.len() == batch_size {
                steps.push(Step::VectorBatch(std::mem::take(&mut run)));
            }
            continue;
        }
        if !run.is_empty() {
            steps.push(Step::VectorBatch(std::mem::take(&mut run)));
        }
        steps.push(Step::Single(position));
    }
    if !run.is_empty() {
        steps.push(Step::VectorBatch(run));
    }
    steps
}

/// How a step ended when raced against the deadline and the cancel token.
enum StepOutcome {
    /// Per-position results; `Some(reason)` for members the backend rejected.
    Applied(Vec<(usize, Option<String>)>),
    Errored(BackendError),
    TimedOut,
    Cancelled,
}

struct Namespaces {
    graph: String,
    vector: String,
}

/// Decrements the active count however the call ends.
struct ActiveTransaction<'a>(&'a AtomicUsize);

impl<'a> ActiveTransaction<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveTransaction<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn new_transaction_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("txn_{}", &hex[..16])
}

/// Coordinates writes across the graph and vector backends for one process.
pub struct TransactionCoordinator {
    router: StorageRouter,
    settings: CoordinatorSettings,
    locks: TargetLocks,
    audit: AuditLog,
    sinks: Vec<Arc<dyn ReportSink>>,
    active: AtomicUsize,
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("router", &self.router)
            .field("settings", &self.settings)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl TransactionCoordinator {
    /// Coordinator reporting to the tracing sink only.
    pub fn new(router: StorageRouter, settings: CoordinatorSettings) -> Self {
        Self {
            router,
            settings,
            locks: TargetLocks::new(),
            audit: AuditLog::default(),
            sinks: vec![Arc::new(TracingReportSink)],
            active: AtomicUsize::new(0),
        }
    }

    /// Add a report sink.
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn router(&self) -> &StorageRouter {
        &self.router
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Per-target locks held by in-flight transactions.
    pub fn target_locks(&self) -> &TargetLocks {
        &self.locks
    }

    // --- Write ---

    /// Run `operations` as one transaction for the context's tenant.
    pub async fn execute(&self, ctx: &TenantContext, operations: Vec<Operation>) -> TransactionResult {
        self.execute_with(ctx, operations, ExecuteOptions::default()).await
    }

    /// Like [`execute`](Self::execute), with contiguous vector upserts batched.
    pub async fn execute_batched(&self, ctx: &TenantContext, operations: Vec<Operation>) -> TransactionResult {
        self.execute_with(ctx, operations, ExecuteOptions::default().batched())
            .await
    }

    /// Write a node and its embedding as one transaction.
    pub async fn add_node_with_embedding(
        &self,
        ctx: &TenantContext,
        node: NodeRecord,
        embedding: Vec<f32>,
    ) -> TransactionResult {
        let vector = Operation::upsert_vector(node.id.clone(), embedding, &node.metadata);
        self.execute(ctx, vec![Operation::write_node(node), vector])
            .await
    }

    pub async fn execute_with(
        &self,
        ctx: &TenantContext,
        operations: Vec<Operation>,
        options: ExecuteOptions,
    ) -> TransactionResult {
        let started_at = Utc::now();
        let transaction_id = new_transaction_id();

        let tenant_id = match ctx.current() {
            Ok(tenant_id) => tenant_id.to_string(),
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "transaction rejected: no tenant context");
                let mut record = TransactionRecord::new(&transaction_id, "", &operations);
                record.advance(TransactionState::Failed);
                record.skip_pending();
                return self.finish(record, Some(e.into()), Vec::new(), started_at);
            }
        };

        let _active = ActiveTransaction::enter(&self.active);
        let mut record = TransactionRecord::new(&transaction_id, &tenant_id, &operations);
        self.audit
            .record(AuditEventKind::Begin, &transaction_id, &tenant_id, operations.len(), None);
        debug!(
            transaction_id = %transaction_id,
            tenant_id = %tenant_id,
            operations = operations.len(),
            batched = options.batched,
            "transaction started"
        );

        let timeout = options.timeout.unwrap_or(self.settings.timeout);
        let deadline = Instant::now() + timeout;
        let cancel = options.cancel.as_ref();

        // Validating: nothing below touches a backend until every check passes.
        record.advance(TransactionState::Validating);
        let errors = self.validate_operations(&tenant_id, &operations);
        if !errors.is_empty() {
            return self.reject(record, TransactionError::Validation(errors), started_at);
        }

        let namespaces = match (
            ctx.namespace(ComponentType::Graph.as_str()),
            ctx.namespace(ComponentType::Embeddings.as_str()),
        ) {
            (Ok(graph), Ok(vector)) => Namespaces { graph, vector },
            (Err(e), _) | (_, Err(e)) => return self.reject(record, e.into(), started_at),
        };

        if cancel.map_or(false, CancellationToken::is_cancelled) {
            return self.reject(record, TransactionError::Cancelled, started_at);
        }

        let _guard = match self
            .lock_targets(&tenant_id, &operations, deadline, timeout, cancel)
            .await
        {
            Ok(guard) => guard,
            Err(e) => return self.reject(record, e, started_at),
        };

        record.advance(TransactionState::Writing);
        let steps = plan_steps(&operations, options.batched, self.settings.vector_batch_size);
        let failure = self
            .write_steps(&mut record, &operations, &steps, &namespaces, deadline, timeout, cancel)
            .await;

        match failure {
            None => {
                record.advance(TransactionState::Committed);
                info!(
                    transaction_id = %transaction_id,
                    tenant_id = %tenant_id,
                    operations = operations.len(),
                    "transaction committed"
                );
                self.audit
                    .record(AuditEventKind::Commit, &transaction_id, &tenant_id, operations.len(), None);
                self.finish(record, None, Vec::new(), started_at)
            }
            Some(failure) => {
                record.advance(TransactionState::RollingBack);
                record.skip_pending();
                warn!(
                    transaction_id = %transaction_id,
                    tenant_id = %tenant_id,
                    error = %failure,
                    completed = record.completed().len(),
                    "write failed; rolling back"
                );
                let compensation_failures = self.compensate(&mut record, &operations, &namespaces).await;

                let kind = if compensation_failures.is_empty() {
                    record.advance(TransactionState::RolledBack);
                    AuditEventKind::Rollback
                } else {
                    record.advance(TransactionState::RollbackFailed);
                    error!(
                        transaction_id = %transaction_id,
                        tenant_id = %tenant_id,
                        orphans = ?record.orphans(),
                        "rollback incomplete; orphaned writes need reconciliation"
                    );
                    AuditEventKind::RollbackFailed
                };
                self.audit.record(
                    kind,
                    &transaction_id,
                    &tenant_id,
                    operations.len(),
                    Some(failure.to_string()),
                );
                self.finish(record, Some(failure), compensation_failures, started_at)
            }
        }
    }

    /// End a transaction in FAILED before any write.
    fn reject(
        &self,
        mut record: TransactionRecord,
        failure: TransactionError,
        started_at: DateTime<Utc>,
    ) -> TransactionResult {
        record.advance(TransactionState::Failed);
        record.skip_pending();
        info!(
            transaction_id = record.id(),
            tenant_id = record.tenant_id(),
            error = %failure,
            "transaction rejected before write"
        );
        self.audit.record(
            AuditEventKind::Failed,
            record.id(),
            record.tenant_id(),
            record.entries().len(),
            Some(failure.to_string()),
        );
        self.finish(record, Some(failure), Vec::new(), started_at)
    }

    fn finish(
        &self,
        record: TransactionRecord,
        failure: Option<TransactionError>,
        compensation_failures: Vec<CompensationFailure>,
        started_at: DateTime<Utc>,
    ) -> TransactionResult {
        let report = ConsistencyReport::from_record(&record, failure.as_ref().map(ToString::to_string), started_at);
        for sink in &self.sinks {
            sink.emit(&report);
        }
        TransactionResult {
            report,
            failure,
            compensation_failures,
        }
    }

    /// Every problem with `operations`, collected without touching a backend.
    fn validate_operations(&self, tenant_id: &str, operations: &[Operation]) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen: HashSet<(Backend, &str)> = HashSet::new();

        for op in operations {
            let target_id = op.target_id();
            let metadata = op.metadata();

            if metadata.tenant_id != tenant_id {
                error!(
                    expected = tenant_id,
                    found = %metadata.tenant_id,
                    target_id,
                    "operation metadata belongs to another tenant"
                );
                errors.push(ValidationError::TenantMismatch {
                    expected: tenant_id.to_string(),
                    found: metadata.tenant_id.clone(),
                });
            }

            let metadata_errors = metadata.validate(&self.settings.validation);
            match &op.payload {
                // Vector metadata never carries text, even for kinds that keep it.
                Payload::Vector { .. } => errors.extend(metadata_errors.into_iter().filter(|e| {
                    !matches!(e, ValidationError::RequiredField { field: "text", .. })
                })),
                _ => errors.extend(metadata_errors),
            }

            if target_id.trim().is_empty() {
                errors.push(structural(target_id, "target id is empty"));
            }

            match &op.payload {
                Payload::Node(node) => {
                    if node.kind != metadata.node_type {
                        errors.push(structural(
                            target_id,
                            &format!("node kind {} does not match metadata node_type {}", node.kind, metadata.node_type),
                        ));
                    }
                }
                Payload::Edge(edge) => {
                    if metadata.node_type != NodeKind::Relationship {
                        errors.push(structural(
                            target_id,
                            &format!("edge metadata node_type is {}, expected {}", metadata.node_type, NodeKind::Relationship),
                        ));
                    }
                    if edge.from_id.trim().is_empty() || edge.to_id.trim().is_empty() {
                        errors.push(structural(target_id, "edge endpoints are required"));
                    }
                    if edge.relation.trim().is_empty() {
                        errors.push(structural(target_id, "edge relation is required"));
                    }
                }
                Payload::Vector {
                    record,
                    expected_dimension,
                } => {
                    let actual = record.embedding.len();
                    if actual == 0 {
                        errors.push(structural(target_id, "embedding is empty"));
                    } else if record.embedding.iter().any(|v| !v.is_finite()) {
                        errors.push(structural(target_id, "embedding contains non-finite values"));
                    }
                    if actual != self.settings.embedding_dimension {
                        errors.push(ValidationError::DimensionMismatch {
                            target_id: target_id.to_string(),
                            expected: self.settings.embedding_dimension,
                            actual,
                        });
                    }
                    if let Some(expected) = expected_dimension {
                        if *expected != actual && *expected != self.settings.embedding_dimension {
                            errors.push(ValidationError::DimensionMismatch {
                                target_id: target_id.to_string(),
                                expected: *expected,
                                actual,
                            });
                        }
                    }
                }
            }

            if !seen.insert((op.backend(), target_id)) {
                errors.push(structural(target_id, "target appears twice for the same backend"));
            }
        }
        errors
    }

    async fn lock_targets(
        &self,
        tenant_id: &str,
        operations: &[Operation],
        deadline: Instant,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<TargetGuard, TransactionError> {
        let targets: Vec<String> = operations.iter().map(|op| op.target_id().to_string()).collect();

        let (lock_deadline, expired) = match self.settings.lock_timeout {
            Some(limit) if Instant::now() + limit < deadline => {
                (Instant::now() + limit, TransactionError::LockTimeout(limit))
            }
            _ => (deadline, TransactionError::TimedOut(timeout)),
        };

        tokio::select! {
            biased;
            _ = wait_cancelled(cancel) => Err(TransactionError::Cancelled),
            acquired = tokio::time::timeout_at(lock_deadline, self.locks.acquire(tenant_id, targets)) => {
                acquired.map_err(|_| expired)
            }
        }
    }

    /// Run every step; returns the failure that stopped the write phase.
    #[allow(clippy::too_many_arguments)]
    async fn write_steps(
        &self,
        record: &mut TransactionRecord,
        operations: &[Operation],
        steps: &[Step],
        namespaces: &Namespaces,
        deadline: Instant,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Option<TransactionError> {
        for step in steps {
            if cancel.map_or(false, CancellationToken::is_cancelled) {
                return Some(TransactionError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = wait_cancelled(cancel) => StepOutcome::Cancelled,
                applied = tokio::time::timeout_at(deadline, self.apply_step(step, operations, namespaces)) => {
                    match applied {
                        Ok(Ok(results)) => StepOutcome::Applied(results),
                        Ok(Err(e)) => StepOutcome::Errored(e),
                        Err(_) => StepOutcome::TimedOut,
                    }
                }
            };

            let positions = step.positions();
            match outcome {
                StepOutcome::Applied(results) => {
                    let mut failure = None;
                    for (position, rejected) in results {
                        match rejected {
                            None => record.set_status(position, OperationStatus::Done, None),
                            Some(reason) => {
                                record.set_status(position, OperationStatus::Failed, Some(reason.clone()));
                                failure.get_or_insert_with(|| TransactionError::Write {
                                    backend: operations[position].backend(),
                                    target_id: operations[position].target_id().to_string(),
                                    source: BackendError::Rejected(reason),
                                });
                            }
                        }
                    }
                    if failure.is_some() {
                        return failure;
                    }
                }
                StepOutcome::Errored(source) => {
                    let reason = source.to_string();
                    for &position in &positions {
                        record.set_status(position, OperationStatus::Failed, Some(reason.clone()));
                    }
                    let first = positions[0];
                    return Some(TransactionError::Write {
                        backend: operations[first].backend(),
                        target_id: operations[first].target_id().to_string(),
                        source,
                    });
                }
                StepOutcome::TimedOut => {
                    for &position in &positions {
                        record.set_status(position, OperationStatus::Failed, Some("timed out".into()));
                    }
                    return Some(TransactionError::TimedOut(timeout));
                }
                StepOutcome::Cancelled => {
                    for &position in &positions {
                        record.set_status(position, OperationStatus::Failed, Some("cancelled".into()));
                    }
                    return Some(TransactionError::Cancelled);
                }
            }
        }
        None
    }

    async fn apply_step(
        &self,
        step: &Step,
        operations: &[Operation],
        namespaces: &Namespaces,
    ) -> BackendResult<Vec<(usize, Option<String>)>> {
        let positions = step.positions();
        let first = &operations[positions[0]];
        match (&first.payload, step) {
            (Payload::Node(node), Step::Single(position)) => {
                self.router.graph().write_node(&namespaces.graph, node).await?;
                Ok(vec![(*position, None)])
            }
            (Payload::Edge(edge), Step::Single(position)) => {
                self.router.graph().write_edge(&namespaces.graph, edge).await?;
                Ok(vec![(*position, None)])
            }
            _ => {
                let mut records = Vec::with_capacity(positions.len());
                for &position in &positions {
                    if let Payload::Vector { record, .. } = &operations[position].payload {
                        let mut record = record.clone();
                        record.metadata.text = None;
                        records.push(record);
                    }
                }
                let results = self.router.vector().upsert_batch(&namespaces.vector, &records).await?;
                Ok(positions
                    .iter()
                    .map(|&position| {
                        let target_id = operations[position].target_id();
                        let rejected = match results.iter().find(|r| r.id == target_id) {
                            Some(result) => result.error.clone(),
                            None => Some("no result reported for vector".to_string()),
                        };
                        (position, rejected)
                    })
                    .collect())
            }
        }
    }

    /// Undo completed writes newest first. Every one is attempted.
    async fn compensate(
        &self,
        record: &mut TransactionRecord,
        operations: &[Operation],
        namespaces: &Namespaces,
    ) -> Vec<CompensationFailure> {
        let mut failures = Vec::new();
        for position in record.completed().into_iter().rev() {
            let op = &operations[position];
            match self.compensate_one(record.id(), op, namespaces).await {
                Ok(attempts) => {
                    debug!(
                        transaction_id = record.id(),
                        target_id = op.target_id(),
                        attempts,
                        "write compensated"
                    );
                    record.set_status(position, OperationStatus::Compensated, None);
                }
                Err((attempts, reason)) => {
                    error!(
                        transaction_id = record.id(),
                        tenant_id = record.tenant_id(),
                        backend = %op.backend(),
                        target_id = op.target_id(),
                        attempts,
                        error = %reason,
                        "compensation failed"
                    );
                    record.set_status(position, OperationStatus::CompensationFailed, Some(reason.clone()));
                    failures.push(CompensationFailure {
                        index: position + 1,
                        backend: op.backend(),
                        target_id: op.target_id().to_string(),
                        attempts,
                        error: reason,
                    });
                }
            }
        }
        failures
    }

    /// Retry one compensating delete with exponential backoff.
    async fn compensate_one(
        &self,
        transaction_id: &str,
        op: &Operation,
        namespaces: &Namespaces,
    ) -> Result<u32, (u32, String)> {
        let attempts = self.settings.compensation_attempts.max(1);
        let mut backoff = self.settings.compensation_backoff;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.settings.compensation_timeout, self.undo(op, namespaces)).await {
                Ok(Ok(existed)) => {
                    if !existed {
                        debug!(transaction_id, target_id = op.target_id(), "compensation target already absent");
                    }
                    return Ok(attempt);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "compensating delete timed out after {:?}",
                        self.settings.compensation_timeout
                    )
                }
            }
            warn!(
                transaction_id,
                target_id = op.target_id(),
                attempt,
                error = %last_error,
                "compensating delete failed"
            );
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
        Err((attempts, last_error))
    }

    async fn undo(&self, op: &Operation, namespaces: &Namespaces) -> BackendResult<bool> {
        match &op.payload {
            Payload::Node(node) => {
                self.router
                    .graph()
                    .delete_node(&namespaces.graph, node.kind, &node.id)
                    .await
            }
            Payload::Edge(edge) => self.router.graph().delete_edge(&namespaces.graph, &edge.id).await,
            Payload::Vector { record, .. } => self.router.vector().delete(&namespaces.vector, &record.id).await,
        }
    }

    // --- Tenant-scoped reads and maintenance ---

    /// Nearest embeddings within the current tenant's namespace.
    pub async fn search(
        &self,
        ctx: &TenantContext,
        embedding: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, TransactionError> {
        let namespace = ctx.namespace(ComponentType::Embeddings.as_str())?;
        if embedding.len() != self.settings.embedding_dimension {
            return Err(TransactionError::Validation(vec![ValidationError::DimensionMismatch {
                target_id: "query".into(),
                expected: self.settings.embedding_dimension,
                actual: embedding.len(),
            }]));
        }
        let matches = self
            .router
            .vector()
            .query(&namespace, embedding, top_k, filter)
            .await?;
        debug!(namespace = %namespace, top_k, found = matches.len(), "vector search");
        Ok(matches)
    }

    /// Delete all graph data and embeddings of the current tenant.
    pub async fn purge_tenant(&self, ctx: &TenantContext) -> Result<PurgeSummary, TransactionError> {
        let tenant_id = ctx.current()?.to_string();
        let namespace = ctx.namespace(ComponentType::Embeddings.as_str())?;
        let (nodes, edges) = self.router.graph().clear_tenant(&tenant_id).await?;
        let vectors = self.router.vector().delete_namespace(&namespace).await?;
        let summary = PurgeSummary { nodes, edges, vectors };
        warn!(tenant_id = %tenant_id, nodes, edges, vectors, "tenant data purged");
        Ok(summary)
    }

    /// The newest `limit` audit events, oldest first.
    pub fn transaction_log(&self, limit: usize) -> Vec<AuditEvent> {
        self.audit.recent(limit)
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            active_transactions: self.active.load(Ordering::SeqCst),
            audit_log_size: self.audit.len(),
            backend_mode: self.router.mode(),
            graph_backend: self.router.graph().name().to_string(),
            vector_backend: self.router.vector().name().to_string(),
            locked_targets: self.locks.len(),
        }
    }
}

fn structural(target_id: &str, reason: &str) -> ValidationError {
    ValidationError::Structural {
        target_id: target_id.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{propagate, InteractionMetadata, InteractionType, NodeKind, SourceSystem};

    fn meta(kind: NodeKind) -> crate::metadata::DerivedMetadata {
        let record = InteractionMetadata::new(
            "tenant_acme",
            "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8",
            "acc_3f2504e0-4f89-41d3-9a0c-0305e82c3301",
            "usr_7c9e6679-7425-40de-944b-e07fc1f90ae7",
            InteractionType::Call,
            SourceSystem::Internal,
            "2024-01-15T10:30:00Z",
            "Kickoff call",
        );
        propagate(&record, kind).unwrap()
    }

    #[test]
    fn unbatched_plan_is_one_step_per_operation() {
        let ops = vec![
            Operation::write_node(NodeRecord::new("sem_1", meta(NodeKind::SemanticUnit))),
            Operation::upsert_vector("sem_1", vec![1.0], &meta(NodeKind::SemanticUnit)),
            Operation::upsert_vector("sem_2", vec![1.0], &meta(NodeKind::SemanticUnit)),
        ];
        assert_eq!(
            plan_steps(&ops, false, 100),
            vec![Step::Single(0), Step::Single(1), Step::Single(2)]
        );
    }

    #[test]
    fn batched_plan_groups_contiguous_vectors_up_to_limit() {
        let m = meta(NodeKind::SemanticUnit);
        let ops = vec![
            Operation::upsert_vector("sem_1", vec![1.0], &m),
            Operation::upsert_vector("sem_2", vec![1.0], &m),
            Operation::upsert_vector("sem_3", vec![1.0], &m),
            Operation::write_node(NodeRecord::new("sem_4", m.clone())),
            Operation::upsert_vector("sem_4", vec![1.0], &m),
        ];
        assert_eq!(
            plan_steps(&ops, true, 2),
            vec![
                Step::VectorBatch(vec![0, 1]),
                Step::VectorBatch(vec![2]),
                Step::Single(3),
                Step::VectorBatch(vec![4]),
            ]
        );
    }

    #[test]
    fn transaction_ids_have_prefix_and_length() {
        let id = new_transaction_id();
        assert!(id.starts_with("txn_"));
        assert_eq!(id.len(), 20);
        assert_ne!(id, new_transaction_id());
    }

    #[test]
    fn settings_follow_config() {
        let mut config = StoreConfig::default();
        config.embedding_dimension = 8;
        config.transaction.lock_timeout_ms = Some(250);
        let settings = CoordinatorSettings::from_config(&config);
        assert_eq!(settings.embedding_dimension, 8);
        assert_eq!(settings.lock_timeout, Some(Duration::from_millis(250)));
        assert_eq!(settings.compensation_attempts, 3);
    }
}
