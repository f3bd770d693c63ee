//! Common test utilities for tenantgraph integration tests
//!
//! Fixture builders for interaction metadata and operations, plus a vector
//! backend that fails on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tenantgraph::metadata::{InteractionType, SourceSystem};
use tenantgraph::storage::{
    BackendError, BackendResult, MemoryVectorStore, MetadataFilter, UpsertResult, VectorBackend, VectorMatch,
    VectorRecord,
};
use tenantgraph::{propagate, DerivedMetadata, InteractionMetadata, NodeKind, NodeRecord, Operation, StoreConfig};

pub const DIM: usize = 8;
pub const INTERACTION_ID: &str = "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8";
pub const ACCOUNT_ID: &str = "acc_3f2504e0-4f89-41d3-9a0c-0305e82c3301";
pub const USER_ID: &str = "usr_7c9e6679-7425-40de-944b-e07fc1f90ae7";

/// A valid interaction record for `tenant`.
pub fn interaction(tenant: &str) -> InteractionMetadata {
    InteractionMetadata::new(
        tenant,
        INTERACTION_ID,
        ACCOUNT_ID,
        USER_ID,
        InteractionType::Call,
        SourceSystem::Internal,
        "2024-03-02T14:05:00Z",
        "Renewal call: customer wants SSO and audit logs before signing.",
    )
}

pub fn derived(tenant: &str, kind: NodeKind) -> DerivedMetadata {
    propagate(&interaction(tenant), kind).expect("fixture metadata derives")
}

pub fn semantic_node(tenant: &str, id: &str) -> NodeRecord {
    NodeRecord::new(id, derived(tenant, NodeKind::SemanticUnit))
}

/// Deterministic unit-ish embedding of length `DIM`.
pub fn embedding(seed: f32) -> Vec<f32> {
    (0..DIM).map(|i| seed + i as f32 * 0.01).collect()
}

pub fn vector_op(tenant: &str, id: &str, seed: f32) -> Operation {
    Operation::upsert_vector(id, embedding(seed), &derived(tenant, NodeKind::SemanticUnit))
}

/// Memory config sized for `DIM`-long embeddings and quick compensation.
pub fn test_config() -> StoreConfig {
    let mut config = StoreConfig::default();
    config.embedding_dimension = DIM;
    config.transaction.compensation_backoff_ms = 1;
    config
}

/// Vector backend that fails every upsert while `failing` is set.
#[derive(Default)]
pub struct SwitchableVectorStore {
    pub inner: MemoryVectorStore,
    pub failing: AtomicBool,
}

impl SwitchableVectorStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorBackend for SwitchableVectorStore {
    fn name(&self) -> &str {
        "switchable-vector"
    }

    async fn upsert_batch(&self, namespace: &str, vectors: &[VectorRecord]) -> BackendResult<Vec<UpsertResult>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("vector index offline".into()));
        }
        self.inner.upsert_batch(namespace, vectors).await
    }

    async fn delete(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        self.inner.delete(namespace, id).await
    }

    async fn delete_namespace(&self, namespace: &str) -> BackendResult<usize> {
        self.inner.delete_namespace(namespace).await
    }

    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> BackendResult<Vec<VectorMatch>> {
        self.inner.query(namespace, embedding, top_k, filter).await
    }

    async fn has(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        self.inner.has(namespace, id).await
    }
}
