//! Backend adapter trait definitions

use super::record::{EdgeRecord, MetadataFilter, NodeRecord, UpsertResult, VectorMatch, VectorRecord};
use crate::metadata::NodeKind;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors raised by a backend adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Graph backend: nodes and edges, addressed by namespace.
///
/// Nodes are identified by `(namespace, kind, id)`: the same id may exist
/// once per node kind. Edges are identified by `(namespace, id)`.
///
/// Implementations must be thread-safe (Send + Sync); the coordinator calls
/// them from many tasks at once.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Short name used in logs and health output.
    fn name(&self) -> &str;

    /// Insert or replace the node of `node.kind` with `node.id`.
    async fn write_node(&self, namespace: &str, node: &NodeRecord) -> BackendResult<()>;

    /// Insert or replace an edge.
    async fn write_edge(&self, namespace: &str, edge: &EdgeRecord) -> BackendResult<()>;

    /// Delete the node of `kind` with `id`; nodes of other kinds sharing the
    /// id are untouched. Returns false if it did not exist.
    async fn delete_node(&self, namespace: &str, kind: NodeKind, id: &str) -> BackendResult<bool>;

    /// Delete an edge. Returns false if it did not exist.
    async fn delete_edge(&self, namespace: &str, id: &str) -> BackendResult<bool>;

    /// Delete everything belonging to a tenant. Returns (nodes, edges) removed.
    async fn clear_tenant(&self, tenant_id: &str) -> BackendResult<(usize, usize)>;

    /// The most recently written node with `id`, of any kind.
    async fn load_node(&self, namespace: &str, id: &str) -> BackendResult<Option<NodeRecord>>;

    async fn has_edge(&self, namespace: &str, id: &str) -> BackendResult<bool>;

    async fn has_node(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        Ok(self.load_node(namespace, id).await?.is_some())
    }
}

/// Vector backend: embeddings with stored metadata, addressed by namespace.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace a batch of vectors. One result per input, in order.
    ///
    /// An `Err` means nothing in the batch can be assumed written.
    async fn upsert_batch(
        &self,
        namespace: &str,
        vectors: &[VectorRecord],
    ) -> BackendResult<Vec<UpsertResult>>;

    /// Delete a vector. Returns false if it did not exist.
    async fn delete(&self, namespace: &str, id: &str) -> BackendResult<bool>;

    /// Delete every vector in a namespace. Returns how many were removed.
    async fn delete_namespace(&self, namespace: &str) -> BackendResult<usize>;

    /// Nearest vectors by cosine similarity, best first.
    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> BackendResult<Vec<VectorMatch>>;

    async fn has(&self, namespace: &str, id: &str) -> BackendResult<bool>;
}

/// Extension trait for opening file-backed stores
pub trait OpenStore: Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> BackendResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> BackendResult<Self>;
}
