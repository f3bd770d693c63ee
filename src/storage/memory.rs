//! In-process backends
//!
//! DashMap-backed implementations of both adapter traits. Used for the
//! `memory` backend mode and as the base for test doubles.

use super::record::{rank, EdgeRecord, MetadataFilter, NodeRecord, UpsertResult, VectorMatch, VectorRecord};
use super::traits::{BackendResult, GraphBackend, VectorBackend};
use crate::metadata::NodeKind;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

type Key = (String, String);
type NodeKey = (String, NodeKind, String);

fn key(namespace: &str, id: &str) -> Key {
    (namespace.to_string(), id.to_string())
}

fn node_key(namespace: &str, kind: NodeKind, id: &str) -> NodeKey {
    (namespace.to_string(), kind, id.to_string())
}

/// Graph backend held entirely in memory.
///
/// Nodes are unique per `(namespace, kind, id)`; each carries the write
/// sequence it was last stored at so `load_node` can pick the newest.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    nodes: DashMap<NodeKey, (u64, NodeRecord)>,
    edges: DashMap<Key, EdgeRecord>,
    writes: AtomicU64,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Node ids stored under `namespace`, sorted and deduplicated across kinds.
    pub fn node_ids(&self, namespace: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .iter()
            .filter(|e| e.key().0 == namespace)
            .map(|e| e.key().2.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[async_trait]
impl GraphBackend for MemoryGraphStore {
    fn name(&self) -> &str {
        "memory-graph"
    }

    async fn write_node(&self, namespace: &str, node: &NodeRecord) -> BackendResult<()> {
        let seq = self.writes.fetch_add(1, Ordering::Relaxed);
        self.nodes
            .insert(node_key(namespace, node.kind, &node.id), (seq, node.clone()));
        Ok(())
    }

    async fn write_edge(&self, namespace: &str, edge: &EdgeRecord) -> BackendResult<()> {
        self.edges.insert(key(namespace, &edge.id), edge.clone());
        Ok(())
    }

    async fn delete_node(&self, namespace: &str, kind: NodeKind, id: &str) -> BackendResult<bool> {
        Ok(self.nodes.remove(&node_key(namespace, kind, id)).is_some())
    }

    async fn delete_edge(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        Ok(self.edges.remove(&key(namespace, id)).is_some())
    }

    async fn clear_tenant(&self, tenant_id: &str) -> BackendResult<(usize, usize)> {
        let nodes_before = self.nodes.len();
        self.nodes.retain(|_, (_, n)| n.tenant_id() != tenant_id);
        let edges_before = self.edges.len();
        self.edges.retain(|_, e| e.tenant_id() != tenant_id);
        Ok((
            nodes_before.saturating_sub(self.nodes.len()),
            edges_before.saturating_sub(self.edges.len()),
        ))
    }

    async fn load_node(&self, namespace: &str, id: &str) -> BackendResult<Option<NodeRecord>> {
        Ok(self
            .nodes
            .iter()
            .filter(|e| e.key().0 == namespace && e.key().2 == id)
            .max_by_key(|e| e.value().0)
            .map(|e| e.value().1.clone()))
    }

    async fn has_edge(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        Ok(self.edges.contains_key(&key(namespace, id)))
    }
}

/// Vector backend held entirely in memory; queries are brute-force cosine.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    vectors: DashMap<Key, VectorRecord>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, namespace: &str, id: &str) -> Option<VectorRecord> {
        self.vectors.get(&key(namespace, id)).map(|v| v.clone())
    }
}

#[async_trait]
impl VectorBackend for MemoryVectorStore {
    fn name(&self) -> &str {
        "memory-vector"
    }

    async fn upsert_batch(
        &self,
        namespace: &str,
        vectors: &[VectorRecord],
    ) -> BackendResult<Vec<UpsertResult>> {
        Ok(vectors
            .iter()
            .map(|v| {
                self.vectors.insert(key(namespace, &v.id), v.clone());
                UpsertResult::ok(&v.id)
            })
            .collect())
    }

    async fn delete(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        Ok(self.vectors.remove(&key(namespace, id)).is_some())
    }

    async fn delete_namespace(&self, namespace: &str) -> BackendResult<usize> {
        let before = self.vectors.len();
        self.vectors.retain(|(ns, _), _| ns != namespace);
        Ok(before.saturating_sub(self.vectors.len()))
    }

    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> BackendResult<Vec<VectorMatch>> {
        let candidates: Vec<VectorRecord> = self
            .vectors
            .iter()
            .filter(|e| e.key().0 == namespace)
            .map(|e| e.value().clone())
            .collect();
        Ok(rank(candidates, embedding, top_k, filter))
    }

    async fn has(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        Ok(self.vectors.contains_key(&key(namespace, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{propagate, InteractionMetadata, InteractionType, NodeKind, SourceSystem};

    fn interaction(tenant: &str) -> InteractionMetadata {
        InteractionMetadata::new(
            tenant,
            "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8",
            "acc_3f2504e0-4f89-41d3-9a0c-0305e82c3301",
            "usr_7c9e6679-7425-40de-944b-e07fc1f90ae7",
            InteractionType::Chat,
            SourceSystem::Internal,
            "2024-01-15T10:30:00Z",
            "Pricing question",
        )
    }

    fn meta(tenant: &str) -> crate::metadata::DerivedMetadata {
        propagate(&interaction(tenant), NodeKind::Entity).unwrap()
    }

    #[tokio::test]
    async fn nodes_are_scoped_by_namespace() {
        let store = MemoryGraphStore::new();
        let node = NodeRecord::new("ent_1", meta("acme"));
        store.write_node("acme_graph", &node).await.unwrap();

        assert!(store.has_node("acme_graph", "ent_1").await.unwrap());
        assert!(!store.has_node("globex_graph", "ent_1").await.unwrap());
        assert!(!store.delete_node("globex_graph", NodeKind::Entity, "ent_1").await.unwrap());
        assert!(store.delete_node("acme_graph", NodeKind::Entity, "ent_1").await.unwrap());
        assert!(!store.delete_node("acme_graph", NodeKind::Entity, "ent_1").await.unwrap());
    }

    #[tokio::test]
    async fn same_id_is_kept_once_per_kind() {
        let store = MemoryGraphStore::new();
        let entity = NodeRecord::new("shared", meta("acme"));
        let unit = NodeRecord::new("shared", propagate(&interaction("acme"), NodeKind::SemanticUnit).unwrap());
        store.write_node("acme_graph", &entity).await.unwrap();
        store.write_node("acme_graph", &unit).await.unwrap();
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.node_ids("acme_graph"), vec!["shared"]);
        assert_eq!(
            store.load_node("acme_graph", "shared").await.unwrap().unwrap().kind,
            NodeKind::SemanticUnit
        );

        assert!(store.delete_node("acme_graph", NodeKind::SemanticUnit, "shared").await.unwrap());
        assert_eq!(
            store.load_node("acme_graph", "shared").await.unwrap().unwrap().kind,
            NodeKind::Entity
        );
    }

    #[tokio::test]
    async fn clear_tenant_counts_only_that_tenant() {
        let store = MemoryGraphStore::new();
        for id in ["ent_1", "ent_2"] {
            store.write_node("acme_graph", &NodeRecord::new(id, meta("acme"))).await.unwrap();
        }
        store.write_node("globex_graph", &NodeRecord::new("ent_1", meta("globex"))).await.unwrap();
        let edge = EdgeRecord::new("rel_1", "ent_1", "ent_2", "works_with", meta("acme"));
        store.write_edge("acme_graph", &edge).await.unwrap();

        assert_eq!(store.clear_tenant("acme").await.unwrap(), (2, 1));
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.node_ids("globex_graph"), vec!["ent_1"]);
    }

    #[tokio::test]
    async fn vector_namespace_isolation() {
        let store = MemoryVectorStore::new();
        let m = meta("acme");
        store
            .upsert_batch("acme_embeddings", &[VectorRecord::new("ent_1", vec![1.0, 0.0], &m)])
            .await
            .unwrap();
        store
            .upsert_batch("globex_embeddings", &[VectorRecord::new("ent_9", vec![1.0, 0.0], &meta("globex"))])
            .await
            .unwrap();

        let hits = store
            .query("acme_embeddings", &[1.0, 0.0], 10, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "ent_1");

        assert_eq!(store.delete_namespace("acme_embeddings").await.unwrap(), 1);
        assert!(store.has("globex_embeddings", "ent_9").await.unwrap());
    }
}
