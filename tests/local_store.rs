//! Local-file deployment: SQLite-backed graph and vector stores

mod common;

use common::*;
use tenantgraph::config::BackendMode;
use std::sync::Arc;
use tenantgraph::storage::{
    MetadataFilter, OpenStore, SqliteGraphStore, StorageRouter, GRAPH_DB_FILE, VECTOR_DB_FILE,
};
use tenantgraph::{
    GraphBackend, NodeKind, NodeRecord, Operation, StoreConfig, TenantGraphApi, TransactionOutcome,
};

fn local_config(dir: &std::path::Path) -> StoreConfig {
    let mut config = test_config();
    config.backend.mode = BackendMode::Local;
    config.backend.data_dir = Some(dir.to_path_buf());
    config
}

#[tokio::test]
async fn committed_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let api = TenantGraphApi::from_config(local_config(dir.path())).unwrap();
        let mut ctx = api.context();
        ctx.set_current("tenant_acme", None).unwrap();
        let result = api
            .add_node_with_embedding(&ctx, semantic_node("tenant_acme", "sem_1"), embedding(0.7))
            .await;
        assert_eq!(result.report.outcome, TransactionOutcome::Committed);
    }
    assert!(dir.path().join(GRAPH_DB_FILE).exists());
    assert!(dir.path().join(VECTOR_DB_FILE).exists());

    let api = TenantGraphApi::from_config(local_config(dir.path())).unwrap();
    assert_eq!(api.health().backend_mode, BackendMode::Local);
    let mut ctx = api.context();
    ctx.set_current("tenant_acme", None).unwrap();

    let node = api
        .coordinator()
        .router()
        .graph()
        .load_node("tenant_acme_graph", "sem_1")
        .await
        .unwrap()
        .expect("node persisted");
    assert_eq!(node.metadata.tenant_id, "tenant_acme");

    let hits = api
        .search(&ctx, &embedding(0.7), 1, &MetadataFilter::new())
        .await
        .unwrap();
    assert_eq!(hits[0].id, "sem_1");
    assert!(hits[0].score > 0.99);
}

#[tokio::test]
async fn clear_tenant_removes_only_that_tenant_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let api = TenantGraphApi::from_config(local_config(dir.path())).unwrap();

    for tenant in ["tenant_acme", "tenant_globex"] {
        let mut ctx = api.context();
        ctx.set_current(tenant, None).unwrap();
        let result = api
            .add_node_with_embedding(&ctx, semantic_node(tenant, "sem_1"), embedding(0.2))
            .await;
        assert!(result.is_committed(), "{:?}", result.failure);
    }

    let summary = api.clear_tenant("tenant_acme").await.unwrap();
    assert_eq!((summary.nodes, summary.vectors), (1, 1));

    let graph = api.coordinator().router().graph();
    assert!(!graph.has_node("tenant_acme_graph", "sem_1").await.unwrap());
    assert!(graph.has_node("tenant_globex_graph", "sem_1").await.unwrap());
}

#[tokio::test]
async fn rollback_leaves_committed_node_of_another_kind() {
    let dir = tempfile::tempdir().unwrap();
    let graph = Arc::new(SqliteGraphStore::open(dir.path().join(GRAPH_DB_FILE)).unwrap());
    let vectors = SwitchableVectorStore::new();
    let router = StorageRouter::networked(graph.clone(), vectors.clone());
    let api = TenantGraphApi::with_router(test_config(), router).unwrap();
    let mut ctx = api.context();
    ctx.set_current("tenant_acme", None).unwrap();

    let entity = NodeRecord::new("shared", derived("tenant_acme", NodeKind::Entity));
    let committed = api.execute(&ctx, vec![Operation::write_node(entity)]).await;
    assert!(committed.is_committed(), "{:?}", committed.failure);
    assert_eq!(graph.count_nodes("tenant_acme").unwrap(), 1);

    vectors.fail(true);
    let result = api
        .add_node_with_embedding(&ctx, semantic_node("tenant_acme", "shared"), embedding(0.5))
        .await;
    assert_eq!(result.report.outcome, TransactionOutcome::RolledBack);

    assert_eq!(graph.count_nodes("tenant_acme").unwrap(), 1);
    let survivor = graph.load_node("tenant_acme_graph", "shared").await.unwrap().unwrap();
    assert_eq!(survivor.kind, NodeKind::Entity);
}

#[test]
fn networked_mode_needs_supplied_adapters() {
    let mut config = test_config();
    config.backend.mode = BackendMode::Networked;
    let err = TenantGraphApi::from_config(config).unwrap_err();
    assert!(err.to_string().contains("networked"), "{}", err);
}
