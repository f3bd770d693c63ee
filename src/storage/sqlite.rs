//! SQLite graph backend for local-file deployments

use super::record::{EdgeRecord, NodeRecord};
use super::traits::{BackendError, BackendResult, GraphBackend, OpenStore};
use crate::metadata::NodeKind;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// SQLite-backed graph store
///
/// One database file with a `nodes` and an `edges` table. Nodes are unique
/// on `(tenant_id, node_type, id)`; both tables also carry the namespace the
/// row was written under. Deletes address `(namespace, node_type, id)`.
/// Thread-safe via internal mutex on the connection.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    fn init_schema(conn: &Connection) -> BackendResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                tenant_id TEXT NOT NULL,
                node_type TEXT NOT NULL,
                id TEXT NOT NULL,
                namespace TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                written_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, node_type, id)
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_namespace
                ON nodes(namespace, id);

            CREATE TABLE IF NOT EXISTS edges (
                namespace TEXT NOT NULL,
                id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                relation TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                written_at TEXT NOT NULL,
                PRIMARY KEY (namespace, id)
            );

            CREATE INDEX IF NOT EXISTS idx_edges_tenant
                ON edges(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_edges_endpoints
                ON edges(namespace, from_id, to_id);

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> BackendResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| BackendError::LockPoisoned)
    }

    fn row_to_node(
        id: String,
        node_type: String,
        properties_json: String,
        metadata_json: String,
    ) -> BackendResult<NodeRecord> {
        let kind = NodeKind::parse(&node_type)
            .ok_or_else(|| BackendError::Rejected(format!("unknown node type '{}'", node_type)))?;
        Ok(NodeRecord {
            id,
            kind,
            properties: serde_json::from_str(&properties_json)?,
            metadata: serde_json::from_str(&metadata_json)?,
        })
    }

    /// Number of nodes stored for a tenant, across every namespace.
    pub fn count_nodes(&self, tenant_id: &str) -> BackendResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl OpenStore for SqliteGraphStore {
    fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> BackendResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl GraphBackend for SqliteGraphStore {
    fn name(&self) -> &str {
        "sqlite-graph"
    }

    async fn write_node(&self, namespace: &str, node: &NodeRecord) -> BackendResult<()> {
        let properties = serde_json::to_string(&node.properties)?;
        let metadata = serde_json::to_string(&node.metadata)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO nodes (tenant_id, node_type, id, namespace, properties_json, metadata_json, written_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(tenant_id, node_type, id) DO UPDATE SET
                namespace = excluded.namespace,
                properties_json = excluded.properties_json,
                metadata_json = excluded.metadata_json,
                written_at = excluded.written_at
            "#,
            params![
                node.tenant_id(),
                node.kind.as_str(),
                node.id,
                namespace,
                properties,
                metadata,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn write_edge(&self, namespace: &str, edge: &EdgeRecord) -> BackendResult<()> {
        let metadata = serde_json::to_string(&edge.metadata)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO edges (namespace, id, tenant_id, from_id, to_id, relation, metadata_json, written_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(namespace, id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                from_id = excluded.from_id,
                to_id = excluded.to_id,
                relation = excluded.relation,
                metadata_json = excluded.metadata_json,
                written_at = excluded.written_at
            "#,
            params![
                namespace,
                edge.id,
                edge.tenant_id(),
                edge.from_id,
                edge.to_id,
                edge.relation,
                metadata,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn delete_node(&self, namespace: &str, kind: NodeKind, id: &str) -> BackendResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM nodes WHERE namespace = ?1 AND node_type = ?2 AND id = ?3",
            params![namespace, kind.as_str(), id],
        )?;
        Ok(rows > 0)
    }

    async fn delete_edge(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM edges WHERE namespace = ?1 AND id = ?2",
            params![namespace, id],
        )?;
        Ok(rows > 0)
    }

    async fn clear_tenant(&self, tenant_id: &str) -> BackendResult<(usize, usize)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let edges = tx.execute("DELETE FROM edges WHERE tenant_id = ?1", params![tenant_id])?;
        let nodes = tx.execute("DELETE FROM nodes WHERE tenant_id = ?1", params![tenant_id])?;
        tx.commit()?;
        debug!(tenant_id, nodes, edges, "cleared tenant graph data");
        Ok((nodes, edges))
    }

    async fn load_node(&self, namespace: &str, id: &str) -> BackendResult<Option<NodeRecord>> {
        let row: Option<(String, String, String, String)> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT id, node_type, properties_json, metadata_json
                 FROM nodes WHERE namespace = ?1 AND id = ?2
                 ORDER BY written_at DESC, rowid DESC LIMIT 1",
                params![namespace, id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?
        };

        match row {
            Some((id, node_type, properties, metadata)) => {
                Ok(Some(Self::row_to_node(id, node_type, properties, metadata)?))
            }
            None => Ok(None),
        }
    }

    async fn has_edge(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE namespace = ?1 AND id = ?2",
            params![namespace, id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
