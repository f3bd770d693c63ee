//! SqliteVectorStore: local-file vector storage
//!
//! Embeddings are stored as little-endian f32 BLOBs keyed by
//! `(namespace, id)`. Queries load the namespace's rows and rank them by
//! cosine similarity in process; metadata filters are applied before ranking.
//!
//! Uses its own database connection (WAL mode) to avoid contention with
//! the graph store's connection.

use super::record::{rank, MetadataFilter, UpsertResult, VectorMatch, VectorRecord};
use super::traits::{BackendError, BackendResult, OpenStore, VectorBackend};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Persistent vector store backed by plain SQLite.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

fn encode(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl SqliteVectorStore {
    fn init_schema(conn: &Connection) -> BackendResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                namespace TEXT NOT NULL,
                id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                metadata_json TEXT NOT NULL,
                written_at TEXT NOT NULL,
                PRIMARY KEY (namespace, id)
            );

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> BackendResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| BackendError::LockPoisoned)
    }

    /// Number of vectors stored under `namespace`.
    pub fn count(&self, namespace: &str) -> BackendResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vectors WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl OpenStore for SqliteVectorStore {
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
impl VectorBackend for SqliteVectorStore {
    fn name(&self) -> &str {
        "sqlite-vector"
    }

    async fn upsert_batch(
        &self,
        namespace: &str,
        vectors: &[VectorRecord],
    ) -> BackendResult<Vec<UpsertResult>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let written_at = Utc::now().to_rfc3339();
        let mut results = Vec::with_capacity(vectors.len());
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO vectors (namespace, id, tenant_id, dimension, embedding, metadata_json, written_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(namespace, id) DO UPDATE SET
                    tenant_id = excluded.tenant_id,
                    dimension = excluded.dimension,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json,
                    written_at = excluded.written_at
                "#,
            )?;
            for vector in vectors {
                let metadata = match serde_json::to_string(&vector.metadata) {
                    Ok(json) => json,
                    Err(e) => {
                        results.push(UpsertResult::failed(&vector.id, e.to_string()));
                        continue;
                    }
                };
                let outcome = stmt.execute(params![
                    namespace,
                    vector.id,
                    vector.metadata.tenant_id,
                    vector.embedding.len() as i64,
                    encode(&vector.embedding),
                    metadata,
                    written_at,
                ]);
                match outcome {
                    Ok(_) => results.push(UpsertResult::ok(&vector.id)),
                    Err(e) => {
                        warn!(namespace, id = %vector.id, error = %e, "vector upsert failed");
                        results.push(UpsertResult::failed(&vector.id, e.to_string()));
                    }
                }
            }
        }
        tx.commit()?;
        debug!(namespace, count = vectors.len(), "vector batch upserted");
        Ok(results)
    }

    async fn delete(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM vectors WHERE namespace = ?1 AND id = ?2",
            params![namespace, id],
        )?;
        Ok(rows > 0)
    }

    async fn delete_namespace(&self, namespace: &str) -> BackendResult<usize> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM vectors WHERE namespace = ?1", params![namespace])?;
        Ok(rows)
    }

    async fn query(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> BackendResult<Vec<VectorMatch>> {
        let rows: Vec<(String, Vec<u8>, String)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, embedding, metadata_json FROM vectors WHERE namespace = ?1",
            )?;
            let rows = stmt
                .query_map(params![namespace], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut candidates = Vec::with_capacity(rows.len());
        for (id, blob, metadata_json) in rows {
            candidates.push(VectorRecord {
                id,
                embedding: decode(&blob),
                metadata: serde_json::from_str(&metadata_json)?,
            });
        }
        Ok(rank(candidates, embedding, top_k, filter))
    }

    async fn has(&self, namespace: &str, id: &str) -> BackendResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vectors WHERE namespace = ?1 AND id = ?2",
            params![namespace, id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{propagate, InteractionMetadata, InteractionType, NodeKind, SourceSystem};

    fn meta(source: SourceSystem) -> crate::metadata::DerivedMetadata {
        let record = InteractionMetadata::new(
            "acme",
            "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8",
            "acc_3f2504e0-4f89-41d3-9a0c-0305e82c3301",
            "usr_7c9e6679-7425-40de-944b-e07fc1f90ae7",
            InteractionType::Email,
            source,
            "2024-01-15T10:30:00Z",
            "Contract redlines attached",
        );
        propagate(&record, NodeKind::SemanticUnit).unwrap()
    }

    #[test]
    fn blob_encoding_is_lossless() {
        let v = vec![0.25_f32, -1.5, 3.0e-7, f32::MAX];
        assert_eq!(decode(&encode(&v)), v);
    }

    #[tokio::test]
    async fn upsert_query_and_delete() {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        let batch = vec![
            VectorRecord::new("sem_a", vec![1.0, 0.0, 0.0], &meta(SourceSystem::Gmail)),
            VectorRecord::new("sem_b", vec![0.7, 0.7, 0.0], &meta(SourceSystem::Outlook)),
            VectorRecord::new("sem_c", vec![0.0, 0.0, 1.0], &meta(SourceSystem::Gmail)),
        ];
        let results = store.upsert_batch("acme_embeddings", &batch).await.unwrap();
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(store.count("acme_embeddings").unwrap(), 3);

        let hits = store
            .query("acme_embeddings", &[1.0, 0.1, 0.0], 2, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(hits[0].id, "sem_a");
        assert_eq!(hits[1].id, "sem_b");
        assert!(hits[0].metadata.text.is_none());

        let gmail_only = store
            .query(
                "acme_embeddings",
                &[1.0, 0.1, 0.0],
                10,
                &MetadataFilter::new().with("source_system", "gmail"),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = gmail_only.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["sem_a", "sem_c"]);

        assert!(store.delete("acme_embeddings", "sem_a").await.unwrap());
        assert!(!store.has("acme_embeddings", "sem_a").await.unwrap());
        assert_eq!(store.delete_namespace("acme_embeddings").await.unwrap(), 2);
    }
}
