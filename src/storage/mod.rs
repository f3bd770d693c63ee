//! Storage backends
//!
//! The coordinator talks to storage only through the `GraphBackend` and
//! `VectorBackend` traits. `StorageRouter` picks the implementations: the
//! in-memory stores, the SQLite stores for local-file deployments, or
//! externally supplied networked adapters.

mod memory;
mod record;
mod router;
mod sqlite;
mod sqlite_vector;
mod traits;

pub use memory::{MemoryGraphStore, MemoryVectorStore};
pub use record::{
    EdgeRecord, MetadataFilter, NodeRecord, Properties, PropertyValue, UpsertResult, VectorMatch,
    VectorRecord,
};
pub use router::{global, init_global, reinitialize_global, StorageRouter, GRAPH_DB_FILE, VECTOR_DB_FILE};
pub use sqlite::SqliteGraphStore;
pub use sqlite_vector::SqliteVectorStore;
pub use traits::{BackendError, BackendResult, GraphBackend, OpenStore, VectorBackend};
