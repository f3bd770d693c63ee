//! Backend selection
//!
//! A `StorageRouter` pairs one graph adapter with one vector adapter
//! according to the deployment mode. The process-wide router is set once;
//! replacing it is an explicit, logged operation.

use super::memory::{MemoryGraphStore, MemoryVectorStore};
use super::sqlite::SqliteGraphStore;
use super::sqlite_vector::SqliteVectorStore;
use super::traits::{BackendError, BackendResult, GraphBackend, OpenStore, VectorBackend};
use crate::config::{BackendMode, StoreConfig};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// File names used under the local data directory.
pub const GRAPH_DB_FILE: &str = "graph.db";
pub const VECTOR_DB_FILE: &str = "vectors.db";

/// The graph and vector adapters every storage call goes through.
#[derive(Clone)]
pub struct StorageRouter {
    mode: BackendMode,
    graph: Arc<dyn GraphBackend>,
    vector: Arc<dyn VectorBackend>,
}

impl std::fmt::Debug for StorageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRouter")
            .field("mode", &self.mode)
            .field("graph", &self.graph.name())
            .field("vector", &self.vector.name())
            .finish()
    }
}

impl StorageRouter {
    /// In-process backends.
    pub fn memory() -> Self {
        Self {
            mode: BackendMode::Memory,
            graph: Arc::new(MemoryGraphStore::new()),
            vector: Arc::new(MemoryVectorStore::new()),
        }
    }

    /// SQLite files under `data_dir`.
    pub fn local(data_dir: impl AsRef<Path>) -> BackendResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let graph = SqliteGraphStore::open(data_dir.join(GRAPH_DB_FILE))?;
        let vector = SqliteVectorStore::open(data_dir.join(VECTOR_DB_FILE))?;
        Ok(Self {
            mode: BackendMode::Local,
            graph: Arc::new(graph),
            vector: Arc::new(vector),
        })
    }

    /// Adapters for remote services, constructed by the caller.
    pub fn networked(graph: Arc<dyn GraphBackend>, vector: Arc<dyn VectorBackend>) -> Self {
        Self {
            mode: BackendMode::Networked,
            graph,
            vector,
        }
    }

    /// Build the router the config selects.
    ///
    /// Networked adapters speak wire protocols this crate does not ship;
    /// that mode must go through [`StorageRouter::networked`].
    pub fn from_config(config: &StoreConfig) -> BackendResult<Self> {
        let router = match config.backend.mode {
            BackendMode::Memory => Self::memory(),
            BackendMode::Local => {
                let dir = config.backend.resolved_data_dir().ok_or_else(|| {
                    BackendError::Unavailable("no data directory for local mode".into())
                })?;
                Self::local(dir)?
            }
            BackendMode::Networked => {
                return Err(BackendError::Unavailable(
                    "networked mode needs externally supplied adapters".into(),
                ))
            }
        };
        info!(mode = %router.mode, graph = router.graph.name(), vector = router.vector.name(), "storage router selected");
        Ok(router)
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn graph(&self) -> &Arc<dyn GraphBackend> {
        &self.graph
    }

    pub fn vector(&self) -> &Arc<dyn VectorBackend> {
        &self.vector
    }
}

static GLOBAL: RwLock<Option<Arc<StorageRouter>>> = RwLock::new(None);

/// Install the process-wide router. If one is already installed it is kept
/// and returned; selection is fixed until [`reinitialize_global`].
pub fn init_global(router: StorageRouter) -> Arc<StorageRouter> {
    let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = slot.as_ref() {
        warn!(
            current = %existing.mode,
            requested = %router.mode,
            "storage router already initialized; keeping current selection"
        );
        return existing.clone();
    }
    info!(mode = %router.mode, "global storage router initialized");
    let router = Arc::new(router);
    *slot = Some(router.clone());
    router
}

/// The process-wide router, if initialized.
pub fn global() -> Option<Arc<StorageRouter>> {
    GLOBAL.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Replace the process-wide router. Returns the previous one.
///
/// Callers holding the old `Arc` keep using the old backends.
pub fn reinitialize_global(router: StorageRouter) -> Option<Arc<StorageRouter>> {
    let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    warn!(
        previous = slot.as_ref().map(|r| r.mode.as_str()).unwrap_or("none"),
        next = %router.mode,
        "reinitializing global storage router"
    );
    slot.replace(Arc::new(router))
}
