//! Storage namespace derivation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage component a namespace is derived for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    /// Node and edge data in the graph backend.
    Graph,
    /// Vectors in the vector backend.
    Embeddings,
    Custom(String),
}

impl ComponentType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Graph => "graph",
            Self::Embeddings => "embeddings",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ComponentType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// `{tenant_id}_{component_type}`. Pure; identical across calls and processes.
pub fn namespace_for(tenant_id: &str, component_type: &str) -> String {
    format!("{}_{}", tenant_id, component_type)
}
