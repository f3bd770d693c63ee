//! Operations a transaction is built from

use crate::metadata::{DerivedMetadata, NodeKind};
use crate::storage::{EdgeRecord, NodeRecord, VectorRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Which backend an operation writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Graph,
    Vector,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Vector => "vector",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The write an operation performs (and therefore how it is undone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationAction {
    WriteNode,
    WriteEdge,
    UpsertVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Node(NodeRecord),
    Edge(EdgeRecord),
    Vector {
        record: VectorRecord,
        /// Dimension the caller expects; checked in addition to the configured one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_dimension: Option<usize>,
    },
}

/// One step of a coordinated write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub payload: Payload,
}

impl Operation {
    pub fn write_node(node: NodeRecord) -> Self {
        Self {
            payload: Payload::Node(node),
        }
    }

    pub fn write_edge(edge: EdgeRecord) -> Self {
        Self {
            payload: Payload::Edge(edge),
        }
    }

    /// Upsert an embedding. `text` is stripped from the stored metadata.
    pub fn upsert_vector(id: impl Into<String>, embedding: Vec<f32>, metadata: &DerivedMetadata) -> Self {
        Self {
            payload: Payload::Vector {
                record: VectorRecord::new(id, embedding, metadata),
                expected_dimension: None,
            },
        }
    }

    /// Declare the dimension this vector must have. No effect on graph operations.
    pub fn with_expected_dimension(mut self, dimension: usize) -> Self {
        if let Payload::Vector {
            expected_dimension, ..
        } = &mut self.payload
        {
            *expected_dimension = Some(dimension);
        }
        self
    }

    pub fn backend(&self) -> Backend {
        match self.payload {
            Payload::Node(_) | Payload::Edge(_) => Backend::Graph,
            Payload::Vector { .. } => Backend::Vector,
        }
    }

    pub fn action(&self) -> OperationAction {
        match self.payload {
            Payload::Node(_) => OperationAction::WriteNode,
            Payload::Edge(_) => OperationAction::WriteEdge,
            Payload::Vector { .. } => OperationAction::UpsertVector,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.metadata().node_type
    }

    pub fn target_id(&self) -> &str {
        match &self.payload {
            Payload::Node(node) => &node.id,
            Payload::Edge(edge) => &edge.id,
            Payload::Vector { record, .. } => &record.id,
        }
    }

    pub fn metadata(&self) -> &DerivedMetadata {
        match &self.payload {
            Payload::Node(node) => &node.metadata,
            Payload::Edge(edge) => &edge.metadata,
            Payload::Vector { record, .. } => &record.metadata,
        }
    }

    /// First 16 hex chars of SHA-256 over the serialized payload.
    ///
    /// `created_at` is excluded so the digest only reflects content.
    pub fn payload_digest(&self) -> String {
        let mut payload = self.payload.clone();
        match &mut payload {
            Payload::Node(node) => node.metadata.created_at = None,
            Payload::Edge(edge) => edge.metadata.created_at = None,
            Payload::Vector { record, .. } => record.metadata.created_at = None,
        }
        // Through Value so property maps serialize with sorted keys.
        let bytes = serde_json::to_value(&payload)
            .and_then(|v| serde_json::to_vec(&v))
            .unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{propagate, InteractionMetadata, InteractionType, SourceSystem};

    fn meta() -> DerivedMetadata {
        let record = InteractionMetadata::new(
            "tenant_acme",
            "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8",
            "acc_3f2504e0-4f89-41d3-9a0c-0305e82c3301",
            "usr_7c9e6679-7425-40de-944b-e07fc1f90ae7",
            InteractionType::Call,
            SourceSystem::Internal,
            "2024-01-15T10:30:00Z",
            "Discussed onboarding timeline",
        );
        propagate(&record, NodeKind::SemanticUnit).unwrap()
    }

    #[test]
    fn operations_describe_themselves() {
        let node = Operation::write_node(NodeRecord::new("sem_1", meta()));
        assert_eq!(node.backend(), Backend::Graph);
        assert_eq!(node.action(), OperationAction::WriteNode);
        assert_eq!(node.kind(), NodeKind::SemanticUnit);
        assert_eq!(node.target_id(), "sem_1");

        let vector = Operation::upsert_vector("sem_1", vec![0.1, 0.2], &meta()).with_expected_dimension(2);
        assert_eq!(vector.backend(), Backend::Vector);
        assert!(vector.metadata().text.is_none());
        assert!(matches!(
            vector.payload,
            Payload::Vector { expected_dimension: Some(2), .. }
        ));
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let a = Operation::write_node(NodeRecord::new("sem_1", meta()));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Operation::write_node(NodeRecord::new("sem_1", meta()));
        assert_eq!(a.payload_digest(), b.payload_digest());
        assert_eq!(a.payload_digest().len(), 16);

        let c = Operation::write_node(NodeRecord::new("sem_2", meta()));
        assert_ne!(a.payload_digest(), c.payload_digest());
    }
}
