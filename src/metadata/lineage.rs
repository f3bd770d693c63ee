//! Lineage tracking: which nodes a derived node was built from

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::propagation::DerivedMetadata;

/// Node type recorded for document roots.
pub const DOCUMENT_NODE_TYPE: &str = "document";

#[derive(Debug, Clone)]
struct LineageEntry {
    node_type: String,
    sources: Vec<String>,
    metadata: Option<DerivedMetadata>,
}

/// A node and, recursively, the nodes it was derived from.
#[derive(Debug, Clone, Serialize)]
pub struct LineageTree {
    pub node_id: String,
    pub node_type: String,
    pub sources: Vec<String>,
    pub ancestors: BTreeMap<String, LineageTree>,
}

/// In-memory record of node derivations within one pipeline run.
#[derive(Debug, Default)]
pub struct LineageTracker {
    entries: HashMap<String, LineageEntry>,
}

impl LineageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node_id` was created from `source_ids`.
    pub fn record_node_creation(
        &mut self,
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        source_ids: Vec<String>,
        metadata: Option<DerivedMetadata>,
    ) {
        self.entries.insert(
            node_id.into(),
            LineageEntry {
                node_type: node_type.into(),
                sources: source_ids,
                metadata,
            },
        );
    }

    pub fn metadata(&self, node_id: &str) -> Option<&DerivedMetadata> {
        self.entries.get(node_id)?.metadata.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full ancestry of a node. Unknown sources are listed but not expanded.
    pub fn lineage_tree(&self, node_id: &str) -> Option<LineageTree> {
        let mut visiting = BTreeSet::new();
        self.build_tree(node_id, &mut visiting)
    }

    fn build_tree(&self, node_id: &str, visiting: &mut BTreeSet<String>) -> Option<LineageTree> {
        let entry = self.entries.get(node_id)?;
        // Guards against accidental cycles in recorded lineage.
        if !visiting.insert(node_id.to_string()) {
            return None;
        }
        let ancestors = entry
            .sources
            .iter()
            .filter_map(|src| self.build_tree(src, visiting).map(|t| (src.clone(), t)))
            .collect();
        visiting.remove(node_id);
        Some(LineageTree {
            node_id: node_id.to_string(),
            node_type: entry.node_type.clone(),
            sources: entry.sources.clone(),
            ancestors,
        })
    }

    /// All document ids reachable through a node's sources, sorted and unique.
    pub fn source_documents(&self, node_id: &str) -> Vec<String> {
        let mut docs = BTreeSet::new();
        let mut stack = vec![node_id.to_string()];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(entry) = self.entries.get(&current) else {
                continue;
            };
            if entry.node_type == DOCUMENT_NODE_TYPE {
                docs.insert(current);
            } else {
                stack.extend(entry.sources.iter().cloned());
            }
        }
        docs.into_iter().collect()
    }
}
