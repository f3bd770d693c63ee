//! Records exchanged with backend adapters

use crate::metadata::{DerivedMetadata, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Typed property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<PropertyValue>),
    Object(HashMap<String, PropertyValue>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Properties collection
pub type Properties = HashMap<String, PropertyValue>;

/// A graph node as written to the graph backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub properties: Properties,
    pub metadata: DerivedMetadata,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, metadata: DerivedMetadata) -> Self {
        Self {
            id: id.into(),
            kind: metadata.node_type,
            properties: Properties::new(),
            metadata,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.metadata.tenant_id
    }
}

/// A directed, typed edge. `id` is the relationship node id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub relation: String,
    pub metadata: DerivedMetadata,
}

impl EdgeRecord {
    pub fn new(
        id: impl Into<String>,
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        relation: impl Into<String>,
        metadata: DerivedMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            from_id: from_id.into(),
            to_id: to_id.into(),
            relation: relation.into(),
            metadata,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.metadata.tenant_id
    }
}

/// An embedding plus the metadata stored beside it. Never carries `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: DerivedMetadata,
}

impl VectorRecord {
    /// Build a record, stripping `text` from the metadata.
    pub fn new(id: impl Into<String>, embedding: Vec<f32>, metadata: &DerivedMetadata) -> Self {
        Self {
            id: id.into(),
            embedding,
            metadata: metadata.without_text(),
        }
    }
}

/// Per-id outcome of a batch upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertResult {
    pub id: String,
    pub error: Option<String>,
}

impl UpsertResult {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One ranked query hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: DerivedMetadata,
}

/// Equality filter over stored vector metadata.
///
/// A key matches a scalar field by equality, or a list field (such as
/// `interaction_ids`) when the list contains the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub equals: BTreeMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn matches(&self, metadata: &DerivedMetadata) -> bool {
        if self.equals.is_empty() {
            return true;
        }
        let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(metadata) else {
            return false;
        };
        self.equals.iter().all(|(key, wanted)| match fields.get(key) {
            Some(serde_json::Value::String(s)) => s == wanted,
            Some(serde_json::Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(wanted.as_str())),
            _ => false,
        })
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Score, filter and rank candidates; best first, ties broken by id.
pub(crate) fn rank<I>(candidates: I, query: &[f32], top_k: usize, filter: &MetadataFilter) -> Vec<VectorMatch>
where
    I: IntoIterator<Item = VectorRecord>,
{
    let mut hits: Vec<VectorMatch> = candidates
        .into_iter()
        .filter(|r| filter.matches(&r.metadata))
        .map(|r| VectorMatch {
            score: cosine_similarity(query, &r.embedding),
            id: r.id,
            metadata: r.metadata,
        })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(top_k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{propagate, InteractionMetadata, InteractionType, SourceSystem};

    fn unit_meta() -> DerivedMetadata {
        let record = InteractionMetadata::new(
            "tenant_acme",
            "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8",
            "acc_3f2504e0-4f89-41d3-9a0c-0305e82c3301",
            "usr_7c9e6679-7425-40de-944b-e07fc1f90ae7",
            InteractionType::Email,
            SourceSystem::Gmail,
            "2024-01-15T10:30:00Z",
            "Renewal discussion",
        );
        propagate(&record, NodeKind::SemanticUnit).unwrap()
    }

    #[test]
    fn vector_record_never_keeps_text() {
        let meta = unit_meta();
        assert!(meta.text.is_some());
        let record = VectorRecord::new("sem_0123456789abcdef", vec![1.0, 0.0], &meta);
        assert!(record.metadata.text.is_none());
    }

    #[test]
    fn filter_matches_scalars_and_lists() {
        let meta = unit_meta();
        assert!(MetadataFilter::new().matches(&meta));
        assert!(MetadataFilter::new().with("source_system", "gmail").matches(&meta));
        assert!(!MetadataFilter::new().with("source_system", "outlook").matches(&meta));
        assert!(!MetadataFilter::new().with("no_such_field", "x").matches(&meta));

        let mut listed = meta.clone();
        listed.interaction_ids = Some(vec!["int_a".into(), "int_b".into()]);
        assert!(MetadataFilter::new().with("interaction_ids", "int_b").matches(&listed));
    }

    #[test]
    fn rank_orders_by_similarity() {
        let meta = unit_meta();
        let records = vec![
            VectorRecord::new("far", vec![0.0, 1.0], &meta),
            VectorRecord::new("near", vec![1.0, 0.1], &meta),
            VectorRecord::new("exact", vec![2.0, 0.0], &meta),
        ];
        let hits = rank(records, &[1.0, 0.0], 2, &MetadataFilter::new());
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_mismatched_or_zero_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
