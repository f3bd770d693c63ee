//! Deterministic node ids
//!
//! Ids are `{prefix}_{hash16}` where `hash16` is the first 16 hex chars of a
//! SHA-256 over `|`-joined components. The first component keeps its position;
//! the rest are sorted, so callers may pass secondary components in any order.

use sha2::{Digest, Sha256};

use super::propagation::NodeKind;
use super::record::InteractionMetadata;

const HASH_LEN: usize = 16;

pub const DOCUMENT_PREFIX: &str = "doc";

fn compute_hash(components: &[&str]) -> String {
    let mut ordered: Vec<&str> = components.to_vec();
    if ordered.len() > 1 {
        ordered[1..].sort_unstable();
    }
    let digest = Sha256::digest(ordered.join("|").as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(HASH_LEN);
    hex
}

fn make_id(prefix: &str, components: &[&str]) -> String {
    format!("{}_{}", prefix, compute_hash(components))
}

pub fn semantic_unit_id(text: &str, tenant_id: &str, doc_id: &str, chunk_index: usize) -> String {
    let index = chunk_index.to_string();
    make_id(
        NodeKind::SemanticUnit.id_prefix(),
        &[text, tenant_id, doc_id, &index],
    )
}

/// Entity ids ignore name case and surrounding whitespace so the same entity
/// mentioned in different documents collapses to one node.
pub fn entity_id(entity_name: &str, entity_type: &str, tenant_id: &str) -> String {
    let name = entity_name.trim().to_lowercase();
    let kind = entity_type.to_lowercase();
    make_id(NodeKind::Entity.id_prefix(), &[&name, &kind, tenant_id])
}

/// Relationship ids are direction-agnostic.
pub fn relationship_id(
    source_entity_id: &str,
    target_entity_id: &str,
    relationship_type: &str,
    tenant_id: &str,
) -> String {
    let mut endpoints = [source_entity_id, target_entity_id];
    endpoints.sort_unstable();
    let rel = relationship_type.to_lowercase();
    make_id(
        NodeKind::Relationship.id_prefix(),
        &[endpoints[0], endpoints[1], &rel, tenant_id],
    )
}

pub fn attribute_id(entity_id: &str, attribute_name: &str, tenant_id: &str) -> String {
    let name = attribute_name.to_lowercase();
    make_id(NodeKind::Attribute.id_prefix(), &[entity_id, &name, tenant_id])
}

pub fn community_id(member_entity_ids: &[&str], tenant_id: &str, level: u32) -> String {
    let mut members = member_entity_ids.to_vec();
    members.sort_unstable();
    let joined = members.join(",");
    let level = level.to_string();
    make_id(NodeKind::Community.id_prefix(), &[&joined, tenant_id, &level])
}

pub fn document_id(metadata: &InteractionMetadata) -> String {
    make_id(
        DOCUMENT_PREFIX,
        &[
            &metadata.interaction_id,
            &metadata.tenant_id,
            &metadata.timestamp,
        ],
    )
}

/// True for ids shaped like the ones this module generates.
pub fn validate_id_format(node_id: &str) -> bool {
    let Some((prefix, hash)) = node_id.split_once('_') else {
        return false;
    };
    let known = prefix == DOCUMENT_PREFIX
        || NodeKind::ALL.iter().any(|k| k.id_prefix() == prefix);
    known
        && hash.len() == HASH_LEN
        && hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}
