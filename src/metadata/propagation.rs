//! Metadata propagation: shaping metadata for each node kind
//!
//! A declarative rule table decides, per node kind, whether `text` survives,
//! whether id fields are single values or lists, and how member records are
//! merged. Everything here is pure: no storage, no clocks beyond `created_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

use super::record::{InteractionMetadata, InteractionType, SourceSystem};
use super::validate::{
    is_blank, is_prefixed_uuid_v4, parse_utc_timestamp, validate, ValidationError,
    ValidationMode, ValidationRules, ACCOUNT_ID_PREFIX, INTERACTION_ID_PREFIX, USER_ID_PREFIX,
};

/// Lineage kinds a node can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    SemanticUnit,
    Entity,
    Relationship,
    Attribute,
    Community,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        Self::SemanticUnit,
        Self::Entity,
        Self::Relationship,
        Self::Attribute,
        Self::Community,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SemanticUnit => "semantic_unit",
            Self::Entity => "entity",
            Self::Relationship => "relationship",
            Self::Attribute => "attribute",
            Self::Community => "community",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }

    /// Prefix used by [`ids`](super::ids) for this kind.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::SemanticUnit => "sem",
            Self::Entity => "ent",
            Self::Relationship => "rel",
            Self::Attribute => "attr",
            Self::Community => "comm",
        }
    }

    pub fn rule(&self) -> &'static PropagationRule {
        &RULES[*self as usize]
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRule {
    Keep,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdShape {
    /// `interaction_id`, `user_id`
    Individual,
    /// Individual when the members agree, list otherwise.
    IndividualOrList,
    /// `interaction_ids`, `user_ids`
    ListOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Derived from exactly one interaction record.
    None,
    /// Merge of one or more entity records.
    MergeEntities,
    /// Merge of one or more member records; `account_id` only if unanimous.
    MergeMembers,
}

/// How metadata is shaped for one node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationRule {
    pub kind: NodeKind,
    pub text: TextRule,
    pub ids: IdShape,
    pub aggregation: Aggregation,
}

/// Indexed by `NodeKind as usize`.
static RULES: [PropagationRule; 5] = [
    PropagationRule {
        kind: NodeKind::SemanticUnit,
        text: TextRule::Keep,
        ids: IdShape::Individual,
        aggregation: Aggregation::None,
    },
    PropagationRule {
        kind: NodeKind::Entity,
        text: TextRule::Drop,
        ids: IdShape::Individual,
        aggregation: Aggregation::None,
    },
    PropagationRule {
        kind: NodeKind::Relationship,
        text: TextRule::Drop,
        ids: IdShape::Individual,
        aggregation: Aggregation::None,
    },
    PropagationRule {
        kind: NodeKind::Attribute,
        text: TextRule::Drop,
        ids: IdShape::IndividualOrList,
        aggregation: Aggregation::MergeEntities,
    },
    PropagationRule {
        kind: NodeKind::Community,
        text: TextRule::Drop,
        ids: IdShape::ListOnly,
        aggregation: Aggregation::MergeMembers,
    },
];

/// Metadata carried by a derived node.
///
/// Equality ignores `created_at`, so re-deriving from the same sources
/// compares equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedMetadata {
    pub node_type: NodeKind,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_hash_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PartialEq for DerivedMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.node_type == other.node_type
            && self.tenant_id == other.tenant_id
            && self.account_id == other.account_id
            && self.interaction_id == other.interaction_id
            && self.interaction_ids == other.interaction_ids
            && self.user_id == other.user_id
            && self.user_ids == other.user_ids
            && self.interaction_type == other.interaction_type
            && self.source_system == other.source_system
            && self.timestamp == other.timestamp
            && self.text == other.text
            && self.node_hash_id == other.node_hash_id
    }
}

impl Eq for DerivedMetadata {}

impl DerivedMetadata {
    fn empty(kind: NodeKind, tenant_id: &str) -> Self {
        Self {
            node_type: kind,
            tenant_id: tenant_id.to_string(),
            account_id: None,
            interaction_id: None,
            interaction_ids: None,
            user_id: None,
            user_ids: None,
            interaction_type: None,
            source_system: None,
            timestamp: None,
            text: None,
            node_hash_id: None,
            created_at: Some(Utc::now()),
        }
    }

    /// Set the generated content-hash id.
    pub fn with_node_hash(mut self, node_hash_id: impl Into<String>) -> Self {
        self.node_hash_id = Some(node_hash_id.into());
        self
    }

    /// Every interaction id this record refers to, single or listed.
    pub fn interaction_ids(&self) -> Vec<&str> {
        collect_ids(&self.interaction_id, &self.interaction_ids)
    }

    /// Every user id this record refers to, single or listed.
    pub fn user_ids(&self) -> Vec<&str> {
        collect_ids(&self.user_id, &self.user_ids)
    }

    /// Copy suitable for storage next to an embedding: never carries `text`.
    pub fn without_text(&self) -> Self {
        Self {
            text: None,
            ..self.clone()
        }
    }

    /// Check this record has the shape its kind's rule demands.
    pub fn validate(&self, rules: &ValidationRules) -> Vec<ValidationError> {
        let kind = self.node_type;
        let rule = kind.rule();
        let mut errors = Vec::new();

        if is_blank(&self.tenant_id) {
            errors.push(ValidationError::Missing { field: "tenant_id" });
        }

        match (rule.text, &self.text) {
            (TextRule::Keep, Some(text)) if !is_blank(text) => {
                let len = text.trim().chars().count();
                if len < rules.min_text_len {
                    errors.push(ValidationError::TextTooShort {
                        min: rules.min_text_len,
                        actual: len,
                    });
                }
            }
            (TextRule::Keep, _) => errors.push(ValidationError::RequiredField {
                kind,
                field: "text",
            }),
            (TextRule::Drop, Some(_)) => errors.push(ValidationError::ForbiddenField {
                kind,
                field: "text",
            }),
            (TextRule::Drop, None) => {}
        }

        check_id_shape(
            &mut errors,
            kind,
            rule.ids,
            ("interaction_id", &self.interaction_id),
            ("interaction_ids", &self.interaction_ids),
        );
        check_id_shape(
            &mut errors,
            kind,
            rule.ids,
            ("user_id", &self.user_id),
            ("user_ids", &self.user_ids),
        );

        for id in self.interaction_ids() {
            if !is_prefixed_uuid_v4(id, INTERACTION_ID_PREFIX) {
                errors.push(ValidationError::InvalidId {
                    field: "interaction_id",
                    prefix: INTERACTION_ID_PREFIX,
                    value: id.to_string(),
                });
            }
        }
        if rules.mode == ValidationMode::Strict {
            for id in self.user_ids() {
                if !is_prefixed_uuid_v4(id, USER_ID_PREFIX) {
                    errors.push(ValidationError::InvalidId {
                        field: "user_id",
                        prefix: USER_ID_PREFIX,
                        value: id.to_string(),
                    });
                }
            }
        }

        match &self.account_id {
            Some(account) if !is_prefixed_uuid_v4(account, ACCOUNT_ID_PREFIX) => {
                errors.push(ValidationError::InvalidId {
                    field: "account_id",
                    prefix: ACCOUNT_ID_PREFIX,
                    value: account.clone(),
                });
            }
            None if rule.ids != IdShape::ListOnly => {
                errors.push(ValidationError::RequiredField {
                    kind,
                    field: "account_id",
                });
            }
            _ => {}
        }

        // Communities drop the per-interaction enums; everyone else keeps them.
        let enums_required = rule.aggregation != Aggregation::MergeMembers;
        match &self.interaction_type {
            Some(value) if InteractionType::parse(value).is_none() => {
                errors.push(ValidationError::NotInEnum {
                    field: "interaction_type",
                    value: value.clone(),
                    allowed: InteractionType::ALL.map(|t| t.as_str()).join(", "),
                });
            }
            None if enums_required => errors.push(ValidationError::RequiredField {
                kind,
                field: "interaction_type",
            }),
            _ => {}
        }
        match &self.source_system {
            Some(value) if SourceSystem::parse(value).is_none() => {
                errors.push(ValidationError::NotInEnum {
                    field: "source_system",
                    value: value.clone(),
                    allowed: SourceSystem::ALL.map(|s| s.as_str()).join(", "),
                });
            }
            None if enums_required => errors.push(ValidationError::RequiredField {
                kind,
                field: "source_system",
            }),
            _ => {}
        }

        match &self.timestamp {
            Some(ts) if parse_utc_timestamp(ts).is_none() => {
                errors.push(ValidationError::InvalidTimestamp { value: ts.clone() });
            }
            None => errors.push(ValidationError::RequiredField {
                kind,
                field: "timestamp",
            }),
            _ => {}
        }

        errors
    }
}

fn collect_ids<'a>(single: &'a Option<String>, list: &'a Option<Vec<String>>) -> Vec<&'a str> {
    let mut ids: Vec<&str> = Vec::new();
    if let Some(id) = single {
        ids.push(id);
    }
    if let Some(list) = list {
        ids.extend(list.iter().map(String::as_str));
    }
    ids
}

fn check_id_shape(
    errors: &mut Vec<ValidationError>,
    kind: NodeKind,
    shape: IdShape,
    (single_name, single): (&'static str, &Option<String>),
    (list_name, list): (&'static str, &Option<Vec<String>>),
) {
    let has_single = single.as_deref().is_some_and(|s| !is_blank(s));
    let has_list = list.as_ref().is_some_and(|l| !l.is_empty());
    match shape {
        IdShape::Individual => {
            if !has_single {
                errors.push(ValidationError::RequiredField {
                    kind,
                    field: single_name,
                });
            }
            if list.is_some() {
                errors.push(ValidationError::ForbiddenField {
                    kind,
                    field: list_name,
                });
            }
        }
        IdShape::IndividualOrList => {
            if has_single == has_list {
                errors.push(ValidationError::RequiredField {
                    kind,
                    field: single_name,
                });
            }
        }
        IdShape::ListOnly => {
            if !has_list {
                errors.push(ValidationError::RequiredField {
                    kind,
                    field: list_name,
                });
            }
            if single.is_some() {
                errors.push(ValidationError::ForbiddenField {
                    kind,
                    field: single_name,
                });
            }
        }
    }
}

/// What a derived node's metadata comes from.
#[derive(Debug, Clone, Copy)]
pub enum Lineage<'a> {
    /// A single raw interaction (semantic units, entities, relationships).
    Interaction(&'a InteractionMetadata),
    /// Already-derived member records (attributes, communities).
    Members(&'a [DerivedMetadata]),
}

impl Lineage<'_> {
    fn describe(&self) -> &'static str {
        match self {
            Self::Interaction(_) => "a single interaction record",
            Self::Members(_) => "a list of member records",
        }
    }
}

impl<'a> From<&'a InteractionMetadata> for Lineage<'a> {
    fn from(record: &'a InteractionMetadata) -> Self {
        Self::Interaction(record)
    }
}

impl<'a> From<&'a [DerivedMetadata]> for Lineage<'a> {
    fn from(members: &'a [DerivedMetadata]) -> Self {
        Self::Members(members)
    }
}

impl<'a> From<&'a Vec<DerivedMetadata>> for Lineage<'a> {
    fn from(members: &'a Vec<DerivedMetadata>) -> Self {
        Self::Members(members.as_slice())
    }
}

/// Derive `kind`'s metadata from its sources using strict validation rules.
pub fn propagate<'a>(
    lineage: impl Into<Lineage<'a>>,
    kind: NodeKind,
) -> Result<DerivedMetadata, Vec<ValidationError>> {
    propagate_with(lineage, kind, &ValidationRules::default())
}

/// Derive `kind`'s metadata from its sources.
///
/// Mixed-tenant member lists are always rejected; no tenant is ever picked
/// on the caller's behalf.
pub fn propagate_with<'a>(
    lineage: impl Into<Lineage<'a>>,
    kind: NodeKind,
    rules: &ValidationRules,
) -> Result<DerivedMetadata, Vec<ValidationError>> {
    let lineage = lineage.into();
    let rule = kind.rule();
    match (rule.aggregation, lineage) {
        (Aggregation::None, Lineage::Interaction(source)) => from_interaction(source, rule, rules),
        (Aggregation::MergeEntities | Aggregation::MergeMembers, Lineage::Members(members)) => {
            merge_members(members, rule, rules)
        }
        (_, other) => Err(vec![ValidationError::UnsupportedLineage {
            kind,
            lineage: other.describe(),
        }]),
    }
}

fn from_interaction(
    source: &InteractionMetadata,
    rule: &PropagationRule,
    rules: &ValidationRules,
) -> Result<DerivedMetadata, Vec<ValidationError>> {
    let errors = validate(source, rules);
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut derived = DerivedMetadata::empty(rule.kind, &source.tenant_id);
    derived.account_id = Some(source.account_id.clone());
    derived.interaction_id = Some(source.interaction_id.clone());
    derived.user_id = Some(source.user_id.clone());
    derived.interaction_type = Some(source.interaction_type.clone());
    derived.source_system = Some(source.source_system.clone());
    derived.timestamp = Some(source.timestamp.clone());
    if rule.text == TextRule::Keep {
        derived.text = Some(source.text.clone());
    }
    Ok(derived)
}

fn merge_members(
    members: &[DerivedMetadata],
    rule: &PropagationRule,
    rules: &ValidationRules,
) -> Result<DerivedMetadata, Vec<ValidationError>> {
    let kind = rule.kind;
    let Some(first) = members.first() else {
        return Err(vec![ValidationError::EmptySources { kind }]);
    };

    let mut errors = Vec::new();
    for member in members {
        if member.tenant_id != first.tenant_id {
            error!(
                kind = %kind,
                expected = %first.tenant_id,
                found = %member.tenant_id,
                "cross-tenant derivation rejected"
            );
            errors.push(ValidationError::TenantMismatch {
                expected: first.tenant_id.clone(),
                found: member.tenant_id.clone(),
            });
        }
        if rule.aggregation == Aggregation::MergeEntities && member.node_type != NodeKind::Entity {
            errors.push(ValidationError::UnsupportedLineage {
                kind,
                lineage: "non-entity member records",
            });
        }
        errors.extend(member.validate(rules));
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let interaction_ids = dedup_ordered(members.iter().flat_map(|m| m.interaction_ids()));
    let user_ids = dedup_ordered(members.iter().flat_map(|m| m.user_ids()));
    let earliest = members
        .iter()
        .filter_map(|m| {
            let ts = m.timestamp.as_deref()?;
            parse_utc_timestamp(ts).map(|parsed| (parsed, ts))
        })
        // min_by_key keeps the first of equal timestamps, preserving member order.
        .min_by_key(|(parsed, _)| *parsed)
        .map(|(_, ts)| ts.to_string());

    let mut derived = DerivedMetadata::empty(kind, &first.tenant_id);
    derived.timestamp = earliest;

    match rule.aggregation {
        Aggregation::MergeMembers => {
            let account = first.account_id.as_ref();
            if account.is_some() && members.iter().all(|m| m.account_id.as_ref() == account) {
                derived.account_id = account.cloned();
            }
            derived.interaction_ids = Some(interaction_ids);
            derived.user_ids = Some(user_ids);
        }
        _ => {
            derived.account_id = first.account_id.clone();
            derived.interaction_type = first.interaction_type.clone();
            derived.source_system = first.source_system.clone();
            assign_id_shape(&mut derived.interaction_id, &mut derived.interaction_ids, interaction_ids);
            assign_id_shape(&mut derived.user_id, &mut derived.user_ids, user_ids);
        }
    }

    Ok(derived)
}

fn assign_id_shape(single: &mut Option<String>, list: &mut Option<Vec<String>>, mut ids: Vec<String>) {
    if ids.len() == 1 {
        *single = ids.pop();
    } else if !ids.is_empty() {
        *list = Some(ids);
    }
}

fn dedup_ordered<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}
