//! Propagation rule tests across every node kind

use super::*;

const INT_A: &str = "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8";
const INT_B: &str = "int_1b4e28ba-2fa1-41d2-883f-0016d3cca427";
const ACC_A: &str = "acc_3f2504e0-4f89-41d3-9a0c-0305e82c3301";
const ACC_B: &str = "acc_16fd2706-8baf-433b-82eb-8c7fada847da";
const USR_A: &str = "usr_7c9e6679-7425-40de-944b-e07fc1f90ae7";
const USR_B: &str = "usr_a8098c1a-f86e-41da-bd5e-12a8c1b2a3c4";

fn interaction(tenant: &str, interaction_id: &str, account: &str, user: &str, ts: &str) -> InteractionMetadata {
    InteractionMetadata::new(
        tenant,
        interaction_id,
        account,
        user,
        InteractionType::Call,
        SourceSystem::Internal,
        ts,
        "Customer asked about the enterprise tier and SSO support.",
    )
}

fn base() -> InteractionMetadata {
    interaction("tenant_acme", INT_A, ACC_A, USR_A, "2024-01-15T10:30:00Z")
}

fn entity_from(record: &InteractionMetadata) -> DerivedMetadata {
    propagate(record, NodeKind::Entity).expect("entity derivation")
}

#[test]
fn semantic_unit_keeps_text_and_individual_ids() {
    let derived = propagate(&base(), NodeKind::SemanticUnit).unwrap();
    assert_eq!(derived.node_type, NodeKind::SemanticUnit);
    assert_eq!(derived.text.as_deref(), Some(base().text.as_str()));
    assert_eq!(derived.interaction_id.as_deref(), Some(INT_A));
    assert_eq!(derived.user_id.as_deref(), Some(USR_A));
    assert_eq!(derived.account_id.as_deref(), Some(ACC_A));
    assert!(derived.interaction_ids.is_none());
    assert!(derived.validate(&ValidationRules::default()).is_empty());
}

#[test]
fn entity_and_relationship_drop_text() {
    for kind in [NodeKind::Entity, NodeKind::Relationship] {
        let derived = propagate(&base(), kind).unwrap();
        assert_eq!(derived.node_type, kind);
        assert!(derived.text.is_none(), "{} must not keep text", kind);
        assert_eq!(derived.interaction_type.as_deref(), Some("call"));
        assert_eq!(derived.source_system.as_deref(), Some("internal"));
        assert!(derived.validate(&ValidationRules::default()).is_empty());
    }
}

#[test]
fn single_source_kind_rejects_invalid_source() {
    let mut broken = base();
    broken.account_id = "acc_nope".into();
    broken.timestamp = "yesterday".into();
    let errors = propagate(&broken, NodeKind::Entity).unwrap_err();
    let fields: Vec<&str> = errors.iter().map(|e| e.field()).collect();
    assert_eq!(fields, vec!["account_id", "timestamp"]);
}

#[test]
fn single_source_kind_rejects_member_lists() {
    let members = vec![entity_from(&base())];
    let errors = propagate(&members, NodeKind::Entity).unwrap_err();
    assert!(matches!(
        errors[0],
        ValidationError::UnsupportedLineage { kind: NodeKind::Entity, .. }
    ));
}

#[test]
fn aggregating_kind_rejects_single_interaction() {
    let errors = propagate(&base(), NodeKind::Community).unwrap_err();
    assert!(matches!(errors[0], ValidationError::UnsupportedLineage { .. }));
}

#[test]
fn aggregation_requires_at_least_one_member() {
    let empty: Vec<DerivedMetadata> = Vec::new();
    for kind in [NodeKind::Attribute, NodeKind::Community] {
        let errors = propagate(&empty, kind).unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptySources { kind }]);
    }
}

#[test]
fn attribute_from_one_entity_keeps_individual_ids() {
    let members = vec![entity_from(&base())];
    let attr = propagate(&members, NodeKind::Attribute).unwrap();
    assert_eq!(attr.interaction_id.as_deref(), Some(INT_A));
    assert!(attr.interaction_ids.is_none());
    assert!(attr.text.is_none());
    assert!(attr.validate(&ValidationRules::default()).is_empty());
}

#[test]
fn attribute_merges_ids_in_order_and_keeps_earliest_timestamp() {
    let later = interaction("tenant_acme", INT_A, ACC_A, USR_A, "2024-02-01T00:00:00Z");
    let earlier = interaction("tenant_acme", INT_B, ACC_A, USR_B, "2024-01-01T00:00:00Z");
    let again = interaction("tenant_acme", INT_A, ACC_A, USR_A, "2024-03-01T00:00:00Z");
    let members = vec![entity_from(&later), entity_from(&earlier), entity_from(&again)];

    let attr = propagate(&members, NodeKind::Attribute).unwrap();
    assert!(attr.interaction_id.is_none());
    assert_eq!(
        attr.interaction_ids,
        Some(vec![INT_A.to_string(), INT_B.to_string()])
    );
    assert_eq!(attr.user_ids, Some(vec![USR_A.to_string(), USR_B.to_string()]));
    assert_eq!(attr.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
}

#[test]
fn attribute_rejects_non_entity_members() {
    let members = vec![propagate(&base(), NodeKind::Relationship).unwrap()];
    let errors = propagate(&members, NodeKind::Attribute).unwrap_err();
    assert!(matches!(errors[0], ValidationError::UnsupportedLineage { .. }));
}

#[test]
fn community_uses_lists_and_unanimous_account() {
    let a = entity_from(&interaction("tenant_acme", INT_A, ACC_A, USR_A, "2024-01-02T00:00:00Z"));
    let b = entity_from(&interaction("tenant_acme", INT_B, ACC_A, USR_B, "2024-01-01T00:00:00Z"));
    let community = propagate(&vec![a.clone(), b.clone()], NodeKind::Community).unwrap();

    assert_eq!(community.tenant_id, "tenant_acme");
    assert_eq!(community.account_id.as_deref(), Some(ACC_A));
    assert_eq!(
        community.interaction_ids,
        Some(vec![INT_A.to_string(), INT_B.to_string()])
    );
    assert!(community.interaction_id.is_none());
    assert!(community.user_id.is_none());
    assert!(community.text.is_none());
    assert!(community.interaction_type.is_none());
    assert_eq!(community.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
    assert!(community.validate(&ValidationRules::default()).is_empty());

    // A single member still yields list-shaped ids.
    let solo = propagate(&vec![a], NodeKind::Community).unwrap();
    assert_eq!(solo.interaction_ids, Some(vec![INT_A.to_string()]));
    assert_eq!(solo.user_ids, Some(vec![USR_A.to_string()]));
}

#[test]
fn community_omits_account_when_members_disagree() {
    let a = entity_from(&interaction("tenant_acme", INT_A, ACC_A, USR_A, "2024-01-02T00:00:00Z"));
    let b = entity_from(&interaction("tenant_acme", INT_B, ACC_B, USR_B, "2024-01-01T00:00:00Z"));
    let community = propagate(&vec![a, b], NodeKind::Community).unwrap();
    assert!(community.account_id.is_none());
}

#[test]
fn community_flattens_listed_member_ids() {
    let e1 = entity_from(&interaction("tenant_acme", INT_A, ACC_A, USR_A, "2024-01-02T00:00:00Z"));
    let e2 = entity_from(&interaction("tenant_acme", INT_B, ACC_A, USR_B, "2024-01-03T00:00:00Z"));
    let attr = propagate(&vec![e1.clone(), e2], NodeKind::Attribute).unwrap();
    let community = propagate(&vec![attr, e1], NodeKind::Community).unwrap();
    assert_eq!(
        community.interaction_ids,
        Some(vec![INT_A.to_string(), INT_B.to_string()])
    );
}

#[test]
fn mixed_tenant_members_always_fail() {
    let ours = entity_from(&base());
    let theirs = entity_from(&interaction("tenant_globex", INT_B, ACC_B, USR_B, "2024-01-01T00:00:00Z"));
    for kind in [NodeKind::Attribute, NodeKind::Community] {
        let errors = propagate(&vec![ours.clone(), theirs.clone()], kind).unwrap_err();
        assert!(errors.contains(&ValidationError::TenantMismatch {
            expected: "tenant_acme".into(),
            found: "tenant_globex".into(),
        }));
    }
}

#[test]
fn derived_tenant_always_matches_source() {
    for kind in [NodeKind::SemanticUnit, NodeKind::Entity, NodeKind::Relationship] {
        assert_eq!(propagate(&base(), kind).unwrap().tenant_id, base().tenant_id);
    }
    let members = vec![entity_from(&base())];
    for kind in [NodeKind::Attribute, NodeKind::Community] {
        assert_eq!(propagate(&members, kind).unwrap().tenant_id, "tenant_acme");
    }
}

#[test]
fn rederivation_is_idempotent_ignoring_created_at() {
    for kind in [NodeKind::SemanticUnit, NodeKind::Entity, NodeKind::Relationship] {
        let first = propagate(&base(), kind).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = propagate(&base(), kind).unwrap();
        assert_eq!(first, second);
    }
    let members = vec![entity_from(&base())];
    assert_eq!(
        propagate(&members, NodeKind::Community).unwrap(),
        propagate(&members, NodeKind::Community).unwrap()
    );
}

#[test]
fn shape_validation_catches_hand_built_records() {
    let mut entity = entity_from(&base());
    entity.text = Some("leaked".into());
    entity.interaction_ids = Some(vec![INT_B.into()]);
    let errors = entity.validate(&ValidationRules::default());
    assert!(errors.contains(&ValidationError::ForbiddenField {
        kind: NodeKind::Entity,
        field: "text"
    }));
    assert!(errors.contains(&ValidationError::ForbiddenField {
        kind: NodeKind::Entity,
        field: "interaction_ids"
    }));
}

#[test]
fn without_text_strips_only_text() {
    let unit = propagate(&base(), NodeKind::SemanticUnit).unwrap().with_node_hash("sem_0123456789abcdef");
    let stripped = unit.without_text();
    assert!(stripped.text.is_none());
    assert_eq!(stripped.node_hash_id.as_deref(), Some("sem_0123456789abcdef"));
    assert_eq!(stripped.interaction_id, unit.interaction_id);
}

#[test]
fn rule_table_matches_kinds() {
    for kind in NodeKind::ALL {
        assert_eq!(kind.rule().kind, kind);
        assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(NodeKind::SemanticUnit.rule().text, TextRule::Keep);
    assert_eq!(NodeKind::Community.rule().ids, IdShape::ListOnly);
}
