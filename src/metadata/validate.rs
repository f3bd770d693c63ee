//! Field-level validation for interaction metadata
//!
//! Every check runs independently so callers see all failures at once.
//! Malformed input is the expected case: nothing here panics or returns `Err`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::propagation::NodeKind;
use super::record::{InteractionMetadata, InteractionType, SourceSystem};

pub const INTERACTION_ID_PREFIX: &str = "int_";
pub const ACCOUNT_ID_PREFIX: &str = "acc_";
pub const USER_ID_PREFIX: &str = "usr_";

/// A single problem found while validating metadata or a transaction payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Missing { field: &'static str },

    #[error("{field} must be a UUID v4 with '{prefix}' prefix, got '{value}'")]
    InvalidId {
        field: &'static str,
        prefix: &'static str,
        value: String,
    },

    #[error("{field} must be one of: {allowed}; got '{value}'")]
    NotInEnum {
        field: &'static str,
        value: String,
        allowed: String,
    },

    #[error("timestamp must be ISO-8601 UTC (YYYY-MM-DDTHH:MM:SSZ), got '{value}'")]
    InvalidTimestamp { value: String },

    #[error("text must be at least {min} characters, got {actual}")]
    TextTooShort { min: usize, actual: usize },

    #[error("tenant mismatch: expected '{expected}', found '{found}'")]
    TenantMismatch { expected: String, found: String },

    #[error("{kind} requires at least one source record")]
    EmptySources { kind: NodeKind },

    #[error("{kind} cannot be derived from {lineage}")]
    UnsupportedLineage { kind: NodeKind, lineage: &'static str },

    #[error("{kind} must not carry {field}")]
    ForbiddenField { kind: NodeKind, field: &'static str },

    #[error("{kind} must carry {field}")]
    RequiredField { kind: NodeKind, field: &'static str },

    #[error("embedding for '{target_id}' has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        target_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("operation on '{target_id}' is incomplete: {reason}")]
    Structural { target_id: String, reason: String },
}

impl ValidationError {
    /// Name of the field (or payload element) the error is about.
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field }
            | Self::InvalidId { field, .. }
            | Self::NotInEnum { field, .. }
            | Self::ForbiddenField { field, .. }
            | Self::RequiredField { field, .. } => field,
            Self::InvalidTimestamp { .. } => "timestamp",
            Self::TextTooShort { .. } => "text",
            Self::TenantMismatch { .. } => "tenant_id",
            Self::EmptySources { .. } | Self::UnsupportedLineage { .. } => "sources",
            Self::DimensionMismatch { .. } => "embedding",
            Self::Structural { .. } => "payload",
        }
    }
}

/// Strictness of id-format checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Every id field must be a prefixed UUID v4.
    #[default]
    Strict,
    /// `user_id` only has to be a non-empty string.
    Relaxed,
}

/// Knobs the validator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub mode: ValidationMode,
    /// Minimum number of characters in `text` (after trimming).
    pub min_text_len: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Strict,
            min_text_len: 1,
        }
    }
}

impl ValidationRules {
    pub fn relaxed() -> Self {
        Self {
            mode: ValidationMode::Relaxed,
            ..Self::default()
        }
    }
}

/// Validate all 8 fields of an interaction record.
///
/// Returns an empty list iff the record is valid.
pub fn validate(record: &InteractionMetadata, rules: &ValidationRules) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if is_blank(&record.tenant_id) {
        errors.push(ValidationError::Missing { field: "tenant_id" });
    }

    check_id(
        &mut errors,
        "interaction_id",
        INTERACTION_ID_PREFIX,
        &record.interaction_id,
    );
    check_id(&mut errors, "account_id", ACCOUNT_ID_PREFIX, &record.account_id);
    match rules.mode {
        ValidationMode::Strict => {
            check_id(&mut errors, "user_id", USER_ID_PREFIX, &record.user_id)
        }
        ValidationMode::Relaxed => {
            if is_blank(&record.user_id) {
                errors.push(ValidationError::Missing { field: "user_id" });
            }
        }
    }

    if is_blank(&record.interaction_type) {
        errors.push(ValidationError::Missing {
            field: "interaction_type",
        });
    } else if InteractionType::parse(&record.interaction_type).is_none() {
        errors.push(ValidationError::NotInEnum {
            field: "interaction_type",
            value: record.interaction_type.clone(),
            allowed: InteractionType::ALL.map(|t| t.as_str()).join(", "),
        });
    }

    if is_blank(&record.source_system) {
        errors.push(ValidationError::Missing {
            field: "source_system",
        });
    } else if SourceSystem::parse(&record.source_system).is_none() {
        errors.push(ValidationError::NotInEnum {
            field: "source_system",
            value: record.source_system.clone(),
            allowed: SourceSystem::ALL.map(|s| s.as_str()).join(", "),
        });
    }

    if is_blank(&record.timestamp) {
        errors.push(ValidationError::Missing { field: "timestamp" });
    } else if parse_utc_timestamp(&record.timestamp).is_none() {
        errors.push(ValidationError::InvalidTimestamp {
            value: record.timestamp.clone(),
        });
    }

    let text_len = record.text.trim().chars().count();
    if text_len == 0 {
        errors.push(ValidationError::Missing { field: "text" });
    } else if text_len < rules.min_text_len {
        errors.push(ValidationError::TextTooShort {
            min: rules.min_text_len,
            actual: text_len,
        });
    }

    errors
}

fn check_id(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    prefix: &'static str,
    value: &str,
) {
    if is_blank(value) {
        errors.push(ValidationError::Missing { field });
    } else if !is_prefixed_uuid_v4(value, prefix) {
        errors.push(ValidationError::InvalidId {
            field,
            prefix,
            value: value.to_string(),
        });
    }
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// `prefix` followed by a hyphenated, RFC 4122 variant, version 4 UUID.
pub fn is_prefixed_uuid_v4(value: &str, prefix: &str) -> bool {
    let Some(rest) = value.strip_prefix(prefix) else {
        return false;
    };
    // Uuid::parse_str also accepts simple/braced/urn forms; only hyphenated is allowed here.
    if rest.len() != 36 {
        return false;
    }
    match Uuid::parse_str(rest) {
        Ok(uuid) => uuid.get_version_num() == 4 && uuid.get_variant() == uuid::Variant::RFC4122,
        Err(_) => false,
    }
}

/// Parse a strict ISO-8601 UTC timestamp (`T` separator, `Z` suffix).
pub fn parse_utc_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if !value.ends_with('Z') || value.as_bytes().get(10) != Some(&b'T') {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> InteractionMetadata {
        InteractionMetadata::new(
            "tenant_acme",
            "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8",
            "acc_3f2504e0-4f89-41d3-9a0c-0305e82c3301",
            "usr_7c9e6679-7425-40de-944b-e07fc1f90ae7",
            InteractionType::Email,
            SourceSystem::Outlook,
            "2024-03-01T08:15:30Z",
            "Follow-up on the onboarding call.",
        )
    }

    fn fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field()).collect()
    }

    #[test]
    fn valid_record_has_no_errors() {
        assert!(valid().validate().is_empty());
    }

    #[test]
    fn each_missing_field_is_named() {
        let blankers: [(&str, fn(&mut InteractionMetadata)); 8] = [
            ("tenant_id", |m| m.tenant_id.clear()),
            ("interaction_id", |m| m.interaction_id.clear()),
            ("account_id", |m| m.account_id.clear()),
            ("user_id", |m| m.user_id.clear()),
            ("interaction_type", |m| m.interaction_type.clear()),
            ("source_system", |m| m.source_system.clear()),
            ("timestamp", |m| m.timestamp.clear()),
            ("text", |m| m.text = "   ".to_string()),
        ];
        for (field, blank) in blankers {
            let mut record = valid();
            blank(&mut record);
            let errors = record.validate();
            assert!(
                fields(&errors).contains(&field),
                "blank {} should be reported, got {:?}",
                field,
                errors
            );
        }
    }

    #[test]
    fn each_malformed_field_is_named() {
        let breakers: [(&str, fn(&mut InteractionMetadata)); 6] = [
            ("interaction_id", |m| {
                m.interaction_id = "acc_6ba7b810-9dad-41d1-80b4-00c04fd430c8".into()
            }),
            ("account_id", |m| m.account_id = "acc_not-a-uuid".into()),
            ("user_id", |m| {
                // version 1 UUID
                m.user_id = "usr_6ba7b810-9dad-11d1-80b4-00c04fd430c8".into()
            }),
            ("interaction_type", |m| m.interaction_type = "fax".into()),
            ("source_system", |m| m.source_system = "slack".into()),
            ("timestamp", |m| m.timestamp = "2024-03-01T08:15:30+02:00".into()),
        ];
        for (field, brk) in breakers {
            let mut record = valid();
            brk(&mut record);
            let errors = record.validate();
            assert_eq!(fields(&errors), vec![field], "breaking {}", field);
        }
    }

    #[test]
    fn all_failures_are_reported_together() {
        let record = InteractionMetadata::default();
        let errors = record.validate();
        assert_eq!(errors.len(), 8);
    }

    #[test]
    fn relaxed_mode_accepts_free_form_user_id() {
        let mut record = valid();
        record.user_id = "jane.doe@example.com".into();
        assert_eq!(fields(&record.validate()), vec!["user_id"]);
        assert!(validate(&record, &ValidationRules::relaxed()).is_empty());
    }

    #[test]
    fn minimum_text_length_is_enforced() {
        let mut record = valid();
        record.text = "ok".into();
        let rules = ValidationRules {
            min_text_len: 10,
            ..ValidationRules::default()
        };
        assert_eq!(
            validate(&record, &rules),
            vec![ValidationError::TextTooShort { min: 10, actual: 2 }]
        );
    }

    #[test]
    fn uuid_check_rejects_non_hyphenated_forms() {
        assert!(is_prefixed_uuid_v4(
            "int_6ba7b810-9dad-41d1-80b4-00c04fd430c8",
            "int_"
        ));
        assert!(!is_prefixed_uuid_v4("int_6ba7b8109dad41d180b400c04fd430c8", "int_"));
        assert!(!is_prefixed_uuid_v4("6ba7b810-9dad-41d1-80b4-00c04fd430c8", "int_"));
    }

    #[test]
    fn timestamp_must_be_z_suffixed_with_t_separator() {
        assert!(parse_utc_timestamp("2024-03-01T08:15:30Z").is_some());
        assert!(parse_utc_timestamp("2024-03-01T08:15:30.250Z").is_some());
        assert!(parse_utc_timestamp("2024-03-01 08:15:30Z").is_none());
        assert!(parse_utc_timestamp("2024-03-01T08:15:30").is_none());
        assert!(parse_utc_timestamp("2024-02-30T08:15:30Z").is_none());
    }
}
