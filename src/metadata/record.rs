//! Interaction metadata: the fixed 8-field record every node descends from

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::validate::{validate, ValidationError, ValidationRules};

/// Kind of customer interaction a record was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Call,
    Chat,
    Email,
    VoiceMemo,
    CustomNotes,
}

impl InteractionType {
    pub const ALL: [InteractionType; 5] = [
        Self::Call,
        Self::Chat,
        Self::Email,
        Self::VoiceMemo,
        Self::CustomNotes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Chat => "chat",
            Self::Email => "email",
            Self::VoiceMemo => "voice_memo",
            Self::CustomNotes => "custom_notes",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System the interaction was imported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSystem {
    Internal,
    VoiceMemo,
    Custom,
    Outlook,
    Gmail,
}

impl SourceSystem {
    pub const ALL: [SourceSystem; 5] = [
        Self::Internal,
        Self::VoiceMemo,
        Self::Custom,
        Self::Outlook,
        Self::Gmail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::VoiceMemo => "voice_memo",
            Self::Custom => "custom",
            Self::Outlook => "outlook",
            Self::Gmail => "gmail",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a raw interaction.
///
/// Fields are held as raw strings so that malformed input can be represented
/// and reported by [`validate`] rather than rejected at deserialization time.
/// Generated fields (`node_hash_id`, `node_type`, `created_at`) are not part of
/// this record; they only exist on [`DerivedMetadata`](super::DerivedMetadata).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InteractionMetadata {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub interaction_id: String,
    #[serde(default)]
    pub interaction_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub source_system: String,
}

impl InteractionMetadata {
    /// Build a record from its typed parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: impl Into<String>,
        interaction_id: impl Into<String>,
        account_id: impl Into<String>,
        user_id: impl Into<String>,
        interaction_type: InteractionType,
        source_system: SourceSystem,
        timestamp: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            interaction_id: interaction_id.into(),
            interaction_type: interaction_type.as_str().to_string(),
            text: text.into(),
            account_id: account_id.into(),
            timestamp: timestamp.into(),
            user_id: user_id.into(),
            source_system: source_system.as_str().to_string(),
        }
    }

    /// Validate with strict default rules.
    pub fn validate(&self) -> Vec<ValidationError> {
        validate(self, &ValidationRules::default())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    pub fn interaction_type(&self) -> Option<InteractionType> {
        InteractionType::parse(&self.interaction_type)
    }

    pub fn source_system(&self) -> Option<SourceSystem> {
        SourceSystem::parse(&self.source_system)
    }

    /// Stable serialization used as hashing input.
    ///
    /// A JSON object with keys in lexicographic order and no insignificant
    /// whitespace. Field declaration order and map iteration order do not
    /// affect the output, so two processes always agree on it.
    pub fn to_canonical_form(&self) -> String {
        // serde_json::Value objects are BTreeMap-backed: keys come out sorted.
        match serde_json::to_value(self) {
            Ok(value) => value.to_string(),
            Err(_) => String::new(),
        }
    }

    /// Parse a record previously produced by [`to_canonical_form`](Self::to_canonical_form).
    ///
    /// Accepts any key order. Does not validate; callers run [`validate`] on the result.
    pub fn from_canonical_form(canonical: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(canonical)
    }

    /// SHA-256 of the canonical form, lowercase hex.
    pub fn canonical_hash(&self) -> String {
        format!("{:x}", Sha256::digest(self.to_canonical_form().as_bytes()))
    }
}
