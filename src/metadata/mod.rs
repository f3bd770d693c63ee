//! Interaction metadata: model, validation, propagation and lineage

pub mod ids;
pub mod lineage;
mod propagation;
mod record;
mod validate;

#[cfg(test)]
mod tests;

pub use lineage::{LineageTracker, LineageTree};
pub use propagation::{
    propagate, propagate_with, Aggregation, DerivedMetadata, IdShape, Lineage, NodeKind,
    PropagationRule, TextRule,
};
pub use record::{InteractionMetadata, InteractionType, SourceSystem};
pub use validate::{
    is_prefixed_uuid_v4, parse_utc_timestamp, validate, ValidationError, ValidationMode,
    ValidationRules, ACCOUNT_ID_PREFIX, INTERACTION_ID_PREFIX, USER_ID_PREFIX,
};
