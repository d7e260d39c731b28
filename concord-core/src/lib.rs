//! Concord Core - Entity Types
//!
//! Pure data structures shared by every other Concord crate: identities,
//! personality traits, domain entities, request drafts and patches, the
//! validation error model, and the declarative compatibility-rule tables.
//! The only logic here is structural (range/type/completeness) checking,
//! which is pure and needs no collaborator.

pub mod entities;
pub mod error;
pub mod request;
pub mod rules;
pub mod schema;
pub mod traits;
pub mod validation;

pub use entities::{
    Agent, EntityKind, GenerationParameter, GenerationSettings, ModelConfiguration, ModelTier,
    NumericRange, Personality, Role, RoleRef, RoleRequirements, ServiceName,
    UnifiedConfiguration,
};
pub use error::{RuleError, ServiceError, ServiceResult};
pub use request::{
    AgentDraft, AgentPatch, AgentUpdate, CallerContext, EntityInput, Permission,
    PersonalityDraft, PersonalityPatch, PersonalityUpdate, RoleDraft, RolePatch, RoleUpdate,
    SettingsPatch, UnifiedConfigurationPatch, UnifiedConfigurationRequest,
};
pub use rules::{
    AgentFacts, AgentField, Comparator, CompatibilityRule, CompatibilitySubject, Fact, FieldPath,
    ModelField, RoleFacts, RoleField, RuleCategory, RuleOutcome, RuleScope, RuleSet, Threshold,
};
pub use schema::{normalize_surface_value, trait_field, EntitySchema, TraitValueError};
pub use traits::{PersonalityTrait, PersonalityTraits, NEUTRAL_TRAIT_VALUE};
pub use validation::{ErrorClass, ErrorCode, ValidationError, ValidationResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Model catalog key (e.g. "claude-sonnet").
pub type ModelId = String;

/// SHA-256 content hash.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Identifier shared by every error produced during one orchestrated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_id_is_v7() {
        let id = new_entity_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_entity_ids_are_sortable() {
        let id1 = new_entity_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = new_entity_id();
        assert!(id1.to_string() < id2.to_string());
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        let hash = compute_content_hash(b"rules");
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, compute_content_hash(b"rules"));
        assert_ne!(hash, compute_content_hash(b"rules2"));
    }

    #[test]
    fn test_correlation_ids_are_distinct() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }

    #[test]
    fn test_correlation_id_serializes_as_plain_uuid() {
        let id = CorrelationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }
}
