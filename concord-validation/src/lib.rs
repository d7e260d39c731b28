//! Concord Validation
//!
//! Stateless rule engine for unified configurations. Five independent
//! validation operations (schema, business rules, security, uniqueness,
//! dependencies) each return a [`ValidationResult`] that callers merge.
//! The [`CompatibilityChecker`] evaluates declarative cross-domain rules.

pub mod business;
pub mod compatibility;
pub mod engine;
pub mod security;

pub use business::{BusinessRules, TraitBound, TraitCombinationRule, TraitCondition};
pub use compatibility::{CompatibilityChecker, CompatibilityStage};
pub use engine::RuleEngine;
pub use security::SecurityPolicy;

use ::async_trait::async_trait;
use concord_core::{
    AgentDraft, CallerContext, EntityId, EntityKind, EntitySchema, PersonalityDraft, RoleDraft,
    ServiceResult, ValidationResult,
};

/// Borrowed view of a sub-entity under validation.
#[derive(Debug, Clone, Copy)]
pub enum EntityPayload<'a> {
    Personality(&'a PersonalityDraft),
    Role(&'a RoleDraft),
    Agent(&'a AgentDraft),
}

impl EntityPayload<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Personality(_) => EntityKind::Personality,
            EntityPayload::Role(_) => EntityKind::Role,
            EntityPayload::Agent(_) => EntityKind::Agent,
        }
    }
}

/// Field that uniqueness can be checked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    /// Case-insensitive, trimmed entity name.
    Name,
    /// Caller-chosen entity id. For agents this is the one-configuration-
    /// per-agent rule.
    Id,
}

/// The five validation operations.
///
/// Findings come back as data in the [`ValidationResult`]; `Err` is reserved
/// for collaborator failures.
#[async_trait]
pub trait ValidationService: Send + Sync {
    /// Structural/type/range validation plus the owning domain's validator.
    async fn validate_entity(
        &self,
        entity: EntityPayload<'_>,
        schema: &EntitySchema,
    ) -> ServiceResult<ValidationResult>;

    /// Domain policy beyond structure.
    async fn validate_business_rules(
        &self,
        entity: EntityPayload<'_>,
        rules: &BusinessRules,
    ) -> ServiceResult<ValidationResult>;

    /// Permission checks for the caller.
    async fn validate_security_constraints(
        &self,
        entity: EntityPayload<'_>,
        context: &CallerContext,
    ) -> ServiceResult<ValidationResult>;

    /// `exclude_id` skips the entity being edited.
    async fn validate_uniqueness(
        &self,
        entity_type: EntityKind,
        field: UniqueField,
        value: &str,
        exclude_id: Option<EntityId>,
    ) -> ServiceResult<ValidationResult>;

    /// Existence and reference integrity. Model ids are catalog keys, other
    /// ids are UUIDs.
    async fn validate_dependencies(
        &self,
        entity_id: &str,
        entity_type: EntityKind,
    ) -> ServiceResult<ValidationResult>;
}
