//! Domain entities as stored by the domain services.

use crate::traits::{PersonalityTrait, PersonalityTraits};
use crate::{EntityId, ModelId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// KINDS AND SERVICES
// ============================================================================

/// Entity kind, used in error attribution and dependency reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Personality,
    Role,
    Agent,
    Model,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Personality => "personality",
            EntityKind::Role => "role",
            EntityKind::Agent => "agent",
            EntityKind::Model => "model",
        }
    }

    /// Service that owns entities of this kind.
    pub fn owner(&self) -> ServiceName {
        match self {
            EntityKind::Personality => ServiceName::PersonalityService,
            EntityKind::Role => ServiceName::RoleService,
            EntityKind::Agent => ServiceName::AgentService,
            EntityKind::Model => ServiceName::ModelService,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceName {
    PersonalityService,
    RoleService,
    ModelService,
    AgentService,
    ValidationService,
    CompatibilityChecker,
    ConfigurationService,
}

impl ServiceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::PersonalityService => "PersonalityService",
            ServiceName::RoleService => "RoleService",
            ServiceName::ModelService => "ModelService",
            ServiceName::AgentService => "AgentService",
            ServiceName::ValidationService => "ValidationService",
            ServiceName::CompatibilityChecker => "CompatibilityChecker",
            ServiceName::ConfigurationService => "ConfigurationService",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PERSONALITY
// ============================================================================

/// Stored personality with canonical integer traits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub custom_instructions: Option<String>,
    pub traits: PersonalityTraits,
    pub is_template: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// ROLE
// ============================================================================

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_well_formed(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

impl fmt::Display for NumericRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Generation parameter an agent sets and a role may constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GenerationParameter {
    Temperature,
    MaxTokens,
    TopP,
    FrequencyPenalty,
    PresencePenalty,
}

impl GenerationParameter {
    pub const ALL: [GenerationParameter; 5] = [
        GenerationParameter::Temperature,
        GenerationParameter::MaxTokens,
        GenerationParameter::TopP,
        GenerationParameter::FrequencyPenalty,
        GenerationParameter::PresencePenalty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationParameter::Temperature => "temperature",
            GenerationParameter::MaxTokens => "maxTokens",
            GenerationParameter::TopP => "topP",
            GenerationParameter::FrequencyPenalty => "frequencyPenalty",
            GenerationParameter::PresencePenalty => "presencePenalty",
        }
    }
}

impl fmt::Display for GenerationParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative compatibility requirements a role places on its agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleRequirements {
    pub min_traits: BTreeMap<PersonalityTrait, u8>,
    pub max_traits: BTreeMap<PersonalityTrait, u8>,
    pub parameter_ranges: BTreeMap<GenerationParameter, NumericRange>,
    pub allowed_model_tiers: Vec<ModelTier>,
}

impl RoleRequirements {
    pub fn is_empty(&self) -> bool {
        self.min_traits.is_empty()
            && self.max_traits.is_empty()
            && self.parameter_ranges.is_empty()
            && self.allowed_model_tiers.is_empty()
    }

    pub fn with_min_trait(mut self, t: PersonalityTrait, value: u8) -> Self {
        self.min_traits.insert(t, value);
        self
    }

    pub fn with_max_trait(mut self, t: PersonalityTrait, value: u8) -> Self {
        self.max_traits.insert(t, value);
        self
    }

    pub fn with_parameter_range(mut self, p: GenerationParameter, range: NumericRange) -> Self {
        self.parameter_ranges.insert(p, range);
        self
    }

    pub fn with_allowed_tiers(mut self, tiers: Vec<ModelTier>) -> Self {
        self.allowed_model_tiers = tiers;
        self
    }
}

/// Stored role. `version` is the optimistic-lock counter and starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub capabilities: BTreeSet<String>,
    pub constraints: Vec<String>,
    pub is_template: bool,
    pub version: u32,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub requirements: RoleRequirements,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Role {
    pub fn grants(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Weak reference from an agent to its role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleRef {
    Id(EntityId),
    Name(String),
}

impl RoleRef {
    /// True if this reference points at `role`. Names compare case-insensitively.
    pub fn matches(&self, id: EntityId, name: &str) -> bool {
        match self {
            RoleRef::Id(r) => *r == id,
            RoleRef::Name(n) => n.trim().eq_ignore_ascii_case(name.trim()),
        }
    }
}

impl fmt::Display for RoleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleRef::Id(id) => write!(f, "id {}", id),
            RoleRef::Name(n) => write!(f, "name '{}'", n),
        }
    }
}

// ============================================================================
// MODEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Free,
    Standard,
    Premium,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Free => "free",
            ModelTier::Standard => "standard",
            ModelTier::Premium => "premium",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry for a model. Read-only from Concord's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfiguration {
    pub id: ModelId,
    pub provider: String,
    pub version: String,
    pub available: bool,
    pub tier: ModelTier,
    /// Context ceiling for a single generation.
    pub max_tokens: u32,
    pub temperature_range: NumericRange,
}

// ============================================================================
// AGENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

impl GenerationSettings {
    pub fn get(&self, p: GenerationParameter) -> Option<f64> {
        match p {
            GenerationParameter::Temperature => Some(self.temperature),
            GenerationParameter::MaxTokens => Some(f64::from(self.max_tokens)),
            GenerationParameter::TopP => Some(self.top_p),
            GenerationParameter::FrequencyPenalty => self.frequency_penalty,
            GenerationParameter::PresencePenalty => self.presence_penalty,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 1.0,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

/// Stored agent. References personality and role by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub personality_id: EntityId,
    pub role_id: EntityId,
    pub model_id: ModelId,
    pub capabilities: BTreeSet<String>,
    pub constraints: Vec<String>,
    pub settings: GenerationSettings,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// UNIFIED CONFIGURATION
// ============================================================================

/// One agent with its resolved personality, role and model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedConfiguration {
    pub personality: Personality,
    pub role: Role,
    pub agent: Agent,
    /// `None` when the model has since been retired from the catalog.
    pub model: Option<ModelConfiguration>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;

    #[test]
    fn test_role_ref_matches() {
        let id = new_entity_id();
        assert!(RoleRef::Id(id).matches(id, "Analyst"));
        assert!(!RoleRef::Id(new_entity_id()).matches(id, "Analyst"));
        assert!(RoleRef::Name(" analyst ".into()).matches(id, "Analyst"));
        assert!(!RoleRef::Name("Writer".into()).matches(id, "Analyst"));
    }

    #[test]
    fn test_role_ref_json_shape() {
        let json = serde_json::to_value(RoleRef::Name("Analyst".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "Analyst" }));
    }

    #[test]
    fn test_numeric_range() {
        let r = NumericRange::new(0.7, 1.2);
        assert!(r.contains(0.7));
        assert!(r.contains(1.2));
        assert!(r.contains(0.9));
        assert!(!r.contains(1.3));
        assert!(!NumericRange::new(2.0, 1.0).is_well_formed());
        assert_eq!(r.to_string(), "[0.7, 1.2]");
    }

    #[test]
    fn test_settings_get() {
        let s = GenerationSettings::default();
        assert_eq!(s.get(GenerationParameter::MaxTokens), Some(2048.0));
        assert_eq!(s.get(GenerationParameter::FrequencyPenalty), None);
    }

    #[test]
    fn test_kind_owner() {
        assert_eq!(EntityKind::Role.owner(), ServiceName::RoleService);
        assert_eq!(EntityKind::Personality.to_string(), "personality");
        assert_eq!(
            serde_json::to_string(&ServiceName::CompatibilityChecker).unwrap(),
            "\"CompatibilityChecker\""
        );
    }

    #[test]
    fn test_requirements_deserialize_with_trait_keys() {
        let json = r#"{ "minTraits": { "conscientiousness": 80, "formality": 75 } }"#;
        let req: RoleRequirements = serde_json::from_str(json).unwrap();
        assert_eq!(
            req.min_traits.get(&PersonalityTrait::Conscientiousness),
            Some(&80)
        );
        assert!(req.max_traits.is_empty());
        assert!(!req.is_empty());
    }
}
