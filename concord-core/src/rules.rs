//! Declarative compatibility rules.
//!
//! A rule relates one fact (a trait, a generation parameter, a role or model
//! attribute) to a threshold. Rules are plain data loaded from JSON or YAML,
//! so new policies need no recompilation. Evaluation is pure.

use crate::entities::{
    Agent, GenerationParameter, GenerationSettings, ModelConfiguration, ModelTier, NumericRange,
    Role, RoleRequirements,
};
use crate::error::RuleError;
use crate::request::{AgentDraft, RoleDraft};
use crate::traits::{PersonalityTrait, PersonalityTraits};
use crate::validation::ErrorCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const EPSILON: f64 = 1e-9;

// ============================================================================
// FIELD PATHS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentField {
    Parameter(GenerationParameter),
    Capabilities,
    Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleField {
    Name,
    Capabilities,
    Constraints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelField {
    Provider,
    Tier,
    MaxTokens,
    Available,
    Version,
    TemperatureMin,
    TemperatureMax,
}

/// Typed dotted path into the facts of a configuration, e.g.
/// `personality.conscientiousness` or `model.tier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldPath {
    Personality(PersonalityTrait),
    Agent(AgentField),
    Role(RoleField),
    Model(ModelField),
}

impl FieldPath {
    pub fn personality(t: PersonalityTrait) -> Self {
        FieldPath::Personality(t)
    }

    pub fn parameter(p: GenerationParameter) -> Self {
        FieldPath::Agent(AgentField::Parameter(p))
    }
}

impl FromStr for FieldPath {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || RuleError::UnknownField {
            path: s.to_string(),
        };
        let (domain, attr) = s.split_once('.').ok_or_else(unknown)?;
        let path = match domain {
            "personality" => FieldPath::Personality(attr.parse().map_err(|_| unknown())?),
            "agent" => FieldPath::Agent(match attr {
                "capabilities" => AgentField::Capabilities,
                "tags" => AgentField::Tags,
                other => AgentField::Parameter(
                    GenerationParameter::ALL
                        .into_iter()
                        .find(|p| p.as_str() == other)
                        .ok_or_else(unknown)?,
                ),
            }),
            "role" => FieldPath::Role(match attr {
                "name" => RoleField::Name,
                "capabilities" => RoleField::Capabilities,
                "constraints" => RoleField::Constraints,
                _ => return Err(unknown()),
            }),
            "model" => FieldPath::Model(match attr {
                "provider" => ModelField::Provider,
                "tier" => ModelField::Tier,
                "maxTokens" => ModelField::MaxTokens,
                "available" => ModelField::Available,
                "version" => ModelField::Version,
                "temperatureMin" => ModelField::TemperatureMin,
                "temperatureMax" => ModelField::TemperatureMax,
                _ => return Err(unknown()),
            }),
            _ => return Err(unknown()),
        };
        Ok(path)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = RuleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FieldPath> for String {
    fn from(p: FieldPath) -> Self {
        p.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Personality(t) => write!(f, "personality.{}", t),
            FieldPath::Agent(AgentField::Parameter(p)) => write!(f, "agent.{}", p),
            FieldPath::Agent(AgentField::Capabilities) => f.write_str("agent.capabilities"),
            FieldPath::Agent(AgentField::Tags) => f.write_str("agent.tags"),
            FieldPath::Role(RoleField::Name) => f.write_str("role.name"),
            FieldPath::Role(RoleField::Capabilities) => f.write_str("role.capabilities"),
            FieldPath::Role(RoleField::Constraints) => f.write_str("role.constraints"),
            FieldPath::Model(m) => f.write_str(match m {
                ModelField::Provider => "model.provider",
                ModelField::Tier => "model.tier",
                ModelField::MaxTokens => "model.maxTokens",
                ModelField::Available => "model.available",
                ModelField::Version => "model.version",
                ModelField::TemperatureMin => "model.temperatureMin",
                ModelField::TemperatureMax => "model.temperatureMax",
            }),
        }
    }
}

// ============================================================================
// FACTS
// ============================================================================

/// Value of a field path for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Fact {
    Number(f64),
    Text(String),
    List(Vec<String>),
    Bool(bool),
    /// The owning entity or optional value is absent; rules on it are skipped.
    Missing,
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::Number(n) => write!(f, "{}", n),
            Fact::Text(s) => write!(f, "'{}'", s),
            Fact::List(items) => write!(f, "[{}]", items.join(", ")),
            Fact::Bool(b) => write!(f, "{}", b),
            Fact::Missing => f.write_str("missing"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleFacts {
    pub name: String,
    pub capabilities: BTreeSet<String>,
    pub constraints: Vec<String>,
    pub requirements: RoleRequirements,
}

impl From<&Role> for RoleFacts {
    fn from(r: &Role) -> Self {
        Self {
            name: r.name.clone(),
            capabilities: r.capabilities.clone(),
            constraints: r.constraints.clone(),
            requirements: r.requirements.clone(),
        }
    }
}

impl From<&RoleDraft> for RoleFacts {
    fn from(r: &RoleDraft) -> Self {
        Self {
            name: r.name.clone(),
            capabilities: r.capability_set(),
            constraints: r.constraints.clone(),
            requirements: r.requirements.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentFacts {
    pub settings: GenerationSettings,
    pub capabilities: BTreeSet<String>,
    pub tags: Vec<String>,
}

impl From<&Agent> for AgentFacts {
    fn from(a: &Agent) -> Self {
        Self {
            settings: a.settings,
            capabilities: a.capabilities.clone(),
            tags: a.tags.clone(),
        }
    }
}

impl From<&AgentDraft> for AgentFacts {
    fn from(a: &AgentDraft) -> Self {
        Self {
            settings: a.settings,
            capabilities: a.capability_set(),
            tags: a.tags.clone(),
        }
    }
}

/// Everything a compatibility rule may look at. Absent sections make their
/// facts [`Fact::Missing`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompatibilitySubject {
    pub traits: Option<PersonalityTraits>,
    pub role: Option<RoleFacts>,
    pub agent: Option<AgentFacts>,
    pub model: Option<ModelConfiguration>,
}

impl CompatibilitySubject {
    pub fn fact(&self, path: &FieldPath) -> Fact {
        match path {
            FieldPath::Personality(t) => match &self.traits {
                Some(traits) => Fact::Number(f64::from(traits.get(*t))),
                None => Fact::Missing,
            },
            FieldPath::Agent(field) => {
                let Some(agent) = &self.agent else {
                    return Fact::Missing;
                };
                match field {
                    AgentField::Parameter(p) => {
                        agent.settings.get(*p).map_or(Fact::Missing, Fact::Number)
                    }
                    AgentField::Capabilities => {
                        Fact::List(agent.capabilities.iter().cloned().collect())
                    }
                    AgentField::Tags => Fact::List(agent.tags.clone()),
                }
            }
            FieldPath::Role(field) => {
                let Some(role) = &self.role else {
                    return Fact::Missing;
                };
                match field {
                    RoleField::Name => Fact::Text(role.name.clone()),
                    RoleField::Capabilities => {
                        Fact::List(role.capabilities.iter().cloned().collect())
                    }
                    RoleField::Constraints => Fact::List(role.constraints.clone()),
                }
            }
            FieldPath::Model(field) => {
                let Some(model) = &self.model else {
                    return Fact::Missing;
                };
                match field {
                    ModelField::Provider => Fact::Text(model.provider.clone()),
                    ModelField::Tier => Fact::Text(model.tier.as_str().to_string()),
                    ModelField::MaxTokens => Fact::Number(f64::from(model.max_tokens)),
                    ModelField::Available => Fact::Bool(model.available),
                    ModelField::Version => Fact::Text(model.version.clone()),
                    ModelField::TemperatureMin => Fact::Number(model.temperature_range.min),
                    ModelField::TemperatureMax => Fact::Number(model.temperature_range.max),
                }
            }
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

/// Cross-domain relationship a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleCategory {
    PersonalityRole,
    ModelParameter,
    ModelConfig,
    PersonalityModel,
    CapabilityRole,
}

impl RuleCategory {
    /// Relationship name reported as the error field.
    pub fn field(&self) -> &'static str {
        match self {
            RuleCategory::PersonalityRole => "personality-role-compatibility",
            RuleCategory::ModelParameter | RuleCategory::ModelConfig => "role-model-compatibility",
            RuleCategory::PersonalityModel => "personality-model-compatibility",
            RuleCategory::CapabilityRole => "capability-role-compatibility",
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            RuleCategory::PersonalityRole => ErrorCode::PersonalityRoleIncompatible,
            RuleCategory::ModelParameter => ErrorCode::ModelParameterOutOfRange,
            RuleCategory::ModelConfig => ErrorCode::ModelConfigIncompatible,
            RuleCategory::PersonalityModel => ErrorCode::PersonalityModelIncompatible,
            RuleCategory::CapabilityRole => ErrorCode::CapabilityRoleMismatch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparator {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Ne,
    Between,
    Outside,
    Contains,
    ContainsAll,
    SubsetOf,
    OneOf,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Gte => ">=",
            Comparator::Gt => ">",
            Comparator::Lte => "<=",
            Comparator::Lt => "<",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Between => "within",
            Comparator::Outside => "outside",
            Comparator::Contains => "to contain",
            Comparator::ContainsAll => "to contain all of",
            Comparator::SubsetOf => "to be a subset of",
            Comparator::OneOf => "to be one of",
        }
    }

    fn name(&self) -> String {
        format!("{:?}", self)
    }
}

/// Right-hand side of a rule. Untagged: variants are tried in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Bool(bool),
    Number(f64),
    Range(NumericRange),
    Path { path: FieldPath },
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Bool(b) => write!(f, "{}", b),
            Threshold::Number(n) => write!(f, "{}", n),
            Threshold::Range(r) => write!(f, "{}", r),
            Threshold::Path { path } => write!(f, "{}", path),
            Threshold::Text(s) => write!(f, "'{}'", s),
            Threshold::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Which configurations a rule applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RuleScope {
    #[default]
    All,
    Role { name: String },
    RoleCapability { capability: String },
    ModelProvider { provider: String },
    ModelTier { tier: ModelTier },
}

impl RuleScope {
    pub fn applies(&self, subject: &CompatibilitySubject) -> bool {
        match self {
            RuleScope::All => true,
            RuleScope::Role { name } => subject
                .role
                .as_ref()
                .is_some_and(|r| r.name.trim().eq_ignore_ascii_case(name.trim())),
            RuleScope::RoleCapability { capability } => subject
                .role
                .as_ref()
                .is_some_and(|r| r.capabilities.contains(capability)),
            RuleScope::ModelProvider { provider } => subject
                .model
                .as_ref()
                .is_some_and(|m| m.provider.eq_ignore_ascii_case(provider)),
            RuleScope::ModelTier { tier } => {
                subject.model.as_ref().is_some_and(|m| m.tier == *tier)
            }
        }
    }
}

/// Outcome of evaluating one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Pass,
    Fail { found: Fact },
    /// A fact was missing or of the wrong shape.
    Skipped,
}

/// `(source, comparator, threshold, target)` plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityRule {
    pub id: String,
    pub category: RuleCategory,
    pub source: FieldPath,
    pub comparator: Comparator,
    pub threshold: Threshold,
    /// Requirement this rule enforces, for messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub applies_to: RuleScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CompatibilityRule {
    pub fn new(
        id: impl Into<String>,
        category: RuleCategory,
        source: FieldPath,
        comparator: Comparator,
        threshold: Threshold,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            source,
            comparator,
            threshold,
            target: None,
            applies_to: RuleScope::All,
            message: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.applies_to = scope;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Check comparator/threshold pairing.
    pub fn validate(&self) -> Result<(), RuleError> {
        let invalid = |reason: &str| RuleError::InvalidThreshold {
            rule_id: self.id.clone(),
            comparator: self.comparator.name(),
            reason: reason.to_string(),
        };
        let t = &self.threshold;
        match self.comparator {
            Comparator::Gte | Comparator::Gt | Comparator::Lte | Comparator::Lt => {
                if !matches!(t, Threshold::Number(_) | Threshold::Path { .. }) {
                    return Err(invalid("a non-numeric threshold"));
                }
            }
            Comparator::Eq | Comparator::Ne => {
                if matches!(t, Threshold::Range(_) | Threshold::List(_)) {
                    return Err(invalid("a range or list threshold"));
                }
            }
            Comparator::Between | Comparator::Outside => match t {
                Threshold::Range(r) if r.is_well_formed() => {}
                Threshold::Range(_) => return Err(invalid("a range with min > max")),
                _ => return Err(invalid("a non-range threshold")),
            },
            Comparator::Contains => {
                if !matches!(t, Threshold::Text(_)) {
                    return Err(invalid("a non-text threshold"));
                }
            }
            Comparator::ContainsAll | Comparator::SubsetOf => {
                if !matches!(t, Threshold::List(_) | Threshold::Path { .. }) {
                    return Err(invalid("a non-list threshold"));
                }
            }
            Comparator::OneOf => {
                if !matches!(t, Threshold::List(_)) {
                    return Err(invalid("a non-list threshold"));
                }
            }
        }
        Ok(())
    }

    /// Evaluate against `subject`. Does not check scope.
    pub fn evaluate(&self, subject: &CompatibilitySubject) -> RuleOutcome {
        let found = subject.fact(&self.source);
        if found == Fact::Missing {
            return RuleOutcome::Skipped;
        }
        let threshold = match &self.threshold {
            Threshold::Path { path } => match subject.fact(path) {
                Fact::Missing => return RuleOutcome::Skipped,
                fact => fact,
            },
            Threshold::Bool(b) => Fact::Bool(*b),
            Threshold::Number(n) => Fact::Number(*n),
            Threshold::Text(s) => Fact::Text(s.clone()),
            Threshold::List(items) => Fact::List(items.clone()),
            Threshold::Range(r) => return self.evaluate_range(found, r),
        };
        match compare(self.comparator, &found, &threshold) {
            Some(true) => RuleOutcome::Pass,
            Some(false) => RuleOutcome::Fail { found },
            None => RuleOutcome::Skipped,
        }
    }

    fn evaluate_range(&self, found: Fact, range: &NumericRange) -> RuleOutcome {
        let Fact::Number(n) = found else {
            return RuleOutcome::Skipped;
        };
        let inside = n >= range.min - EPSILON && n <= range.max + EPSILON;
        let ok = match self.comparator {
            Comparator::Between => inside,
            Comparator::Outside => !inside,
            _ => return RuleOutcome::Skipped,
        };
        if ok {
            RuleOutcome::Pass
        } else {
            RuleOutcome::Fail { found }
        }
    }

    /// Human-readable failure message.
    pub fn failure_message(&self, found: &Fact) -> String {
        match &self.message {
            Some(m) => format!("{} (found {})", m, found),
            None => format!(
                "Rule '{}' requires {} {} {} (found {})",
                self.id,
                self.source,
                self.comparator.symbol(),
                self.threshold,
                found
            ),
        }
    }
}

fn compare(cmp: Comparator, found: &Fact, threshold: &Fact) -> Option<bool> {
    use Comparator::*;
    match (cmp, found, threshold) {
        (Gte, Fact::Number(a), Fact::Number(b)) => Some(*a >= *b - EPSILON),
        (Gt, Fact::Number(a), Fact::Number(b)) => Some(*a > *b + EPSILON),
        (Lte, Fact::Number(a), Fact::Number(b)) => Some(*a <= *b + EPSILON),
        (Lt, Fact::Number(a), Fact::Number(b)) => Some(*a < *b - EPSILON),
        (Eq | Ne, a, b) => {
            let equal = match (a, b) {
                (Fact::Number(x), Fact::Number(y)) => (x - y).abs() <= EPSILON,
                (Fact::Text(x), Fact::Text(y)) => x.eq_ignore_ascii_case(y),
                (Fact::Bool(x), Fact::Bool(y)) => x == y,
                _ => return None,
            };
            Some(if cmp == Eq { equal } else { !equal })
        }
        (Contains, Fact::List(items), Fact::Text(t)) => Some(items.iter().any(|i| i == t)),
        (Contains, Fact::Text(s), Fact::Text(t)) => Some(s.contains(t.as_str())),
        (ContainsAll, Fact::List(have), Fact::List(want)) => {
            let have: HashSet<&String> = have.iter().collect();
            Some(want.iter().all(|w| have.contains(w)))
        }
        (SubsetOf, Fact::List(items), Fact::List(allowed)) => {
            let allowed: HashSet<&String> = allowed.iter().collect();
            Some(items.iter().all(|i| allowed.contains(i)))
        }
        (OneOf, Fact::Text(s), Fact::List(options)) => {
            Some(options.iter().any(|o| o.eq_ignore_ascii_case(s)))
        }
        _ => None,
    }
}

// ============================================================================
// ROLE REQUIREMENTS AS RULES
// ============================================================================

impl RoleRequirements {
    /// Expand the role's declared requirements into rules.
    pub fn to_rules(&self, role_name: &str) -> Vec<CompatibilityRule> {
        let mut rules = Vec::new();
        let bounds = [
            ("min", &self.min_traits, Comparator::Gte),
            ("max", &self.max_traits, Comparator::Lte),
        ];
        for (label, traits, cmp) in bounds {
            for (t, v) in traits {
                rules.push(
                    CompatibilityRule::new(
                        format!("role:{}:{}:{}", role_name, label, t),
                        RuleCategory::PersonalityRole,
                        FieldPath::personality(*t),
                        cmp,
                        Threshold::Number(f64::from(*v)),
                    )
                    .with_target(format!("role.requirements.{}Traits.{}", label, t))
                    .with_message(format!(
                        "Role '{}' requires personality.{} {} {}",
                        role_name,
                        t,
                        cmp.symbol(),
                        v
                    )),
                );
            }
        }
        for (p, range) in &self.parameter_ranges {
            rules.push(
                CompatibilityRule::new(
                    format!("role:{}:range:{}", role_name, p),
                    RuleCategory::ModelParameter,
                    FieldPath::parameter(*p),
                    Comparator::Between,
                    Threshold::Range(*range),
                )
                .with_target(format!("role.requirements.parameterRanges.{}", p))
                .with_message(format!(
                    "Role '{}' requires agent.{} within {}",
                    role_name, p, range
                )),
            );
        }
        if !self.allowed_model_tiers.is_empty() {
            let tiers: Vec<String> = self
                .allowed_model_tiers
                .iter()
                .map(|t| t.as_str().to_string())
                .collect();
            rules.push(
                CompatibilityRule::new(
                    format!("role:{}:tier", role_name),
                    RuleCategory::ModelConfig,
                    FieldPath::Model(ModelField::Tier),
                    Comparator::OneOf,
                    Threshold::List(tiers.clone()),
                )
                .with_target("role.requirements.allowedModelTiers")
                .with_message(format!(
                    "Role '{}' requires a model tier in [{}]",
                    role_name,
                    tiers.join(", ")
                )),
            );
        }
        rules
    }
}

// ============================================================================
// RULE SET
// ============================================================================

/// A validated, immutable table of compatibility rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<CompatibilityRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CompatibilityRule>) -> Result<Self, RuleError> {
        let set = Self { rules };
        set.validate()?;
        Ok(set)
    }

    /// Rules binding agent settings to the referenced model.
    pub fn standard() -> Self {
        let rules = vec![
            CompatibilityRule::new(
                "model:max-tokens",
                RuleCategory::ModelConfig,
                FieldPath::parameter(GenerationParameter::MaxTokens),
                Comparator::Lte,
                Threshold::Path {
                    path: FieldPath::Model(ModelField::MaxTokens),
                },
            )
            .with_target("model.maxTokens")
            .with_message("agent.maxTokens must not exceed the model's context ceiling"),
            CompatibilityRule::new(
                "model:temperature-min",
                RuleCategory::ModelParameter,
                FieldPath::parameter(GenerationParameter::Temperature),
                Comparator::Gte,
                Threshold::Path {
                    path: FieldPath::Model(ModelField::TemperatureMin),
                },
            )
            .with_target("model.temperatureRange"),
            CompatibilityRule::new(
                "model:temperature-max",
                RuleCategory::ModelParameter,
                FieldPath::parameter(GenerationParameter::Temperature),
                Comparator::Lte,
                Threshold::Path {
                    path: FieldPath::Model(ModelField::TemperatureMax),
                },
            )
            .with_target("model.temperatureRange"),
        ];
        Self { rules }
    }

    pub fn from_json_str(s: &str) -> Result<Self, RuleError> {
        let set: RuleSet = serde_json::from_str(s).map_err(|e| RuleError::Parse {
            format: "JSON",
            reason: e.to_string(),
        })?;
        set.validate()?;
        Ok(set)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, RuleError> {
        let set: RuleSet = serde_yaml::from_str(s).map_err(|e| RuleError::Parse {
            format: "YAML",
            reason: e.to_string(),
        })?;
        set.validate()?;
        Ok(set)
    }

    /// Load by extension: `.yaml`/`.yml` as YAML, anything else as JSON.
    pub fn from_path(path: &Path) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path).map_err(|e| RuleError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleError::DuplicateId {
                    rule_id: rule.id.clone(),
                });
            }
            rule.validate()?;
        }
        Ok(())
    }

    /// Append `other`, rejecting id collisions.
    pub fn extend(&mut self, other: RuleSet) -> Result<(), RuleError> {
        self.rules.extend(other.rules);
        self.validate()
    }

    /// SHA-256 of the canonical JSON form, hex encoded.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompatibilityRule> {
        self.rules.iter()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelConfiguration {
        ModelConfiguration {
            id: "claude-sonnet".into(),
            provider: "anthropic".into(),
            version: "4".into(),
            available: true,
            tier: ModelTier::Standard,
            max_tokens: 8192,
            temperature_range: NumericRange::new(0.0, 1.0),
        }
    }

    fn subject(conscientiousness: u8, temperature: f64) -> CompatibilitySubject {
        let traits = PersonalityTraits::neutral()
            .with(PersonalityTrait::Conscientiousness, conscientiousness);
        CompatibilitySubject {
            traits: Some(traits),
            role: Some(RoleFacts {
                name: "Analyst".into(),
                capabilities: ["analyze".to_string()].into_iter().collect(),
                ..Default::default()
            }),
            agent: Some(AgentFacts {
                settings: GenerationSettings {
                    temperature,
                    ..Default::default()
                },
                ..Default::default()
            }),
            model: Some(model()),
        }
    }

    #[test]
    fn test_field_path_round_trip() {
        for s in [
            "personality.analyticalDepth",
            "agent.topP",
            "agent.capabilities",
            "role.name",
            "model.tier",
        ] {
            let p: FieldPath = s.parse().unwrap();
            assert_eq!(p.to_string(), s);
        }
        assert!("personality.charisma".parse::<FieldPath>().is_err());
        assert!("agent".parse::<FieldPath>().is_err());
    }

    #[test]
    fn test_numeric_rule() {
        let rule = CompatibilityRule::new(
            "r1",
            RuleCategory::PersonalityRole,
            FieldPath::personality(PersonalityTrait::Conscientiousness),
            Comparator::Gte,
            Threshold::Number(80.0),
        );
        assert_eq!(rule.evaluate(&subject(80, 0.5)), RuleOutcome::Pass);
        assert_eq!(
            rule.evaluate(&subject(25, 0.5)),
            RuleOutcome::Fail {
                found: Fact::Number(25.0)
            }
        );
    }

    #[test]
    fn test_missing_fact_skips() {
        let rule = CompatibilityRule::new(
            "r1",
            RuleCategory::PersonalityRole,
            FieldPath::personality(PersonalityTrait::Openness),
            Comparator::Gte,
            Threshold::Number(10.0),
        );
        let mut s = subject(50, 0.5);
        s.traits = None;
        assert_eq!(rule.evaluate(&s), RuleOutcome::Skipped);
    }

    #[test]
    fn test_path_threshold() {
        let set = RuleSet::standard();
        let hot = subject(50, 1.5);
        let failed: Vec<_> = set
            .iter()
            .filter(|r| matches!(r.evaluate(&hot), RuleOutcome::Fail { .. }))
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(failed, vec!["model:temperature-max"]);
    }

    #[test]
    fn test_role_requirements_to_rules() {
        let req = RoleRequirements::default()
            .with_min_trait(PersonalityTrait::Conscientiousness, 80)
            .with_parameter_range(GenerationParameter::Temperature, NumericRange::new(0.7, 1.2))
            .with_allowed_tiers(vec![ModelTier::Premium]);
        let rules = req.to_rules("Analyst");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].id, "role:Analyst:min:conscientiousness");

        let s = subject(25, 0.9);
        let msg = match rules[0].evaluate(&s) {
            RuleOutcome::Fail { found } => rules[0].failure_message(&found),
            other => panic!("expected failure, got {:?}", other),
        };
        assert_eq!(
            msg,
            "Role 'Analyst' requires personality.conscientiousness >= 80 (found 25)"
        );
        assert_eq!(rules[1].evaluate(&s), RuleOutcome::Pass);
        assert!(matches!(rules[2].evaluate(&s), RuleOutcome::Fail { .. }));
    }

    #[test]
    fn test_list_comparators() {
        let s = subject(50, 0.5);
        let contains = CompatibilityRule::new(
            "c",
            RuleCategory::CapabilityRole,
            FieldPath::Role(RoleField::Capabilities),
            Comparator::Contains,
            Threshold::Text("analyze".into()),
        );
        assert_eq!(contains.evaluate(&s), RuleOutcome::Pass);

        let subset = CompatibilityRule::new(
            "s",
            RuleCategory::CapabilityRole,
            FieldPath::Agent(AgentField::Capabilities),
            Comparator::SubsetOf,
            Threshold::Path {
                path: FieldPath::Role(RoleField::Capabilities),
            },
        );
        assert_eq!(subset.evaluate(&s), RuleOutcome::Pass);
    }

    #[test]
    fn test_scope() {
        let s = subject(50, 0.5);
        assert!(RuleScope::Role {
            name: "analyst".into()
        }
        .applies(&s));
        assert!(!RuleScope::ModelTier {
            tier: ModelTier::Premium
        }
        .applies(&s));
    }

    #[test]
    fn test_rule_set_from_json() {
        let json = r#"{
            "rules": [
                {
                    "id": "storyteller-imagination",
                    "category": "personalityRole",
                    "source": "personality.imagination",
                    "comparator": "gte",
                    "threshold": 60,
                    "appliesTo": { "kind": "roleCapability", "capability": "storytelling" }
                },
                {
                    "id": "creative-temperature",
                    "category": "modelParameter",
                    "source": "agent.temperature",
                    "comparator": "between",
                    "threshold": { "min": 0.5, "max": 1.5 }
                },
                {
                    "id": "anthropic-only",
                    "category": "modelConfig",
                    "source": "model.provider",
                    "comparator": "oneOf",
                    "threshold": ["anthropic"]
                }
            ]
        }"#;
        let set = RuleSet::from_json_str(json).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.rules[0].threshold, Threshold::Number(60.0));
        assert_eq!(
            set.rules[1].threshold,
            Threshold::Range(NumericRange::new(0.5, 1.5))
        );
        assert_eq!(set.fingerprint().len(), 64);
        assert_eq!(set.fingerprint(), set.clone().fingerprint());
    }

    #[test]
    fn test_rule_set_from_yaml() {
        let yaml = r#"
rules:
  - id: formal-analyst
    category: personalityRole
    source: personality.formality
    comparator: gte
    threshold: 75
    appliesTo:
      kind: role
      name: Analyst
"#;
        let set = RuleSet::from_yaml_str(yaml).unwrap();
        assert_eq!(
            set.rules[0].applies_to,
            RuleScope::Role {
                name: "Analyst".into()
            }
        );
    }

    #[test]
    fn test_rule_set_rejects_bad_tables() {
        let bad_path = r#"{ "rules": [ { "id": "x", "category": "personalityRole",
            "source": "personality.charisma", "comparator": "gte", "threshold": 1 } ] }"#;
        assert!(matches!(
            RuleSet::from_json_str(bad_path),
            Err(RuleError::Parse { .. })
        ));

        let bad_pair = r#"{ "rules": [ { "id": "x", "category": "personalityRole",
            "source": "personality.humor", "comparator": "between", "threshold": 1 } ] }"#;
        assert!(matches!(
            RuleSet::from_json_str(bad_pair),
            Err(RuleError::InvalidThreshold { .. })
        ));

        let dup = CompatibilityRule::new(
            "x",
            RuleCategory::PersonalityRole,
            FieldPath::personality(PersonalityTrait::Humor),
            Comparator::Gte,
            Threshold::Number(1.0),
        );
        assert!(matches!(
            RuleSet::new(vec![dup.clone(), dup]),
            Err(RuleError::DuplicateId { .. })
        ));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_min_trait_rule_matches_comparison(min in 0u8..=100, value in 0u8..=100) {
            let rules = RoleRequirements::default()
                .with_min_trait(PersonalityTrait::Formality, min)
                .to_rules("R");
            let subject = CompatibilitySubject {
                traits: Some(PersonalityTraits::neutral().with(PersonalityTrait::Formality, value)),
                ..Default::default()
            };
            let passed = rules[0].evaluate(&subject) == RuleOutcome::Pass;
            prop_assert_eq!(passed, value >= min);
        }

        #[test]
        fn prop_between_and_outside_are_complements(v in -5.0f64..5.0) {
            let make = |cmp| CompatibilityRule::new(
                "r",
                RuleCategory::ModelParameter,
                FieldPath::parameter(GenerationParameter::Temperature),
                cmp,
                Threshold::Range(NumericRange::new(0.7, 1.2)),
            );
            let subject = CompatibilitySubject {
                agent: Some(AgentFacts {
                    settings: GenerationSettings { temperature: v, ..Default::default() },
                    ..Default::default()
                }),
                ..Default::default()
            };
            let inside = make(Comparator::Between).evaluate(&subject) == RuleOutcome::Pass;
            let outside = make(Comparator::Outside).evaluate(&subject) == RuleOutcome::Pass;
            prop_assert_ne!(inside, outside);
        }
    }
}
