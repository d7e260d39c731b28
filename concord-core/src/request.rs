//! Request payloads: drafts, unified requests, patches and typed updates.

use crate::entities::{
    Agent, GenerationSettings, Personality, Role, RoleRef, RoleRequirements,
};
use crate::traits::{PersonalityTrait, PersonalityTraits};
use crate::{EntityId, ModelId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// DRAFTS
// ============================================================================

/// Personality as submitted. Traits stay raw JSON so that missing,
/// fractional, non-numeric and unknown values reach the validator intact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalityDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    pub is_template: bool,
    pub traits: BTreeMap<String, Value>,
}

impl PersonalityDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_custom_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }

    pub fn as_template(mut self) -> Self {
        self.is_template = true;
        self
    }

    pub fn with_trait(mut self, t: PersonalityTrait, value: impl Into<Value>) -> Self {
        self.traits.insert(t.as_str().to_string(), value.into());
        self
    }

    /// Set a raw trait entry, including keys that are not known traits.
    pub fn with_raw_trait(mut self, key: impl Into<String>, value: Value) -> Self {
        self.traits.insert(key.into(), value);
        self
    }

    pub fn without_trait(mut self, t: PersonalityTrait) -> Self {
        self.traits.remove(t.as_str());
        self
    }

    /// Populate every trait from typed values.
    pub fn with_traits(mut self, traits: &PersonalityTraits) -> Self {
        for (t, v) in traits.iter() {
            self.traits.insert(t.as_str().to_string(), Value::from(v));
        }
        self
    }

    pub fn from_personality(p: &Personality) -> Self {
        Self {
            id: Some(p.id),
            name: p.name.clone(),
            description: p.description.clone(),
            custom_instructions: p.custom_instructions.clone(),
            is_template: p.is_template,
            traits: BTreeMap::new(),
        }
        .with_traits(&p.traits)
    }

    /// Overlay a patch: present fields overwrite, omitted fields stay.
    pub fn apply(mut self, patch: &PersonalityPatch) -> Self {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(d) = &patch.description {
            self.description = Some(d.clone());
        }
        if let Some(ci) = &patch.custom_instructions {
            self.custom_instructions = Some(ci.clone());
        }
        if let Some(t) = patch.is_template {
            self.is_template = t;
        }
        for (k, v) in &patch.traits {
            self.traits.insert(k.clone(), v.clone());
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set semantics: duplicates are dropped on persist.
    pub capabilities: Vec<String>,
    pub constraints: Vec<String>,
    pub is_template: bool,
    pub metadata: BTreeMap<String, Value>,
    pub requirements: RoleRequirements,
}

impl RoleDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints = constraints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_requirements(mut self, requirements: RoleRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn as_template(mut self) -> Self {
        self.is_template = true;
        self
    }

    pub fn capability_set(&self) -> BTreeSet<String> {
        self.capabilities.iter().cloned().collect()
    }

    pub fn from_role(r: &Role) -> Self {
        Self {
            id: Some(r.id),
            name: r.name.clone(),
            description: r.description.clone(),
            capabilities: r.capabilities.iter().cloned().collect(),
            constraints: r.constraints.clone(),
            is_template: r.is_template,
            metadata: r.metadata.clone(),
            requirements: r.requirements.clone(),
        }
    }

    pub fn apply(mut self, patch: &RolePatch) -> Self {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(d) = &patch.description {
            self.description = Some(d.clone());
        }
        if let Some(c) = &patch.capabilities {
            self.capabilities = c.clone();
        }
        if let Some(c) = &patch.constraints {
            self.constraints = c.clone();
        }
        if let Some(t) = patch.is_template {
            self.is_template = t;
        }
        if let Some(m) = &patch.metadata {
            self.metadata = m.clone();
        }
        if let Some(r) = &patch.requirements {
            self.requirements = r.clone();
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentDraft {
    /// Caller-chosen agent id. Generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When absent, the agent references the personality in the same request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality_id: Option<EntityId>,
    /// When absent, the agent references the role in the same request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleRef>,
    pub model_id: ModelId,
    pub capabilities: Vec<String>,
    pub constraints: Vec<String>,
    pub settings: GenerationSettings,
    pub tags: Vec<String>,
}

impl AgentDraft {
    pub fn new(name: impl Into<String>, model_id: impl Into<ModelId>) -> Self {
        Self {
            name: name.into(),
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_personality(mut self, id: EntityId) -> Self {
        self.personality_id = Some(id);
        self
    }

    pub fn with_role(mut self, role: RoleRef) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.settings.temperature = temperature;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn capability_set(&self) -> BTreeSet<String> {
        self.capabilities.iter().cloned().collect()
    }

    pub fn from_agent(a: &Agent) -> Self {
        Self {
            id: Some(a.id),
            name: a.name.clone(),
            description: a.description.clone(),
            personality_id: Some(a.personality_id),
            role: Some(RoleRef::Id(a.role_id)),
            model_id: a.model_id.clone(),
            capabilities: a.capabilities.iter().cloned().collect(),
            constraints: a.constraints.clone(),
            settings: a.settings,
            tags: a.tags.clone(),
        }
    }

    pub fn apply(mut self, patch: &AgentPatch) -> Self {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(d) = &patch.description {
            self.description = Some(d.clone());
        }
        if let Some(m) = &patch.model_id {
            self.model_id = m.clone();
        }
        if let Some(c) = &patch.capabilities {
            self.capabilities = c.clone();
        }
        if let Some(c) = &patch.constraints {
            self.constraints = c.clone();
        }
        if let Some(s) = &patch.settings {
            s.apply_to(&mut self.settings);
        }
        if let Some(t) = &patch.tags {
            self.tags = t.clone();
        }
        self
    }
}

// ============================================================================
// UNIFIED REQUEST
// ============================================================================

/// Either a new entity to create or a reference to an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum EntityInput<T> {
    New(T),
    Existing { id: EntityId },
}

impl<T> EntityInput<T> {
    pub fn is_new(&self) -> bool {
        matches!(self, EntityInput::New(_))
    }

    pub fn draft(&self) -> Option<&T> {
        match self {
            EntityInput::New(d) => Some(d),
            EntityInput::Existing { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageTemplates,
    CreateAgents,
    UsePremiumModels,
}

impl Permission {
    pub const ALL: [Permission; 3] = [
        Permission::ManageTemplates,
        Permission::CreateAgents,
        Permission::UsePremiumModels,
    ];
}

/// Security context of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    pub permissions: BTreeSet<Permission>,
}

impl CallerContext {
    /// In-process caller with every permission.
    pub fn system() -> Self {
        Self {
            caller_id: None,
            permissions: Permission::ALL.into_iter().collect(),
        }
    }

    pub fn user(caller_id: impl Into<String>, permissions: &[Permission]) -> Self {
        Self {
            caller_id: Some(caller_id.into()),
            permissions: permissions.iter().copied().collect(),
        }
    }

    pub fn has(&self, p: Permission) -> bool {
        self.permissions.contains(&p)
    }
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::system()
    }
}

/// Input to create/validate of a unified configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedConfigurationRequest {
    pub personality: EntityInput<PersonalityDraft>,
    pub role: EntityInput<RoleDraft>,
    pub agent: AgentDraft,
    #[serde(default)]
    pub caller: CallerContext,
}

impl UnifiedConfigurationRequest {
    pub fn new(
        personality: EntityInput<PersonalityDraft>,
        role: EntityInput<RoleDraft>,
        agent: AgentDraft,
    ) -> Self {
        Self {
            personality,
            role,
            agent,
            caller: CallerContext::system(),
        }
    }

    pub fn with_caller(mut self, caller: CallerContext) -> Self {
        self.caller = caller;
        self
    }

    /// Personality id the agent must reference, if already known.
    pub fn personality_id(&self) -> Option<EntityId> {
        match &self.personality {
            EntityInput::New(d) => d.id,
            EntityInput::Existing { id } => Some(*id),
        }
    }

    pub fn role_id(&self) -> Option<EntityId> {
        match &self.role {
            EntityInput::New(d) => d.id,
            EntityInput::Existing { id } => Some(*id),
        }
    }
}

// ============================================================================
// PATCHES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalityPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub custom_instructions: Option<String>,
    pub is_template: Option<bool>,
    /// Only listed traits change.
    pub traits: BTreeMap<String, Value>,
}

impl PersonalityPatch {
    pub fn with_trait(mut self, t: PersonalityTrait, value: impl Into<Value>) -> Self {
        self.traits.insert(t.as_str().to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RolePatch {
    /// Optimistic lock: the role version the caller last read.
    pub expected_version: Option<u32>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub capabilities: Option<Vec<String>>,
    pub constraints: Option<Vec<String>>,
    pub is_template: Option<bool>,
    pub metadata: Option<BTreeMap<String, Value>>,
    pub requirements: Option<RoleRequirements>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

impl SettingsPatch {
    pub fn apply_to(&self, settings: &mut GenerationSettings) {
        if let Some(v) = self.temperature {
            settings.temperature = v;
        }
        if let Some(v) = self.max_tokens {
            settings.max_tokens = v;
        }
        if let Some(v) = self.top_p {
            settings.top_p = v;
        }
        if self.frequency_penalty.is_some() {
            settings.frequency_penalty = self.frequency_penalty;
        }
        if self.presence_penalty.is_some() {
            settings.presence_penalty = self.presence_penalty;
        }
    }
}

/// Agent fields that may change. Personality and role references are fixed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub model_id: Option<ModelId>,
    pub capabilities: Option<Vec<String>>,
    pub constraints: Option<Vec<String>>,
    pub settings: Option<SettingsPatch>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnifiedConfigurationPatch {
    pub personality: Option<PersonalityPatch>,
    pub role: Option<RolePatch>,
    pub agent: Option<AgentPatch>,
    /// Re-apply pre-update values of committed siblings when a later write fails.
    pub atomic: bool,
    pub caller: CallerContext,
}

impl UnifiedConfigurationPatch {
    pub fn is_empty(&self) -> bool {
        self.personality.is_none() && self.role.is_none() && self.agent.is_none()
    }
}

// ============================================================================
// TYPED UPDATES
// ============================================================================

/// Full replacement of a personality's mutable fields, built after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityUpdate {
    pub name: String,
    pub description: Option<String>,
    pub custom_instructions: Option<String>,
    pub is_template: bool,
    pub traits: PersonalityTraits,
}

impl PersonalityUpdate {
    pub fn from_draft(draft: &PersonalityDraft, traits: PersonalityTraits) -> Self {
        Self {
            name: draft.name.clone(),
            description: draft.description.clone(),
            custom_instructions: draft.custom_instructions.clone(),
            is_template: draft.is_template,
            traits,
        }
    }

    /// Update that puts `p` back the way it was.
    pub fn restore(p: &Personality) -> Self {
        Self {
            name: p.name.clone(),
            description: p.description.clone(),
            custom_instructions: p.custom_instructions.clone(),
            is_template: p.is_template,
            traits: p.traits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdate {
    /// `None` skips the optimistic-lock check.
    pub expected_version: Option<u32>,
    pub name: String,
    pub description: Option<String>,
    pub capabilities: BTreeSet<String>,
    pub constraints: Vec<String>,
    pub is_template: bool,
    pub metadata: BTreeMap<String, Value>,
    pub requirements: RoleRequirements,
}

impl RoleUpdate {
    pub fn from_draft(draft: &RoleDraft, expected_version: Option<u32>) -> Self {
        Self {
            expected_version,
            name: draft.name.clone(),
            description: draft.description.clone(),
            capabilities: draft.capability_set(),
            constraints: draft.constraints.clone(),
            is_template: draft.is_template,
            metadata: draft.metadata.clone(),
            requirements: draft.requirements.clone(),
        }
    }

    pub fn restore(r: &Role) -> Self {
        Self {
            expected_version: None,
            name: r.name.clone(),
            description: r.description.clone(),
            capabilities: r.capabilities.clone(),
            constraints: r.constraints.clone(),
            is_template: r.is_template,
            metadata: r.metadata.clone(),
            requirements: r.requirements.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub name: String,
    pub description: Option<String>,
    pub model_id: ModelId,
    pub capabilities: BTreeSet<String>,
    pub constraints: Vec<String>,
    pub settings: GenerationSettings,
    pub tags: Vec<String>,
}

impl AgentUpdate {
    pub fn from_draft(draft: &AgentDraft) -> Self {
        Self {
            name: draft.name.clone(),
            description: draft.description.clone(),
            model_id: draft.model_id.clone(),
            capabilities: draft.capability_set(),
            constraints: draft.constraints.clone(),
            settings: draft.settings,
            tags: draft.tags.clone(),
        }
    }

    pub fn restore(a: &Agent) -> Self {
        Self {
            name: a.name.clone(),
            description: a.description.clone(),
            model_id: a.model_id.clone(),
            capabilities: a.capabilities.clone(),
            constraints: a.constraints.clone(),
            settings: a.settings,
            tags: a.tags.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;
    use serde_json::json;

    #[test]
    fn test_entity_input_json_shape() {
        let existing: EntityInput<RoleDraft> = EntityInput::Existing {
            id: new_entity_id(),
        };
        let v = serde_json::to_value(&existing).unwrap();
        assert_eq!(v["mode"], "existing");

        let parsed: EntityInput<PersonalityDraft> = serde_json::from_value(json!({
            "mode": "new",
            "name": "Muse",
            "traits": { "openness": 90 }
        }))
        .unwrap();
        let draft = parsed.draft().unwrap();
        assert_eq!(draft.name, "Muse");
        assert_eq!(draft.traits["openness"], json!(90));
    }

    #[test]
    fn test_caller_defaults_to_system() {
        let req: UnifiedConfigurationRequest = serde_json::from_value(json!({
            "personality": { "mode": "existing", "id": new_entity_id() },
            "role": { "mode": "existing", "id": new_entity_id() },
            "agent": { "name": "A", "modelId": "m" }
        }))
        .unwrap();
        assert!(req.caller.has(Permission::ManageTemplates));
        assert!(req.caller.has(Permission::UsePremiumModels));
    }

    #[test]
    fn test_personality_patch_overlays_only_present_fields() {
        let draft = PersonalityDraft::new("Muse")
            .with_description("old")
            .with_trait(PersonalityTrait::Openness, 90)
            .with_trait(PersonalityTrait::Humor, 40);
        let patch = PersonalityPatch {
            name: Some("Muse II".into()),
            ..Default::default()
        }
        .with_trait(PersonalityTrait::Humor, 70);

        let merged = draft.apply(&patch);
        assert_eq!(merged.name, "Muse II");
        assert_eq!(merged.description.as_deref(), Some("old"));
        assert_eq!(merged.traits["openness"], json!(90));
        assert_eq!(merged.traits["humor"], json!(70));
    }

    #[test]
    fn test_settings_patch() {
        let mut s = GenerationSettings::default();
        SettingsPatch {
            temperature: Some(1.1),
            presence_penalty: Some(0.5),
            ..Default::default()
        }
        .apply_to(&mut s);
        assert_eq!(s.temperature, 1.1);
        assert_eq!(s.max_tokens, 2048);
        assert_eq!(s.presence_penalty, Some(0.5));
    }

    #[test]
    fn test_request_ids() {
        let pid = new_entity_id();
        let req = UnifiedConfigurationRequest::new(
            EntityInput::New(PersonalityDraft::new("p").with_id(pid)),
            EntityInput::New(RoleDraft::new("r")),
            AgentDraft::new("a", "m"),
        );
        assert_eq!(req.personality_id(), Some(pid));
        assert_eq!(req.role_id(), None);
    }

    #[test]
    fn test_role_update_dedups_capabilities() {
        let draft = RoleDraft::new("r").with_capabilities(["write", "read", "write"]);
        let update = RoleUpdate::from_draft(&draft, Some(3));
        assert_eq!(update.capabilities.len(), 2);
        assert_eq!(update.expected_version, Some(3));
    }
}
