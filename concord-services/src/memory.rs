//! In-memory domain services.
//!
//! Each service guards its own map with a `tokio::sync::RwLock`; there is no
//! process-wide state, so every test or embedding builds its own instances.

use crate::domain;
use crate::{AgentService, DomainServices, ModelService, PersonalityService, RoleService};
use ::async_trait::async_trait;
use chrono::Utc;
use concord_core::{
    new_entity_id, Agent, AgentDraft, AgentUpdate, EntityId, EntityKind, EntitySchema,
    ModelConfiguration, Personality, PersonalityDraft, PersonalityUpdate, Role, RoleDraft,
    RoleRef, RoleUpdate, ServiceError, ServiceName, ServiceResult, ValidationResult,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

fn not_found(entity: EntityKind, id: impl ToString) -> ServiceError {
    ServiceError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn already_exists(entity: EntityKind, id: EntityId) -> ServiceError {
    ServiceError::AlreadyExists {
        entity,
        id: id.to_string(),
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

// ============================================================================
// PERSONALITIES
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryPersonalityService {
    schema: EntitySchema,
    personalities: RwLock<HashMap<EntityId, Personality>>,
}

impl InMemoryPersonalityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.personalities.read().await.len()
    }

    /// Insert a fully formed personality, bypassing draft resolution.
    pub async fn insert(&self, personality: Personality) {
        self.personalities
            .write()
            .await
            .insert(personality.id, personality);
    }
}

#[async_trait]
impl PersonalityService for InMemoryPersonalityService {
    async fn create(&self, draft: &PersonalityDraft) -> ServiceResult<Personality> {
        let traits = self
            .schema
            .resolve_traits(&draft.traits)
            .map_err(|invalid| ServiceError::Rejected {
                service: ServiceName::PersonalityService,
                reason: invalid
                    .errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            })?;

        let id = draft.id.unwrap_or_else(new_entity_id);
        let mut personalities = self.personalities.write().await;
        if personalities.contains_key(&id) {
            return Err(already_exists(EntityKind::Personality, id));
        }
        let now = Utc::now();
        let personality = Personality {
            id,
            name: draft.name.trim().to_string(),
            description: draft.description.clone(),
            custom_instructions: draft.custom_instructions.clone(),
            traits,
            is_template: draft.is_template,
            created_at: now,
            updated_at: now,
        };
        personalities.insert(id, personality.clone());
        debug!(personality_id = %id, "personality created");
        Ok(personality)
    }

    async fn get(&self, id: EntityId) -> ServiceResult<Option<Personality>> {
        Ok(self.personalities.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        id: EntityId,
        update: &PersonalityUpdate,
    ) -> ServiceResult<Personality> {
        let mut personalities = self.personalities.write().await;
        let p = personalities
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Personality, id))?;
        p.name = update.name.trim().to_string();
        p.description = update.description.clone();
        p.custom_instructions = update.custom_instructions.clone();
        p.is_template = update.is_template;
        p.traits = update.traits;
        p.updated_at = Utc::now();
        Ok(p.clone())
    }

    async fn delete(&self, id: EntityId) -> ServiceResult<()> {
        self.personalities
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found(EntityKind::Personality, id))
    }

    async fn validate(&self, draft: &PersonalityDraft) -> ServiceResult<ValidationResult> {
        Ok(domain::validate_personality(draft))
    }

    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<Personality>> {
        let personalities = self.personalities.read().await;
        Ok(personalities
            .values()
            .find(|p| same_name(&p.name, name))
            .cloned())
    }
}

// ============================================================================
// ROLES
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryRoleService {
    roles: RwLock<HashMap<EntityId, Role>>,
}

impl InMemoryRoleService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.roles.read().await.len()
    }
}

#[async_trait]
impl RoleService for InMemoryRoleService {
    async fn create(&self, draft: &RoleDraft) -> ServiceResult<Role> {
        let id = draft.id.unwrap_or_else(new_entity_id);
        let mut roles = self.roles.write().await;
        if roles.contains_key(&id) {
            return Err(already_exists(EntityKind::Role, id));
        }
        let now = Utc::now();
        let role = Role {
            id,
            name: draft.name.trim().to_string(),
            description: draft.description.clone(),
            capabilities: draft.capability_set(),
            constraints: draft.constraints.clone(),
            is_template: draft.is_template,
            version: 1,
            metadata: draft.metadata.clone(),
            requirements: draft.requirements.clone(),
            created_at: now,
            updated_at: now,
        };
        roles.insert(id, role.clone());
        debug!(role_id = %id, "role created");
        Ok(role)
    }

    async fn get(&self, id: EntityId) -> ServiceResult<Option<Role>> {
        Ok(self.roles.read().await.get(&id).cloned())
    }

    async fn update(&self, id: EntityId, update: &RoleUpdate) -> ServiceResult<Role> {
        let mut roles = self.roles.write().await;
        let role = roles
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Role, id))?;
        if let Some(expected) = update.expected_version {
            if expected != role.version {
                return Err(ServiceError::VersionConflict {
                    entity: EntityKind::Role,
                    id: id.to_string(),
                    expected,
                    actual: role.version,
                });
            }
        }
        role.name = update.name.trim().to_string();
        role.description = update.description.clone();
        role.capabilities = update.capabilities.clone();
        role.constraints = update.constraints.clone();
        role.is_template = update.is_template;
        role.metadata = update.metadata.clone();
        role.requirements = update.requirements.clone();
        role.version += 1;
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete(&self, id: EntityId) -> ServiceResult<()> {
        self.roles
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found(EntityKind::Role, id))
    }

    async fn validate(&self, draft: &RoleDraft) -> ServiceResult<ValidationResult> {
        Ok(domain::validate_role(draft))
    }

    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<Role>> {
        let roles = self.roles.read().await;
        Ok(roles.values().find(|r| same_name(&r.name, name)).cloned())
    }

    async fn list_capabilities(&self, role_id: EntityId) -> ServiceResult<Vec<String>> {
        let roles = self.roles.read().await;
        let role = roles
            .get(&role_id)
            .ok_or_else(|| not_found(EntityKind::Role, role_id))?;
        Ok(role.capabilities.iter().cloned().collect())
    }
}

// ============================================================================
// MODELS
// ============================================================================

/// Model catalog seeded at construction.
#[derive(Debug, Default)]
pub struct InMemoryModelService {
    models: RwLock<HashMap<String, ModelConfiguration>>,
}

impl InMemoryModelService {
    pub fn new(catalog: impl IntoIterator<Item = ModelConfiguration>) -> Self {
        Self {
            models: RwLock::new(catalog.into_iter().map(|m| (m.id.clone(), m)).collect()),
        }
    }

    /// Flip availability of a catalog entry.
    pub async fn set_available(&self, id: &str, available: bool) {
        if let Some(m) = self.models.write().await.get_mut(id) {
            m.available = available;
        }
    }

    /// Remove a model from the catalog.
    pub async fn retire(&self, id: &str) {
        self.models.write().await.remove(id);
    }
}

#[async_trait]
impl ModelService for InMemoryModelService {
    async fn get(&self, id: &str) -> ServiceResult<Option<ModelConfiguration>> {
        Ok(self.models.read().await.get(id).cloned())
    }

    async fn is_available(&self, id: &str) -> ServiceResult<bool> {
        Ok(self
            .models
            .read()
            .await
            .get(id)
            .is_some_and(|m| m.available))
    }
}

// ============================================================================
// AGENTS
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryAgentService {
    agents: RwLock<HashMap<EntityId, Agent>>,
    dependents: RwLock<HashMap<EntityId, BTreeMap<String, u64>>>,
}

impl InMemoryAgentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Record `count` live resources of `kind` (e.g. "conversation")
    /// referencing the agent.
    pub async fn register_dependent(&self, agent_id: EntityId, kind: &str, count: u64) {
        let mut deps = self.dependents.write().await;
        *deps
            .entry(agent_id)
            .or_default()
            .entry(kind.to_string())
            .or_default() += count;
    }

    pub async fn clear_dependents(&self, agent_id: EntityId) {
        self.dependents.write().await.remove(&agent_id);
    }
}

#[async_trait]
impl AgentService for InMemoryAgentService {
    async fn create(&self, draft: &AgentDraft) -> ServiceResult<Agent> {
        let rejected = |reason: &str| ServiceError::Rejected {
            service: ServiceName::AgentService,
            reason: reason.to_string(),
        };
        let personality_id = draft
            .personality_id
            .ok_or_else(|| rejected("personality reference is unresolved"))?;
        let role_id = match &draft.role {
            Some(RoleRef::Id(id)) => *id,
            _ => return Err(rejected("role reference is unresolved")),
        };

        let id = draft.id.unwrap_or_else(new_entity_id);
        let mut agents = self.agents.write().await;
        if agents.contains_key(&id) {
            return Err(already_exists(EntityKind::Agent, id));
        }
        let now = Utc::now();
        let agent = Agent {
            id,
            name: draft.name.trim().to_string(),
            description: draft.description.clone(),
            personality_id,
            role_id,
            model_id: draft.model_id.clone(),
            capabilities: draft.capability_set(),
            constraints: draft.constraints.clone(),
            settings: draft.settings,
            tags: draft.tags.clone(),
            created_at: now,
            updated_at: now,
        };
        agents.insert(id, agent.clone());
        debug!(agent_id = %id, "agent created");
        Ok(agent)
    }

    async fn get(&self, id: EntityId) -> ServiceResult<Option<Agent>> {
        Ok(self.agents.read().await.get(&id).cloned())
    }

    async fn update(&self, id: EntityId, update: &AgentUpdate) -> ServiceResult<Agent> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Agent, id))?;
        agent.name = update.name.trim().to_string();
        agent.description = update.description.clone();
        agent.model_id = update.model_id.clone();
        agent.capabilities = update.capabilities.clone();
        agent.constraints = update.constraints.clone();
        agent.settings = update.settings;
        agent.tags = update.tags.clone();
        agent.updated_at = Utc::now();
        Ok(agent.clone())
    }

    async fn delete(&self, id: EntityId) -> ServiceResult<()> {
        self.agents
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| not_found(EntityKind::Agent, id))?;
        self.dependents.write().await.remove(&id);
        Ok(())
    }

    async fn validate(&self, draft: &AgentDraft) -> ServiceResult<ValidationResult> {
        Ok(domain::validate_agent(draft))
    }

    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents.values().find(|a| same_name(&a.name, name)).cloned())
    }

    async fn list(&self) -> ServiceResult<Vec<Agent>> {
        Ok(self.agents.read().await.values().cloned().collect())
    }

    async fn dependents(&self, id: EntityId) -> ServiceResult<BTreeMap<String, u64>> {
        let deps = self.dependents.read().await;
        Ok(deps
            .get(&id)
            .map(|m| {
                m.iter()
                    .filter(|(_, n)| **n > 0)
                    .map(|(k, n)| (k.clone(), *n))
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ============================================================================
// BUNDLE
// ============================================================================

/// Concrete in-memory services, kept typed so tests can reach the helpers.
#[derive(Debug, Clone)]
pub struct InMemoryServices {
    pub personalities: Arc<InMemoryPersonalityService>,
    pub roles: Arc<InMemoryRoleService>,
    pub models: Arc<InMemoryModelService>,
    pub agents: Arc<InMemoryAgentService>,
}

impl InMemoryServices {
    pub fn new(catalog: impl IntoIterator<Item = ModelConfiguration>) -> Self {
        Self {
            personalities: Arc::new(InMemoryPersonalityService::new()),
            roles: Arc::new(InMemoryRoleService::new()),
            models: Arc::new(InMemoryModelService::new(catalog)),
            agents: Arc::new(InMemoryAgentService::new()),
        }
    }

    /// Type-erased handles for the validator and orchestrator.
    pub fn domain(&self) -> DomainServices {
        DomainServices::new(
            self.personalities.clone(),
            self.roles.clone(),
            self.models.clone(),
            self.agents.clone(),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
