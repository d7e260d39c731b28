//! Concord Domain Services
//!
//! Async contracts for the four collaborators the orchestrator coordinates
//! (personalities, roles, models, agents) plus in-memory implementations.
//! Each service owns CRUD and domain-specific validation for its entity
//! type and is solely responsible for its own consistency under concurrent
//! writes.

pub mod domain;
pub mod memory;

pub use memory::{
    InMemoryAgentService, InMemoryModelService, InMemoryPersonalityService,
    InMemoryRoleService, InMemoryServices,
};

use ::async_trait::async_trait;
use concord_core::{
    Agent, AgentDraft, AgentUpdate, EntityId, ModelConfiguration, Personality, PersonalityDraft,
    PersonalityUpdate, Role, RoleDraft, RoleUpdate, ServiceResult, UnifiedConfigurationRequest,
    ValidationResult,
};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// PERSONALITY SERVICE
// ============================================================================

#[async_trait]
pub trait PersonalityService: Send + Sync {
    /// Persist a new personality. Uses `draft.id` when present.
    async fn create(&self, draft: &PersonalityDraft) -> ServiceResult<Personality>;

    async fn get(&self, id: EntityId) -> ServiceResult<Option<Personality>>;

    async fn update(&self, id: EntityId, update: &PersonalityUpdate)
        -> ServiceResult<Personality>;

    async fn delete(&self, id: EntityId) -> ServiceResult<()>;

    /// Domain-specific validation of a draft.
    async fn validate(&self, draft: &PersonalityDraft) -> ServiceResult<ValidationResult>;

    /// First personality whose name matches case-insensitively.
    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<Personality>>;
}

// ============================================================================
// ROLE SERVICE
// ============================================================================

#[async_trait]
pub trait RoleService: Send + Sync {
    /// Persist a new role at version 1. Duplicate capabilities are dropped.
    async fn create(&self, draft: &RoleDraft) -> ServiceResult<Role>;

    async fn get(&self, id: EntityId) -> ServiceResult<Option<Role>>;

    /// Apply an update, checking `update.expected_version` when set.
    /// Each successful update increments the version.
    async fn update(&self, id: EntityId, update: &RoleUpdate) -> ServiceResult<Role>;

    async fn delete(&self, id: EntityId) -> ServiceResult<()>;

    async fn validate(&self, draft: &RoleDraft) -> ServiceResult<ValidationResult>;

    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<Role>>;

    /// Capabilities granted by a role, sorted.
    async fn list_capabilities(&self, role_id: EntityId) -> ServiceResult<Vec<String>>;
}

// ============================================================================
// MODEL SERVICE
// ============================================================================

/// Read-only model catalog.
#[async_trait]
pub trait ModelService: Send + Sync {
    async fn get(&self, id: &str) -> ServiceResult<Option<ModelConfiguration>>;

    async fn is_available(&self, id: &str) -> ServiceResult<bool>;
}

// ============================================================================
// AGENT SERVICE
// ============================================================================

#[async_trait]
pub trait AgentService: Send + Sync {
    /// Persist a new agent. The draft must carry a resolved personality id
    /// and a role reference by id.
    async fn create(&self, draft: &AgentDraft) -> ServiceResult<Agent>;

    async fn get(&self, id: EntityId) -> ServiceResult<Option<Agent>>;

    async fn update(&self, id: EntityId, update: &AgentUpdate) -> ServiceResult<Agent>;

    async fn delete(&self, id: EntityId) -> ServiceResult<()>;

    async fn validate(&self, draft: &AgentDraft) -> ServiceResult<ValidationResult>;

    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<Agent>>;

    async fn list(&self) -> ServiceResult<Vec<Agent>>;

    /// Agent-domain checks on the agent draft of a unified request. The
    /// personality and role inputs are left to their own services and to
    /// cross-domain validation.
    async fn validate_agent_configuration(
        &self,
        request: &UnifiedConfigurationRequest,
    ) -> ServiceResult<ValidationResult> {
        self.validate(&request.agent).await
    }

    /// Count of live resources referencing the agent, by type. Zero counts
    /// are omitted.
    async fn dependents(&self, id: EntityId) -> ServiceResult<BTreeMap<String, u64>>;
}

// ============================================================================
// BUNDLE
// ============================================================================

/// Shared handles to the four collaborators.
#[derive(Clone)]
pub struct DomainServices {
    pub personalities: Arc<dyn PersonalityService>,
    pub roles: Arc<dyn RoleService>,
    pub models: Arc<dyn ModelService>,
    pub agents: Arc<dyn AgentService>,
}

impl DomainServices {
    pub fn new(
        personalities: Arc<dyn PersonalityService>,
        roles: Arc<dyn RoleService>,
        models: Arc<dyn ModelService>,
        agents: Arc<dyn AgentService>,
    ) -> Self {
        Self {
            personalities,
            roles,
            models,
            agents,
        }
    }
}

impl std::fmt::Debug for DomainServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainServices").finish_non_exhaustive()
    }
}
