//! Configurable service doubles.
//!
//! A [`ServiceDouble`] wraps a real collaborator and, per [`DoubleOptions`],
//! fails selected operations, appends injected validation errors, or adds
//! latency. Every call is recorded so tests can assert on call order.

use ::async_trait::async_trait;
use concord_core::{
    Agent, AgentDraft, AgentUpdate, EntityId, ModelConfiguration, Personality, PersonalityDraft,
    PersonalityUpdate, Role, RoleDraft, RoleUpdate, ServiceError, ServiceName, ServiceResult,
    ValidationError, ValidationResult,
};
use concord_services::{
    AgentService, DomainServices, InMemoryAgentService, InMemoryModelService,
    InMemoryPersonalityService, InMemoryRoleService, InMemoryServices, ModelService,
    PersonalityService, RoleService,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Collaborator operation a double can intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Create,
    Get,
    Update,
    Delete,
    Validate,
    FindByName,
    List,
    ListCapabilities,
    IsAvailable,
    Dependents,
}

/// Behavior of a [`ServiceDouble`]. Plain data; swap it at any time with
/// [`ServiceDouble::set_options`].
#[derive(Debug, Clone, Default)]
pub struct DoubleOptions {
    /// Operations that fail instead of reaching the wrapped service.
    pub fail_on: BTreeSet<Operation>,
    /// Error returned by failing operations. Defaults to `Unavailable`.
    pub failure: Option<ServiceError>,
    /// Appended to every `validate` result.
    pub injected_errors: Vec<ValidationError>,
    /// Delay before each call.
    pub latency: Option<Duration>,
    /// Operations the latency applies to; all operations when empty.
    pub slow_on: BTreeSet<Operation>,
}

impl DoubleOptions {
    pub fn failing(ops: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            fail_on: ops.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_failure(mut self, failure: ServiceError) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_injected(mut self, error: ValidationError) -> Self {
        self.injected_errors.push(error);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn slow_on(mut self, ops: impl IntoIterator<Item = Operation>) -> Self {
        self.slow_on.extend(ops);
        self
    }
}

/// Wrapper around a collaborator of type `S`.
#[derive(Debug)]
pub struct ServiceDouble<S: ?Sized> {
    service: ServiceName,
    inner: Arc<S>,
    options: Mutex<DoubleOptions>,
    calls: Mutex<Vec<Operation>>,
}

impl<S: ?Sized> ServiceDouble<S> {
    pub fn new(service: ServiceName, inner: Arc<S>) -> Self {
        Self {
            service,
            inner,
            options: Mutex::new(DoubleOptions::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_options(self, options: DoubleOptions) -> Self {
        self.set_options(options);
        self
    }

    pub fn set_options(&self, options: DoubleOptions) {
        *self.options.lock().unwrap_or_else(PoisonError::into_inner) = options;
    }

    /// Back to pass-through behavior.
    pub fn reset(&self) {
        self.set_options(DoubleOptions::default());
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Calls seen so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, op: Operation) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| **c == op)
            .count()
    }

    fn options(&self) -> DoubleOptions {
        self.options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record the call, apply latency, then fail if configured.
    async fn enter(&self, op: Operation) -> ServiceResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
        let options = self.options();
        if let Some(latency) = options.latency {
            if options.slow_on.is_empty() || options.slow_on.contains(&op) {
                tokio::time::sleep(latency).await;
            }
        }
        if options.fail_on.contains(&op) {
            return Err(options.failure.unwrap_or_else(|| ServiceError::Unavailable {
                service: self.service,
                reason: format!("injected failure on {:?}", op),
            }));
        }
        Ok(())
    }

    fn inject(&self, mut result: ValidationResult) -> ValidationResult {
        for error in self.options().injected_errors {
            result.push(error);
        }
        result
    }
}

// ============================================================================
// SERVICE IMPLS
// ============================================================================

#[async_trait]
impl<S: PersonalityService + ?Sized> PersonalityService for ServiceDouble<S> {
    async fn create(&self, draft: &PersonalityDraft) -> ServiceResult<Personality> {
        self.enter(Operation::Create).await?;
        self.inner.create(draft).await
    }

    async fn get(&self, id: EntityId) -> ServiceResult<Option<Personality>> {
        self.enter(Operation::Get).await?;
        self.inner.get(id).await
    }

    async fn update(&self, id: EntityId, update: &PersonalityUpdate) -> ServiceResult<Personality> {
        self.enter(Operation::Update).await?;
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: EntityId) -> ServiceResult<()> {
        self.enter(Operation::Delete).await?;
        self.inner.delete(id).await
    }

    async fn validate(&self, draft: &PersonalityDraft) -> ServiceResult<ValidationResult> {
        self.enter(Operation::Validate).await?;
        Ok(self.inject(self.inner.validate(draft).await?))
    }

    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<Personality>> {
        self.enter(Operation::FindByName).await?;
        self.inner.find_by_name(name).await
    }
}

#[async_trait]
impl<S: RoleService + ?Sized> RoleService for ServiceDouble<S> {
    async fn create(&self, draft: &RoleDraft) -> ServiceResult<Role> {
        self.enter(Operation::Create).await?;
        self.inner.create(draft).await
    }

    async fn get(&self, id: EntityId) -> ServiceResult<Option<Role>> {
        self.enter(Operation::Get).await?;
        self.inner.get(id).await
    }

    async fn update(&self, id: EntityId, update: &RoleUpdate) -> ServiceResult<Role> {
        self.enter(Operation::Update).await?;
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: EntityId) -> ServiceResult<()> {
        self.enter(Operation::Delete).await?;
        self.inner.delete(id).await
    }

    async fn validate(&self, draft: &RoleDraft) -> ServiceResult<ValidationResult> {
        self.enter(Operation::Validate).await?;
        Ok(self.inject(self.inner.validate(draft).await?))
    }

    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<Role>> {
        self.enter(Operation::FindByName).await?;
        self.inner.find_by_name(name).await
    }

    async fn list_capabilities(&self, role_id: EntityId) -> ServiceResult<Vec<String>> {
        self.enter(Operation::ListCapabilities).await?;
        self.inner.list_capabilities(role_id).await
    }
}

#[async_trait]
impl<S: ModelService + ?Sized> ModelService for ServiceDouble<S> {
    async fn get(&self, id: &str) -> ServiceResult<Option<ModelConfiguration>> {
        self.enter(Operation::Get).await?;
        self.inner.get(id).await
    }

    async fn is_available(&self, id: &str) -> ServiceResult<bool> {
        self.enter(Operation::IsAvailable).await?;
        self.inner.is_available(id).await
    }
}

#[async_trait]
impl<S: AgentService + ?Sized> AgentService for ServiceDouble<S> {
    async fn create(&self, draft: &AgentDraft) -> ServiceResult<Agent> {
        self.enter(Operation::Create).await?;
        self.inner.create(draft).await
    }

    async fn get(&self, id: EntityId) -> ServiceResult<Option<Agent>> {
        self.enter(Operation::Get).await?;
        self.inner.get(id).await
    }

    async fn update(&self, id: EntityId, update: &AgentUpdate) -> ServiceResult<Agent> {
        self.enter(Operation::Update).await?;
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: EntityId) -> ServiceResult<()> {
        self.enter(Operation::Delete).await?;
        self.inner.delete(id).await
    }

    async fn validate(&self, draft: &AgentDraft) -> ServiceResult<ValidationResult> {
        self.enter(Operation::Validate).await?;
        Ok(self.inject(self.inner.validate(draft).await?))
    }

    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<Agent>> {
        self.enter(Operation::FindByName).await?;
        self.inner.find_by_name(name).await
    }

    async fn list(&self) -> ServiceResult<Vec<Agent>> {
        self.enter(Operation::List).await?;
        self.inner.list().await
    }

    async fn dependents(&self, id: EntityId) -> ServiceResult<BTreeMap<String, u64>> {
        self.enter(Operation::Dependents).await?;
        self.inner.dependents(id).await
    }
}

// ============================================================================
// BUNDLE
// ============================================================================

/// In-memory services with a double in front of each. Tests reach the
/// backing stores through `backing` to assert on what was persisted.
#[derive(Debug, Clone)]
pub struct DoubledServices {
    pub backing: InMemoryServices,
    pub personalities: Arc<ServiceDouble<InMemoryPersonalityService>>,
    pub roles: Arc<ServiceDouble<InMemoryRoleService>>,
    pub models: Arc<ServiceDouble<InMemoryModelService>>,
    pub agents: Arc<ServiceDouble<InMemoryAgentService>>,
}

impl DoubledServices {
    pub fn new(backing: InMemoryServices) -> Self {
        Self {
            personalities: Arc::new(ServiceDouble::new(
                ServiceName::PersonalityService,
                backing.personalities.clone(),
            )),
            roles: Arc::new(ServiceDouble::new(
                ServiceName::RoleService,
                backing.roles.clone(),
            )),
            models: Arc::new(ServiceDouble::new(
                ServiceName::ModelService,
                backing.models.clone(),
            )),
            agents: Arc::new(ServiceDouble::new(
                ServiceName::AgentService,
                backing.agents.clone(),
            )),
            backing,
        }
    }

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
