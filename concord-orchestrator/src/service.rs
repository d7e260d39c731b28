//! The configuration service: one entry point that coordinates the four
//! domain services for every unified configuration operation.
//!
//! Writes run in dependency order (personality, role, agent). Every
//! completed write is logged so a later failure can undo it. Writes already
//! in flight are never interrupted; timeouts and cancellation take effect
//! at the boundaries between steps.

use crate::cancel::CancelSignal;
use crate::compensation::{CompensationLog, CompensationReport};
use crate::config::{ConfigError, OrchestratorConfig, TimeoutMode};
use crate::context::{OperationContext, OperationKind, Phase};
use crate::error::{ConfigurationError, ConfigurationResult, Severity, Step};
use crate::metrics::OrchestratorMetrics;
use crate::pipeline::{AgentCandidate, Candidate, Triad};
use concord_core::{
    Agent, AgentDraft, AgentUpdate, CorrelationId, EntityId, EntityInput, EntityKind,
    EntitySchema, PersonalityDraft, PersonalityUpdate, RoleDraft, RoleRef, RoleUpdate, RuleSet,
    ServiceError, ServiceName, UnifiedConfiguration, UnifiedConfigurationPatch,
    UnifiedConfigurationRequest, ValidationResult,
};
use concord_services::DomainServices;
use concord_validation::{BusinessRules, CompatibilityChecker, RuleEngine, ValidationService};
use futures_util::{StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

// ============================================================================
// BUILDER
// ============================================================================

pub struct ConfigurationServiceBuilder {
    services: DomainServices,
    config: OrchestratorConfig,
    rules: Option<Arc<RuleSet>>,
    validator: Option<Arc<dyn ValidationService>>,
    schema: EntitySchema,
    business: BusinessRules,
    metrics: Option<Arc<OrchestratorMetrics>>,
}

impl ConfigurationServiceBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Compatibility rules. Defaults to the rules named by the config.
    pub fn rules(mut self, rules: Arc<RuleSet>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Validation operations. Defaults to a [`RuleEngine`] over the same
    /// domain services.
    pub fn validator(mut self, validator: Arc<dyn ValidationService>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn schema(mut self, schema: EntitySchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn business_rules(mut self, business: BusinessRules) -> Self {
        self.business = business;
        self
    }

    /// Share a metrics registry. Defaults to a fresh one.
    pub fn metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<ConfigurationService, ConfigError> {
        self.config.validate()?;
        let rules = match self.rules {
            Some(rules) => rules,
            None => Arc::new(self.config.load_rules()?),
        };
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(OrchestratorMetrics::new()?),
        };
        let validator = match self.validator {
            Some(validator) => validator,
            None => Arc::new(RuleEngine::new(self.services.clone())) as Arc<dyn ValidationService>,
        };

        info!(
            rules = rules.len(),
            timeout_mode = ?self.config.timeout_mode,
            validation_budget_ms = self.config.validation_budget_ms,
            operation_budget_ms = self.config.operation_budget_ms,
            "Configuration service ready"
        );

        Ok(ConfigurationService {
            services: self.services,
            validator,
            checker: CompatibilityChecker::new(rules),
            schema: Arc::new(self.schema),
            business: Arc::new(self.business),
            config: self.config,
            metrics,
        })
    }
}

// ============================================================================
// SERVICE
// ============================================================================

/// Creates, reads, updates, deletes and validates unified configurations.
///
/// Cheap to share behind an `Arc`; every call is independent and carries
/// its own correlation id.
pub struct ConfigurationService {
    pub(crate) services: DomainServices,
    pub(crate) validator: Arc<dyn ValidationService>,
    pub(crate) checker: CompatibilityChecker,
    pub(crate) schema: Arc<EntitySchema>,
    pub(crate) business: Arc<BusinessRules>,
    config: OrchestratorConfig,
    metrics: Arc<OrchestratorMetrics>,
}

impl std::fmt::Debug for ConfigurationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationService")
            .field("config", &self.config)
            .field("rules", &self.checker.rules().len())
            .finish_non_exhaustive()
    }
}

/// Why persistence stopped before finishing.
#[derive(Debug)]
enum Failure {
    Service { step: Step, source: ServiceError },
    Timeout { elapsed: Duration },
    Cancelled { step: Step },
}

impl Failure {
    fn into_error(
        self,
        correlation_id: CorrelationId,
        budget_ms: u64,
        compensation: CompensationReport,
    ) -> ConfigurationError {
        match self {
            Failure::Service { step, source } => ConfigurationError::Infrastructure {
                correlation_id,
                step,
                source,
                compensation,
            },
            Failure::Timeout { .. } => ConfigurationError::Timeout {
                correlation_id,
                phase: Phase::Persistence,
                budget_ms,
                compensation,
            },
            Failure::Cancelled { step } => ConfigurationError::Cancelled {
                correlation_id,
                step,
                compensation,
            },
        }
    }

    /// The failure as seen by a partially applied update.
    fn into_service_error(self) -> ServiceError {
        match self {
            Failure::Service { source, .. } => source,
            Failure::Timeout { elapsed } => ServiceError::Timeout {
                service: ServiceName::ConfigurationService,
                elapsed_ms: elapsed.as_millis() as u64,
            },
            Failure::Cancelled { step } => ServiceError::Rejected {
                service: ServiceName::ConfigurationService,
                reason: format!("cancelled before {}", step),
            },
        }
    }
}

/// Typed updates for the sub-entities an update patch touches.
#[derive(Debug, Default)]
struct Changes {
    personality: Option<PersonalityUpdate>,
    role: Option<RoleUpdate>,
    agent: Option<AgentUpdate>,
}

fn read_error(correlation_id: CorrelationId, source: ServiceError) -> ConfigurationError {
    ConfigurationError::Infrastructure {
        correlation_id,
        step: Step::Read,
        source,
        compensation: CompensationReport::default(),
    }
}

impl ConfigurationService {
    pub fn builder(services: DomainServices) -> ConfigurationServiceBuilder {
        ConfigurationServiceBuilder {
            services,
            config: OrchestratorConfig::default(),
            rules: None,
            validator: None,
            schema: EntitySchema::default(),
            business: BusinessRules::default(),
            metrics: None,
        }
    }

    /// Default configuration, standard rules.
    pub fn new(services: DomainServices) -> Result<Self, ConfigError> {
        Self::builder(services).build()
    }

    pub fn services(&self) -> &DomainServices {
        &self.services
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &OrchestratorMetrics {
        &self.metrics
    }

    pub fn rules(&self) -> &RuleSet {
        self.checker.rules()
    }

    // ------------------------------------------------------------------------
    // Validate
    // ------------------------------------------------------------------------

    /// Run every check `create_unified_configuration` would run, without
    /// writing anything. The returned findings are exactly the ones create
    /// would reject the same request with.
    pub async fn validate_unified_configuration(
        &self,
        request: &UnifiedConfigurationRequest,
    ) -> ConfigurationResult<ValidationResult> {
        let ctx = OperationContext::new(OperationKind::Validate);
        let outcome = async {
            let triad = Triad::from_request(request);
            self.run_validation(&ctx, &triad, &mut CancelSignal::never())
                .await
        }
        .instrument(ctx.span().clone())
        .await;
        self.finish(
            &ctx,
            outcome
                .as_ref()
                .map(|r| if r.is_valid { "valid" } else { "invalid" }),
        );
        outcome
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    pub async fn create_unified_configuration(
        &self,
        request: &UnifiedConfigurationRequest,
    ) -> ConfigurationResult<UnifiedConfiguration> {
        self.create_unified_configuration_with_cancel(request, CancelSignal::never())
            .await
    }

    /// Create, stopping at the next step boundary once `cancel` fires.
    /// Writes made before that point are rolled back.
    pub async fn create_unified_configuration_with_cancel(
        &self,
        request: &UnifiedConfigurationRequest,
        mut cancel: CancelSignal,
    ) -> ConfigurationResult<UnifiedConfiguration> {
        let ctx = OperationContext::new(OperationKind::Create);
        if let Some(id) = request.agent.id {
            ctx.span().record("agent_id", tracing::field::display(id));
        }
        let outcome = self
            .create_inner(&ctx, request, &mut cancel)
            .instrument(ctx.span().clone())
            .await;
        self.finish(&ctx, outcome.as_ref().map(|_| "success"));
        outcome
    }

    async fn create_inner(
        &self,
        ctx: &OperationContext,
        request: &UnifiedConfigurationRequest,
        cancel: &mut CancelSignal,
    ) -> ConfigurationResult<UnifiedConfiguration> {
        let triad = Triad::from_request(request);
        let result = self.run_validation(ctx, &triad, cancel).await?;
        if !result.is_valid {
            return Err(ConfigurationError::Validation {
                correlation_id: ctx.correlation_id,
                result,
            });
        }

        let started = Instant::now();
        let mut log = CompensationLog::new();
        let outcome = self.persist_new(ctx, request, &mut log, cancel).await;
        self.metrics
            .observe_phase(ctx.operation, Phase::Persistence, started.elapsed());

        match outcome {
            Ok(configuration) => {
                info!(
                    agent_id = %configuration.agent.id,
                    personality_id = %configuration.personality.id,
                    role_id = %configuration.role.id,
                    "Unified configuration created"
                );
                Ok(configuration)
            }
            Err(failure) => {
                let compensation = self.compensate(ctx, log).await;
                let error = failure.into_error(
                    ctx.correlation_id,
                    self.config.operation_budget_ms,
                    compensation.clone(),
                );
                Err(error.escalate(&compensation))
            }
        }
    }

    async fn persist_new(
        &self,
        ctx: &OperationContext,
        request: &UnifiedConfigurationRequest,
        log: &mut CompensationLog,
        cancel: &CancelSignal,
    ) -> Result<UnifiedConfiguration, Failure> {
        let personality = match &request.personality {
            EntityInput::New(draft) => {
                let step = Step::Write(EntityKind::Personality);
                self.checkpoint(ctx, step, cancel)?;
                let created = self
                    .services
                    .personalities
                    .create(draft)
                    .await
                    .map_err(|source| Failure::Service { step, source })?;
                log.created(EntityKind::Personality, created.id);
                created
            }
            EntityInput::Existing { id } => self
                .services
                .personalities
                .get(*id)
                .await
                .and_then(|p| p.ok_or_else(|| missing(EntityKind::Personality, *id)))
                .map_err(|source| Failure::Service {
                    step: Step::Read,
                    source,
                })?,
        };

        let role = match &request.role {
            EntityInput::New(draft) => {
                let step = Step::Write(EntityKind::Role);
                self.checkpoint(ctx, step, cancel)?;
                let created = self
                    .services
                    .roles
                    .create(draft)
                    .await
                    .map_err(|source| Failure::Service { step, source })?;
                log.created(EntityKind::Role, created.id);
                created
            }
            EntityInput::Existing { id } => self
                .services
                .roles
                .get(*id)
                .await
                .and_then(|r| r.ok_or_else(|| missing(EntityKind::Role, *id)))
                .map_err(|source| Failure::Service {
                    step: Step::Read,
                    source,
                })?,
        };

        let step = Step::Write(EntityKind::Agent);
        self.checkpoint(ctx, step, cancel)?;
        let mut draft = request.agent.clone();
        draft.personality_id = Some(personality.id);
        draft.role = Some(RoleRef::Id(role.id));
        let agent = self
            .services
            .agents
            .create(&draft)
            .await
            .map_err(|source| Failure::Service { step, source })?;
        log.created(EntityKind::Agent, agent.id);

        // Committed. The model is for the caller's convenience only.
        let model = match self.services.models.get(&agent.model_id).await {
            Ok(model) => model,
            Err(e) => {
                warn!(model_id = %agent.model_id, error = %e, "Model lookup failed after create");
                None
            }
        };

        Ok(UnifiedConfiguration {
            personality,
            role,
            agent,
            model,
        })
    }

    // ------------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------------

    /// The configuration of `agent_id`, or `None` if there is no such agent.
    pub async fn get_unified_configuration(
        &self,
        agent_id: EntityId,
    ) -> ConfigurationResult<Option<UnifiedConfiguration>> {
        let ctx = OperationContext::new(OperationKind::Get).with_agent(agent_id);
        let outcome = self
            .load(&ctx, agent_id)
            .instrument(ctx.span().clone())
            .await;
        self.finish(
            &ctx,
            outcome
                .as_ref()
                .map(|c| if c.is_some() { "success" } else { "absent" }),
        );
        outcome
    }

    /// Every stored configuration. Agents are assembled concurrently, at
    /// most `list_concurrency` at a time.
    pub async fn list_unified_configurations(
        &self,
    ) -> ConfigurationResult<Vec<UnifiedConfiguration>> {
        let ctx = OperationContext::new(OperationKind::List);
        let outcome = async {
            let started = Instant::now();
            let agents = self
                .services
                .agents
                .list()
                .await
                .map_err(|source| read_error(ctx.correlation_id, source))?;
            let total = agents.len();
            let configurations: Vec<UnifiedConfiguration> = futures_util::stream::iter(agents)
                .map(|agent| self.assemble(&ctx, agent))
                .buffer_unordered(self.config.list_concurrency)
                .try_collect()
                .await?;
            self.metrics
                .observe_phase(ctx.operation, Phase::Read, started.elapsed());
            debug!(agents = total, "Listed unified configurations");
            Ok::<_, ConfigurationError>(configurations)
        }
        .instrument(ctx.span().clone())
        .await;
        self.finish(&ctx, outcome.as_ref().map(|_| "success"));
        outcome
    }

    async fn load(
        &self,
        ctx: &OperationContext,
        agent_id: EntityId,
    ) -> ConfigurationResult<Option<UnifiedConfiguration>> {
        let started = Instant::now();
        let agent = self
            .services
            .agents
            .get(agent_id)
            .await
            .map_err(|source| read_error(ctx.correlation_id, source))?;
        let outcome = match agent {
            Some(agent) => self.assemble(ctx, agent).await.map(Some),
            None => Ok(None),
        };
        self.metrics
            .observe_phase(ctx.operation, Phase::Read, started.elapsed());
        outcome
    }

    /// Resolve an agent's personality, role and model in parallel.
    async fn assemble(
        &self,
        ctx: &OperationContext,
        agent: Agent,
    ) -> ConfigurationResult<UnifiedConfiguration> {
        let (personality, role, model) = futures_util::join!(
            self.services.personalities.get(agent.personality_id),
            self.services.roles.get(agent.role_id),
            self.services.models.get(&agent.model_id),
        );
        let read = |source| read_error(ctx.correlation_id, source);
        let (personality, role, model) = (
            personality.map_err(read)?,
            role.map_err(read)?,
            model.map_err(read)?,
        );

        match (personality, role) {
            (Some(personality), Some(role)) => Ok(UnifiedConfiguration {
                personality,
                role,
                agent,
                model,
            }),
            (personality, role) => {
                let mut missing = Vec::new();
                if personality.is_none() {
                    missing.push(EntityKind::Personality);
                }
                if role.is_none() {
                    missing.push(EntityKind::Role);
                }
                error!(
                    agent_id = %agent.id,
                    missing = ?missing,
                    "Agent references entities that do not exist"
                );
                Err(ConfigurationError::Inconsistent {
                    correlation_id: ctx.correlation_id,
                    agent_id: agent.id,
                    missing,
                })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    pub async fn update_unified_configuration(
        &self,
        agent_id: EntityId,
        patch: &UnifiedConfigurationPatch,
    ) -> ConfigurationResult<UnifiedConfiguration> {
        self.update_unified_configuration_with_cancel(agent_id, patch, CancelSignal::never())
            .await
    }

    /// Update, stopping at the next step boundary once `cancel` fires.
    pub async fn update_unified_configuration_with_cancel(
        &self,
        agent_id: EntityId,
        patch: &UnifiedConfigurationPatch,
        mut cancel: CancelSignal,
    ) -> ConfigurationResult<UnifiedConfiguration> {
        let ctx = OperationContext::new(OperationKind::Update).with_agent(agent_id);
        let outcome = self
            .update_inner(&ctx, agent_id, patch, &mut cancel)
            .instrument(ctx.span().clone())
            .await;
        self.finish(&ctx, outcome.as_ref().map(|_| "success"));
        outcome
    }

    async fn update_inner(
        &self,
        ctx: &OperationContext,
        agent_id: EntityId,
        patch: &UnifiedConfigurationPatch,
        cancel: &mut CancelSignal,
    ) -> ConfigurationResult<UnifiedConfiguration> {
        let not_found = || ConfigurationError::NotFound {
            correlation_id: ctx.correlation_id,
            agent_id,
        };
        let current = self.load(ctx, agent_id).await?.ok_or_else(not_found)?;
        if patch.is_empty() {
            debug!("Empty patch, nothing to update");
            return Ok(current);
        }

        let personality = patch
            .personality
            .as_ref()
            .map(|p| PersonalityDraft::from_personality(&current.personality).apply(p));
        let role = patch
            .role
            .as_ref()
            .map(|p| RoleDraft::from_role(&current.role).apply(p));
        let agent = match &patch.agent {
            Some(p) => AgentDraft::from_agent(&current.agent).apply(p),
            None => AgentDraft::from_agent(&current.agent),
        };

        let triad = Triad {
            personality: match &personality {
                Some(draft) => Candidate::Draft {
                    draft,
                    exclude_id: Some(current.personality.id),
                },
                None => Candidate::Existing(current.personality.id),
            },
            role: match &role {
                Some(draft) => Candidate::Draft {
                    draft,
                    exclude_id: Some(current.role.id),
                },
                None => Candidate::Existing(current.role.id),
            },
            agent: AgentCandidate {
                draft: &agent,
                exclude_id: Some(agent_id),
                validate: patch.agent.is_some(),
            },
            caller: &patch.caller,
        };
        let result = self.run_validation(ctx, &triad, cancel).await?;
        if !result.is_valid {
            return Err(ConfigurationError::Validation {
                correlation_id: ctx.correlation_id,
                result,
            });
        }

        let personality = match personality {
            Some(draft) => {
                let traits = self.schema.resolve_traits(&draft.traits).map_err(|result| {
                    ConfigurationError::Validation {
                        correlation_id: ctx.correlation_id,
                        result: result.with_correlation(ctx.correlation_id),
                    }
                })?;
                Some(PersonalityUpdate::from_draft(&draft, traits))
            }
            None => None,
        };
        // Without a caller-supplied version, lock against the version just read.
        let expected_version = patch
            .role
            .as_ref()
            .and_then(|r| r.expected_version)
            .or(Some(current.role.version));
        let changes = Changes {
            personality,
            role: role.map(|draft| RoleUpdate::from_draft(&draft, expected_version)),
            agent: patch.agent.as_ref().map(|_| AgentUpdate::from_draft(&agent)),
        };

        let started = Instant::now();
        let mut log = CompensationLog::new();
        let mut committed = Vec::new();
        let outcome = self
            .write_changes(ctx, &current, &changes, &mut log, &mut committed, cancel)
            .await;
        self.metrics
            .observe_phase(ctx.operation, Phase::Persistence, started.elapsed());

        match outcome {
            Ok(()) => {
                let updated = self.load(ctx, agent_id).await?.ok_or_else(not_found)?;
                info!(updated = ?committed, "Unified configuration updated");
                Ok(updated)
            }
            Err((failed, failure)) => {
                Err(self
                    .update_failed(ctx, agent_id, patch.atomic, log, committed, failed, failure)
                    .await)
            }
        }
    }

    async fn write_changes(
        &self,
        ctx: &OperationContext,
        current: &UnifiedConfiguration,
        changes: &Changes,
        log: &mut CompensationLog,
        committed: &mut Vec<EntityKind>,
        cancel: &CancelSignal,
    ) -> Result<(), (EntityKind, Failure)> {
        if let Some(update) = &changes.personality {
            let kind = EntityKind::Personality;
            let step = Step::Write(kind);
            self.checkpoint(ctx, step, cancel).map_err(|f| (kind, f))?;
            self.services
                .personalities
                .update(current.personality.id, update)
                .await
                .map_err(|source| (kind, Failure::Service { step, source }))?;
            log.updated_personality(current.personality.clone());
            committed.push(kind);
        }

        if let Some(update) = &changes.role {
            let kind = EntityKind::Role;
            let step = Step::Write(kind);
            self.checkpoint(ctx, step, cancel).map_err(|f| (kind, f))?;
            self.services
                .roles
                .update(current.role.id, update)
                .await
                .map_err(|source| (kind, Failure::Service { step, source }))?;
            log.updated_role(current.role.clone());
            committed.push(kind);
        }

        if let Some(update) = &changes.agent {
            let kind = EntityKind::Agent;
            let step = Step::Write(kind);
            self.checkpoint(ctx, step, cancel).map_err(|f| (kind, f))?;
            self.services
                .agents
                .update(current.agent.id, update)
                .await
                .map_err(|source| (kind, Failure::Service { step, source }))?;
            log.updated_agent(current.agent.clone());
            committed.push(kind);
        }

        Ok(())
    }

    /// Nothing committed: a plain failure. Otherwise a partial update, with
    /// the committed siblings restored when the patch asked for atomicity.
    #[allow(clippy::too_many_arguments)]
    async fn update_failed(
        &self,
        ctx: &OperationContext,
        agent_id: EntityId,
        atomic: bool,
        log: CompensationLog,
        committed: Vec<EntityKind>,
        failed: EntityKind,
        failure: Failure,
    ) -> ConfigurationError {
        if committed.is_empty() {
            return failure.into_error(
                ctx.correlation_id,
                self.config.operation_budget_ms,
                CompensationReport::default(),
            );
        }

        warn!(
            committed = ?committed,
            failed = %failed,
            atomic,
            "Update stopped after a partial commit"
        );
        let compensation = if atomic {
            Some(self.compensate(ctx, log).await)
        } else {
            None
        };
        let error = ConfigurationError::PartialUpdate {
            correlation_id: ctx.correlation_id,
            agent_id,
            committed,
            failed,
            source: failure.into_service_error(),
            compensation: compensation.clone(),
        };
        match &compensation {
            Some(report) => error.escalate(report),
            None => error,
        }
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    /// Delete an agent, then its personality and role when no other agent
    /// uses them and they are not templates. Refused while the agent has
    /// dependents.
    pub async fn delete_unified_configuration(
        &self,
        agent_id: EntityId,
    ) -> ConfigurationResult<DeletionReport> {
        let ctx = OperationContext::new(OperationKind::Delete).with_agent(agent_id);
        let outcome = self
            .delete_inner(&ctx, agent_id)
            .instrument(ctx.span().clone())
            .await;
        self.finish(&ctx, outcome.as_ref().map(|_| "success"));
        outcome
    }

    // Dependents are checked before the delete call, so a dependent registered
    // in between is not seen.
    async fn delete_inner(
        &self,
        ctx: &OperationContext,
        agent_id: EntityId,
    ) -> ConfigurationResult<DeletionReport> {
        let correlation_id = ctx.correlation_id;
        let (agent, dependents) = futures_util::join!(
            self.services.agents.get(agent_id),
            self.services.agents.dependents(agent_id),
        );
        let agent = agent
            .map_err(|source| read_error(correlation_id, source))?
            .ok_or(ConfigurationError::NotFound {
                correlation_id,
                agent_id,
            })?;
        let dependents = dependents.map_err(|source| read_error(correlation_id, source))?;
        if dependents.values().any(|n| *n > 0) {
            return Err(ConfigurationError::Dependency {
                correlation_id,
                agent_id,
                dependents,
            });
        }

        let step = Step::Write(EntityKind::Agent);
        self.services
            .agents
            .delete(agent_id)
            .await
            .map_err(|source| ConfigurationError::Infrastructure {
                correlation_id,
                step,
                source,
                compensation: CompensationReport::default(),
            })?;

        let (personality, role) = match self.services.agents.list().await {
            Ok(others) => futures_util::join!(
                self.dispose_personality(agent.personality_id, &others),
                self.dispose_role(agent.role_id, &others),
            ),
            Err(e) => {
                warn!(error = %e, "Could not list agents; keeping personality and role");
                let kept = Disposition::Failed {
                    reason: e.to_string(),
                };
                (kept.clone(), kept)
            }
        };

        info!(
            personality = ?personality,
            role = ?role,
            "Unified configuration deleted"
        );
        Ok(DeletionReport {
            correlation_id,
            agent_id,
            personality_id: agent.personality_id,
            personality,
            role_id: agent.role_id,
            role,
        })
    }

    async fn dispose_personality(&self, id: EntityId, others: &[Agent]) -> Disposition {
        let sharing = others.iter().filter(|a| a.personality_id == id).count();
        if sharing > 0 {
            return Disposition::Shared { agents: sharing };
        }
        match self.services.personalities.get(id).await {
            Ok(None) => Disposition::Missing,
            Ok(Some(p)) if p.is_template => Disposition::Template,
            Ok(Some(_)) => match self.services.personalities.delete(id).await {
                Ok(()) => Disposition::Deleted,
                Err(e) => disposal_failed(EntityKind::Personality, id, e),
            },
            Err(e) => disposal_failed(EntityKind::Personality, id, e),
        }
    }

    async fn dispose_role(&self, id: EntityId, others: &[Agent]) -> Disposition {
        let sharing = others.iter().filter(|a| a.role_id == id).count();
        if sharing > 0 {
            return Disposition::Shared { agents: sharing };
        }
        match self.services.roles.get(id).await {
            Ok(None) => Disposition::Missing,
            Ok(Some(r)) if r.is_template => Disposition::Template,
            Ok(Some(_)) => match self.services.roles.delete(id).await {
                Ok(()) => Disposition::Deleted,
                Err(e) => disposal_failed(EntityKind::Role, id, e),
            },
            Err(e) => disposal_failed(EntityKind::Role, id, e),
        }
    }

    // ------------------------------------------------------------------------
    // Shared steps
    // ------------------------------------------------------------------------

    /// The validation phase. In enforce mode it is abandoned at the budget;
    /// either way a cancellation abandons it immediately. Nothing is
    /// written during validation, so abandoning needs no compensation.
    async fn run_validation(
        &self,
        ctx: &OperationContext,
        triad: &Triad<'_>,
        cancel: &mut CancelSignal,
    ) -> ConfigurationResult<ValidationResult> {
        let cancelled = || ConfigurationError::Cancelled {
            correlation_id: ctx.correlation_id,
            step: Step::Validation,
            compensation: CompensationReport::default(),
        };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let budget = self.config.validation_budget();
        let started = Instant::now();
        let checks = self.check_triad(triad, ctx.correlation_id);
        let outcome = match self.config.timeout_mode {
            TimeoutMode::Observe => tokio::select! {
                result = checks => Some(result),
                _ = cancel.cancelled() => None,
            },
            TimeoutMode::Enforce => tokio::select! {
                result = tokio::time::timeout(budget, checks) => match result {
                    Ok(result) => Some(result),
                    Err(_) => {
                        self.metrics
                            .observe_phase(ctx.operation, Phase::Validation, started.elapsed());
                        self.metrics
                            .record_budget_exceeded(ctx.operation, Phase::Validation);
                        warn!(
                            budget_ms = self.config.validation_budget_ms,
                            "Validation cut off at its budget"
                        );
                        return Err(ConfigurationError::Timeout {
                            correlation_id: ctx.correlation_id,
                            phase: Phase::Validation,
                            budget_ms: self.config.validation_budget_ms,
                            compensation: CompensationReport::default(),
                        });
                    }
                },
                _ = cancel.cancelled() => None,
            },
        };
        self.observe(ctx, Phase::Validation, started.elapsed(), budget);

        match outcome {
            None => Err(cancelled()),
            Some(Err(source)) => Err(ConfigurationError::Infrastructure {
                correlation_id: ctx.correlation_id,
                step: Step::Validation,
                source,
                compensation: CompensationReport::default(),
            }),
            Some(Ok(result)) => {
                if !result.is_valid {
                    debug!(errors = result.errors.len(), "Validation found errors");
                }
                Ok(result)
            }
        }
    }

    /// Step boundary: stop here if cancelled, or if enforce mode and the
    /// operation budget is spent.
    fn checkpoint(
        &self,
        ctx: &OperationContext,
        step: Step,
        cancel: &CancelSignal,
    ) -> Result<(), Failure> {
        if cancel.is_cancelled() {
            return Err(Failure::Cancelled { step });
        }
        let elapsed = ctx.elapsed();
        if self.config.timeout_mode == TimeoutMode::Enforce
            && elapsed > self.config.operation_budget()
        {
            return Err(Failure::Timeout { elapsed });
        }
        Ok(())
    }

    async fn compensate(&self, ctx: &OperationContext, log: CompensationLog) -> CompensationReport {
        if log.is_empty() {
            return CompensationReport::default();
        }
        let started = Instant::now();
        let report = log.unwind(&self.services).await;
        self.metrics
            .observe_phase(ctx.operation, Phase::Compensation, started.elapsed());
        for action in &report.actions {
            self.metrics.record_compensation(action.succeeded());
        }
        report
    }

    fn observe(&self, ctx: &OperationContext, phase: Phase, elapsed: Duration, budget: Duration) {
        self.metrics.observe_phase(ctx.operation, phase, elapsed);
        if elapsed > budget {
            self.metrics.record_budget_exceeded(ctx.operation, phase);
            warn!(
                phase = %phase,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "Phase exceeded its budget"
            );
        }
    }

    fn finish(&self, ctx: &OperationContext, outcome: Result<&'static str, &ConfigurationError>) {
        let _entered = ctx.span().enter();
        self.observe(
            ctx,
            Phase::Total,
            ctx.elapsed(),
            self.config.operation_budget(),
        );
        match outcome {
            Ok(label) => self.metrics.record_outcome(ctx.operation, label),
            Err(e) => {
                self.metrics.record_outcome(ctx.operation, e.outcome_label());
                match e.severity() {
                    Severity::Warning => debug!(error = %e, "Operation rejected"),
                    Severity::Error => warn!(error = %e, retryable = e.is_retryable(), "Operation failed"),
                    Severity::Critical => error!(error = %e, "Operation failed and left data behind"),
                }
            }
        }
    }
}

fn missing(entity: EntityKind, id: EntityId) -> ServiceError {
    ServiceError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn disposal_failed(entity: EntityKind, id: EntityId, e: ServiceError) -> Disposition {
    warn!(entity = %entity, entity_id = %id, error = %e, "Could not delete orphaned entity");
    Disposition::Failed {
        reason: e.to_string(),
    }
}

// ============================================================================
// DELETION REPORT
// ============================================================================

/// What happened to a deleted agent's personality or role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Deleted,
    /// Kept because other agents still reference it.
    Shared { agents: usize },
    /// Kept because it is a template.
    Template,
    /// Already gone.
    Missing,
    /// Kept because the lookup or delete failed.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletionReport {
    pub correlation_id: CorrelationId,
    pub agent_id: EntityId,
    pub personality_id: EntityId,
    pub personality: Disposition,
    pub role_id: EntityId,
    pub role: Disposition,
}
