//! Default [`ValidationService`] backed by the domain services.

use crate::{BusinessRules, EntityPayload, SecurityPolicy, UniqueField, ValidationService};
use ::async_trait::async_trait;
use concord_core::{
    CallerContext, EntityId, EntityKind, EntitySchema, ErrorCode, ServiceError, ServiceName,
    ServiceResult, ValidationError, ValidationResult,
};
use concord_services::DomainServices;
use tracing::trace;
use uuid::Uuid;

/// Rule engine that composes structural checks with each domain service's
/// own validator. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    services: DomainServices,
    policy: SecurityPolicy,
}

impl RuleEngine {
    pub fn new(services: DomainServices) -> Self {
        Self {
            services,
            policy: SecurityPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SecurityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn services(&self) -> &DomainServices {
        &self.services
    }

    fn reference_not_found(kind: EntityKind, id: &str) -> ValidationResult {
        ValidationResult::from_errors(vec![ValidationError::new(
            format!("{}.id", kind),
            ErrorCode::ReferenceNotFound,
            format!("{} {} does not exist", kind, id),
        )
        .with_service(kind.owner())])
    }
}

#[async_trait]
impl ValidationService for RuleEngine {
    async fn validate_entity(
        &self,
        entity: EntityPayload<'_>,
        schema: &EntitySchema,
    ) -> ServiceResult<ValidationResult> {
        let (structural, domain) = match entity {
            EntityPayload::Personality(p) => (
                schema.check_personality(p),
                self.services.personalities.validate(p).await?,
            ),
            EntityPayload::Role(r) => (schema.check_role(r), self.services.roles.validate(r).await?),
            EntityPayload::Agent(a) => {
                (schema.check_agent(a), self.services.agents.validate(a).await?)
            }
        };
        let mut result = structural.attributed_to(entity.kind().owner());
        result.merge(domain.attributed_to(entity.kind().owner()));
        trace!(kind = %entity.kind(), errors = result.errors.len(), "entity validated");
        Ok(result)
    }

    async fn validate_business_rules(
        &self,
        entity: EntityPayload<'_>,
        rules: &BusinessRules,
    ) -> ServiceResult<ValidationResult> {
        Ok(rules.check(entity))
    }

    async fn validate_security_constraints(
        &self,
        entity: EntityPayload<'_>,
        context: &CallerContext,
    ) -> ServiceResult<ValidationResult> {
        let mut result = ValidationResult::valid();
        match entity {
            EntityPayload::Personality(p) => {
                self.policy
                    .check_template(&mut result, "personality.isTemplate", p.is_template, context);
                self.policy.check_instructions(
                    &mut result,
                    "personality.customInstructions",
                    p.custom_instructions.as_deref(),
                );
            }
            EntityPayload::Role(r) => {
                self.policy
                    .check_template(&mut result, "role.isTemplate", r.is_template, context);
            }
            EntityPayload::Agent(a) => {
                let model = if a.model_id.trim().is_empty() {
                    None
                } else {
                    self.services.models.get(&a.model_id).await?
                };
                self.policy.check_agent(&mut result, model.as_ref(), context);
            }
        }
        Ok(result.attributed_to(entity.kind().owner()))
    }

    async fn validate_uniqueness(
        &self,
        entity_type: EntityKind,
        field: UniqueField,
        value: &str,
        exclude_id: Option<EntityId>,
    ) -> ServiceResult<ValidationResult> {
        let unsupported = || ServiceError::Rejected {
            service: ServiceName::ValidationService,
            reason: format!("uniqueness of {:?} is not tracked for {}", field, entity_type),
        };

        match field {
            UniqueField::Name => {
                if value.trim().is_empty() {
                    return Ok(ValidationResult::valid());
                }
                let existing = match entity_type {
                    EntityKind::Personality => self
                        .services
                        .personalities
                        .find_by_name(value)
                        .await?
                        .map(|p| p.id),
                    EntityKind::Role => {
                        self.services.roles.find_by_name(value).await?.map(|r| r.id)
                    }
                    EntityKind::Agent => {
                        self.services.agents.find_by_name(value).await?.map(|a| a.id)
                    }
                    EntityKind::Model => return Err(unsupported()),
                };
                match existing {
                    Some(id) if Some(id) != exclude_id => {
                        Ok(ValidationResult::from_errors(vec![ValidationError::new(
                            format!("{}.name", entity_type),
                            ErrorCode::NameNotUnique,
                            format!("A {} named '{}' already exists", entity_type, value.trim()),
                        )
                        .with_service(entity_type.owner())]))
                    }
                    _ => Ok(ValidationResult::valid()),
                }
            }
            UniqueField::Id => {
                let Ok(id) = Uuid::parse_str(value) else {
                    return Ok(ValidationResult::valid());
                };
                if Some(id) == exclude_id {
                    return Ok(ValidationResult::valid());
                }
                let taken = match entity_type {
                    EntityKind::Personality => {
                        self.services.personalities.get(id).await?.is_some()
                    }
                    EntityKind::Role => self.services.roles.get(id).await?.is_some(),
                    EntityKind::Agent => self.services.agents.get(id).await?.is_some(),
                    EntityKind::Model => return Err(unsupported()),
                };
                if !taken {
                    return Ok(ValidationResult::valid());
                }
                // One unified configuration per agent id; other ids just clash.
                let error = if entity_type == EntityKind::Agent {
                    ValidationError::new(
                        "agent.id",
                        ErrorCode::ConfigurationAlreadyExists,
                        format!("A unified configuration already exists for agent {}", id),
                    )
                } else {
                    ValidationError::new(
                        format!("{}.id", entity_type),
                        ErrorCode::IdNotUnique,
                        format!("A {} with id {} already exists", entity_type, id),
                    )
                };
                Ok(ValidationResult::from_errors(vec![
                    error.with_service(entity_type.owner())
                ]))
            }
        }
    }

    async fn validate_dependencies(
        &self,
        entity_id: &str,
        entity_type: EntityKind,
    ) -> ServiceResult<ValidationResult> {
        if entity_type == EntityKind::Model {
            let field = "agent.modelId";
            let exists = self.services.models.get(entity_id).await?.is_some();
            let result = if !exists {
                ValidationResult::from_errors(vec![ValidationError::new(
                    field,
                    ErrorCode::ModelNotFound,
                    format!("Model '{}' is not in the catalog", entity_id),
                )])
            } else if !self.services.models.is_available(entity_id).await? {
                ValidationResult::from_errors(vec![ValidationError::new(
                    field,
                    ErrorCode::ModelUnavailable,
                    format!("Model '{}' is not currently available", entity_id),
                )])
            } else {
                ValidationResult::valid()
            };
            return Ok(result.attributed_to(ServiceName::ModelService));
        }

        let Ok(id) = Uuid::parse_str(entity_id) else {
            return Ok(Self::reference_not_found(entity_type, entity_id));
        };
        match entity_type {
            EntityKind::Personality => Ok(match self.services.personalities.get(id).await? {
                Some(_) => ValidationResult::valid(),
                None => Self::reference_not_found(entity_type, entity_id),
            }),
            EntityKind::Role => Ok(match self.services.roles.get(id).await? {
                Some(_) => ValidationResult::valid(),
                None => Self::reference_not_found(entity_type, entity_id),
            }),
            EntityKind::Agent => {
                let Some(agent) = self.services.agents.get(id).await? else {
                    return Ok(Self::reference_not_found(entity_type, entity_id));
                };
                let personality_id = agent.personality_id.to_string();
                let role_id = agent.role_id.to_string();
                let (personality, role, model) = futures_util::join!(
                    self.validate_dependencies(&personality_id, EntityKind::Personality),
                    self.validate_dependencies(&role_id, EntityKind::Role),
                    self.validate_dependencies(&agent.model_id, EntityKind::Model),
                );
                Ok(ValidationResult::merged([personality?, role?, model?]))
            }
            EntityKind::Model => Ok(ValidationResult::valid()),
        }
    }
}
