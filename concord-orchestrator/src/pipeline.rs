//! The validation pipeline shared by create, update and pre-flight validate.
//!
//! Each sub-entity is assessed by the five validation operations in
//! parallel. Referential integrity and cross-domain compatibility run once
//! the three assessments are in, so a failure in one domain can block only
//! the compatibility stages that depend on it.

use crate::service::ConfigurationService;
use concord_core::{
    AgentDraft, AgentFacts, CallerContext, CompatibilitySubject, CorrelationId, EntityId,
    EntityInput, EntityKind, ErrorClass, ErrorCode, ModelConfiguration, PersonalityDraft,
    PersonalityTraits, RoleDraft, RoleFacts, RoleRef, ServiceName, ServiceResult,
    UnifiedConfigurationRequest, ValidationError, ValidationResult,
};
use concord_validation::{EntityPayload, UniqueField};
use std::collections::BTreeSet;
use tracing::debug;

// ============================================================================
// CANDIDATES
// ============================================================================

/// A personality or role as it appears in an operation.
#[derive(Debug)]
pub(crate) enum Candidate<'a, T> {
    /// Values about to be written. `exclude_id` is the entity being edited.
    Draft {
        draft: &'a T,
        exclude_id: Option<EntityId>,
    },
    /// An entity that must already exist.
    Existing(EntityId),
}

impl<T> Clone for Candidate<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Candidate<'_, T> {}

impl<'a, T> Candidate<'a, T> {
    fn from_input(input: &'a EntityInput<T>) -> Self {
        match input {
            EntityInput::New(draft) => Candidate::Draft {
                draft,
                exclude_id: None,
            },
            EntityInput::Existing { id } => Candidate::Existing(*id),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AgentCandidate<'a> {
    pub draft: &'a AgentDraft,
    /// Set on update; the agent's own id and name are not conflicts.
    pub exclude_id: Option<EntityId>,
    /// False when the agent is untouched and only contributes facts.
    pub validate: bool,
}

/// The three sub-entities of one operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Triad<'a> {
    pub personality: Candidate<'a, PersonalityDraft>,
    pub role: Candidate<'a, RoleDraft>,
    pub agent: AgentCandidate<'a>,
    pub caller: &'a CallerContext,
}

impl<'a> Triad<'a> {
    pub(crate) fn from_request(request: &'a UnifiedConfigurationRequest) -> Self {
        Self {
            personality: Candidate::from_input(&request.personality),
            role: Candidate::from_input(&request.role),
            agent: AgentCandidate {
                draft: &request.agent,
                exclude_id: None,
                validate: true,
            },
            caller: &request.caller,
        }
    }
}

/// Outcome of one domain's checks.
struct Assessment<F> {
    result: ValidationResult,
    /// Structurally broken or missing. Blocks dependent compatibility stages.
    failed: bool,
    facts: Option<F>,
}

// ============================================================================
// PIPELINE
// ============================================================================

impl ConfigurationService {
    /// Run every check for `triad` and return the complete finding set.
    /// Nothing short-circuits: a caller sees every problem at once.
    pub(crate) async fn check_triad(
        &self,
        triad: &Triad<'_>,
        correlation_id: CorrelationId,
    ) -> ServiceResult<ValidationResult> {
        let (personality, role, agent) = futures_util::join!(
            self.assess_personality(&triad.personality, triad.caller),
            self.assess_role(&triad.role, triad.caller),
            self.assess_agent(&triad.agent, triad.caller),
        );
        let personality = personality?;
        let role = role?;
        let (agent, model) = agent?;

        let references = check_references(triad, role.facts.as_ref());

        let mut failed = BTreeSet::new();
        if personality.failed {
            failed.insert(EntityKind::Personality);
        }
        if role.failed {
            failed.insert(EntityKind::Role);
        }
        if agent.failed {
            failed.insert(EntityKind::Agent);
        }
        if !failed.is_empty() {
            debug!(failed = ?failed, "compatibility stages blocked by upstream failures");
        }

        let subject = CompatibilitySubject {
            traits: personality.facts,
            role: role.facts,
            agent: agent.facts,
            model,
        };
        let compatibility = self
            .checker
            .check_with_upstream(&subject, &failed, Some(correlation_id));

        Ok(ValidationResult::merged([
            personality.result,
            role.result,
            agent.result,
            references,
            compatibility,
        ])
        .with_correlation(correlation_id))
    }

    /// A caller-chosen id on create must not belong to a stored entity.
    /// Edits keep their own id, so there is nothing to check.
    async fn check_claimed_id(
        &self,
        kind: EntityKind,
        id: Option<EntityId>,
        exclude_id: Option<EntityId>,
    ) -> ServiceResult<ValidationResult> {
        match (exclude_id, id) {
            (None, Some(id)) => {
                self.validator
                    .validate_uniqueness(kind, UniqueField::Id, &id.to_string(), None)
                    .await
            }
            _ => Ok(ValidationResult::valid()),
        }
    }

    async fn assess_personality(
        &self,
        candidate: &Candidate<'_, PersonalityDraft>,
        caller: &CallerContext,
    ) -> ServiceResult<Assessment<PersonalityTraits>> {
        match *candidate {
            Candidate::Draft { draft, exclude_id } => {
                let entity = EntityPayload::Personality(draft);
                let (structure, business, security, unique, id) = futures_util::join!(
                    self.validator.validate_entity(entity, &self.schema),
                    self.validator.validate_business_rules(entity, &self.business),
                    self.validator.validate_security_constraints(entity, caller),
                    self.validator.validate_uniqueness(
                        EntityKind::Personality,
                        UniqueField::Name,
                        &draft.name,
                        exclude_id,
                    ),
                    self.check_claimed_id(EntityKind::Personality, draft.id, exclude_id),
                );
                let structure = structure?;
                let failed = structure.has_class(ErrorClass::Structural);
                let facts = if failed {
                    None
                } else {
                    self.schema.resolve_traits(&draft.traits).ok()
                };
                Ok(Assessment {
                    result: ValidationResult::merged([
                        structure, business?, security?, unique?, id?,
                    ]),
                    failed,
                    facts,
                })
            }
            Candidate::Existing(id) => {
                let result = self
                    .validator
                    .validate_dependencies(&id.to_string(), EntityKind::Personality)
                    .await?;
                let facts = if result.is_valid {
                    self.services.personalities.get(id).await?.map(|p| p.traits)
                } else {
                    None
                };
                Ok(Assessment {
                    failed: facts.is_none(),
                    result,
                    facts,
                })
            }
        }
    }

    async fn assess_role(
        &self,
        candidate: &Candidate<'_, RoleDraft>,
        caller: &CallerContext,
    ) -> ServiceResult<Assessment<RoleFacts>> {
        match *candidate {
            Candidate::Draft { draft, exclude_id } => {
                let entity = EntityPayload::Role(draft);
                let (structure, business, security, unique, id) = futures_util::join!(
                    self.validator.validate_entity(entity, &self.schema),
                    self.validator.validate_business_rules(entity, &self.business),
                    self.validator.validate_security_constraints(entity, caller),
                    self.validator.validate_uniqueness(
                        EntityKind::Role,
                        UniqueField::Name,
                        &draft.name,
                        exclude_id,
                    ),
                    self.check_claimed_id(EntityKind::Role, draft.id, exclude_id),
                );
                let structure = structure?;
                let failed = structure.has_class(ErrorClass::Structural);
                Ok(Assessment {
                    result: ValidationResult::merged([
                        structure, business?, security?, unique?, id?,
                    ]),
                    failed,
                    facts: (!failed).then(|| RoleFacts::from(draft)),
                })
            }
            Candidate::Existing(id) => {
                let result = self
                    .validator
                    .validate_dependencies(&id.to_string(), EntityKind::Role)
                    .await?;
                let facts = if result.is_valid {
                    self.services
                        .roles
                        .get(id)
                        .await?
                        .map(|r| RoleFacts::from(&r))
                } else {
                    None
                };
                Ok(Assessment {
                    failed: facts.is_none(),
                    result,
                    facts,
                })
            }
        }
    }

    /// The agent assessment also fetches the model its draft names, since
    /// both the dependency check and the compatibility facts need it.
    async fn assess_agent(
        &self,
        candidate: &AgentCandidate<'_>,
        caller: &CallerContext,
    ) -> ServiceResult<(Assessment<AgentFacts>, Option<ModelConfiguration>)> {
        let draft = candidate.draft;
        let model_id = draft.model_id.trim();
        let model = async {
            if model_id.is_empty() {
                Ok(None)
            } else {
                self.services.models.get(model_id).await
            }
        };

        if !candidate.validate {
            let assessment = Assessment {
                result: ValidationResult::valid(),
                failed: false,
                facts: Some(AgentFacts::from(draft)),
            };
            return Ok((assessment, model.await?));
        }

        let entity = EntityPayload::Agent(draft);
        let id_check = self.check_claimed_id(EntityKind::Agent, draft.id, candidate.exclude_id);
        let model_check = async {
            if model_id.is_empty() {
                Ok(ValidationResult::valid())
            } else {
                self.validator
                    .validate_dependencies(model_id, EntityKind::Model)
                    .await
            }
        };

        let (structure, business, security, name, id, dependency, model) = futures_util::join!(
            self.validator.validate_entity(entity, &self.schema),
            self.validator.validate_business_rules(entity, &self.business),
            self.validator.validate_security_constraints(entity, caller),
            self.validator.validate_uniqueness(
                EntityKind::Agent,
                UniqueField::Name,
                &draft.name,
                candidate.exclude_id,
            ),
            id_check,
            model_check,
            model,
        );
        let structure = structure?;
        let failed = structure.has_class(ErrorClass::Structural);
        let assessment = Assessment {
            result: ValidationResult::merged([
                structure,
                business?,
                security?,
                name?,
                id?,
                dependency?,
            ]),
            failed,
            facts: (!failed).then(|| AgentFacts::from(draft)),
        };
        Ok((assessment, model?))
    }
}

// ============================================================================
// REFERENTIAL INTEGRITY
// ============================================================================

/// The agent's explicit personality and role references must point at the
/// entities of the same operation.
fn check_references(triad: &Triad<'_>, role: Option<&RoleFacts>) -> ValidationResult {
    let agent = triad.agent.draft;
    let mut result = ValidationResult::valid();

    let expected_personality = match triad.personality {
        Candidate::Draft { draft, .. } => draft.id,
        Candidate::Existing(id) => Some(id),
    };
    if let Some(given) = agent.personality_id {
        if Some(given) != expected_personality {
            result.push(ValidationError::new(
                "agent.personalityId",
                ErrorCode::ReferenceMismatch,
                format!(
                    "Agent references personality {} which is not the personality of this configuration",
                    given
                ),
            ));
        }
    }

    let (expected_role, role_name) = match triad.role {
        Candidate::Draft { draft, .. } => (draft.id, Some(draft.name.as_str())),
        Candidate::Existing(id) => (Some(id), role.map(|r| r.name.as_str())),
    };
    let mismatch = match &agent.role {
        Some(RoleRef::Id(id)) => Some(*id) != expected_role,
        Some(RoleRef::Name(name)) => {
            role_name.is_some_and(|actual| !name.trim().eq_ignore_ascii_case(actual.trim()))
        }
        None => false,
    };
    if let (true, Some(reference)) = (mismatch, &agent.role) {
        result.push(ValidationError::new(
            "agent.role",
            ErrorCode::ReferenceMismatch,
            format!(
                "Agent references role by {} which is not the role of this configuration",
                reference
            ),
        ));
    }

    result.attributed_to(ServiceName::ConfigurationService)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::new_entity_id;

    fn triad<'a>(
        personality: &'a PersonalityDraft,
        role: &'a RoleDraft,
        agent: &'a AgentDraft,
        caller: &'a CallerContext,
    ) -> Triad<'a> {
        Triad {
            personality: Candidate::Draft {
                draft: personality,
                exclude_id: None,
            },
            role: Candidate::Draft {
                draft: role,
                exclude_id: None,
            },
            agent: AgentCandidate {
                draft: agent,
                exclude_id: None,
                validate: true,
            },
            caller,
        }
    }

    #[test]
    fn test_unset_references_are_implicit() {
        let caller = CallerContext::system();
        let p = PersonalityDraft::new("P");
        let r = RoleDraft::new("Writer");
        let a = AgentDraft::new("A", "m");
        let result = check_references(&triad(&p, &r, &a, &caller), None);
        assert!(result.is_valid);
    }

    #[test]
    fn test_foreign_personality_id_mismatches() {
        let caller = CallerContext::system();
        let p = PersonalityDraft::new("P").with_id(new_entity_id());
        let r = RoleDraft::new("Writer");
        let a = AgentDraft::new("A", "m").with_personality(new_entity_id());
        let result = check_references(&triad(&p, &r, &a, &caller), None);
        assert_eq!(result.count_code(ErrorCode::ReferenceMismatch), 1);
        assert_eq!(result.errors[0].field, "agent.personalityId");
        assert_eq!(
            result.errors[0].originating_service,
            Some(ServiceName::ConfigurationService)
        );
    }

    #[test]
    fn test_role_name_reference_is_case_insensitive() {
        let caller = CallerContext::system();
        let p = PersonalityDraft::new("P");
        let r = RoleDraft::new("Writer");
        let same = AgentDraft::new("A", "m").with_role(RoleRef::Name(" writer ".into()));
        assert!(check_references(&triad(&p, &r, &same, &caller), None).is_valid);

        let other = AgentDraft::new("A", "m").with_role(RoleRef::Name("Editor".into()));
        let result = check_references(&triad(&p, &r, &other, &caller), None);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "agent.role");
    }

    #[test]
    fn test_existing_role_checked_by_id() {
        let caller = CallerContext::system();
        let role_id = new_entity_id();
        let p = PersonalityDraft::new("P");
        let r = RoleDraft::new("unused");
        let a = AgentDraft::new("A", "m").with_role(RoleRef::Id(role_id));
        let mut t = triad(&p, &r, &a, &caller);
        t.role = Candidate::Existing(role_id);
        assert!(check_references(&t, None).is_valid);

        t.role = Candidate::Existing(new_entity_id());
        assert!(check_references(&t, None).has_code(ErrorCode::ReferenceMismatch));
    }
}
