//! Cross-domain compatibility checking.
//!
//! Every applicable rule is evaluated; the checker never stops at the first
//! failure. Stages whose inputs failed structural validation upstream are
//! reported as blocked instead of evaluated.

use concord_core::{
    CompatibilityRule, CompatibilitySubject, CorrelationId, EntityKind, ErrorCode, RuleCategory,
    RuleOutcome, RuleSet, ServiceName, ValidationError, ValidationResult,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Field reported for the built-in capability subset check.
const CAPABILITY_FIELD: &str = "capability-role-compatibility";

/// Group of rules that depend on the same upstream domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompatibilityStage {
    PersonalityRole,
    PersonalityModel,
    RoleModel,
    CapabilityRole,
}

impl CompatibilityStage {
    pub const ALL: [CompatibilityStage; 4] = [
        CompatibilityStage::PersonalityRole,
        CompatibilityStage::PersonalityModel,
        CompatibilityStage::RoleModel,
        CompatibilityStage::CapabilityRole,
    ];

    pub fn of(category: RuleCategory) -> Self {
        match category {
            RuleCategory::PersonalityRole => CompatibilityStage::PersonalityRole,
            RuleCategory::PersonalityModel => CompatibilityStage::PersonalityModel,
            RuleCategory::ModelParameter | RuleCategory::ModelConfig => {
                CompatibilityStage::RoleModel
            }
            RuleCategory::CapabilityRole => CompatibilityStage::CapabilityRole,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            CompatibilityStage::PersonalityRole => "personality-role-compatibility",
            CompatibilityStage::PersonalityModel => "personality-model-compatibility",
            CompatibilityStage::RoleModel => "role-model-compatibility",
            CompatibilityStage::CapabilityRole => CAPABILITY_FIELD,
        }
    }

    /// Upstream domain whose failure blocks this stage, if any failed.
    pub fn blocked_by(&self, failed: &BTreeSet<EntityKind>) -> Option<EntityKind> {
        let upstream: &[EntityKind] = match self {
            CompatibilityStage::PersonalityRole | CompatibilityStage::PersonalityModel => {
                &[EntityKind::Personality]
            }
            CompatibilityStage::RoleModel | CompatibilityStage::CapabilityRole => {
                &[EntityKind::Role, EntityKind::Agent]
            }
        };
        upstream.iter().copied().find(|k| failed.contains(k))
    }
}

/// Evaluates a shared, read-only rule table plus each role's declared
/// requirements.
#[derive(Debug, Clone)]
pub struct CompatibilityChecker {
    rules: Arc<RuleSet>,
}

impl CompatibilityChecker {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        debug!(
            rules = rules.len(),
            fingerprint = %rules.fingerprint(),
            "compatibility rules loaded"
        );
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Check with no upstream failures.
    pub fn check(&self, subject: &CompatibilitySubject) -> ValidationResult {
        self.check_with_upstream(subject, &BTreeSet::new(), None)
    }

    /// Check every stage not blocked by a failed upstream domain. Blocked
    /// stages each yield one `UPSTREAM_VALIDATION_FAILED` error.
    pub fn check_with_upstream(
        &self,
        subject: &CompatibilitySubject,
        failed: &BTreeSet<EntityKind>,
        correlation_id: Option<CorrelationId>,
    ) -> ValidationResult {
        let mut result = ValidationResult::valid();
        let mut blocked = BTreeSet::new();

        for stage in CompatibilityStage::ALL {
            if let Some(upstream) = stage.blocked_by(failed) {
                blocked.insert(stage);
                let correlation = correlation_id.unwrap_or_default();
                result.push(ValidationError::upstream_blocked(
                    stage.field(),
                    upstream,
                    correlation,
                ));
            }
        }

        let role_rules = subject
            .role
            .as_ref()
            .map(|r| r.requirements.to_rules(&r.name))
            .unwrap_or_default();

        let table = self
            .rules
            .iter()
            .filter(|r| r.applies_to.applies(subject));
        for rule in table.chain(role_rules.iter()) {
            if blocked.contains(&CompatibilityStage::of(rule.category)) {
                continue;
            }
            if let Some(error) = Self::evaluate(rule, subject) {
                result.push(error);
            }
        }

        if !blocked.contains(&CompatibilityStage::CapabilityRole) {
            self.check_capabilities(&mut result, subject);
        }

        match correlation_id {
            Some(id) => result.with_correlation(id),
            None => result,
        }
    }

    fn evaluate(rule: &CompatibilityRule, subject: &CompatibilitySubject) -> Option<ValidationError> {
        match rule.evaluate(subject) {
            RuleOutcome::Fail { found } => Some(
                ValidationError::new(
                    rule.category.field(),
                    rule.category.code(),
                    rule.failure_message(&found),
                )
                .with_service(ServiceName::CompatibilityChecker),
            ),
            RuleOutcome::Pass | RuleOutcome::Skipped => None,
        }
    }

    /// Every agent capability must be granted by the role.
    fn check_capabilities(&self, result: &mut ValidationResult, subject: &CompatibilitySubject) {
        let (Some(role), Some(agent)) = (&subject.role, &subject.agent) else {
            return;
        };
        for cap in agent.capabilities.difference(&role.capabilities) {
            result.push(
                ValidationError::new(
                    CAPABILITY_FIELD,
                    ErrorCode::CapabilityRoleMismatch,
                    format!(
                        "Agent capability '{}' is not granted by role '{}'",
                        cap, role.name
                    ),
                )
                .with_service(ServiceName::CompatibilityChecker),
            );
        }
    }
}

impl Default for CompatibilityChecker {
    fn default() -> Self {
        Self::new(Arc::new(RuleSet::standard()))
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use concord_core::{PersonalityTrait, PersonalityTraits, RoleFacts, RoleRequirements};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// One error per violated minimum, never fewer.
        #[test]
        fn prop_no_short_circuit(
            mins in prop::collection::btree_map(
                (0usize..19).prop_map(|i| PersonalityTrait::all().nth(i).unwrap()),
                0u8..=100,
                0..8,
            ),
            value in 0u8..=100,
        ) {
            let mut traits = PersonalityTraits::neutral();
            for t in PersonalityTrait::all() {
                traits.set(t, value);
            }
            let mut requirements = RoleRequirements::default();
            for (t, v) in &mins {
                requirements = requirements.with_min_trait(*t, *v);
            }
            let subject = CompatibilitySubject {
                traits: Some(traits),
                role: Some(RoleFacts {
                    name: "R".into(),
                    requirements,
                    ..Default::default()
                }),
                ..Default::default()
            };
            let expected = mins.values().filter(|v| value < **v).count();
            let result = CompatibilityChecker::new(Arc::new(RuleSet::default())).check(&subject);
            prop_assert_eq!(result.errors.len(), expected);
        }
    }
}
