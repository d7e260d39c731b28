//! Concord Test Utilities
//!
//! Shared test infrastructure for the Concord workspace:
//! - Proptest generators for trait values and drafts
//! - Fixtures for the common configuration scenarios
//! - Service doubles with injectable failures and latency
//! - Assertions over validation results

pub mod doubles;

pub use doubles::{DoubleOptions, DoubledServices, Operation, ServiceDouble};

pub use concord_core::{
    AgentDraft, CallerContext, EntityId, EntityInput, ErrorCode, GenerationParameter,
    ModelConfiguration, ModelTier, NumericRange, Permission, PersonalityDraft, PersonalityTrait,
    PersonalityTraits, RoleDraft, RoleRequirements, UnifiedConfigurationRequest, ValidationResult,
};
pub use concord_services::InMemoryServices;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Concord inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;
    use uuid::Uuid;

    /// Generate a random entity id.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_trait() -> impl Strategy<Value = PersonalityTrait> {
        prop::sample::select(PersonalityTrait::all().collect::<Vec<_>>())
    }

    pub fn arb_big_five_trait() -> impl Strategy<Value = PersonalityTrait> {
        prop::sample::select(PersonalityTrait::BIG_FIVE.to_vec())
    }

    /// Generate an in-range integer trait value.
    pub fn arb_trait_value() -> impl Strategy<Value = u8> {
        0u8..=100
    }

    /// Integral values outside [0, 100].
    pub fn arb_out_of_range_value() -> impl Strategy<Value = f64> {
        prop_oneof![
            (-10_000i64..0).prop_map(|v| v as f64),
            (101i64..10_000).prop_map(|v| v as f64),
        ]
    }

    /// In-range values with exactly one decimal place, e.g. `42.5`.
    pub fn arb_fractional_value() -> impl Strategy<Value = f64> {
        (0u32..100, 1u32..10).prop_map(|(whole, tenth)| (whole * 10 + tenth) as f64 / 10.0)
    }

    /// In-range values with exactly three decimal places, e.g. `42.125`.
    pub fn arb_over_precise_value() -> impl Strategy<Value = f64> {
        (0u32..100, 1u32..1000)
            .prop_filter("needs a third decimal", |(_, milli)| milli % 10 != 0)
            .prop_map(|(whole, milli)| (whole * 1000 + milli) as f64 / 1000.0)
    }

    /// JSON values that are not numbers.
    pub fn arb_non_numeric_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            "[a-z]{0,8}".prop_map(Value::String),
            Just(Value::Array(vec![])),
        ]
    }

    /// Fully specified, valid traits.
    pub fn arb_traits() -> impl Strategy<Value = PersonalityTraits> {
        prop::collection::vec(arb_trait_value(), 19).prop_map(|values| {
            let mut traits = PersonalityTraits::neutral();
            for (t, v) in PersonalityTrait::all().zip(values) {
                traits.set(t, v);
            }
            traits
        })
    }

    /// Complete personality draft with a unique-ish name.
    pub fn arb_personality_draft() -> impl Strategy<Value = PersonalityDraft> {
        ("[A-Z][a-z]{2,12}", arb_traits())
            .prop_map(|(name, traits)| PersonalityDraft::new(name).with_traits(&traits))
    }

    /// Personality draft missing at least one Big Five trait; returns the
    /// omitted traits alongside.
    pub fn arb_incomplete_personality_draft(
    ) -> impl Strategy<Value = (PersonalityDraft, Vec<PersonalityTrait>)> {
        (
            arb_personality_draft(),
            prop::sample::subsequence(PersonalityTrait::BIG_FIVE.to_vec(), 1..=5),
        )
            .prop_map(|(mut draft, missing)| {
                for t in &missing {
                    draft = draft.without_trait(*t);
                }
                (draft, missing)
            })
    }

    pub fn arb_capability() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{1,15}"
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built drafts and catalogs for common scenarios.
    //!
    //! Every builder takes a `tag` that is folded into entity names, so
    //! several configurations can coexist in one set of services.

    use super::*;

    /// Standard-tier model, temperature 0.0..=1.5, 8192 token ceiling.
    pub const SONNET: &str = "claude-sonnet";
    /// Premium-tier model.
    pub const OPUS: &str = "claude-opus";
    /// Listed in the catalog but unavailable.
    pub const LEGACY: &str = "claude-legacy";

    pub fn model_catalog() -> Vec<ModelConfiguration> {
        vec![
            ModelConfiguration {
                id: SONNET.into(),
                provider: "anthropic".into(),
                version: "4.5".into(),
                available: true,
                tier: ModelTier::Standard,
                max_tokens: 8192,
                temperature_range: NumericRange::new(0.0, 1.5),
            },
            ModelConfiguration {
                id: OPUS.into(),
                provider: "anthropic".into(),
                version: "4.1".into(),
                available: true,
                tier: ModelTier::Premium,
                max_tokens: 32_000,
                temperature_range: NumericRange::new(0.0, 1.0),
            },
            ModelConfiguration {
                id: LEGACY.into(),
                provider: "anthropic".into(),
                version: "2.1".into(),
                available: false,
                tier: ModelTier::Free,
                max_tokens: 4096,
                temperature_range: NumericRange::new(0.0, 1.0),
            },
        ]
    }

    /// In-memory services seeded with [`model_catalog`].
    pub fn services() -> InMemoryServices {
        InMemoryServices::new(model_catalog())
    }

    /// Caller holding every permission.
    pub fn full_access() -> CallerContext {
        CallerContext::user("tester", &Permission::ALL)
    }

    /// All traits neutral.
    pub fn neutral_personality(tag: &str) -> PersonalityDraft {
        PersonalityDraft::new(format!("Neutral {}", tag)).with_traits(&PersonalityTraits::neutral())
    }

    pub fn creative_personality(tag: &str) -> PersonalityDraft {
        use PersonalityTrait::*;
        let traits = PersonalityTraits::neutral()
            .with(Openness, 90)
            .with(Extraversion, 70)
            .with(Imagination, 92)
            .with(Storytelling, 80)
            .with(Playfulness, 75)
            .with(Curiosity, 85);
        PersonalityDraft::new(format!("Muse {}", tag))
            .with_description("Inventive and playful collaborator")
            .with_traits(&traits)
    }

    /// Temperature range [0.7, 1.2], imagination at least 70.
    pub fn creative_role(tag: &str) -> RoleDraft {
        RoleDraft::new(format!("Storyteller {}", tag))
            .with_description("Drafts fiction and brainstorms ideas")
            .with_capabilities(["brainstorm", "write"])
            .with_requirements(
                RoleRequirements::default()
                    .with_min_trait(PersonalityTrait::Imagination, 70)
                    .with_parameter_range(
                        GenerationParameter::Temperature,
                        NumericRange::new(0.7, 1.2),
                    )
                    .with_allowed_tiers(vec![ModelTier::Standard, ModelTier::Premium]),
            )
    }

    /// Temperature 0.9 on [`SONNET`].
    pub fn creative_agent(tag: &str) -> AgentDraft {
        AgentDraft::new(format!("Bard {}", tag), SONNET)
            .with_capabilities(["write"])
            .with_temperature(0.9)
            .with_tags(["creative"])
    }

    /// A valid personality/role/agent triad, all new.
    pub fn creative_request(tag: &str) -> UnifiedConfigurationRequest {
        UnifiedConfigurationRequest::new(
            EntityInput::New(creative_personality(tag)),
            EntityInput::New(creative_role(tag)),
            creative_agent(tag),
        )
    }

    /// Conscientiousness at least 80, formality at least 75.
    pub fn analyst_role(tag: &str) -> RoleDraft {
        RoleDraft::new(format!("Analyst {}", tag))
            .with_capabilities(["analyze", "report"])
            .with_requirements(
                RoleRequirements::default()
                    .with_min_trait(PersonalityTrait::Conscientiousness, 80)
                    .with_min_trait(PersonalityTrait::Formality, 75),
            )
    }

    /// Meets both analyst minimums.
    pub fn rigorous_personality(tag: &str) -> PersonalityDraft {
        let traits = PersonalityTraits::neutral()
            .with(PersonalityTrait::Conscientiousness, 92)
            .with(PersonalityTrait::Formality, 85)
            .with(PersonalityTrait::AnalyticalDepth, 90);
        PersonalityDraft::new(format!("Auditor {}", tag)).with_traits(&traits)
    }

    /// Conscientiousness 25 and formality 20; violates both analyst minimums.
    pub fn casual_personality(tag: &str) -> PersonalityDraft {
        let traits = PersonalityTraits::neutral()
            .with(PersonalityTrait::Conscientiousness, 25)
            .with(PersonalityTrait::Formality, 20)
            .with(PersonalityTrait::Humor, 80);
        PersonalityDraft::new(format!("Slacker {}", tag)).with_traits(&traits)
    }

    pub fn analyst_agent(tag: &str) -> AgentDraft {
        AgentDraft::new(format!("Analyst Agent {}", tag), SONNET).with_capabilities(["analyze"])
    }

    /// Casual personality on the analyst role: exactly two compatibility
    /// violations.
    pub fn mismatched_analyst_request(tag: &str) -> UnifiedConfigurationRequest {
        UnifiedConfigurationRequest::new(
            EntityInput::New(casual_personality(tag)),
            EntityInput::New(analyst_role(tag)),
            analyst_agent(tag),
        )
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over validation results.

    use super::*;

    #[track_caller]
    pub fn assert_valid(result: &ValidationResult) {
        assert!(
            result.is_valid && result.errors.is_empty(),
            "Expected a valid result, got: {:#?}",
            result.errors
        );
    }

    /// Assert that `code` was reported exactly `count` times.
    #[track_caller]
    pub fn assert_code_count(result: &ValidationResult, code: ErrorCode, count: usize) {
        assert_eq!(
            result.count_code(code),
            count,
            "Expected {} x {}, got: {:#?}",
            count,
            code,
            result.errors
        );
    }

    /// Assert that some error on `field` has `code`.
    #[track_caller]
    pub fn assert_field_error(result: &ValidationResult, field: &str, code: ErrorCode) {
        assert!(
            result.errors.iter().any(|e| e.field == field && e.code == code),
            "Expected {} on '{}', got: {:#?}",
            code,
            field,
            result.errors
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::EntitySchema;

    #[test]
    fn test_fixture_drafts_are_structurally_valid() {
        let schema = EntitySchema::default();
        for draft in [
            fixtures::creative_personality("t"),
            fixtures::rigorous_personality("t"),
            fixtures::casual_personality("t"),
            fixtures::neutral_personality("t"),
        ] {
            assertions::assert_valid(&schema.check_personality(&draft));
        }
        assertions::assert_valid(&schema.check_role(&fixtures::creative_role("t")));
        assertions::assert_valid(&schema.check_agent(&fixtures::creative_agent("t")));
    }

    #[test]
    fn test_catalog_has_one_of_each() {
        let catalog = fixtures::model_catalog();
        assert!(catalog.iter().any(|m| m.tier == ModelTier::Premium));
        assert!(catalog.iter().any(|m| !m.available));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::generators::*;
    use concord_core::{EntitySchema, TraitValueError};
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_fractional_values_are_not_integers(v in arb_fractional_value()) {
            let parsed = EntitySchema::default().parse_trait_value(&json!(v));
            let is_not_integer = matches!(parsed, Err(TraitValueError::NotInteger { .. }));
            prop_assert!(is_not_integer);
        }

        #[test]
        fn prop_over_precise_values_exceed_precision(v in arb_over_precise_value()) {
            let parsed = EntitySchema::default().parse_trait_value(&json!(v));
            let exceeded = matches!(parsed, Err(TraitValueError::PrecisionExceeded { .. }));
            prop_assert!(exceeded);
        }
    }
}
