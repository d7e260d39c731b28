//! Property-Based Tests for Trait Validation Through the Orchestrator
//!
//! **Property: Trait Range and Completeness**
//!
//! For any personality in a unified request:
//! - Integral values in [0, 100] are structurally accepted
//! - Values outside [0, 100], fractional values and non-numbers are
//!   rejected on the offending trait's field
//! - Omitting Big Five traits reports exactly the omitted traits
//! - A rejected create persists nothing

use concord_core::{trait_field, ErrorClass, ErrorCode, PersonalityDraft, PersonalityTrait};
use concord_test_utils::{assertions, fixtures, generators::*, EntityInput};
use concord_orchestrator::ConfigurationError;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tokio::runtime::Runtime;

#[path = "support/orchestrator.rs"]
mod test_orchestrator_support;
use test_orchestrator_support::{stored_counts, test_orchestrator};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

/// Creative request with `personality` swapped in.
fn request_with(personality: PersonalityDraft) -> concord_core::UnifiedConfigurationRequest {
    let mut request = fixtures::creative_request("prop");
    request.personality = EntityInput::New(personality);
    request
}

fn with_raw(t: PersonalityTrait, value: Value) -> PersonalityDraft {
    fixtures::creative_personality("prop").with_raw_trait(t.as_str(), value)
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_in_range_values_accepted(t in arb_trait(), v in arb_trait_value()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let services = fixtures::services();
            let orchestrator = test_orchestrator(&services);
            let result = orchestrator
                .validate_unified_configuration(&request_with(with_raw(t, json!(v))))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert!(
                !result.has_class(ErrorClass::Structural),
                "{} = {} rejected: {:?}", t, v, result.errors
            );
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_out_of_range_values_rejected(t in arb_trait(), v in arb_out_of_range_value()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let services = fixtures::services();
            let orchestrator = test_orchestrator(&services);
            let outcome = orchestrator
                .create_unified_configuration(&request_with(with_raw(t, json!(v))))
                .await;
            let Err(ConfigurationError::Validation { result, .. }) = outcome else {
                return Err(TestCaseError::fail(format!("{} = {} was not rejected", t, v)));
            };
            prop_assert!(result
                .errors_for(&trait_field(t))
                .any(|e| e.code == ErrorCode::TraitOutOfRange));
            prop_assert_eq!(stored_counts(&services).await, (0, 0, 0));
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_fractional_values_rejected(t in arb_trait(), v in arb_fractional_value()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let services = fixtures::services();
            let orchestrator = test_orchestrator(&services);
            let result = orchestrator
                .validate_unified_configuration(&request_with(with_raw(t, json!(v))))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert!(result
                .errors_for(&trait_field(t))
                .any(|e| e.code == ErrorCode::TraitNotInteger));
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_non_numeric_values_rejected(t in arb_trait(), v in arb_non_numeric_value()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let services = fixtures::services();
            let orchestrator = test_orchestrator(&services);
            let result = orchestrator
                .validate_unified_configuration(&request_with(with_raw(t, v)))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert!(result
                .errors_for(&trait_field(t))
                .any(|e| e.code == ErrorCode::TraitInvalidType));
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_missing_big_five_named_exactly((draft, missing) in arb_incomplete_personality_draft()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let services = fixtures::services();
            let orchestrator = test_orchestrator(&services);
            let result = orchestrator
                .validate_unified_configuration(&request_with(draft))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let reported: BTreeSet<String> = result
                .errors
                .iter()
                .filter(|e| e.code == ErrorCode::TraitRequired)
                .map(|e| e.field.clone())
                .collect();
            let expected: BTreeSet<String> = missing.iter().map(|t| trait_field(*t)).collect();
            prop_assert_eq!(reported, expected);

            // The personality failed, so both personality stages are blocked.
            prop_assert_eq!(result.count_code(ErrorCode::UpstreamValidationFailed), 2);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ============================================================================
// BOUNDARIES
// ============================================================================

#[tokio::test]
async fn test_trait_boundaries() {
    let services = fixtures::services();
    let orchestrator = test_orchestrator(&services);

    for (value, accepted) in [
        (json!(0), true),
        (json!(100), true),
        (json!(50.0), true),
        (json!(-1), false),
        (json!(101), false),
        (json!(99.99), false),
    ] {
        let personality = with_raw(PersonalityTrait::Openness, value.clone());
        let result = orchestrator
            .validate_unified_configuration(&request_with(personality))
            .await
            .unwrap();
        let field_errors = result.errors_for("personality.openness").count();
        assert_eq!(
            field_errors == 0,
            accepted,
            "openness = {} gave {:?}",
            value,
            result.errors
        );
    }
}

#[tokio::test]
async fn test_precision_is_checked_before_integrality() {
    let services = fixtures::services();
    let orchestrator = test_orchestrator(&services);
    let personality = with_raw(PersonalityTrait::Humor, json!(42.125));
    let result = orchestrator
        .validate_unified_configuration(&request_with(personality))
        .await
        .unwrap();
    assertions::assert_field_error(&result, "personality.humor", ErrorCode::TraitPrecisionExceeded);
    assert!(!result.has_code(ErrorCode::TraitNotInteger));
}

#[tokio::test]
async fn test_unknown_trait_reported_by_personality_domain() {
    let services = fixtures::services();
    let orchestrator = test_orchestrator(&services);
    let personality = fixtures::creative_personality("x").with_raw_trait("charisma", json!(60));
    let result = orchestrator
        .validate_unified_configuration(&request_with(personality))
        .await
        .unwrap();
    assertions::assert_field_error(&result, "personality.charisma", ErrorCode::TraitUnknown);
    assert_eq!(
        result.errors_for("personality.charisma").next().unwrap().originating_service,
        Some(concord_core::ServiceName::PersonalityService)
    );
}
