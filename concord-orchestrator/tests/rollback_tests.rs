//! Rollback, Timeout and Cancellation Tests
//!
//! **Property: No Half-Written Configurations**
//!
//! When any step after the first write fails, times out or is cancelled,
//! every completed write is undone in reverse order, and a failed undo is
//! surfaced as a critical error.

use concord_core::{
    AgentPatch, EntityKind, PersonalityPatch, PersonalityTrait, RoleDraft, RolePatch, RoleUpdate,
    ServiceError, ServiceName, UnifiedConfigurationPatch,
};
use concord_orchestrator::{
    CancelSignal, ConfigurationError, Disposition, OperationKind, Phase, Severity, Step,
};
use concord_services::{PersonalityService, RoleService};
use concord_test_utils::{fixtures, DoubleOptions, Operation};
use std::time::Duration;

#[path = "support/orchestrator.rs"]
mod test_orchestrator_support;
use test_orchestrator_support::{enforcing, stored_counts, test_doubled};

fn imagination_patch(value: u8, atomic: bool) -> UnifiedConfigurationPatch {
    UnifiedConfigurationPatch {
        personality: Some(PersonalityPatch::default().with_trait(PersonalityTrait::Imagination, value)),
        agent: Some(AgentPatch {
            description: Some("Now with more imagination".into()),
            ..Default::default()
        }),
        atomic,
        ..Default::default()
    }
}

// ============================================================================
// WRITE FAILURES
// ============================================================================

#[tokio::test]
async fn test_agent_write_failure_rolls_back_role_and_personality() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    doubled
        .agents
        .set_options(DoubleOptions::failing([Operation::Create]));

    let err = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap_err();
    let ConfigurationError::Infrastructure {
        step,
        source,
        compensation,
        ..
    } = &err
    else {
        panic!("expected infrastructure error, got {err:?}");
    };
    assert_eq!(*step, Step::Write(EntityKind::Agent));
    assert!(matches!(
        source,
        ServiceError::Unavailable {
            service: ServiceName::AgentService,
            ..
        }
    ));
    assert_eq!(
        compensation.rolled_back(),
        vec![EntityKind::Role, EntityKind::Personality]
    );
    assert_eq!(err.severity(), Severity::Error);
    assert_eq!(stored_counts(&doubled.backing).await, (0, 0, 0));
    assert_eq!(orchestrator.metrics().compensation_count(true), 2);
    assert_eq!(
        orchestrator
            .metrics()
            .outcome_count(OperationKind::Create, "infrastructure"),
        1
    );
}

#[tokio::test]
async fn test_role_write_failure_rolls_back_personality() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    doubled
        .roles
        .set_options(DoubleOptions::failing([Operation::Create]));

    let err = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap_err();
    let compensation = err.compensation().expect("compensation report");
    assert_eq!(compensation.rolled_back(), vec![EntityKind::Personality]);
    assert_eq!(doubled.agents.call_count(Operation::Create), 0);
    assert_eq!(stored_counts(&doubled.backing).await, (0, 0, 0));
}

#[tokio::test]
async fn test_failed_rollback_is_critical() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    doubled
        .agents
        .set_options(DoubleOptions::failing([Operation::Create]));
    doubled
        .personalities
        .set_options(DoubleOptions::failing([Operation::Delete]));

    let err = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap_err();
    let ConfigurationError::CompensationFailed {
        cause,
        compensation,
        ..
    } = &err
    else {
        panic!("expected compensation failure, got {err:?}");
    };
    assert_eq!(err.severity(), Severity::Critical);
    assert!(matches!(**cause, ConfigurationError::Infrastructure { .. }));
    assert_eq!(compensation.rolled_back(), vec![EntityKind::Role]);
    assert_eq!(
        compensation.failures().map(|a| a.entity).collect::<Vec<_>>(),
        vec![EntityKind::Personality]
    );
    // The orphaned personality is still there for an operator to clean up.
    assert_eq!(stored_counts(&doubled.backing).await, (1, 0, 0));
    assert_eq!(orchestrator.metrics().compensation_count(false), 1);
}

#[tokio::test]
async fn test_model_lookup_failure_during_validation() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    doubled
        .models
        .set_options(DoubleOptions::failing([Operation::Get, Operation::IsAvailable]));

    let err = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::Infrastructure {
            step: Step::Validation,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert!(err.compensation().is_some_and(|c| c.is_empty()));
    assert_eq!(stored_counts(&doubled.backing).await, (0, 0, 0));
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_during_role_write_rolls_back_at_next_step() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    doubled.roles.set_options(
        DoubleOptions::default()
            .with_latency(Duration::from_secs(2))
            .slow_on([Operation::Create]),
    );
    let (handle, signal) = CancelSignal::pair();
    let request = fixtures::creative_request("a");

    let (outcome, ()) = tokio::join!(
        orchestrator.create_unified_configuration_with_cancel(&request, signal),
        async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.cancel();
        }
    );

    let err = outcome.unwrap_err();
    let ConfigurationError::Cancelled { step, compensation, .. } = &err else {
        panic!("expected cancellation, got {err:?}");
    };
    // The in-flight role write completed; the agent write never started.
    assert_eq!(*step, Step::Write(EntityKind::Agent));
    assert_eq!(doubled.roles.call_count(Operation::Create), 1);
    assert_eq!(doubled.agents.call_count(Operation::Create), 0);
    assert_eq!(
        compensation.rolled_back(),
        vec![EntityKind::Role, EntityKind::Personality]
    );
    assert_eq!(stored_counts(&doubled.backing).await, (0, 0, 0));
}

#[tokio::test]
async fn test_cancel_before_start_writes_nothing() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    let (handle, signal) = CancelSignal::pair();
    handle.cancel();

    let err = orchestrator
        .create_unified_configuration_with_cancel(&fixtures::creative_request("a"), signal)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::Cancelled {
            step: Step::Validation,
            ..
        }
    ));
    assert!(doubled.personalities.calls().is_empty());
    assert_eq!(stored_counts(&doubled.backing).await, (0, 0, 0));
}

// ============================================================================
// TIMEOUTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_enforced_validation_budget() {
    let (doubled, orchestrator) = test_doubled(enforcing());
    doubled.personalities.set_options(
        DoubleOptions::default()
            .with_latency(Duration::from_secs(1))
            .slow_on([Operation::Validate]),
    );

    let err = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::Timeout {
            phase: Phase::Validation,
            budget_ms: 300,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(
        orchestrator
            .metrics()
            .budget_exceeded_count(OperationKind::Create, Phase::Validation),
        1
    );
    assert_eq!(stored_counts(&doubled.backing).await, (0, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_enforced_operation_budget_rolls_back() {
    let (doubled, orchestrator) = test_doubled(enforcing());
    doubled.roles.set_options(
        DoubleOptions::default()
            .with_latency(Duration::from_secs(2))
            .slow_on([Operation::Create]),
    );

    let err = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap_err();
    let ConfigurationError::Timeout {
        phase,
        compensation,
        ..
    } = &err
    else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(*phase, Phase::Persistence);
    assert_eq!(
        compensation.rolled_back(),
        vec![EntityKind::Role, EntityKind::Personality]
    );
    assert_eq!(stored_counts(&doubled.backing).await, (0, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_observed_overrun_still_succeeds() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    doubled.roles.set_options(
        DoubleOptions::default()
            .with_latency(Duration::from_millis(1500))
            .slow_on([Operation::Create]),
    );

    let created = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap();
    assert_eq!(created.agent.role_id, created.role.id);
    assert_eq!(
        orchestrator
            .metrics()
            .budget_exceeded_count(OperationKind::Create, Phase::Total),
        1
    );
    assert_eq!(
        orchestrator
            .metrics()
            .budget_exceeded_count(OperationKind::Create, Phase::Validation),
        0
    );
    assert_eq!(stored_counts(&doubled.backing).await, (1, 1, 1));
}

// ============================================================================
// PARTIAL UPDATES
// ============================================================================

#[tokio::test]
async fn test_partial_update_keeps_committed_siblings() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    let created = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap();
    doubled
        .agents
        .set_options(DoubleOptions::failing([Operation::Update]));

    let err = orchestrator
        .update_unified_configuration(created.agent.id, &imagination_patch(97, false))
        .await
        .unwrap_err();
    let ConfigurationError::PartialUpdate {
        committed,
        failed,
        compensation,
        ..
    } = &err
    else {
        panic!("expected partial update, got {err:?}");
    };
    assert_eq!(committed, &vec![EntityKind::Personality]);
    assert_eq!(*failed, EntityKind::Agent);
    assert!(compensation.is_none());

    let stored = doubled
        .backing
        .personalities
        .get(created.personality.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.traits.get(PersonalityTrait::Imagination), 97);
}

#[tokio::test]
async fn test_atomic_update_restores_siblings() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    let created = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap();
    doubled
        .agents
        .set_options(DoubleOptions::failing([Operation::Update]));

    let err = orchestrator
        .update_unified_configuration(created.agent.id, &imagination_patch(97, true))
        .await
        .unwrap_err();
    let ConfigurationError::PartialUpdate { compensation, .. } = &err else {
        panic!("expected partial update, got {err:?}");
    };
    let report = compensation.as_ref().expect("atomic update compensates");
    assert_eq!(report.rolled_back(), vec![EntityKind::Personality]);

    doubled.agents.reset();
    let fetched = orchestrator
        .get_unified_configuration(created.agent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        fetched.personality.traits.get(PersonalityTrait::Imagination),
        92
    );
    assert_eq!(fetched.agent, created.agent);
}

#[tokio::test(start_paused = true)]
async fn test_role_update_does_not_overwrite_concurrent_write() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    let created = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap();
    // Hold the update in validation, after it has read the role.
    doubled.roles.set_options(
        DoubleOptions::default()
            .with_latency(Duration::from_secs(1))
            .slow_on([Operation::Validate]),
    );
    let patch = UnifiedConfigurationPatch {
        role: Some(RolePatch {
            description: Some("edit from a stale read".into()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let other_writer = RoleUpdate::from_draft(
        &RoleDraft::from_role(&created.role).with_description("edit that landed first"),
        None,
    );

    let (outcome, landed) = tokio::join!(
        orchestrator.update_unified_configuration(created.agent.id, &patch),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            doubled
                .backing
                .roles
                .update(created.role.id, &other_writer)
                .await
        }
    );
    assert_eq!(landed.unwrap().version, created.role.version + 1);

    let err = outcome.unwrap_err();
    assert!(
        matches!(
            err,
            ConfigurationError::Infrastructure {
                step: Step::Write(EntityKind::Role),
                source: ServiceError::VersionConflict { .. },
                ..
            }
        ),
        "expected version conflict, got {err:?}"
    );
    let stored = doubled
        .backing
        .roles
        .get(created.role.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.description.as_deref(), Some("edit that landed first"));
}

#[tokio::test]
async fn test_update_failure_before_any_commit_is_plain() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    let created = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap();
    doubled
        .personalities
        .set_options(DoubleOptions::failing([Operation::Update]));

    let err = orchestrator
        .update_unified_configuration(created.agent.id, &imagination_patch(97, true))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::Infrastructure {
            step: Step::Write(EntityKind::Personality),
            ..
        }
    ));
    assert_eq!(doubled.agents.call_count(Operation::Update), 0);
}

// ============================================================================
// READ AND DELETE DEGRADATION
// ============================================================================

#[tokio::test]
async fn test_missing_personality_reported_as_inconsistent() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    let created = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap();
    doubled
        .backing
        .personalities
        .delete(created.personality.id)
        .await
        .unwrap();

    let err = orchestrator
        .get_unified_configuration(created.agent.id)
        .await
        .unwrap_err();
    let ConfigurationError::Inconsistent { missing, .. } = &err else {
        panic!("expected inconsistency, got {err:?}");
    };
    assert_eq!(missing, &vec![EntityKind::Personality]);
}

#[tokio::test]
async fn test_delete_reports_failed_disposal() {
    let (doubled, orchestrator) = test_doubled(Default::default());
    let created = orchestrator
        .create_unified_configuration(&fixtures::creative_request("a"))
        .await
        .unwrap();
    doubled
        .personalities
        .set_options(DoubleOptions::failing([Operation::Delete]));

    let report = orchestrator
        .delete_unified_configuration(created.agent.id)
        .await
        .unwrap();
    assert!(matches!(report.personality, Disposition::Failed { .. }));
    assert_eq!(report.role, Disposition::Deleted);
    assert_eq!(stored_counts(&doubled.backing).await, (1, 0, 0));
}
