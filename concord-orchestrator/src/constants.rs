//! Constants for the Concord orchestrator
//!
//! Every default the orchestrator falls back to lives here.

// ============================================================================
// BUDGETS
// ============================================================================

/// Cross-service validation phase budget in milliseconds
pub const DEFAULT_VALIDATION_BUDGET_MS: u64 = 300;

/// Whole-operation budget in milliseconds
pub const DEFAULT_OPERATION_BUDGET_MS: u64 = 1000;

// ============================================================================
// CONCURRENCY
// ============================================================================

/// Agents assembled concurrently by `list_unified_configurations`
pub const DEFAULT_LIST_CONCURRENCY: usize = 8;

/// Upper bound accepted for `list_concurrency`
pub const MAX_LIST_CONCURRENCY: usize = 256;

// ============================================================================
// ENVIRONMENT
// ============================================================================

pub const ENV_VALIDATION_BUDGET_MS: &str = "CONCORD_VALIDATION_BUDGET_MS";
pub const ENV_OPERATION_BUDGET_MS: &str = "CONCORD_OPERATION_BUDGET_MS";
pub const ENV_TIMEOUT_MODE: &str = "CONCORD_TIMEOUT_MODE";
pub const ENV_LIST_CONCURRENCY: &str = "CONCORD_LIST_CONCURRENCY";
pub const ENV_RULES_PATH: &str = "CONCORD_RULES_PATH";
pub const ENV_LOG_FORMAT: &str = "CONCORD_LOG_FORMAT";

/// Log filter variable, consulted before `RUST_LOG`
pub const ENV_LOG_FILTER: &str = "CONCORD_LOG";

/// Filter used when neither variable is set
pub const DEFAULT_LOG_FILTER: &str = "concord_orchestrator=info,concord_validation=info,warn";

// ============================================================================
// METRICS
// ============================================================================

/// Phase latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 300ms, 500ms, 1s, 2.5s, 5s
pub const PHASE_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.300, 0.500, 1.0, 2.5, 5.0,
];
