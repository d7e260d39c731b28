//! Prometheus metrics for the orchestrator.
//!
//! Each [`OrchestratorMetrics`] owns its own registry, so several
//! orchestrators (or tests) in one process never collide on registration.

use crate::constants::PHASE_LATENCY_BUCKETS;
use crate::context::{OperationKind, Phase};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

#[derive(Clone)]
pub struct OrchestratorMetrics {
    registry: Registry,

    /// Phase latency - labels: operation, phase
    pub phase_duration_seconds: HistogramVec,

    /// Completed operations - labels: operation, outcome
    pub operations_total: IntCounterVec,

    /// Phases that ran past their budget - labels: operation, phase
    pub budget_exceeded_total: IntCounterVec,

    /// Compensating actions - labels: outcome (success/failure)
    pub compensations_total: IntCounterVec,
}

impl OrchestratorMetrics {
    /// Create and register all metrics with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let phase_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "concord_phase_duration_seconds",
                "Orchestrator phase duration in seconds",
            )
            .buckets(PHASE_LATENCY_BUCKETS.to_vec()),
            &["operation", "phase"],
        )?;
        let operations_total = IntCounterVec::new(
            Opts::new(
                "concord_operations_total",
                "Total orchestrator operations by outcome",
            ),
            &["operation", "outcome"],
        )?;
        let budget_exceeded_total = IntCounterVec::new(
            Opts::new(
                "concord_budget_exceeded_total",
                "Phases that exceeded their time budget",
            ),
            &["operation", "phase"],
        )?;
        let compensations_total = IntCounterVec::new(
            Opts::new(
                "concord_compensations_total",
                "Compensating actions by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(phase_duration_seconds.clone()))?;
        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(budget_exceeded_total.clone()))?;
        registry.register(Box::new(compensations_total.clone()))?;

        Ok(Self {
            registry,
            phase_duration_seconds,
            operations_total,
            budget_exceeded_total,
            compensations_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe_phase(&self, operation: OperationKind, phase: Phase, elapsed: Duration) {
        self.phase_duration_seconds
            .with_label_values(&[operation.as_str(), phase.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_outcome(&self, operation: OperationKind, outcome: &str) {
        self.operations_total
            .with_label_values(&[operation.as_str(), outcome])
            .inc();
    }

    pub fn record_budget_exceeded(&self, operation: OperationKind, phase: Phase) {
        self.budget_exceeded_total
            .with_label_values(&[operation.as_str(), phase.as_str()])
            .inc();
    }

    pub fn record_compensation(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.compensations_total.with_label_values(&[outcome]).inc();
    }

    pub fn outcome_count(&self, operation: OperationKind, outcome: &str) -> u64 {
        self.operations_total
            .with_label_values(&[operation.as_str(), outcome])
            .get()
    }

    pub fn budget_exceeded_count(&self, operation: OperationKind, phase: Phase) -> u64 {
        self.budget_exceeded_total
            .with_label_values(&[operation.as_str(), phase.as_str()])
            .get()
    }

    pub fn compensation_count(&self, success: bool) -> u64 {
        let outcome = if success { "success" } else { "failure" };
        self.compensations_total.with_label_values(&[outcome]).get()
    }

    /// Prometheus text exposition of every metric in the registry.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for OrchestratorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_instances_do_not_collide() {
        let a = OrchestratorMetrics::new().unwrap();
        let b = OrchestratorMetrics::new().unwrap();
        a.record_outcome(OperationKind::Create, "success");
        assert_eq!(a.outcome_count(OperationKind::Create, "success"), 1);
        assert_eq!(b.outcome_count(OperationKind::Create, "success"), 0);
    }

    #[test]
    fn test_encode_contains_families() {
        let metrics = OrchestratorMetrics::new().unwrap();
        metrics.observe_phase(
            OperationKind::Validate,
            Phase::Validation,
            Duration::from_millis(12),
        );
        metrics.record_budget_exceeded(OperationKind::Create, Phase::Total);
        metrics.record_compensation(false);
        let text = metrics.encode().unwrap();
        assert!(text.contains("concord_phase_duration_seconds"));
        assert!(text.contains("concord_budget_exceeded_total"));
        assert!(text.contains("concord_compensations_total{outcome=\"failure\"} 1"));
    }
}
