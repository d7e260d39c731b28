//! Errors returned by the orchestrator.
//!
//! Validation findings travel as data inside [`ConfigurationError::Validation`];
//! every other variant is an operation failure. All of them carry the
//! correlation id of the call that produced them.

use crate::compensation::CompensationReport;
use crate::context::Phase;
use concord_core::{
    CorrelationId, EntityId, EntityKind, ServiceError, ValidationError, ValidationResult,
};
use std::collections::BTreeMap;
use std::fmt;

/// How loudly a failure should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// The caller's input or the current state is at fault.
    Warning,
    /// The operation failed; no data was left half-written.
    Error,
    /// Data may be left half-written.
    Critical,
}

/// Where an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Validation,
    Read,
    Write(EntityKind),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Validation => f.write_str("validation"),
            Step::Read => f.write_str("read"),
            Step::Write(kind) => write!(f, "{} write", kind),
        }
    }
}

fn kinds(list: &[EntityKind]) -> String {
    list.iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn counts(map: &BTreeMap<String, u64>) -> String {
    map.iter()
        .map(|(kind, n)| format!("{} {}", n, kind))
        .collect::<Vec<_>>()
        .join(", ")
}

fn optional(report: &Option<CompensationReport>) -> String {
    match report {
        Some(r) => r.to_string(),
        None => "not attempted".to_string(),
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Configuration is invalid: {} error(s) (correlation {correlation_id})", .result.errors.len())]
    Validation {
        correlation_id: CorrelationId,
        result: ValidationResult,
    },

    #[error("Agent {agent_id} not found (correlation {correlation_id})")]
    NotFound {
        correlation_id: CorrelationId,
        agent_id: EntityId,
    },

    #[error("Configuration for agent {agent_id} is inconsistent: missing {} (correlation {correlation_id})", kinds(.missing))]
    Inconsistent {
        correlation_id: CorrelationId,
        agent_id: EntityId,
        missing: Vec<EntityKind>,
    },

    #[error("Agent {agent_id} still has dependents: {} (correlation {correlation_id})", counts(.dependents))]
    Dependency {
        correlation_id: CorrelationId,
        agent_id: EntityId,
        dependents: BTreeMap<String, u64>,
    },

    #[error("{step} failed: {source}; compensation: {compensation} (correlation {correlation_id})")]
    Infrastructure {
        correlation_id: CorrelationId,
        step: Step,
        source: ServiceError,
        compensation: CompensationReport,
    },

    #[error("{phase} phase exceeded its {budget_ms}ms budget; compensation: {compensation} (correlation {correlation_id})")]
    Timeout {
        correlation_id: CorrelationId,
        phase: Phase,
        budget_ms: u64,
        compensation: CompensationReport,
    },

    #[error("Cancelled during {step}; compensation: {compensation} (correlation {correlation_id})")]
    Cancelled {
        correlation_id: CorrelationId,
        step: Step,
        compensation: CompensationReport,
    },

    #[error("Partial update of agent {agent_id}: committed [{}], {failed} failed: {source}; compensation: {} (correlation {correlation_id})", kinds(.committed), optional(.compensation))]
    PartialUpdate {
        correlation_id: CorrelationId,
        agent_id: EntityId,
        committed: Vec<EntityKind>,
        failed: EntityKind,
        source: ServiceError,
        /// Present when the update asked for atomic behavior.
        compensation: Option<CompensationReport>,
    },

    #[error("Compensation failed ({compensation}) after: {cause}")]
    CompensationFailed {
        correlation_id: CorrelationId,
        #[source]
        cause: Box<ConfigurationError>,
        compensation: CompensationReport,
    },
}

impl ConfigurationError {
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            ConfigurationError::Validation { correlation_id, .. }
            | ConfigurationError::NotFound { correlation_id, .. }
            | ConfigurationError::Inconsistent { correlation_id, .. }
            | ConfigurationError::Dependency { correlation_id, .. }
            | ConfigurationError::Infrastructure { correlation_id, .. }
            | ConfigurationError::Timeout { correlation_id, .. }
            | ConfigurationError::Cancelled { correlation_id, .. }
            | ConfigurationError::PartialUpdate { correlation_id, .. }
            | ConfigurationError::CompensationFailed { correlation_id, .. } => *correlation_id,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ConfigurationError::Validation { .. }
            | ConfigurationError::NotFound { .. }
            | ConfigurationError::Dependency { .. } => Severity::Warning,
            ConfigurationError::Inconsistent { .. }
            | ConfigurationError::Infrastructure { .. }
            | ConfigurationError::Timeout { .. }
            | ConfigurationError::Cancelled { .. }
            | ConfigurationError::PartialUpdate { .. } => Severity::Error,
            ConfigurationError::CompensationFailed { .. } => Severity::Critical,
        }
    }

    /// Timeouts and transient collaborator failures may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConfigurationError::Timeout { .. } => true,
            ConfigurationError::Infrastructure { source, .. }
            | ConfigurationError::PartialUpdate { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Validation findings, empty for operation failures.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ConfigurationError::Validation { result, .. } => &result.errors,
            _ => &[],
        }
    }

    pub fn compensation(&self) -> Option<&CompensationReport> {
        match self {
            ConfigurationError::Infrastructure { compensation, .. }
            | ConfigurationError::Timeout { compensation, .. }
            | ConfigurationError::Cancelled { compensation, .. }
            | ConfigurationError::CompensationFailed { compensation, .. } => Some(compensation),
            ConfigurationError::PartialUpdate { compensation, .. } => compensation.as_ref(),
            _ => None,
        }
    }

    /// Metrics label for the failed outcome.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            ConfigurationError::Validation { .. } => "invalid",
            ConfigurationError::NotFound { .. } => "not_found",
            ConfigurationError::Inconsistent { .. } => "inconsistent",
            ConfigurationError::Dependency { .. } => "dependency",
            ConfigurationError::Infrastructure { .. } => "infrastructure",
            ConfigurationError::Timeout { .. } => "timeout",
            ConfigurationError::Cancelled { .. } => "cancelled",
            ConfigurationError::PartialUpdate { .. } => "partial_update",
            ConfigurationError::CompensationFailed { .. } => "compensation_failed",
        }
    }

    /// Escalate to `CompensationFailed` when `report` holds a failed action.
    pub(crate) fn escalate(self, report: &CompensationReport) -> Self {
        if report.succeeded() {
            return self;
        }
        ConfigurationError::CompensationFailed {
            correlation_id: self.correlation_id(),
            compensation: report.clone(),
            cause: Box::new(self),
        }
    }
}

/// Result type for orchestrator calls.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compensation::{CompensationAction, CompensationKind};
    use concord_core::{new_entity_id, ErrorCode, ServiceName};

    fn unavailable() -> ServiceError {
        ServiceError::Unavailable {
            service: ServiceName::AgentService,
            reason: "connection refused".into(),
        }
    }

    #[test]
    fn test_validation_exposes_errors() {
        let correlation_id = CorrelationId::new();
        let err = ConfigurationError::Validation {
            correlation_id,
            result: ValidationResult::from_errors(vec![ValidationError::new(
                "personality.openness",
                ErrorCode::TraitRequired,
                "openness is required",
            )]),
        };
        assert_eq!(err.validation_errors().len(), 1);
        assert_eq!(err.severity(), Severity::Warning);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("1 error(s)"));
    }

    #[test]
    fn test_escalation_on_failed_compensation() {
        let correlation_id = CorrelationId::new();
        let err = ConfigurationError::Infrastructure {
            correlation_id,
            step: Step::Write(EntityKind::Agent),
            source: unavailable(),
            compensation: CompensationReport::default(),
        };
        assert!(err.is_retryable());

        let clean = err.clone().escalate(&CompensationReport::default());
        assert_eq!(clean.severity(), Severity::Error);

        let failed = CompensationReport {
            actions: vec![CompensationAction {
                entity: EntityKind::Role,
                id: new_entity_id(),
                kind: CompensationKind::Delete,
                error: Some(unavailable()),
            }],
        };
        let escalated = err.escalate(&failed);
        assert_eq!(escalated.severity(), Severity::Critical);
        assert_eq!(escalated.correlation_id(), correlation_id);
        assert!(escalated.to_string().contains("agent write failed"));
    }

    #[test]
    fn test_dependency_message_lists_counts() {
        let err = ConfigurationError::Dependency {
            correlation_id: CorrelationId::new(),
            agent_id: new_entity_id(),
            dependents: [("conversation".to_string(), 3)].into_iter().collect(),
        };
        assert!(err.to_string().contains("3 conversation"));
    }
}
