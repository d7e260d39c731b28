//! Error types for collaborator calls and rule loading.

use crate::entities::{EntityKind, ServiceName};
use thiserror::Error;

/// Failure of a domain service call. These are infrastructural or
/// concurrency failures, not validation findings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: EntityKind, id: String },

    #[error("Version conflict on {entity} {id}: expected {expected}, found {actual}")]
    VersionConflict {
        entity: EntityKind,
        id: String,
        expected: u32,
        actual: u32,
    },

    #[error("{service} unavailable: {reason}")]
    Unavailable { service: ServiceName, reason: String },

    #[error("{service} timed out after {elapsed_ms}ms")]
    Timeout { service: ServiceName, elapsed_ms: u64 },

    #[error("{service} rejected request: {reason}")]
    Rejected { service: ServiceName, reason: String },

    #[error("Internal error in {service}: {reason}")]
    Internal { service: ServiceName, reason: String },
}

impl ServiceError {
    /// Timeouts and unavailability may succeed on retry; everything else won't.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Unavailable { .. } | ServiceError::Timeout { .. }
        )
    }

    /// Service the failure is attributed to.
    pub fn service(&self) -> ServiceName {
        match self {
            ServiceError::NotFound { entity, .. }
            | ServiceError::AlreadyExists { entity, .. }
            | ServiceError::VersionConflict { entity, .. } => entity.owner(),
            ServiceError::Unavailable { service, .. }
            | ServiceError::Timeout { service, .. }
            | ServiceError::Rejected { service, .. }
            | ServiceError::Internal { service, .. } => *service,
        }
    }
}

/// Result type for domain service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Compatibility rule table load or validation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("Failed to read rule table {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse {format} rule table: {reason}")]
    Parse { format: &'static str, reason: String },

    #[error("Unknown field path '{path}'")]
    UnknownField { path: String },

    #[error("Rule '{rule_id}': comparator {comparator} cannot take {reason}")]
    InvalidThreshold {
        rule_id: String,
        comparator: String,
        reason: String,
    },

    #[error("Duplicate rule id '{rule_id}'")]
    DuplicateId { rule_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ServiceError::Timeout {
            service: ServiceName::RoleService,
            elapsed_ms: 300
        }
        .is_retryable());
        assert!(!ServiceError::Rejected {
            service: ServiceName::RoleService,
            reason: "no".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_service_attribution() {
        let err = ServiceError::NotFound {
            entity: EntityKind::Personality,
            id: "x".into(),
        };
        assert_eq!(err.service(), ServiceName::PersonalityService);
        assert_eq!(err.to_string(), "personality not found: x");
    }
}
