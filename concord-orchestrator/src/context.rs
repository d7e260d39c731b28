//! Per-call operation context.

use concord_core::{CorrelationId, EntityId};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{field, info_span, Span};

/// Orchestrator entry point, used as a metric and span label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Get,
    List,
    Update,
    Delete,
    Validate,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Get => "get",
            OperationKind::List => "list",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Validate => "validate",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timed section of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Validation,
    Persistence,
    Compensation,
    Read,
    /// The operation as a whole.
    Total,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Validation => "validation",
            Phase::Persistence => "persistence",
            Phase::Compensation => "compensation",
            Phase::Read => "read",
            Phase::Total => "total",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Created at the entry of every orchestrator call. Carries the correlation
/// id stamped on every error the call returns.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub correlation_id: CorrelationId,
    pub operation: OperationKind,
    started: Instant,
    span: Span,
}

impl OperationContext {
    pub fn new(operation: OperationKind) -> Self {
        let correlation_id = CorrelationId::new();
        let span = info_span!(
            "concord_operation",
            operation = operation.as_str(),
            correlation_id = %correlation_id,
            agent_id = field::Empty,
        );
        Self {
            correlation_id,
            operation,
            started: Instant::now(),
            span,
        }
    }

    pub fn with_agent(self, agent_id: EntityId) -> Self {
        self.span.record("agent_id", field::display(agent_id));
        self
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left of `budget`, zero once spent.
    pub fn remaining(&self, budget: Duration) -> Duration {
        budget.saturating_sub(self.elapsed())
    }
}
