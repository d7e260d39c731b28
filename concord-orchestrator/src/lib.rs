//! Concord Orchestrator
//!
//! Coordinates personality, role, model and agent services so that a
//! unified agent configuration is created, read, updated and deleted as
//! one consistent unit.
//!
//! # Flow
//!
//! Every mutating call first runs the validation pipeline: the five
//! validation operations for each sub-entity in parallel, then referential
//! integrity and cross-domain compatibility. Only a clean result proceeds
//! to persistence, which writes personality, role and agent in that order
//! and undoes completed writes when a later step fails.
//!
//! Validation findings are data ([`ValidationResult`]); operation failures
//! are [`ConfigurationError`]s. Both carry the correlation id of the call.

pub mod cancel;
pub mod compensation;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod metrics;
mod pipeline;
pub mod service;
pub mod telemetry;

pub use cancel::{CancelHandle, CancelSignal};
pub use compensation::{CompensationAction, CompensationKind, CompensationReport};
pub use config::{ConfigError, LogFormat, OrchestratorConfig, TimeoutMode};
pub use context::{OperationContext, OperationKind, Phase};
pub use error::{ConfigurationError, ConfigurationResult, Severity, Step};
pub use metrics::OrchestratorMetrics;
pub use service::{
    ConfigurationService, ConfigurationServiceBuilder, DeletionReport, Disposition,
};
pub use telemetry::init_tracing;

pub use concord_core::{UnifiedConfiguration, ValidationResult};
