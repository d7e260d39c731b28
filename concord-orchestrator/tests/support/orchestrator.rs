#![allow(dead_code)]

use concord_orchestrator::{ConfigurationService, OrchestratorConfig, TimeoutMode};
use concord_services::DomainServices;
use concord_test_utils::{fixtures, DoubledServices, InMemoryServices};

/// Orchestrator with default configuration over `services`.
pub fn test_orchestrator(services: &InMemoryServices) -> ConfigurationService {
    test_orchestrator_with(services.domain(), OrchestratorConfig::default())
}

pub fn test_orchestrator_with(
    domain: DomainServices,
    config: OrchestratorConfig,
) -> ConfigurationService {
    ConfigurationService::builder(domain)
        .config(config)
        .build()
        .expect("Failed to build orchestrator")
}

/// Seeded in-memory services behind doubles, plus an orchestrator over them.
pub fn test_doubled(config: OrchestratorConfig) -> (DoubledServices, ConfigurationService) {
    let doubled = DoubledServices::new(fixtures::services());
    let orchestrator = test_orchestrator_with(doubled.domain(), config);
    (doubled, orchestrator)
}

pub fn enforcing() -> OrchestratorConfig {
    OrchestratorConfig {
        timeout_mode: TimeoutMode::Enforce,
        ..Default::default()
    }
}

/// Persisted entity counts: (personalities, roles, agents).
pub async fn stored_counts(services: &InMemoryServices) -> (usize, usize, usize) {
    (
        services.personalities.count().await,
        services.roles.count().await,
        services.agents.count().await,
    )
}
