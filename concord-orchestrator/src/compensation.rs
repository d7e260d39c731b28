//! Compensation log: undo completed writes in reverse order.

use concord_core::{
    Agent, AgentUpdate, EntityId, EntityKind, Personality, PersonalityUpdate, Role, RoleUpdate,
    ServiceError,
};
use concord_services::DomainServices;
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationKind {
    /// Delete an entity this operation created.
    Delete,
    /// Re-apply the values an entity had before this operation.
    Restore,
}

/// One compensating action and how it went.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationAction {
    pub entity: EntityKind,
    pub id: EntityId,
    pub kind: CompensationKind,
    pub error: Option<ServiceError>,
}

impl CompensationAction {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for CompensationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            CompensationKind::Delete => "deleted",
            CompensationKind::Restore => "restored",
        };
        match &self.error {
            None => write!(f, "{} {} {}", verb, self.entity, self.id),
            Some(e) => write!(f, "failed to undo {} {} ({})", self.entity, self.id, e),
        }
    }
}

/// Compensating actions taken by an operation, in the order they ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompensationReport {
    pub actions: Vec<CompensationAction>,
}

impl CompensationReport {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// True when every action succeeded (vacuously for an empty report).
    pub fn succeeded(&self) -> bool {
        self.actions.iter().all(CompensationAction::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CompensationAction> {
        self.actions.iter().filter(|a| !a.succeeded())
    }

    /// Entities rolled back, in order.
    pub fn rolled_back(&self) -> Vec<EntityKind> {
        self.actions
            .iter()
            .filter(|a| a.succeeded())
            .map(|a| a.entity)
            .collect()
    }
}

impl fmt::Display for CompensationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.actions.is_empty() {
            return f.write_str("none");
        }
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", action)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Undo {
    Delete { entity: EntityKind, id: EntityId },
    RestorePersonality(Box<Personality>),
    RestoreRole(Box<Role>),
    RestoreAgent(Box<Agent>),
}

/// Completed writes of one operation. Unwinding replays them backwards.
#[derive(Debug, Default)]
pub(crate) struct CompensationLog {
    entries: Vec<Undo>,
}

impl CompensationLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn created(&mut self, entity: EntityKind, id: EntityId) {
        self.entries.push(Undo::Delete { entity, id });
    }

    pub(crate) fn updated_personality(&mut self, previous: Personality) {
        self.entries
            .push(Undo::RestorePersonality(Box::new(previous)));
    }

    pub(crate) fn updated_role(&mut self, previous: Role) {
        self.entries.push(Undo::RestoreRole(Box::new(previous)));
    }

    pub(crate) fn updated_agent(&mut self, previous: Agent) {
        self.entries.push(Undo::RestoreAgent(Box::new(previous)));
    }

    /// Run every compensating action, newest first. A failed action is
    /// recorded and the rest still run.
    pub(crate) async fn unwind(self, services: &DomainServices) -> CompensationReport {
        let mut report = CompensationReport::default();
        for undo in self.entries.into_iter().rev() {
            let (entity, id, kind, outcome) = match undo {
                Undo::Delete { entity, id } => {
                    let outcome = match entity {
                        EntityKind::Personality => services.personalities.delete(id).await,
                        EntityKind::Role => services.roles.delete(id).await,
                        EntityKind::Agent => services.agents.delete(id).await,
                        EntityKind::Model => Ok(()),
                    };
                    (entity, id, CompensationKind::Delete, outcome)
                }
                Undo::RestorePersonality(p) => {
                    let outcome = services
                        .personalities
                        .update(p.id, &PersonalityUpdate::restore(&p))
                        .await
                        .map(|_| ());
                    (EntityKind::Personality, p.id, CompensationKind::Restore, outcome)
                }
                Undo::RestoreRole(r) => {
                    let outcome = services
                        .roles
                        .update(r.id, &RoleUpdate::restore(&r))
                        .await
                        .map(|_| ());
                    (EntityKind::Role, r.id, CompensationKind::Restore, outcome)
                }
                Undo::RestoreAgent(a) => {
                    let outcome = services
                        .agents
                        .update(a.id, &AgentUpdate::restore(&a))
                        .await
                        .map(|_| ());
                    (EntityKind::Agent, a.id, CompensationKind::Restore, outcome)
                }
            };
            let error = match outcome {
                Ok(()) => {
                    warn!(entity = %entity, entity_id = %id, action = ?kind, "compensating action applied");
                    None
                }
                Err(e) => {
                    error!(entity = %entity, entity_id = %id, action = ?kind, error = %e, "compensating action failed");
                    Some(e)
                }
            };
            report.actions.push(CompensationAction {
                entity,
                id,
                kind,
                error,
            });
        }
        report
    }
}
