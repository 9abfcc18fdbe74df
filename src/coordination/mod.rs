//! Coordination components.
//!
//! Dependency order, leaves first: [`validator`] is pure over snapshots,
//! [`locks`] owns the lock table, [`agents`] owns the registry, [`sync`]
//! owns sync status and the dependency graph, and [`service`] orchestrates
//! the four behind a single request/response surface.

pub mod agents;
pub mod locks;
pub mod service;
pub mod sync;
pub mod validator;

pub use agents::AgentManager;
pub use locks::LockManager;
pub use service::{
    CoordinationEvent, CoordinationOutcome, CoordinationRequest, CoordinationResponse,
    CoordinationService,
};
pub use sync::SyncCoordinator;
pub use validator::{CoordinationSnapshot, SafetyValidator};
