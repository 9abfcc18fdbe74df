//! Core data model for the coordination state machine.

pub mod agent;
pub mod lock;
pub mod scope;
pub mod sync;
pub mod violation;

pub use agent::{Agent, AgentId, AgentState};
pub use lock::{LockEvent, LockEventKind, ScopeLock};
pub use scope::ScopePath;
pub use sync::{DependencyCheck, ScopeSync, SyncStatus};
pub use violation::{SafetyViolation, ViolationKind, ViolationSubject};
