//! quorum: a coordination core for concurrent autonomous agents.
//!
//! Agents working in a shared workspace register with the
//! [`CoordinationService`], take exclusive leases on scopes through the
//! lock manager, and order cross-scope work through declared
//! dependencies. A safety validator checks the combined state after
//! every mutation; in advisory mode findings are reported alongside
//! results, in strict mode the offending mutation is rolled back.
//!
//! The service is the only entry point for mutations. The component
//! managers ([`AgentManager`], [`LockManager`], [`SyncCoordinator`]) are
//! exported for direct use in embedders that do their own locking, but
//! cross-component invariants only hold when operations go through the
//! service.

pub mod clock;
pub mod config;
pub mod coordination;
pub mod core;
pub mod error;
pub mod log;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::CoordinationConfig;
pub use coordination::{
    AgentManager, CoordinationEvent, CoordinationOutcome, CoordinationRequest,
    CoordinationResponse, CoordinationService, CoordinationSnapshot, LockManager,
    SafetyValidator, SyncCoordinator,
};
pub use core::{
    Agent, AgentId, AgentState, DependencyCheck, LockEvent, LockEventKind, SafetyViolation,
    ScopeLock, ScopePath, ScopeSync, SyncStatus, ViolationKind, ViolationSubject,
};
pub use error::{AgentError, CoordinationError, Error, LockError, Result, SyncError};
