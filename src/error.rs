//! Error types for the coordination core.
//!
//! Operations return typed results; errors are never used for conditions
//! that are ordinary outcomes (an already-held lock yields `Ok(false)`
//! from acquire, not an error).

use crate::core::agent::{AgentId, AgentState};
use crate::core::scope::ScopePath;
use crate::core::sync::SyncStatus;
use crate::core::violation::SafetyViolation;
use thiserror::Error;

/// Failures of agent lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("agent already joined: {0}")]
    AlreadyJoined(AgentId),

    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("invalid agent transition from {from} to {to}")]
    InvalidTransition { from: AgentState, to: AgentState },
}

/// Failures of lock operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("agent {agent} is not the holder of lock {scope}")]
    NotHolder { scope: ScopePath, agent: AgentId },

    #[error("agent {agent} already holds {held} lock(s), limit is {max}")]
    LockLimitExceeded {
        agent: AgentId,
        held: usize,
        max: usize,
    },
}

/// Failures of sync operations and dependency declarations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("unknown scope: {0}")]
    UnknownScope(ScopePath),

    #[error("scope already declared: {0}")]
    AlreadyDeclared(ScopePath),

    #[error("scope {0} is already syncing")]
    AlreadySyncing(ScopePath),

    #[error("dependencies not ready for {scope}: {}", format_paths(unmet))]
    DependencyNotReady {
        scope: ScopePath,
        unmet: Vec<ScopePath>,
    },

    #[error("invalid sync transition for {scope}: {from} -> {to}")]
    InvalidTransition {
        scope: ScopePath,
        from: SyncStatus,
        to: SyncStatus,
    },

    #[error("scope {0} cannot depend on itself")]
    SelfDependency(ScopePath),

    #[error("dependency {dependency} -> {scope} would create a cycle")]
    DependencyCycle {
        scope: ScopePath,
        dependency: ScopePath,
    },

    #[error("scope {scope} declares {declared} dependencies, limit is {max}")]
    TooManyDependencies {
        scope: ScopePath,
        declared: usize,
        max: usize,
    },
}

fn format_paths(paths: &[ScopePath]) -> String {
    paths
        .iter()
        .map(ScopePath::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Top-level failure of a coordination request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Strict mode only: the mutation was rolled back because it left the
    /// system in violation of a safety invariant.
    #[error("operation rejected by safety validation ({} violation(s))", violations.len())]
    SafetyRejected { violations: Vec<SafetyViolation> },
}

/// Infrastructure errors (config file handling, logging setup).
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,
}

pub type Result<T> = std::result::Result<T, Error>;
