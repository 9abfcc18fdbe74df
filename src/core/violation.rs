//! Safety violations: reportable invariant breaches.
//!
//! A violation is a reportable condition, not necessarily an error. In
//! advisory mode violations are logged and returned alongside successful
//! results; in strict mode they abort the triggering operation.

use crate::core::agent::AgentId;
use crate::core::scope::ScopePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The invariant family a violation belongs to.
///
/// A closed enum so call sites can match exhaustively; no stringly-typed
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A lock or sync entry references a scope nothing has declared.
    ContextConsistency,
    /// The dependency graph is cyclic, self-referential, over the
    /// per-scope limit, or a scope completed ahead of its dependencies.
    DependencyIntegrity,
    /// An agent is stalled, or too many agents are working under lock.
    AgentCoordination,
    /// Lock-table inconsistency: orphaned holder, over-limit agent,
    /// duplicate holders, or an unreaped expired lock.
    LockConsistency,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::ContextConsistency => write!(f, "context-consistency"),
            ViolationKind::DependencyIntegrity => write!(f, "dependency-integrity"),
            ViolationKind::AgentCoordination => write!(f, "agent-coordination"),
            ViolationKind::LockConsistency => write!(f, "lock-consistency"),
        }
    }
}

/// What a violation is about: an agent or a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum ViolationSubject {
    /// The violation concerns an agent.
    Agent(AgentId),
    /// The violation concerns a scope.
    Scope(ScopePath),
}

impl std::fmt::Display for ViolationSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSubject::Agent(id) => write!(f, "agent {}", id),
            ViolationSubject::Scope(path) => write!(f, "scope {}", path),
        }
    }
}

/// A detected breach of a safety invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyViolation {
    /// Which invariant family was breached.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub message: String,
    /// The agent or scope at fault.
    pub subject: ViolationSubject,
    /// When the breach was detected.
    pub detected_at: DateTime<Utc>,
}

impl SafetyViolation {
    /// Build a violation detected at the given instant.
    pub fn new(
        kind: ViolationKind,
        subject: ViolationSubject,
        message: impl Into<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            subject,
            detected_at,
        }
    }

    /// Whether this violation names the given agent.
    pub fn concerns_agent(&self, id: &AgentId) -> bool {
        matches!(&self.subject, ViolationSubject::Agent(a) if a == id)
    }

    /// Whether this violation names the given scope.
    pub fn concerns_scope(&self, path: &ScopePath) -> bool {
        matches!(&self.subject, ViolationSubject::Scope(s) if s == path)
    }
}
