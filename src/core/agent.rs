//! Agent data model and lifecycle state machine.
//!
//! Agents are the autonomous participants (tools or AI processes) whose
//! access to shared scopes the coordination core arbitrates. Each agent
//! moves through an explicit state machine; the complete legal-transition
//! set lives in [`AgentState::can_transition`] so it is auditable in one
//! place.

use crate::core::scope::ScopePath;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Unique identifier for an agent, supplied by the caller at join time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an agent id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state of an agent.
///
/// There is no terminal state: a Completed agent may cycle back to Idle
/// to take new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Registered but not doing anything.
    Idle,
    /// Actively performing work.
    Working,
    /// Waiting on something external; subject to stall detection.
    Blocked,
    /// Finished its current unit of work.
    Completed,
}

impl AgentState {
    /// Whether a transition from `self` to `target` is legal.
    ///
    /// The full transition table:
    /// - Idle -> Working
    /// - Working -> Blocked
    /// - Working -> Completed
    /// - Blocked -> Working
    /// - Completed -> Idle
    pub fn can_transition(self, target: AgentState) -> bool {
        matches!(
            (self, target),
            (AgentState::Idle, AgentState::Working)
                | (AgentState::Working, AgentState::Blocked)
                | (AgentState::Working, AgentState::Completed)
                | (AgentState::Blocked, AgentState::Working)
                | (AgentState::Completed, AgentState::Idle)
        )
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Idle => write!(f, "idle"),
            AgentState::Working => write!(f, "working"),
            AgentState::Blocked => write!(f, "blocked"),
            AgentState::Completed => write!(f, "completed"),
        }
    }
}

/// A registered agent and its coordination-relevant state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Caller-supplied unique identifier.
    pub id: AgentId,
    /// Current lifecycle state.
    pub state: AgentState,
    /// When the agent joined.
    pub joined_at: DateTime<Utc>,
    /// Last time the agent made observable progress.
    ///
    /// Reset whenever the agent leaves Blocked. Stall detection compares
    /// this against `max_block_time` while the agent is Blocked.
    pub last_progress_at: DateTime<Utc>,
    /// Scopes this agent currently holds the lock for.
    pub held_locks: HashSet<ScopePath>,
}

impl Agent {
    /// Register a new agent in Idle state.
    pub fn new(id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            state: AgentState::Idle,
            joined_at: now,
            last_progress_at: now,
            held_locks: HashSet::new(),
        }
    }

    /// How long the agent has been blocked without progress, if Blocked.
    pub fn blocked_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.state {
            AgentState::Blocked => Some(now - self.last_progress_at),
            _ => None,
        }
    }

    /// Whether the agent counts against the concurrent-worker limit:
    /// Working while holding at least one lock.
    pub fn is_working_with_lock(&self) -> bool {
        self.state == AgentState::Working && !self.held_locks.is_empty()
    }
}
