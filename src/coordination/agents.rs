//! Agent registry and lifecycle management.
//!
//! The `AgentManager` owns the agent table and enforces the lifecycle
//! state machine. It never touches the lock table; cross-component
//! operations (leave, lock bookkeeping) are orchestrated by the
//! coordination service, which calls back in here to keep each agent's
//! `held_locks` view current.

use crate::clock::SharedClock;
use crate::core::agent::{Agent, AgentId, AgentState};
use crate::core::scope::ScopePath;
use crate::core::violation::{SafetyViolation, ViolationKind, ViolationSubject};
use crate::error::AgentError;
use crate::qlog_debug;
use std::collections::{HashMap, HashSet};

/// Registry of joined agents.
pub struct AgentManager {
    /// Joined agents indexed by id.
    agents: HashMap<AgentId, Agent>,
    /// How long an agent may stay Blocked before being flagged.
    max_block_time: chrono::Duration,
    /// Injected time source.
    clock: SharedClock,
}

impl AgentManager {
    /// Create an empty registry.
    pub fn new(max_block_time: chrono::Duration, clock: SharedClock) -> Self {
        Self {
            agents: HashMap::new(),
            max_block_time,
            clock,
        }
    }

    /// Register a new agent in Idle state.
    ///
    /// # Errors
    /// `AlreadyJoined` if an agent with this id is present.
    pub fn join(&mut self, id: AgentId) -> Result<(), AgentError> {
        if self.agents.contains_key(&id) {
            return Err(AgentError::AlreadyJoined(id));
        }
        qlog_debug!("agent {} joined", id);
        let now = self.clock.now();
        self.agents.insert(id.clone(), Agent::new(id, now));
        Ok(())
    }

    /// Remove an agent from the registry, returning its final record.
    ///
    /// The caller (the coordination service) is responsible for
    /// force-releasing the agent's locks first.
    ///
    /// # Errors
    /// `UnknownAgent` if no such agent is registered.
    pub fn remove(&mut self, id: &AgentId) -> Result<Agent, AgentError> {
        self.agents
            .remove(id)
            .ok_or_else(|| AgentError::UnknownAgent(id.clone()))
    }

    /// Transition an agent to a new state.
    ///
    /// Validated against the transition table in
    /// [`AgentState::can_transition`]; an illegal pair leaves the state
    /// unchanged. Leaving Blocked resets `last_progress_at`.
    ///
    /// # Errors
    /// `UnknownAgent` or `InvalidTransition`.
    pub fn set_state(&mut self, id: &AgentId, target: AgentState) -> Result<(), AgentError> {
        let agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| AgentError::UnknownAgent(id.clone()))?;

        if !agent.state.can_transition(target) {
            return Err(AgentError::InvalidTransition {
                from: agent.state,
                to: target,
            });
        }

        let leaving_blocked = agent.state == AgentState::Blocked;
        agent.state = target;
        if leaving_blocked {
            agent.last_progress_at = self.clock.now();
        }
        qlog_debug!("agent {} -> {}", id, target);
        Ok(())
    }

    /// Flag every agent that has been Blocked longer than the configured
    /// maximum. Read-only; mutates nothing.
    pub fn check_progress(&self) -> Vec<SafetyViolation> {
        let now = self.clock.now();
        let mut violations: Vec<SafetyViolation> = self
            .agents
            .values()
            .filter_map(|agent| {
                let blocked = agent.blocked_for(now)?;
                if blocked > self.max_block_time {
                    Some(SafetyViolation::new(
                        ViolationKind::AgentCoordination,
                        ViolationSubject::Agent(agent.id.clone()),
                        format!(
                            "agent {} blocked for {}s, limit is {}s",
                            agent.id,
                            blocked.num_seconds(),
                            self.max_block_time.num_seconds()
                        ),
                        now,
                    ))
                } else {
                    None
                }
            })
            .collect();
        violations.sort_by(|a, b| a.message.cmp(&b.message));
        violations
    }

    /// Look up an agent by id.
    pub fn get(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Whether an agent with this id is registered.
    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    /// Ids of all registered agents.
    pub fn agent_ids(&self) -> HashSet<AgentId> {
        self.agents.keys().cloned().collect()
    }

    /// Snapshot of all agents.
    pub fn agents(&self) -> Vec<Agent> {
        self.agents.values().cloned().collect()
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Record that an agent was granted a scope lock.
    pub(crate) fn record_lock_acquired(&mut self, id: &AgentId, scope: &ScopePath) {
        if let Some(agent) = self.agents.get_mut(id) {
            agent.held_locks.insert(scope.clone());
        }
    }

    /// Record that an agent's scope lock went away (release or expiry).
    pub(crate) fn record_lock_released(&mut self, id: &AgentId, scope: &ScopePath) {
        if let Some(agent) = self.agents.get_mut(id) {
            agent.held_locks.remove(scope);
        }
    }

    /// Put back a previously captured agent record. Rollback use only.
    pub(crate) fn restore(&mut self, agent: Agent) {
        self.agents.insert(agent.id.clone(), agent);
    }

    /// Drop an agent without existence checks. Rollback use only.
    pub(crate) fn remove_forced(&mut self, id: &AgentId) {
        self.agents.remove(id);
    }
}
