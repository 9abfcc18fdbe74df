//! Safety-invariant validation over read-only snapshots.
//!
//! The validator is pure: it owns no state beyond the configured limits
//! and mutates nothing. The four checks are independent — a finding in
//! one never suppresses the others — and run in a fixed order so the
//! combined violation list is deterministic for a given snapshot.

use crate::config::CoordinationConfig;
use crate::core::agent::{Agent, AgentId};
use crate::core::lock::ScopeLock;
use crate::core::scope::ScopePath;
use crate::core::sync::{ScopeSync, SyncStatus};
use crate::core::violation::{SafetyViolation, ViolationKind, ViolationSubject};
use chrono::{DateTime, Utc};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Read-only view of the full coordination state at one instant.
#[derive(Debug, Clone)]
pub struct CoordinationSnapshot {
    /// All registered agents.
    pub agents: Vec<Agent>,
    /// All held locks.
    pub locks: Vec<ScopeLock>,
    /// All declared sync records.
    pub syncs: Vec<ScopeSync>,
    /// Every declared scope path.
    pub known_scopes: HashSet<ScopePath>,
    /// When the snapshot was taken; expiry is judged against this.
    pub taken_at: DateTime<Utc>,
}

/// Stateless checker for the coordination safety invariants.
#[derive(Debug, Clone)]
pub struct SafetyValidator {
    max_concurrent_agents: usize,
    max_block_time: chrono::Duration,
    max_locks_per_agent: usize,
    max_dependencies_per_scope: usize,
}

impl SafetyValidator {
    /// Build a validator from the configured limits.
    pub fn new(config: &CoordinationConfig) -> Self {
        Self {
            max_concurrent_agents: config.max_concurrent_agents,
            max_block_time: config.max_block_time(),
            max_locks_per_agent: config.max_locks_per_agent,
            max_dependencies_per_scope: config.max_dependencies_per_scope,
        }
    }

    /// Run all four checks and collect every finding.
    pub fn validate(&self, snapshot: &CoordinationSnapshot) -> Vec<SafetyViolation> {
        let mut violations = self.check_context_consistency(snapshot);
        violations.extend(self.check_dependency_integrity(snapshot));
        violations.extend(self.check_agent_coordination(snapshot));
        violations.extend(self.check_lock_consistency(snapshot));
        violations
    }

    /// Every scope referenced by a lock or a sync dependency must be
    /// declared; no dangling references.
    pub fn check_context_consistency(&self, snapshot: &CoordinationSnapshot) -> Vec<SafetyViolation> {
        let mut violations = Vec::new();

        for lock in &snapshot.locks {
            if !snapshot.known_scopes.contains(&lock.scope) {
                violations.push(SafetyViolation::new(
                    ViolationKind::ContextConsistency,
                    ViolationSubject::Scope(lock.scope.clone()),
                    format!("lock references undeclared scope {}", lock.scope),
                    snapshot.taken_at,
                ));
            }
        }

        for sync in &snapshot.syncs {
            for dep in &sync.dependencies {
                if !snapshot.known_scopes.contains(dep) {
                    violations.push(SafetyViolation::new(
                        ViolationKind::ContextConsistency,
                        ViolationSubject::Scope(sync.scope.clone()),
                        format!("scope {} depends on undeclared scope {}", sync.scope, dep),
                        snapshot.taken_at,
                    ));
                }
            }
        }

        violations.sort_by(|a, b| a.message.cmp(&b.message));
        violations
    }

    /// The dependency graph must be acyclic with no self-dependencies,
    /// each scope within the dependency limit, and no scope Completed
    /// ahead of its dependencies.
    pub fn check_dependency_integrity(&self, snapshot: &CoordinationSnapshot) -> Vec<SafetyViolation> {
        let mut violations = Vec::new();
        let at = snapshot.taken_at;

        let status_of: HashMap<&ScopePath, SyncStatus> = snapshot
            .syncs
            .iter()
            .map(|s| (&s.scope, s.status))
            .collect();

        for sync in &snapshot.syncs {
            if sync.dependencies.contains(&sync.scope) {
                violations.push(SafetyViolation::new(
                    ViolationKind::DependencyIntegrity,
                    ViolationSubject::Scope(sync.scope.clone()),
                    format!("scope {} depends on itself", sync.scope),
                    at,
                ));
            }

            if sync.dependencies.len() > self.max_dependencies_per_scope {
                violations.push(SafetyViolation::new(
                    ViolationKind::DependencyIntegrity,
                    ViolationSubject::Scope(sync.scope.clone()),
                    format!(
                        "scope {} declares {} dependencies, limit is {}",
                        sync.scope,
                        sync.dependencies.len(),
                        self.max_dependencies_per_scope
                    ),
                    at,
                ));
            }

            if sync.status == SyncStatus::Completed {
                let unmet: Vec<&ScopePath> = sync
                    .dependencies
                    .iter()
                    .filter(|dep| status_of.get(*dep).copied() != Some(SyncStatus::Completed))
                    .collect();
                if !unmet.is_empty() {
                    violations.push(SafetyViolation::new(
                        ViolationKind::DependencyIntegrity,
                        ViolationSubject::Scope(sync.scope.clone()),
                        format!(
                            "scope {} is completed but {} of its dependencies are not",
                            sync.scope,
                            unmet.len()
                        ),
                        at,
                    ));
                }
            }
        }

        if let Some(on_cycle) = find_cycle_member(&snapshot.syncs) {
            violations.push(SafetyViolation::new(
                ViolationKind::DependencyIntegrity,
                ViolationSubject::Scope(on_cycle.clone()),
                format!("dependency graph contains a cycle through {}", on_cycle),
                at,
            ));
        }

        violations.sort_by(|a, b| a.message.cmp(&b.message));
        violations
    }

    /// Agents must not stall in Blocked, and the number of agents
    /// Working while holding a lock must stay within the limit.
    pub fn check_agent_coordination(&self, snapshot: &CoordinationSnapshot) -> Vec<SafetyViolation> {
        let mut violations = Vec::new();
        let at = snapshot.taken_at;

        for agent in &snapshot.agents {
            if let Some(blocked) = agent.blocked_for(at) {
                if blocked > self.max_block_time {
                    violations.push(SafetyViolation::new(
                        ViolationKind::AgentCoordination,
                        ViolationSubject::Agent(agent.id.clone()),
                        format!(
                            "agent {} blocked for {}s, limit is {}s",
                            agent.id,
                            blocked.num_seconds(),
                            self.max_block_time.num_seconds()
                        ),
                        at,
                    ));
                }
            }
        }

        let mut working: Vec<&AgentId> = snapshot
            .agents
            .iter()
            .filter(|agent| agent.is_working_with_lock())
            .map(|agent| &agent.id)
            .collect();
        working.sort();
        if working.len() > self.max_concurrent_agents {
            violations.push(SafetyViolation::new(
                ViolationKind::AgentCoordination,
                ViolationSubject::Agent(working[0].clone()),
                format!(
                    "{} agents working while holding locks, limit is {}",
                    working.len(),
                    self.max_concurrent_agents
                ),
                at,
            ));
        }

        violations.sort_by(|a, b| a.message.cmp(&b.message));
        violations
    }

    /// Lock-table invariants: unique holder per scope, per-agent lock
    /// limit, no orphaned holders, no unreaped expired locks.
    pub fn check_lock_consistency(&self, snapshot: &CoordinationSnapshot) -> Vec<SafetyViolation> {
        let mut violations = Vec::new();
        let at = snapshot.taken_at;

        let live: HashSet<&AgentId> = snapshot.agents.iter().map(|a| &a.id).collect();

        let mut seen_scopes: HashSet<&ScopePath> = HashSet::new();
        let mut held_counts: HashMap<&AgentId, usize> = HashMap::new();

        for lock in &snapshot.locks {
            if !seen_scopes.insert(&lock.scope) {
                violations.push(SafetyViolation::new(
                    ViolationKind::LockConsistency,
                    ViolationSubject::Scope(lock.scope.clone()),
                    format!("scope {} appears in the lock table more than once", lock.scope),
                    at,
                ));
            }

            *held_counts.entry(&lock.holder).or_insert(0) += 1;

            if !live.contains(&lock.holder) {
                violations.push(SafetyViolation::new(
                    ViolationKind::LockConsistency,
                    ViolationSubject::Scope(lock.scope.clone()),
                    format!(
                        "lock {} held by unregistered agent {}",
                        lock.scope, lock.holder
                    ),
                    at,
                ));
            }

            if lock.is_expired(at) {
                violations.push(SafetyViolation::new(
                    ViolationKind::LockConsistency,
                    ViolationSubject::Scope(lock.scope.clone()),
                    format!("lock {} expired but not yet reclaimed", lock.scope),
                    at,
                ));
            }
        }

        let mut over_limit: Vec<(&AgentId, usize)> = held_counts
            .into_iter()
            .filter(|(_, count)| *count > self.max_locks_per_agent)
            .collect();
        over_limit.sort();
        for (agent, count) in over_limit {
            violations.push(SafetyViolation::new(
                ViolationKind::LockConsistency,
                ViolationSubject::Agent(agent.clone()),
                format!(
                    "agent {} holds {} locks, limit is {}",
                    agent, count, self.max_locks_per_agent
                ),
                at,
            ));
        }

        violations.sort_by(|a, b| a.message.cmp(&b.message));
        violations
    }
}

/// Find one scope participating in a dependency cycle, if any exists.
fn find_cycle_member(syncs: &[ScopeSync]) -> Option<&ScopePath> {
    let mut graph: DiGraph<&ScopePath, ()> = DiGraph::new();
    let mut index: HashMap<&ScopePath, NodeIndex> = HashMap::new();

    for sync in syncs {
        if !index.contains_key(&sync.scope) {
            let n = graph.add_node(&sync.scope);
            index.insert(&sync.scope, n);
        }
        for dep in &sync.dependencies {
            if !index.contains_key(dep) {
                let n = graph.add_node(dep);
                index.insert(dep, n);
            }
        }
    }

    for sync in syncs {
        let to = index[&sync.scope];
        for dep in &sync.dependencies {
            let from = index[dep];
            graph.add_edge(from, to, ());
        }
    }

    if !is_cyclic_directed(&graph) {
        return None;
    }

    match petgraph::algo::toposort(&graph, None) {
        Err(cycle) => Some(graph[cycle.node_id()]),
        Ok(_) => None,
    }
}
