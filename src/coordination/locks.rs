//! Exclusive per-scope locking with lazy expiry.
//!
//! The `LockManager` owns the scope→holder table and a bounded ring of
//! lock events for audit. Acquisition never waits: a lock held by
//! another agent yields `Ok(false)` and the caller decides whether to
//! retry. Expired locks stay in the table until the periodic sweep calls
//! [`LockManager::cleanup_expired`]; callers cannot trigger reclamation
//! directly, so a crashed agent's locks are reaped on the sweep's
//! schedule rather than whenever a competitor asks.

use crate::clock::SharedClock;
use crate::core::agent::AgentId;
use crate::core::lock::{LockEvent, LockEventKind, ScopeLock};
use crate::core::scope::ScopePath;
use crate::core::violation::{SafetyViolation, ViolationKind, ViolationSubject};
use crate::error::LockError;
use crate::{qlog_debug, qlog_warn};
use std::collections::{HashMap, HashSet, VecDeque};

/// Owner of the scope lock table.
pub struct LockManager {
    /// Held locks indexed by scope path. Keying by scope is what makes
    /// mutual exclusion structural.
    locks: HashMap<ScopePath, ScopeLock>,
    /// Bounded audit ring, oldest evicted first.
    history: VecDeque<LockEvent>,
    history_capacity: usize,
    /// Time-to-live granted on acquire and re-acquire.
    lock_timeout: chrono::Duration,
    /// Max scopes one agent may hold at once.
    max_locks_per_agent: usize,
    clock: SharedClock,
}

impl LockManager {
    /// Create an empty lock table.
    pub fn new(
        lock_timeout: chrono::Duration,
        max_locks_per_agent: usize,
        history_capacity: usize,
        clock: SharedClock,
    ) -> Self {
        Self {
            locks: HashMap::new(),
            history: VecDeque::new(),
            history_capacity,
            lock_timeout,
            max_locks_per_agent,
            clock,
        }
    }

    /// Try to acquire the lock on a scope.
    ///
    /// Returns `Ok(true)` when the scope was free or already held by the
    /// same agent (idempotent re-acquire, which extends the expiry), and
    /// `Ok(false)` when held by a different agent — even one whose lock
    /// has expired but not yet been reaped.
    ///
    /// # Errors
    /// `LockLimitExceeded` when granting a new scope would put the agent
    /// over `max_locks_per_agent`.
    pub fn acquire(&mut self, scope: &ScopePath, agent: &AgentId) -> Result<bool, LockError> {
        let now = self.clock.now();

        if let Some(existing) = self.locks.get_mut(scope) {
            if existing.holder != *agent {
                return Ok(false);
            }
            // Re-acquire by the holder refreshes the lease.
            existing.acquired_at = now;
            existing.expires_at = now + self.lock_timeout;
            self.push_event(scope.clone(), agent.clone(), LockEventKind::Acquired, now);
            return Ok(true);
        }

        let held = self.count_held_by(agent);
        if held >= self.max_locks_per_agent {
            return Err(LockError::LockLimitExceeded {
                agent: agent.clone(),
                held,
                max: self.max_locks_per_agent,
            });
        }

        self.locks.insert(
            scope.clone(),
            ScopeLock {
                scope: scope.clone(),
                holder: agent.clone(),
                acquired_at: now,
                expires_at: now + self.lock_timeout,
            },
        );
        self.push_event(scope.clone(), agent.clone(), LockEventKind::Acquired, now);
        qlog_debug!("lock {} acquired by {}", scope, agent);
        Ok(true)
    }

    /// Release a lock held by the calling agent.
    ///
    /// # Errors
    /// `NotHolder` when the scope is unlocked or held by someone else.
    pub fn release(&mut self, scope: &ScopePath, agent: &AgentId) -> Result<(), LockError> {
        match self.locks.get(scope) {
            Some(lock) if lock.holder == *agent => {
                self.locks.remove(scope);
                let now = self.clock.now();
                self.push_event(scope.clone(), agent.clone(), LockEventKind::Released, now);
                qlog_debug!("lock {} released by {}", scope, agent);
                Ok(())
            }
            _ => Err(LockError::NotHolder {
                scope: scope.clone(),
                agent: agent.clone(),
            }),
        }
    }

    /// Force-release every lock past its expiry, returning the reaped
    /// records. Invoked only by the periodic sweep.
    pub fn cleanup_expired(&mut self) -> Vec<ScopeLock> {
        let now = self.clock.now();
        let expired: Vec<ScopePath> = self
            .locks
            .values()
            .filter(|lock| lock.is_expired(now))
            .map(|lock| lock.scope.clone())
            .collect();

        let mut reaped = Vec::with_capacity(expired.len());
        for scope in expired {
            if let Some(lock) = self.locks.remove(&scope) {
                qlog_warn!("lock {} expired, held by {}", scope, lock.holder);
                self.push_event(scope, lock.holder.clone(), LockEventKind::Expired, now);
                reaped.push(lock);
            }
        }
        reaped
    }

    /// Flag locks whose holder is not in the live agent set.
    pub fn check_consistency(&self, live_agents: &HashSet<AgentId>) -> Vec<SafetyViolation> {
        let now = self.clock.now();
        self.locks
            .values()
            .filter(|lock| !live_agents.contains(&lock.holder))
            .map(|lock| {
                SafetyViolation::new(
                    ViolationKind::LockConsistency,
                    ViolationSubject::Scope(lock.scope.clone()),
                    format!(
                        "lock {} held by unregistered agent {}",
                        lock.scope, lock.holder
                    ),
                    now,
                )
            })
            .collect()
    }

    /// Force-release every lock held by an agent (leave path). Returns
    /// the released scope paths.
    pub fn force_release_agent(&mut self, agent: &AgentId) -> Vec<ScopePath> {
        let scopes = self.locks_held_by(agent);
        let now = self.clock.now();
        for scope in &scopes {
            self.locks.remove(scope);
            self.push_event(scope.clone(), agent.clone(), LockEventKind::Released, now);
        }
        scopes
    }

    /// Scopes currently locked by the given agent.
    pub fn locks_held_by(&self, agent: &AgentId) -> Vec<ScopePath> {
        let mut scopes: Vec<ScopePath> = self
            .locks
            .values()
            .filter(|lock| lock.holder == *agent)
            .map(|lock| lock.scope.clone())
            .collect();
        scopes.sort();
        scopes
    }

    /// The current holder of a scope's lock, if any.
    pub fn holder(&self, scope: &ScopePath) -> Option<&AgentId> {
        self.locks.get(scope).map(|lock| &lock.holder)
    }

    /// The full lock record for a scope, if held.
    pub fn get(&self, scope: &ScopePath) -> Option<&ScopeLock> {
        self.locks.get(scope)
    }

    /// Snapshot of all held locks.
    pub fn locks(&self) -> Vec<ScopeLock> {
        self.locks.values().cloned().collect()
    }

    /// Number of held locks.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no locks are held.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Snapshot of the audit ring, oldest first.
    pub fn history(&self) -> Vec<LockEvent> {
        self.history.iter().cloned().collect()
    }

    fn count_held_by(&self, agent: &AgentId) -> usize {
        self.locks
            .values()
            .filter(|lock| lock.holder == *agent)
            .count()
    }

    fn push_event(
        &mut self,
        scope: ScopePath,
        agent: AgentId,
        kind: LockEventKind,
        at: chrono::DateTime<chrono::Utc>,
    ) {
        if self.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(LockEvent {
            scope,
            agent,
            kind,
            at,
        });
    }

    /// Put back (or clear) a captured table entry. Rollback use only.
    pub(crate) fn restore_entry(&mut self, scope: &ScopePath, entry: Option<ScopeLock>) {
        match entry {
            Some(lock) => {
                self.locks.insert(scope.clone(), lock);
            }
            None => {
                self.locks.remove(scope);
            }
        }
    }

    /// Drop the most recent history events. Rollback use only, so a
    /// rolled-back mutation leaves no trace in the audit ring.
    pub(crate) fn pop_events(&mut self, count: usize) {
        for _ in 0..count {
            self.history.pop_back();
        }
    }
}
