//! The coordination service: single entry point for all operations.
//!
//! `CoordinationService` owns the three stateful components behind
//! per-component `RwLock`s and orchestrates every cross-component
//! operation. Guards are always taken in the fixed order agents →
//! locks → sync, which rules out deadlock between concurrent requests.
//!
//! Every mutating operation validates the resulting state before
//! returning. In advisory mode (the default) violations are recorded and
//! returned alongside the successful outcome; in strict mode the
//! mutation is rolled back and the request fails with `SafetyRejected`.
//! Rollback happens while the write guards are still held, so no other
//! request can observe the intermediate state.

use crate::clock::{SharedClock, SystemClock};
use crate::config::CoordinationConfig;
use crate::coordination::agents::AgentManager;
use crate::coordination::locks::LockManager;
use crate::coordination::sync::SyncCoordinator;
use crate::coordination::validator::{CoordinationSnapshot, SafetyValidator};
use crate::core::agent::{Agent, AgentId, AgentState};
use crate::core::lock::{LockEvent, ScopeLock};
use crate::core::scope::ScopePath;
use crate::core::sync::{ScopeSync, SyncStatus};
use crate::core::violation::SafetyViolation;
use crate::error::{AgentError, CoordinationError};
use crate::{qlog, qlog_debug, qlog_warn};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A coordination operation, in enum form for callers that route
/// requests through a single channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationRequest {
    Join { agent: AgentId },
    Leave { agent: AgentId },
    SetAgentState { agent: AgentId, state: AgentState },
    AcquireLock { agent: AgentId, scope: ScopePath },
    ReleaseLock { agent: AgentId, scope: ScopePath },
    DeclareScope { scope: ScopePath, dependencies: Vec<ScopePath> },
    StartSync { scope: ScopePath },
    CompleteSync { scope: ScopePath },
    FailSync { scope: ScopePath, error: String },
}

/// What a successful operation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationOutcome {
    Joined,
    /// The agent left; these scopes were force-released on the way out.
    Left { released: Vec<ScopePath> },
    StateChanged,
    /// `granted: false` means the scope is held by another agent. Not an
    /// error; the caller decides whether to retry.
    LockAcquired { granted: bool },
    LockReleased,
    ScopeDeclared,
    SyncStarted,
    /// These dependents became ready; none of them were started.
    SyncCompleted { ready: Vec<ScopePath> },
    SyncFailed,
}

/// A successful operation plus any violations the resulting state shows.
///
/// In strict mode `violations` is always empty (a violating mutation is
/// rolled back and the request errors instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationResponse {
    pub outcome: CoordinationOutcome,
    pub violations: Vec<SafetyViolation>,
}

impl CoordinationResponse {
    fn clean(outcome: CoordinationOutcome) -> Self {
        Self {
            outcome,
            violations: Vec::new(),
        }
    }
}

/// Notifications pushed to the optional event channel.
///
/// Delivery is best effort: events are sent with `try_send` and dropped
/// when the channel is full or closed, so a slow subscriber can never
/// stall an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationEvent {
    AgentJoined(AgentId),
    AgentLeft { agent: AgentId, released: Vec<ScopePath> },
    AgentStateChanged { agent: AgentId, state: AgentState },
    LockAcquired { scope: ScopePath, agent: AgentId },
    LockReleased { scope: ScopePath, agent: AgentId },
    LockExpired { scope: ScopePath, agent: AgentId },
    ScopeDeclared { scope: ScopePath },
    SyncStarted { scope: ScopePath },
    SyncCompleted { scope: ScopePath, ready: Vec<ScopePath> },
    SyncFailed { scope: ScopePath },
    ViolationsDetected(Vec<SafetyViolation>),
}

/// Facade over the agent registry, lock table, and sync coordinator.
pub struct CoordinationService {
    config: CoordinationConfig,
    validator: SafetyValidator,
    agents: RwLock<AgentManager>,
    locks: RwLock<LockManager>,
    sync: RwLock<SyncCoordinator>,
    /// Bounded ring of detected violations, oldest evicted first.
    violations: StdMutex<VecDeque<SafetyViolation>>,
    /// Single-flight gate for the sweep; an overlapping run is skipped.
    sweep_gate: AsyncMutex<()>,
    events: Option<mpsc::Sender<CoordinationEvent>>,
    clock: SharedClock,
}

impl CoordinationService {
    /// Build a service on the system clock.
    pub fn new(config: CoordinationConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a service on an injected clock.
    pub fn with_clock(config: CoordinationConfig, clock: SharedClock) -> Self {
        let validator = SafetyValidator::new(&config);
        let agents = AgentManager::new(config.max_block_time(), clock.clone());
        let locks = LockManager::new(
            config.lock_timeout(),
            config.max_locks_per_agent,
            config.history_capacity,
            clock.clone(),
        );
        let sync = SyncCoordinator::new(config.max_dependencies_per_scope, clock.clone());
        Self {
            config,
            validator,
            agents: RwLock::new(agents),
            locks: RwLock::new(locks),
            sync: RwLock::new(sync),
            violations: StdMutex::new(VecDeque::new()),
            sweep_gate: AsyncMutex::new(()),
            events: None,
            clock,
        }
    }

    /// Attach an event channel. Call before sharing the service.
    pub fn with_event_channel(mut self, sender: mpsc::Sender<CoordinationEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// The configuration this service was built with.
    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Route an enum-form request to the matching operation.
    pub async fn handle(
        &self,
        request: CoordinationRequest,
    ) -> Result<CoordinationResponse, CoordinationError> {
        match request {
            CoordinationRequest::Join { agent } => self.join(agent).await,
            CoordinationRequest::Leave { agent } => self.leave(agent).await,
            CoordinationRequest::SetAgentState { agent, state } => {
                self.set_agent_state(agent, state).await
            }
            CoordinationRequest::AcquireLock { agent, scope } => {
                self.acquire_lock(agent, scope).await
            }
            CoordinationRequest::ReleaseLock { agent, scope } => {
                self.release_lock(agent, scope).await
            }
            CoordinationRequest::DeclareScope { scope, dependencies } => {
                self.declare_scope(scope, dependencies).await
            }
            CoordinationRequest::StartSync { scope } => self.start_sync(scope).await,
            CoordinationRequest::CompleteSync { scope } => self.complete_sync(scope).await,
            CoordinationRequest::FailSync { scope, error } => {
                self.fail_sync(scope, error).await
            }
        }
    }

    /// Register a new agent.
    pub async fn join(&self, agent: AgentId) -> Result<CoordinationResponse, CoordinationError> {
        let mut agents = self.agents.write().await;
        let locks = self.locks.read().await;
        let sync = self.sync.read().await;

        agents.join(agent.clone())?;

        let violations = self.validate_guards(&agents, &locks, &sync);
        if !violations.is_empty() && self.config.strict_validation {
            agents.remove_forced(&agent);
            return Err(CoordinationError::SafetyRejected { violations });
        }
        self.emit(CoordinationEvent::AgentJoined(agent));
        self.finish(CoordinationOutcome::Joined, violations)
    }

    /// Deregister an agent, force-releasing everything it holds.
    pub async fn leave(&self, agent: AgentId) -> Result<CoordinationResponse, CoordinationError> {
        let mut agents = self.agents.write().await;
        let mut locks = self.locks.write().await;
        let sync = self.sync.read().await;

        let prior_agent = agents
            .get(&agent)
            .cloned()
            .ok_or_else(|| AgentError::UnknownAgent(agent.clone()))?;
        let prior_locks: Vec<ScopeLock> = locks
            .locks_held_by(&agent)
            .iter()
            .filter_map(|scope| locks.get(scope).cloned())
            .collect();

        let released = locks.force_release_agent(&agent);
        agents.remove(&agent)?;
        qlog!("agent {} left, released {} lock(s)", agent, released.len());

        let violations = self.validate_guards(&agents, &locks, &sync);
        if !violations.is_empty() && self.config.strict_validation {
            agents.restore(prior_agent);
            locks.pop_events(released.len());
            for lock in prior_locks {
                let scope = lock.scope.clone();
                locks.restore_entry(&scope, Some(lock));
            }
            return Err(CoordinationError::SafetyRejected { violations });
        }
        self.emit(CoordinationEvent::AgentLeft {
            agent,
            released: released.clone(),
        });
        self.finish(CoordinationOutcome::Left { released }, violations)
    }

    /// Transition an agent through its lifecycle state machine.
    pub async fn set_agent_state(
        &self,
        agent: AgentId,
        state: AgentState,
    ) -> Result<CoordinationResponse, CoordinationError> {
        let mut agents = self.agents.write().await;
        let locks = self.locks.read().await;
        let sync = self.sync.read().await;

        let prior = agents.get(&agent).cloned();
        agents.set_state(&agent, state)?;

        let violations = self.validate_guards(&agents, &locks, &sync);
        if !violations.is_empty() && self.config.strict_validation {
            if let Some(prior) = prior {
                agents.restore(prior);
            }
            return Err(CoordinationError::SafetyRejected { violations });
        }
        self.emit(CoordinationEvent::AgentStateChanged { agent, state });
        self.finish(CoordinationOutcome::StateChanged, violations)
    }

    /// Try to take the exclusive lock on a scope.
    pub async fn acquire_lock(
        &self,
        agent: AgentId,
        scope: ScopePath,
    ) -> Result<CoordinationResponse, CoordinationError> {
        let mut agents = self.agents.write().await;
        let mut locks = self.locks.write().await;
        let sync = self.sync.read().await;

        if !agents.contains(&agent) {
            return Err(AgentError::UnknownAgent(agent).into());
        }

        let prior_agent = agents.get(&agent).cloned();
        let prior_entry = locks.get(&scope).cloned();
        let granted = locks.acquire(&scope, &agent)?;
        if !granted {
            // Nothing changed; no validation pass needed.
            return Ok(CoordinationResponse::clean(
                CoordinationOutcome::LockAcquired { granted: false },
            ));
        }
        agents.record_lock_acquired(&agent, &scope);

        let violations = self.validate_guards(&agents, &locks, &sync);
        if !violations.is_empty() && self.config.strict_validation {
            locks.restore_entry(&scope, prior_entry);
            locks.pop_events(1);
            if let Some(prior) = prior_agent {
                agents.restore(prior);
            }
            return Err(CoordinationError::SafetyRejected { violations });
        }
        self.emit(CoordinationEvent::LockAcquired { scope, agent });
        self.finish(CoordinationOutcome::LockAcquired { granted: true }, violations)
    }

    /// Release a lock held by the calling agent.
    pub async fn release_lock(
        &self,
        agent: AgentId,
        scope: ScopePath,
    ) -> Result<CoordinationResponse, CoordinationError> {
        let mut agents = self.agents.write().await;
        let mut locks = self.locks.write().await;
        let sync = self.sync.read().await;

        if !agents.contains(&agent) {
            return Err(AgentError::UnknownAgent(agent).into());
        }

        let prior_agent = agents.get(&agent).cloned();
        let prior_entry = locks.get(&scope).cloned();
        locks.release(&scope, &agent)?;
        agents.record_lock_released(&agent, &scope);

        let violations = self.validate_guards(&agents, &locks, &sync);
        if !violations.is_empty() && self.config.strict_validation {
            locks.restore_entry(&scope, prior_entry);
            locks.pop_events(1);
            if let Some(prior) = prior_agent {
                agents.restore(prior);
            }
            return Err(CoordinationError::SafetyRejected { violations });
        }
        self.emit(CoordinationEvent::LockReleased { scope, agent });
        self.finish(CoordinationOutcome::LockReleased, violations)
    }

    /// Declare a scope and its dependencies.
    pub async fn declare_scope(
        &self,
        scope: ScopePath,
        dependencies: Vec<ScopePath>,
    ) -> Result<CoordinationResponse, CoordinationError> {
        let agents = self.agents.read().await;
        let locks = self.locks.read().await;
        let mut sync = self.sync.write().await;

        sync.declare_scope(scope.clone(), dependencies)?;

        let violations = self.validate_guards(&agents, &locks, &sync);
        if !violations.is_empty() && self.config.strict_validation {
            sync.undeclare(&scope);
            return Err(CoordinationError::SafetyRejected { violations });
        }
        self.emit(CoordinationEvent::ScopeDeclared { scope });
        self.finish(CoordinationOutcome::ScopeDeclared, violations)
    }

    /// Begin syncing a scope.
    pub async fn start_sync(
        &self,
        scope: ScopePath,
    ) -> Result<CoordinationResponse, CoordinationError> {
        let agents = self.agents.read().await;
        let locks = self.locks.read().await;
        let mut sync = self.sync.write().await;

        let prior = sync.get(&scope).cloned();
        sync.start_sync(&scope)?;

        let violations = self.validate_guards(&agents, &locks, &sync);
        if !violations.is_empty() && self.config.strict_validation {
            if let Some(prior) = prior {
                sync.restore_record(prior);
            }
            return Err(CoordinationError::SafetyRejected { violations });
        }
        self.emit(CoordinationEvent::SyncStarted { scope });
        self.finish(CoordinationOutcome::SyncStarted, violations)
    }

    /// Finish a sync; the response lists dependents that became ready.
    pub async fn complete_sync(
        &self,
        scope: ScopePath,
    ) -> Result<CoordinationResponse, CoordinationError> {
        let agents = self.agents.read().await;
        let locks = self.locks.read().await;
        let mut sync = self.sync.write().await;

        let prior = sync.get(&scope).cloned();
        let ready = sync.complete_sync(&scope)?;

        let violations = self.validate_guards(&agents, &locks, &sync);
        if !violations.is_empty() && self.config.strict_validation {
            if let Some(prior) = prior {
                sync.restore_record(prior);
            }
            return Err(CoordinationError::SafetyRejected { violations });
        }
        self.emit(CoordinationEvent::SyncCompleted {
            scope,
            ready: ready.clone(),
        });
        self.finish(CoordinationOutcome::SyncCompleted { ready }, violations)
    }

    /// Record a sync failure.
    pub async fn fail_sync(
        &self,
        scope: ScopePath,
        error: String,
    ) -> Result<CoordinationResponse, CoordinationError> {
        let agents = self.agents.read().await;
        let locks = self.locks.read().await;
        let mut sync = self.sync.write().await;

        let prior = sync.get(&scope).cloned();
        sync.fail_sync(&scope, error)?;

        let violations = self.validate_guards(&agents, &locks, &sync);
        if !violations.is_empty() && self.config.strict_validation {
            if let Some(prior) = prior {
                sync.restore_record(prior);
            }
            return Err(CoordinationError::SafetyRejected { violations });
        }
        self.emit(CoordinationEvent::SyncFailed { scope });
        self.finish(CoordinationOutcome::SyncFailed, violations)
    }

    /// Reap expired locks and flag stalled agents and orphaned locks.
    /// Returns the reaped locks.
    ///
    /// Single-flight: if a sweep is already running this call returns
    /// immediately with an empty list. Sweep findings are always
    /// advisory, even in strict mode — there is no caller to reject.
    pub async fn run_sweep(&self) -> Vec<ScopeLock> {
        let Ok(_gate) = self.sweep_gate.try_lock() else {
            qlog_debug!("sweep already running, skipping");
            return Vec::new();
        };

        let mut agents = self.agents.write().await;
        let mut locks = self.locks.write().await;

        let reaped = locks.cleanup_expired();
        for lock in &reaped {
            agents.record_lock_released(&lock.holder, &lock.scope);
            self.emit(CoordinationEvent::LockExpired {
                scope: lock.scope.clone(),
                agent: lock.holder.clone(),
            });
        }

        let mut violations = agents.check_progress();
        violations.extend(locks.check_consistency(&agents.agent_ids()));
        if !violations.is_empty() {
            qlog_warn!("sweep found {} violation(s)", violations.len());
            self.record_violations(&violations);
            self.emit(CoordinationEvent::ViolationsDetected(violations));
        }
        reaped
    }

    /// Spawn the periodic sweep task. It ticks every
    /// [`CoordinationConfig::sweep_interval`] until the token is
    /// cancelled.
    pub fn spawn_sweep(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let period = service.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; consume that so the first
            // sweep waits a full period.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        qlog_debug!("sweep task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        service.run_sweep().await;
                    }
                }
            }
        })
    }

    /// Validate the current state without mutating or recording.
    pub async fn validate_now(&self) -> Vec<SafetyViolation> {
        let agents = self.agents.read().await;
        let locks = self.locks.read().await;
        let sync = self.sync.read().await;
        self.validate_guards(&agents, &locks, &sync)
    }

    /// A registered agent's current record.
    pub async fn agent(&self, id: &AgentId) -> Option<Agent> {
        self.agents.read().await.get(id).cloned()
    }

    /// All registered agents.
    pub async fn agents(&self) -> Vec<Agent> {
        self.agents.read().await.agents()
    }

    /// The current holder of a scope's lock.
    pub async fn lock_holder(&self, scope: &ScopePath) -> Option<AgentId> {
        self.locks.read().await.holder(scope).cloned()
    }

    /// All currently held locks.
    pub async fn locks(&self) -> Vec<ScopeLock> {
        self.locks.read().await.locks()
    }

    /// The lock audit ring, oldest first.
    pub async fn lock_history(&self) -> Vec<LockEvent> {
        self.locks.read().await.history()
    }

    /// A declared scope's sync status.
    pub async fn sync_status(&self, scope: &ScopePath) -> Option<SyncStatus> {
        self.sync.read().await.status(scope)
    }

    /// All declared sync records.
    pub async fn syncs(&self) -> Vec<ScopeSync> {
        self.sync.read().await.syncs()
    }

    /// Recorded violations, oldest first.
    pub fn recent_violations(&self) -> Vec<SafetyViolation> {
        self.violations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn validate_guards(
        &self,
        agents: &AgentManager,
        locks: &LockManager,
        sync: &SyncCoordinator,
    ) -> Vec<SafetyViolation> {
        self.validator
            .validate(&Self::snapshot(agents, locks, sync, self.clock.now()))
    }

    fn snapshot(
        agents: &AgentManager,
        locks: &LockManager,
        sync: &SyncCoordinator,
        taken_at: DateTime<Utc>,
    ) -> CoordinationSnapshot {
        CoordinationSnapshot {
            agents: agents.agents(),
            locks: locks.locks(),
            syncs: sync.syncs(),
            known_scopes: sync.known_scopes(),
            taken_at,
        }
    }

    /// Advisory-mode tail: record and announce violations, then return
    /// the successful response with them attached.
    fn finish(
        &self,
        outcome: CoordinationOutcome,
        violations: Vec<SafetyViolation>,
    ) -> Result<CoordinationResponse, CoordinationError> {
        if !violations.is_empty() {
            qlog_warn!("{} safety violation(s) detected", violations.len());
            self.record_violations(&violations);
            self.emit(CoordinationEvent::ViolationsDetected(violations.clone()));
        }
        Ok(CoordinationResponse { outcome, violations })
    }

    fn record_violations(&self, violations: &[SafetyViolation]) {
        if self.config.history_capacity == 0 {
            return;
        }
        let mut ring = self.violations.lock().unwrap_or_else(|e| e.into_inner());
        for violation in violations {
            while ring.len() >= self.config.history_capacity {
                ring.pop_front();
            }
            ring.push_back(violation.clone());
        }
    }

    fn emit(&self, event: CoordinationEvent) {
        if let Some(sender) = &self.events {
            if sender.try_send(event).is_err() {
                qlog_debug!("event channel full or closed, dropping event");
            }
        }
    }
}
