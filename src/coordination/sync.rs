//! Cross-scope synchronization with dependency ordering.
//!
//! The `SyncCoordinator` owns per-scope sync status and the dependency
//! graph. Dependencies are declared up front and validated atomically: a
//! self-dependency, an over-limit declaration, or a cycle is rejected at
//! declaration time with no partial graph mutation, so a cycle can never
//! be discovered later during sync. The coordinator reads, but never
//! mutates, agent and lock state; it also never auto-starts a dependent
//! sync — [`SyncCoordinator::complete_sync`] reports which scopes became
//! ready and the caller decides.

use crate::clock::SharedClock;
use crate::core::scope::ScopePath;
use crate::core::sync::{DependencyCheck, ScopeSync, SyncStatus};
use crate::error::SyncError;
use crate::qlog_debug;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Owner of sync status and the scope dependency graph.
///
/// Graph edges run dependency → dependent: an edge A→B means A must be
/// Completed before B may start syncing. Dependencies may name scopes
/// that are not yet declared; those get placeholder nodes and show up as
/// context-consistency violations until declared.
pub struct SyncCoordinator {
    /// Sync records for declared scopes.
    records: HashMap<ScopePath, ScopeSync>,
    /// The dependency graph. Node weights are scope paths.
    graph: DiGraph<ScopePath, ()>,
    /// Scope path → node index, for fast lookups.
    node_index: HashMap<ScopePath, NodeIndex>,
    /// Max dependencies one scope may declare.
    max_dependencies_per_scope: usize,
    clock: SharedClock,
}

impl SyncCoordinator {
    /// Create an empty coordinator.
    pub fn new(max_dependencies_per_scope: usize, clock: SharedClock) -> Self {
        Self {
            records: HashMap::new(),
            graph: DiGraph::new(),
            node_index: HashMap::new(),
            max_dependencies_per_scope,
            clock,
        }
    }

    /// Declare a scope and its dependencies.
    ///
    /// Validation is atomic: on any error the records and graph are left
    /// exactly as they were.
    ///
    /// # Errors
    /// `AlreadyDeclared`, `SelfDependency`, `TooManyDependencies`, or
    /// `DependencyCycle` naming the offending edge.
    pub fn declare_scope(
        &mut self,
        scope: ScopePath,
        dependencies: Vec<ScopePath>,
    ) -> Result<(), SyncError> {
        if self.records.contains_key(&scope) {
            return Err(SyncError::AlreadyDeclared(scope));
        }
        if dependencies.contains(&scope) {
            return Err(SyncError::SelfDependency(scope));
        }

        // Preserve declaration order but drop duplicates.
        let mut seen = HashSet::new();
        let dependencies: Vec<ScopePath> = dependencies
            .into_iter()
            .filter(|dep| seen.insert(dep.clone()))
            .collect();

        if dependencies.len() > self.max_dependencies_per_scope {
            return Err(SyncError::TooManyDependencies {
                scope,
                declared: dependencies.len(),
                max: self.max_dependencies_per_scope,
            });
        }

        let scope_node = self.ensure_node(&scope);
        let mut added_edges = Vec::with_capacity(dependencies.len());
        for dep in &dependencies {
            let dep_node = self.ensure_node(dep);
            let edge = self.graph.add_edge(dep_node, scope_node, ());
            if is_cyclic_directed(&self.graph) {
                // Undo everything added in this call.
                self.graph.remove_edge(edge);
                for earlier in added_edges.into_iter().rev() {
                    self.graph.remove_edge(earlier);
                }
                return Err(SyncError::DependencyCycle {
                    scope,
                    dependency: dep.clone(),
                });
            }
            added_edges.push(edge);
        }

        qlog_debug!(
            "scope {} declared with {} dependencies",
            scope,
            dependencies.len()
        );
        self.records
            .insert(scope.clone(), ScopeSync::new(scope, dependencies));
        Ok(())
    }

    /// Begin syncing a scope.
    ///
    /// Legal from Idle, Failed (clearing the prior error), and Completed
    /// (a re-sync).
    ///
    /// # Errors
    /// `UnknownScope`, `AlreadySyncing`, or `DependencyNotReady` listing
    /// the unmet dependencies.
    pub fn start_sync(&mut self, scope: &ScopePath) -> Result<(), SyncError> {
        let status = self
            .records
            .get(scope)
            .ok_or_else(|| SyncError::UnknownScope(scope.clone()))?
            .status;

        if status == SyncStatus::Syncing {
            return Err(SyncError::AlreadySyncing(scope.clone()));
        }

        let check = self.check_dependencies(scope)?;
        if !check.satisfied {
            return Err(SyncError::DependencyNotReady {
                scope: scope.clone(),
                unmet: check.unmet,
            });
        }

        let now = self.clock.now();
        let record = self.records.get_mut(scope).expect("checked above");
        record.status = SyncStatus::Syncing;
        record.started_at = Some(now);
        record.error = None;
        qlog_debug!("sync started for {}", scope);
        Ok(())
    }

    /// Finish a sync successfully.
    ///
    /// Returns the scopes whose dependencies are now fully satisfied and
    /// that are not already Syncing or Completed. The caller decides
    /// whether to start them.
    ///
    /// # Errors
    /// `UnknownScope`, or `InvalidTransition` unless the scope is Syncing.
    pub fn complete_sync(&mut self, scope: &ScopePath) -> Result<Vec<ScopePath>, SyncError> {
        let record = self
            .records
            .get_mut(scope)
            .ok_or_else(|| SyncError::UnknownScope(scope.clone()))?;

        if record.status != SyncStatus::Syncing {
            return Err(SyncError::InvalidTransition {
                scope: scope.clone(),
                from: record.status,
                to: SyncStatus::Completed,
            });
        }

        let now = self.clock.now();
        record.status = SyncStatus::Completed;
        record.completed_at = Some(now);
        qlog_debug!("sync completed for {}", scope);

        let mut ready: Vec<ScopePath> = self
            .dependents_of(scope)
            .into_iter()
            .filter(|dependent| {
                match self.records.get(dependent).map(|r| r.status) {
                    Some(SyncStatus::Idle) | Some(SyncStatus::Failed) => {}
                    // Undeclared, already running, or already done.
                    _ => return false,
                }
                self.check_dependencies(dependent)
                    .map(|check| check.satisfied)
                    .unwrap_or(false)
            })
            .collect();
        ready.sort();
        Ok(ready)
    }

    /// Record a sync failure. Dependents stay blocked until a retry
    /// succeeds.
    ///
    /// # Errors
    /// `UnknownScope`, or `InvalidTransition` unless the scope is Syncing.
    pub fn fail_sync(&mut self, scope: &ScopePath, error: impl Into<String>) -> Result<(), SyncError> {
        let record = self
            .records
            .get_mut(scope)
            .ok_or_else(|| SyncError::UnknownScope(scope.clone()))?;

        if record.status != SyncStatus::Syncing {
            return Err(SyncError::InvalidTransition {
                scope: scope.clone(),
                from: record.status,
                to: SyncStatus::Failed,
            });
        }

        record.status = SyncStatus::Failed;
        record.error = Some(error.into());
        qlog_debug!("sync failed for {}", scope);
        Ok(())
    }

    /// Read-only dependency readiness report for a scope.
    ///
    /// A dependency that is not declared counts as unmet.
    ///
    /// # Errors
    /// `UnknownScope`.
    pub fn check_dependencies(&self, scope: &ScopePath) -> Result<DependencyCheck, SyncError> {
        let record = self
            .records
            .get(scope)
            .ok_or_else(|| SyncError::UnknownScope(scope.clone()))?;

        let unmet: Vec<ScopePath> = record
            .dependencies
            .iter()
            .filter(|dep| {
                self.records.get(dep).map(|r| r.status) != Some(SyncStatus::Completed)
            })
            .cloned()
            .collect();

        Ok(DependencyCheck {
            satisfied: unmet.is_empty(),
            unmet,
        })
    }

    /// Whether a scope has been declared.
    pub fn contains_scope(&self, scope: &ScopePath) -> bool {
        self.records.contains_key(scope)
    }

    /// Current sync status of a declared scope.
    pub fn status(&self, scope: &ScopePath) -> Option<SyncStatus> {
        self.records.get(scope).map(|r| r.status)
    }

    /// The full sync record for a declared scope.
    pub fn get(&self, scope: &ScopePath) -> Option<&ScopeSync> {
        self.records.get(scope)
    }

    /// Snapshot of all sync records.
    pub fn syncs(&self) -> Vec<ScopeSync> {
        self.records.values().cloned().collect()
    }

    /// All declared scope paths.
    pub fn known_scopes(&self) -> HashSet<ScopePath> {
        self.records.keys().cloned().collect()
    }

    /// Number of declared scopes.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no scopes are declared.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Scopes that directly depend on the given scope.
    pub fn dependents_of(&self, scope: &ScopePath) -> Vec<ScopePath> {
        match self.node_index.get(scope) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, Direction::Outgoing)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Declared dependencies of a scope, in declaration order.
    pub fn dependencies_of(&self, scope: &ScopePath) -> Vec<ScopePath> {
        self.records
            .get(scope)
            .map(|r| r.dependencies.clone())
            .unwrap_or_default()
    }

    fn ensure_node(&mut self, scope: &ScopePath) -> NodeIndex {
        if let Some(&index) = self.node_index.get(scope) {
            return index;
        }
        let index = self.graph.add_node(scope.clone());
        self.node_index.insert(scope.clone(), index);
        index
    }

    /// Put back a captured sync record. Rollback use only; the graph is
    /// untouched because start/complete/fail never change edges.
    pub(crate) fn restore_record(&mut self, record: ScopeSync) {
        self.records.insert(record.scope.clone(), record);
    }

    /// Undo a just-applied declaration: drop the record and the edges it
    /// added. The node stays as a placeholder (other scopes may already
    /// reference it). Rollback use only.
    pub(crate) fn undeclare(&mut self, scope: &ScopePath) {
        let Some(record) = self.records.remove(scope) else {
            return;
        };
        let Some(&scope_node) = self.node_index.get(scope) else {
            return;
        };
        for dep in &record.dependencies {
            if let Some(&dep_node) = self.node_index.get(dep) {
                if let Some(edge) = self.graph.find_edge(dep_node, scope_node) {
                    self.graph.remove_edge(edge);
                }
            }
        }
    }
}
