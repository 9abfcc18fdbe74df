//! Per-scope synchronization state.

use crate::core::scope::ScopePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Synchronization status of a scope.
///
/// Failed is recoverable: a later `start_sync` clears the error and
/// returns the scope to Syncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No sync has run, or the last one was superseded.
    Idle,
    /// A sync is in flight.
    Syncing,
    /// The last sync finished successfully.
    Completed,
    /// The last sync failed; see the recorded error.
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Completed => write!(f, "completed"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Sync record for one declared scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSync {
    /// The scope this record tracks.
    pub scope: ScopePath,
    /// Current sync status.
    pub status: SyncStatus,
    /// Scopes that must be Completed before this one may start syncing.
    pub dependencies: Vec<ScopePath>,
    /// When the current (or last) sync started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the last sync completed successfully.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure message, set only while status is Failed.
    pub error: Option<String>,
}

impl ScopeSync {
    /// Create an Idle record for a newly declared scope.
    pub fn new(scope: ScopePath, dependencies: Vec<ScopePath>) -> Self {
        Self {
            scope,
            status: SyncStatus::Idle,
            dependencies,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// Read-only result of a dependency readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCheck {
    /// True when every dependency is Completed.
    pub satisfied: bool,
    /// Dependencies that are not Completed, in declaration order.
    pub unmet: Vec<ScopePath>,
}
