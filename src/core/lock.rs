//! Scope lock records and the audit event stream.

use crate::core::agent::AgentId;
use crate::core::scope::ScopePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An exclusive lock on one scope.
///
/// A lock record exists only while held; release removes it from the
/// table, so the holder is always present. Mutual exclusion is structural:
/// the lock table is keyed by scope path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeLock {
    /// The locked scope.
    pub scope: ScopePath,
    /// The agent holding the lock.
    pub holder: AgentId,
    /// When the lock was acquired (or last re-acquired).
    pub acquired_at: DateTime<Utc>,
    /// When the lock becomes eligible for reclamation by the sweep.
    pub expires_at: DateTime<Utc>,
}

impl ScopeLock {
    /// Whether the lock is past its expiry at the given instant.
    ///
    /// Expiry is evaluated lazily; an expired lock stays in the table
    /// until the sweep reaps it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What happened to a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventKind {
    /// Lock granted to an agent (including idempotent re-acquires).
    Acquired,
    /// Lock released by its holder, or force-released on leave.
    Released,
    /// Lock reclaimed by the sweep after expiry.
    Expired,
}

impl std::fmt::Display for LockEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockEventKind::Acquired => write!(f, "acquired"),
            LockEventKind::Released => write!(f, "released"),
            LockEventKind::Expired => write!(f, "expired"),
        }
    }
}

/// One entry in the bounded lock history ring.
///
/// External collaborators may snapshot these for durable audit storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    /// The scope the event concerns.
    pub scope: ScopePath,
    /// The agent involved.
    pub agent: AgentId,
    /// What happened.
    pub kind: LockEventKind,
    /// When it happened.
    pub at: DateTime<Utc>,
}
