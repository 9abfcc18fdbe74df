//! Integration test suite for the quorum coordination core.
//!
//! These tests drive the full `CoordinationService` surface the way an
//! embedding host would, with a manual clock so every timeout and expiry
//! path is deterministic.
//!
//! # Test Categories
//!
//! - `locking`: scope lock contention, expiry, and the sweep
//! - `lifecycle`: agent join/leave and the lifecycle state machine
//! - `sync_ordering`: dependency-gated sync across scopes
//! - `safety`: advisory and strict validation behavior


mod lifecycle;
mod locking;
mod safety;
mod sync_ordering;
