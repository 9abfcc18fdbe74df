//! Advisory and strict validation behavior across the whole service.

use crate::fixtures::{agent, path, TestCoordinator};
use chrono::Duration;
use quorum::{
    AgentState, CoordinationConfig, CoordinationError, CoordinationEvent, CoordinationOutcome,
    ViolationKind,
};

#[tokio::test]
async fn advisory_mode_reports_without_rejecting() {
    let mut coord = TestCoordinator::new();
    coord.join(&["a1"]).await;

    // Lock on an undeclared scope is permitted but flagged.
    let response = coord
        .service
        .acquire_lock(agent("a1"), path("undeclared"))
        .await
        .unwrap();
    assert_eq!(response.outcome, CoordinationOutcome::LockAcquired { granted: true });
    assert!(response
        .violations
        .iter()
        .any(|v| v.kind == ViolationKind::ContextConsistency));

    // The finding is recorded and announced.
    assert!(!coord.service.recent_violations().is_empty());
    assert!(coord
        .drain_events()
        .iter()
        .any(|e| matches!(e, CoordinationEvent::ViolationsDetected(_))));

    // And the mutation stands.
    assert_eq!(
        coord.service.lock_holder(&path("undeclared")).await,
        Some(agent("a1"))
    );
}

#[tokio::test]
async fn strict_mode_rejects_and_rolls_back() {
    let coord = TestCoordinator::strict();
    coord.join(&["a1"]).await;

    let err = coord
        .service
        .acquire_lock(agent("a1"), path("undeclared"))
        .await
        .unwrap_err();
    let CoordinationError::SafetyRejected { violations } = err else {
        panic!("expected SafetyRejected");
    };
    assert!(violations
        .iter()
        .any(|v| v.kind == ViolationKind::ContextConsistency));

    // No trace of the attempt: table, audit ring, and agent bookkeeping
    // all read as if the call never happened.
    assert!(coord.service.lock_holder(&path("undeclared")).await.is_none());
    assert!(coord.service.lock_history().await.is_empty());
    assert!(coord
        .service
        .agent(&agent("a1"))
        .await
        .unwrap()
        .held_locks
        .is_empty());
}

#[tokio::test]
async fn strict_mode_passes_clean_operations() {
    let coord = TestCoordinator::strict();
    coord.join(&["a1", "a2"]).await;
    coord.declare("svc/auth", &[]).await;
    coord.declare("svc/db", &["svc/auth"]).await;

    assert!(coord.acquire("a1", "svc/auth").await);
    coord
        .service
        .set_agent_state(agent("a1"), AgentState::Working)
        .await
        .unwrap();
    coord.service.start_sync(path("svc/auth")).await.unwrap();
    coord.service.complete_sync(path("svc/auth")).await.unwrap();
    coord.service.start_sync(path("svc/db")).await.unwrap();

    assert!(coord.service.validate_now().await.is_empty());
    assert!(coord.service.recent_violations().is_empty());
}

#[tokio::test]
async fn strict_rollback_of_scope_declaration() {
    let coord = TestCoordinator::strict();
    coord.declare("clean", &[]).await;

    // A declaration referencing a scope nothing declared is rejected in
    // strict mode because the dangling dependency is a violation.
    let err = coord
        .service
        .declare_scope(path("next"), vec![path("missing")])
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::SafetyRejected { .. }));
    assert!(coord.service.sync_status(&path("next")).await.is_none());

    // With the dependency declared, the same call goes through.
    coord.declare("missing", &[]).await;
    coord.declare("next", &["missing"]).await;
}

#[tokio::test]
async fn sweep_records_stall_findings() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    coord
        .service
        .set_agent_state(agent("a1"), AgentState::Working)
        .await
        .unwrap();
    coord
        .service
        .set_agent_state(agent("a1"), AgentState::Blocked)
        .await
        .unwrap();

    coord.clock.advance(Duration::seconds(301));
    coord.service.run_sweep().await;

    let recorded = coord.service.recent_violations();
    assert!(recorded
        .iter()
        .any(|v| v.kind == ViolationKind::AgentCoordination && v.concerns_agent(&agent("a1"))));
}

#[tokio::test]
async fn working_capacity_limit_is_flagged() {
    let coord = TestCoordinator::with_config(CoordinationConfig {
        max_concurrent_agents: 1,
        ..Default::default()
    });
    coord.join(&["a1", "a2"]).await;
    coord.declare("s1", &[]).await;
    coord.declare("s2", &[]).await;

    for id in ["a1", "a2"] {
        assert!(coord.acquire(id, if id == "a1" { "s1" } else { "s2" }).await);
        coord
            .service
            .set_agent_state(agent(id), AgentState::Working)
            .await
            .unwrap();
    }

    let violations = coord.service.validate_now().await;
    assert!(violations
        .iter()
        .any(|v| v.kind == ViolationKind::AgentCoordination
            && v.message.contains("2 agents working")));
}

#[tokio::test]
async fn validate_now_does_not_record() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    coord
        .service
        .set_agent_state(agent("a1"), AgentState::Working)
        .await
        .unwrap();
    coord
        .service
        .set_agent_state(agent("a1"), AgentState::Blocked)
        .await
        .unwrap();
    coord.clock.advance(Duration::seconds(400));

    assert_eq!(coord.service.validate_now().await.len(), 1);
    // Read-only: nothing lands in the recorded ring.
    assert!(coord.service.recent_violations().is_empty());
}
