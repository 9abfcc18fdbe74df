//! Agent join/leave and the lifecycle state machine end to end.

use crate::fixtures::{agent, path, TestCoordinator};
use chrono::Duration;
use quorum::{
    AgentError, AgentState, CoordinationError, CoordinationEvent, CoordinationOutcome,
    ViolationKind,
};

#[tokio::test]
async fn join_starts_idle_and_leave_removes() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;

    let record = coord.service.agent(&agent("a1")).await.unwrap();
    assert_eq!(record.state, AgentState::Idle);

    coord.service.leave(agent("a1")).await.unwrap();
    assert!(coord.service.agent(&agent("a1")).await.is_none());

    let err = coord.service.leave(agent("a1")).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinationError::Agent(AgentError::UnknownAgent(_))
    ));
}

#[tokio::test]
async fn leave_frees_held_locks_for_others() {
    let mut coord = TestCoordinator::new();
    coord.join(&["a1", "a2"]).await;
    coord.declare("svc/auth", &[]).await;
    coord
        .service
        .set_agent_state(agent("a1"), AgentState::Working)
        .await
        .unwrap();
    assert!(coord.acquire("a1", "svc/auth").await);
    assert!(!coord.acquire("a2", "svc/auth").await);
    coord.drain_events();

    let response = coord.service.leave(agent("a1")).await.unwrap();
    assert_eq!(
        response.outcome,
        CoordinationOutcome::Left {
            released: vec![path("svc/auth")]
        }
    );
    assert!(coord.drain_events().contains(&CoordinationEvent::AgentLeft {
        agent: agent("a1"),
        released: vec![path("svc/auth")],
    }));

    // No sweep needed; departure releases immediately.
    assert!(coord.acquire("a2", "svc/auth").await);
}

#[tokio::test]
async fn full_state_cycle() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    let id = agent("a1");

    for state in [
        AgentState::Working,
        AgentState::Blocked,
        AgentState::Working,
        AgentState::Completed,
        AgentState::Idle,
    ] {
        coord.service.set_agent_state(id.clone(), state).await.unwrap();
        assert_eq!(coord.service.agent(&id).await.unwrap().state, state);
    }
}

#[tokio::test]
async fn illegal_transitions_leave_state_unchanged() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    let id = agent("a1");

    // Idle cannot block or complete directly.
    for target in [AgentState::Blocked, AgentState::Completed] {
        let err = coord
            .service
            .set_agent_state(id.clone(), target)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinationError::Agent(AgentError::InvalidTransition { .. })
        ));
        assert_eq!(coord.service.agent(&id).await.unwrap().state, AgentState::Idle);
    }
}

#[tokio::test]
async fn blocked_agent_flagged_after_limit() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    let id = agent("a1");
    coord
        .service
        .set_agent_state(id.clone(), AgentState::Working)
        .await
        .unwrap();
    coord
        .service
        .set_agent_state(id.clone(), AgentState::Blocked)
        .await
        .unwrap();

    coord.clock.advance(Duration::seconds(300));
    assert!(coord.service.validate_now().await.is_empty());

    coord.clock.advance(Duration::seconds(1));
    let violations = coord.service.validate_now().await;
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::AgentCoordination);
    assert!(violations[0].concerns_agent(&id));
}

#[tokio::test]
async fn unblocking_resets_the_stall_timer() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    let id = agent("a1");
    coord
        .service
        .set_agent_state(id.clone(), AgentState::Working)
        .await
        .unwrap();
    coord
        .service
        .set_agent_state(id.clone(), AgentState::Blocked)
        .await
        .unwrap();

    coord.clock.advance(Duration::seconds(200));
    coord
        .service
        .set_agent_state(id.clone(), AgentState::Working)
        .await
        .unwrap();
    coord
        .service
        .set_agent_state(id.clone(), AgentState::Blocked)
        .await
        .unwrap();

    // 200s of the old block must not count against the new one.
    coord.clock.advance(Duration::seconds(200));
    assert!(coord.service.validate_now().await.is_empty());

    coord.clock.advance(Duration::seconds(101));
    assert_eq!(coord.service.validate_now().await.len(), 1);
}
