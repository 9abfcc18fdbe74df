//! Scope lock contention, expiry, and sweep behavior.

use crate::fixtures::{agent, path, TestCoordinator};
use chrono::Duration;
use quorum::{CoordinationError, CoordinationEvent, LockError, LockEventKind};

#[tokio::test]
async fn two_agents_contend_for_one_scope() {
    let coord = TestCoordinator::new();
    coord.join(&["a1", "a2"]).await;
    coord.declare("svc/auth", &[]).await;

    assert!(coord.acquire("a1", "svc/auth").await);
    assert!(!coord.acquire("a2", "svc/auth").await);
    assert_eq!(
        coord.service.lock_holder(&path("svc/auth")).await,
        Some(agent("a1"))
    );

    // a1 releases; a2's retry now wins.
    coord
        .service
        .release_lock(agent("a1"), path("svc/auth"))
        .await
        .unwrap();
    assert!(coord.acquire("a2", "svc/auth").await);
    assert_eq!(
        coord.service.lock_holder(&path("svc/auth")).await,
        Some(agent("a2"))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_acquires_grant_exactly_one() {
    let coord = TestCoordinator::new();
    coord.declare("svc/auth", &[]).await;
    let ids: Vec<String> = (0..8).map(|i| format!("a{}", i)).collect();
    for id in &ids {
        coord.service.join(agent(id)).await.unwrap();
    }

    let mut handles = Vec::new();
    for id in &ids {
        let service = coord.service.clone();
        let id = agent(id);
        handles.push(tokio::spawn(async move {
            let response = service.acquire_lock(id, path("svc/auth")).await.unwrap();
            matches!(
                response.outcome,
                quorum::CoordinationOutcome::LockAcquired { granted: true }
            )
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
    assert!(coord.service.lock_holder(&path("svc/auth")).await.is_some());
}

#[tokio::test]
async fn reacquire_by_holder_extends_lease() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    coord.declare("svc/auth", &[]).await;

    assert!(coord.acquire("a1", "svc/auth").await);
    coord.clock.advance(Duration::seconds(50));
    // Refresh just before expiry.
    assert!(coord.acquire("a1", "svc/auth").await);

    // Original lease would have lapsed by now; the refreshed one has not.
    coord.clock.advance(Duration::seconds(50));
    assert!(coord.service.run_sweep().await.is_empty());
    assert_eq!(
        coord.service.lock_holder(&path("svc/auth")).await,
        Some(agent("a1"))
    );
}

#[tokio::test]
async fn expired_lock_blocks_until_swept() {
    let coord = TestCoordinator::new();
    coord.join(&["a1", "a2"]).await;
    coord.declare("svc/auth", &[]).await;
    assert!(coord.acquire("a1", "svc/auth").await);

    coord.clock.advance(Duration::seconds(61));

    // Expiry is lazy: a competitor is still refused before the sweep.
    assert!(!coord.acquire("a2", "svc/auth").await);

    let reaped = coord.service.run_sweep().await;
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].holder, agent("a1"));
    assert!(coord.acquire("a2", "svc/auth").await);
}

#[tokio::test]
async fn per_agent_lock_limit() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    coord.declare("svc/a", &[]).await;
    coord.declare("svc/b", &[]).await;

    assert!(coord.acquire("a1", "svc/a").await);
    let err = coord
        .service
        .acquire_lock(agent("a1"), path("svc/b"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinationError::Lock(LockError::LockLimitExceeded { held: 1, max: 1, .. })
    ));
}

#[tokio::test]
async fn release_requires_holding() {
    let coord = TestCoordinator::new();
    coord.join(&["a1", "a2"]).await;
    coord.declare("svc/auth", &[]).await;
    assert!(coord.acquire("a1", "svc/auth").await);

    let err = coord
        .service
        .release_lock(agent("a2"), path("svc/auth"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinationError::Lock(LockError::NotHolder { .. })
    ));
    assert_eq!(
        coord.service.lock_holder(&path("svc/auth")).await,
        Some(agent("a1"))
    );
}

#[tokio::test]
async fn lock_history_records_full_audit_trail() {
    let coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    coord.declare("svc/auth", &[]).await;

    assert!(coord.acquire("a1", "svc/auth").await);
    coord
        .service
        .release_lock(agent("a1"), path("svc/auth"))
        .await
        .unwrap();
    assert!(coord.acquire("a1", "svc/auth").await);
    coord.clock.advance(Duration::seconds(61));
    coord.service.run_sweep().await;

    let kinds: Vec<LockEventKind> = coord
        .service
        .lock_history()
        .await
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            LockEventKind::Acquired,
            LockEventKind::Released,
            LockEventKind::Acquired,
            LockEventKind::Expired,
        ]
    );
}

#[tokio::test]
async fn lock_events_reach_subscribers() {
    let mut coord = TestCoordinator::new();
    coord.join(&["a1"]).await;
    coord.declare("svc/auth", &[]).await;
    coord.drain_events();

    assert!(coord.acquire("a1", "svc/auth").await);
    coord.clock.advance(Duration::seconds(61));
    coord.service.run_sweep().await;

    let events = coord.drain_events();
    assert_eq!(
        events[0],
        CoordinationEvent::LockAcquired {
            scope: path("svc/auth"),
            agent: agent("a1"),
        }
    );
    assert!(events.contains(&CoordinationEvent::LockExpired {
        scope: path("svc/auth"),
        agent: agent("a1"),
    }));
}
