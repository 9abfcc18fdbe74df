//! Dependency-gated synchronization across scopes.

use crate::fixtures::{path, TestCoordinator};
use quorum::{CoordinationError, CoordinationOutcome, SyncError, SyncStatus};

#[tokio::test]
async fn dependent_cannot_start_until_dependency_completes() {
    let coord = TestCoordinator::new();
    coord.declare("B", &[]).await;
    coord.declare("A", &["B"]).await;

    let err = coord.service.start_sync(path("A")).await.unwrap_err();
    assert_eq!(
        err,
        CoordinationError::Sync(SyncError::DependencyNotReady {
            scope: path("A"),
            unmet: vec![path("B")],
        })
    );

    coord.service.start_sync(path("B")).await.unwrap();
    let response = coord.service.complete_sync(path("B")).await.unwrap();
    assert_eq!(
        response.outcome,
        CoordinationOutcome::SyncCompleted {
            ready: vec![path("A")]
        }
    );

    // Completion reports readiness but starts nothing.
    assert_eq!(coord.service.sync_status(&path("A")).await, Some(SyncStatus::Idle));
    coord.service.start_sync(path("A")).await.unwrap();
    coord.service.complete_sync(path("A")).await.unwrap();
    assert_eq!(
        coord.service.sync_status(&path("A")).await,
        Some(SyncStatus::Completed)
    );
}

#[tokio::test]
async fn diamond_dependencies_resolve_in_order() {
    let coord = TestCoordinator::new();
    coord.declare("base", &[]).await;
    coord.declare("left", &["base"]).await;
    coord.declare("right", &["base"]).await;
    coord.declare("top", &["left", "right"]).await;

    coord.service.start_sync(path("base")).await.unwrap();
    let response = coord.service.complete_sync(path("base")).await.unwrap();
    assert_eq!(
        response.outcome,
        CoordinationOutcome::SyncCompleted {
            ready: vec![path("left"), path("right")]
        }
    );

    coord.service.start_sync(path("left")).await.unwrap();
    let response = coord.service.complete_sync(path("left")).await.unwrap();
    // top still waits on right.
    assert_eq!(
        response.outcome,
        CoordinationOutcome::SyncCompleted { ready: vec![] }
    );

    coord.service.start_sync(path("right")).await.unwrap();
    let response = coord.service.complete_sync(path("right")).await.unwrap();
    assert_eq!(
        response.outcome,
        CoordinationOutcome::SyncCompleted {
            ready: vec![path("top")]
        }
    );
}

#[tokio::test]
async fn failure_blocks_dependents_until_retry_succeeds() {
    let coord = TestCoordinator::new();
    coord.declare("B", &[]).await;
    coord.declare("A", &["B"]).await;

    coord.service.start_sync(path("B")).await.unwrap();
    coord
        .service
        .fail_sync(path("B"), "remote unreachable".into())
        .await
        .unwrap();
    assert_eq!(coord.service.sync_status(&path("B")).await, Some(SyncStatus::Failed));

    let err = coord.service.start_sync(path("A")).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinationError::Sync(SyncError::DependencyNotReady { .. })
    ));

    // Retry clears the failure and unblocks A.
    coord.service.start_sync(path("B")).await.unwrap();
    coord.service.complete_sync(path("B")).await.unwrap();
    coord.service.start_sync(path("A")).await.unwrap();
}

#[tokio::test]
async fn cycles_are_rejected_atomically_at_declaration() {
    let coord = TestCoordinator::new();
    coord.declare("a", &["b"]).await;
    coord.declare("c", &["a"]).await;

    let err = coord
        .service
        .declare_scope(path("b"), vec![path("c")])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CoordinationError::Sync(SyncError::DependencyCycle {
            scope: path("b"),
            dependency: path("c"),
        })
    );
    // Nothing about b was kept.
    assert!(coord.service.sync_status(&path("b")).await.is_none());
}

#[tokio::test]
async fn forward_reference_is_unmet_until_declared_and_completed() {
    let coord = TestCoordinator::new();
    // A references B before B exists.
    coord.declare("A", &["B"]).await;

    let err = coord.service.start_sync(path("A")).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinationError::Sync(SyncError::DependencyNotReady { .. })
    ));

    // The dangling reference shows up as a consistency finding.
    let violations = coord.service.validate_now().await;
    assert!(violations
        .iter()
        .any(|v| v.kind == quorum::ViolationKind::ContextConsistency));

    coord.declare("B", &[]).await;
    coord.service.start_sync(path("B")).await.unwrap();
    coord.service.complete_sync(path("B")).await.unwrap();
    coord.service.start_sync(path("A")).await.unwrap();
    assert!(coord.service.validate_now().await.is_empty());
}

#[tokio::test]
async fn self_dependency_and_redeclaration_rejected() {
    let coord = TestCoordinator::new();
    coord.declare("a", &[]).await;

    let err = coord
        .service
        .declare_scope(path("a"), vec![])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CoordinationError::Sync(SyncError::AlreadyDeclared(path("a")))
    );

    let err = coord
        .service
        .declare_scope(path("b"), vec![path("b")])
        .await
        .unwrap_err();
    assert_eq!(err, CoordinationError::Sync(SyncError::SelfDependency(path("b"))));
}

#[tokio::test]
async fn resync_completed_scope() {
    let coord = TestCoordinator::new();
    coord.declare("a", &[]).await;
    coord.service.start_sync(path("a")).await.unwrap();
    coord.service.complete_sync(path("a")).await.unwrap();

    coord.service.start_sync(path("a")).await.unwrap();
    assert_eq!(
        coord.service.sync_status(&path("a")).await,
        Some(SyncStatus::Syncing)
    );
    let err = coord.service.start_sync(path("a")).await.unwrap_err();
    assert_eq!(err, CoordinationError::Sync(SyncError::AlreadySyncing(path("a"))));
}
