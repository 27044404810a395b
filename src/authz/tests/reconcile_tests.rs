//! ACL reconciliation: idempotence, restore-over-insert, failure semantics

mod common;

use common::{seed, seeded_engine, tuple_of, FlakyStore, RacingStore};
use rbac_authz::{
    AclIntent, AuthzError, DimensionKind, DimensionStore, EngineConfig, InMemoryStore,
    IntentOutcome, PolicyStore, RbacEngine, ReconcileReport,
};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// IDEMPOTENCE
// ============================================================================

#[tokio::test]
async fn test_double_grant_leaves_one_active_row() {
    let (engine, store) = seeded_engine().await;
    let grant = AclIntent::grant("admin", "read", "user", "global");

    engine.reconcile(&[grant.clone()], None).await.unwrap();
    let second = engine.reconcile(&[grant], None).await.unwrap();

    assert!(matches!(second.outcomes[0], IntentOutcome::AlreadyGranted { .. }));

    let tuple = tuple_of(&store, "admin", "read", "user", "global").await;
    assert_eq!(store.row_count(&tuple).await, 1);
    assert_eq!(store.list_active(1, 10).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_same_grant_twice_in_one_batch() {
    let (engine, store) = seeded_engine().await;
    let grant = AclIntent::grant("admin", "read", "user", "global");

    let report = engine.reconcile(&[grant.clone(), grant], None).await.unwrap();

    let IntentOutcome::Created { policy_id } = report.outcomes[0] else {
        panic!("expected Created, got {:?}", report.outcomes[0]);
    };
    assert_eq!(report.outcomes[1], IntentOutcome::AlreadyGranted { policy_id });
    assert_eq!(store.list_active(1, 10).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_revoke_never_granted_or_already_revoked() {
    let (engine, _) = seeded_engine().await;
    let revoke = AclIntent::revoke("admin", "read", "user", "global");

    let never = engine.reconcile(&[revoke.clone()], None).await.unwrap();
    assert_eq!(never.outcomes, vec![IntentOutcome::NotGranted]);

    engine
        .reconcile(&[AclIntent::grant("admin", "read", "user", "global")], None)
        .await
        .unwrap();
    let first = engine.reconcile(&[revoke.clone()], None).await.unwrap();
    assert!(matches!(first.outcomes[0], IntentOutcome::Revoked { .. }));

    let again = engine.reconcile(&[revoke], None).await.unwrap();
    assert_eq!(again.outcomes, vec![IntentOutcome::NotGranted]);
}

// ============================================================================
// RESTORE OVER INSERT
// ============================================================================

#[tokio::test]
async fn test_grant_revoke_grant_keeps_row_id() {
    let (engine, store) = seeded_engine().await;
    let actor = Uuid::new_v4();
    let grant = AclIntent::grant("admin", "read", "user", "global");
    let revoke = AclIntent::revoke("admin", "read", "user", "global");

    let created = engine.reconcile(&[grant.clone()], Some(actor)).await.unwrap();
    let IntentOutcome::Created { policy_id } = created.outcomes[0] else {
        panic!("expected Created, got {:?}", created.outcomes[0]);
    };

    engine.reconcile(&[revoke], Some(actor)).await.unwrap();
    let restored = engine.reconcile(&[grant], Some(actor)).await.unwrap();
    assert_eq!(restored.outcomes, vec![IntentOutcome::Restored { policy_id }]);

    let tuple = tuple_of(&store, "admin", "read", "user", "global").await;
    assert_eq!(store.row_count(&tuple).await, 1);

    let row = store.find_active(&tuple).await.unwrap().unwrap();
    assert_eq!(row.id, policy_id);
    assert_eq!(row.created_by, Some(actor));
    assert_eq!(row.updated_by, Some(actor));
}

#[tokio::test]
async fn test_mixed_batch_against_soft_deleted_rows() {
    let (engine, store) = seeded_engine().await;
    engine
        .reconcile(
            &[
                AclIntent::grant("admin", "read", "user", "global"),
                AclIntent::grant("admin", "write", "user", "global"),
            ],
            None,
        )
        .await
        .unwrap();

    let report = engine
        .reconcile(
            &[
                AclIntent::revoke("admin", "read", "user", "global"),
                AclIntent::grant("admin", "read", "user", "global"),
                AclIntent::revoke("admin", "write", "user", "global"),
            ],
            None,
        )
        .await
        .unwrap();

    assert!(matches!(report.outcomes[0], IntentOutcome::Revoked { .. }));
    assert!(matches!(report.outcomes[1], IntentOutcome::Restored { .. }));
    assert!(matches!(report.outcomes[2], IntentOutcome::Revoked { .. }));
    assert_eq!(report.changed(), 3);

    assert!(engine.authorize("admin", "read", "user", "global").await.unwrap());
    assert!(!engine.authorize("admin", "write", "user", "global").await.unwrap());

    let read = tuple_of(&store, "admin", "read", "user", "global").await;
    assert_eq!(store.row_count(&read).await, 1);
}

// ============================================================================
// UNRESOLVED NAMES
// ============================================================================

#[tokio::test]
async fn test_unknown_names_are_skipped() {
    let (engine, store) = seeded_engine().await;

    let report = engine
        .reconcile(
            &[
                AclIntent::grant("admin", "teleport", "user", "global"),
                AclIntent::revoke("nobody", "read", "user", "global"),
                AclIntent::grant("ADMIN", " Read ", "User", "GLOBAL"),
            ],
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        report.outcomes[0],
        IntentOutcome::Unresolved {
            missing: vec![DimensionKind::Permission]
        }
    );
    assert_eq!(
        report.outcomes[1],
        IntentOutcome::Unresolved {
            missing: vec![DimensionKind::Role]
        }
    );
    assert!(matches!(report.outcomes[2], IntentOutcome::Created { .. }));
    assert_eq!(store.list_active(1, 10).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_soft_deleted_dimension_does_not_resolve() {
    let (engine, store) = seeded_engine().await;
    seed(&store, &[(DimensionKind::Scope, "tenant")]).await;
    let tenant = store
        .find_active_by_name(DimensionKind::Scope, "tenant")
        .await
        .unwrap()
        .unwrap()
        .id;
    store
        .soft_delete_dimension(DimensionKind::Scope, tenant, None)
        .await
        .unwrap();

    let report = engine
        .reconcile(&[AclIntent::grant("admin", "read", "user", "tenant")], None)
        .await
        .unwrap();

    assert_eq!(
        report.outcomes,
        vec![IntentOutcome::Unresolved {
            missing: vec![DimensionKind::Scope]
        }]
    );
}

// ============================================================================
// FAILURE SEMANTICS
// ============================================================================

#[tokio::test]
async fn test_storage_failure_aborts_without_rollback() {
    common::init_tracing();
    let inner = InMemoryStore::new();
    seed(
        &inner,
        &[
            (DimensionKind::Role, "admin"),
            (DimensionKind::Permission, "read"),
            (DimensionKind::Permission, "write"),
            (DimensionKind::Permission, "delete"),
            (DimensionKind::Resource, "user"),
            (DimensionKind::Scope, "global"),
        ],
    )
    .await;

    // One write succeeds, the second fails
    let flaky = Arc::new(FlakyStore::new(inner.clone(), 1));
    let engine = RbacEngine::with_store(EngineConfig::default(), flaky);

    // Warm the cache so the test proves invalidation on failure
    assert!(!engine.authorize("admin", "read", "user", "global").await.unwrap());

    let err = engine
        .reconcile(
            &[
                AclIntent::grant("admin", "read", "user", "global"),
                AclIntent::grant("admin", "write", "user", "global"),
                AclIntent::grant("admin", "delete", "user", "global"),
            ],
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AuthzError::Storage(_)));
    assert!(err.is_fatal());

    // First intent stays applied and is visible right away
    assert!(engine.authorize("admin", "read", "user", "global").await.unwrap());
    assert!(!engine.authorize("admin", "write", "user", "global").await.unwrap());
    assert!(!engine.authorize("admin", "delete", "user", "global").await.unwrap());
    assert_eq!(inner.list_active(1, 10).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_aborted_batch_keeps_applied_outcomes() {
    common::init_tracing();
    let inner = InMemoryStore::new();
    seed(
        &inner,
        &[
            (DimensionKind::Role, "admin"),
            (DimensionKind::Permission, "read"),
            (DimensionKind::Permission, "write"),
            (DimensionKind::Resource, "user"),
            (DimensionKind::Scope, "global"),
        ],
    )
    .await;

    let flaky = Arc::new(FlakyStore::new(inner.clone(), 1));
    let engine = RbacEngine::with_store(EngineConfig::default(), flaky);

    let mut report = ReconcileReport::default();
    let err = engine
        .reconcile_into(
            &[
                AclIntent::grant("admin", "teleport", "user", "global"),
                AclIntent::grant("admin", "read", "user", "global"),
                AclIntent::grant("admin", "write", "user", "global"),
                AclIntent::grant("admin", "read", "user", "global"),
            ],
            None,
            &mut report,
        )
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(report.len(), 2);
    assert_eq!(report.unresolved(), 1);

    let IntentOutcome::Created { policy_id } = report.outcomes[1] else {
        panic!("expected Created, got {:?}", report.outcomes[1]);
    };
    assert_eq!(
        engine.lookup("admin", "read", "user", "global").await.unwrap(),
        Some(policy_id)
    );
}

#[tokio::test]
async fn test_constraint_violation_on_grant_is_fatal() {
    common::init_tracing();
    let inner = InMemoryStore::new();
    seed(
        &inner,
        &[
            (DimensionKind::Role, "admin"),
            (DimensionKind::Permission, "read"),
            (DimensionKind::Resource, "user"),
            (DimensionKind::Scope, "global"),
        ],
    )
    .await;

    let tuple = tuple_of(&inner, "admin", "read", "user", "global").await;
    let existing = inner.create(tuple, None, None).await.unwrap();
    inner.soft_delete(existing.id, None).await.unwrap();

    let racing = Arc::new(RacingStore { inner: inner.clone() });
    let engine = RbacEngine::with_store(EngineConfig::default(), racing);

    let err = engine
        .reconcile(&[AclIntent::grant("admin", "read", "user", "global")], None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthzError::ConstraintViolation(_)));
    assert!(err.is_fatal());
    assert_eq!(inner.row_count(&tuple).await, 1);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_on_disjoint_tuples() {
    let (engine, store) = seeded_engine().await;
    let scopes: Vec<String> = (0..8).map(|i| format!("tenant-{}", i)).collect();
    for scope in &scopes {
        seed(&store, &[(DimensionKind::Scope, scope.as_str())]).await;
    }

    let engine = Arc::new(engine);
    let mut handles = Vec::new();
    for scope in scopes.clone() {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .reconcile(&[AclIntent::grant("admin", "read", "user", scope)], None)
                .await
        }));
    }

    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        assert!(matches!(report.outcomes[0], IntentOutcome::Created { .. }));
    }

    for scope in &scopes {
        assert!(engine.authorize("admin", "read", "user", scope).await.unwrap());
    }
    assert_eq!(store.list_active(1, 100).await.unwrap().total, scopes.len() as u64);
}
