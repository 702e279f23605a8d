//! Integration test: delegation trees built through perspective creation.

use lens_access::AccessError;
use lens_integration_tests::{TestEnv, did, perspective};
use lens_types::{ElementId, ErrorKind, PermissionKind};

/// Every config in the subtree rooted at `root` carries `root`'s permissions
/// and names it as final delegate.
async fn assert_subtree_consistent(env: &TestEnv, root: &ElementId, members: &[&ElementId]) {
    let access = env.graph.access();
    let root_config = access.access_config(root).await.unwrap();
    for member in members {
        let config = access.access_config(member).await.unwrap();
        assert_eq!(&config.fin_delegated_to, root, "{member}");
        assert_eq!(config.permissions, root_config.permissions, "{member}");
    }
}

#[tokio::test]
async fn test_three_level_chain() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let c = env.root(&alice, "c").await;
    let b = env.child(&alice, "b", &c).await;
    let a = env.child(&alice, "a", &b).await;

    assert_subtree_consistent(&env, &c, &[&a, &b]).await;

    env.graph
        .access()
        .set_delegation(&b, None, Some(&alice))
        .await
        .unwrap();
    assert_subtree_consistent(&env, &b, &[&a]).await;
    let c_config = env.graph.access().access_config(&c).await.unwrap();
    assert!(c_config.is_root(), "c untouched");
}

#[tokio::test]
async fn test_grant_on_root_reaches_whole_tree() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let bob = did("bob");
    let root = env.root(&alice, "root").await;
    let left = env.child(&alice, "left", &root).await;
    let right = env.child(&alice, "right", &root).await;
    let leaf = env.child(&alice, "leaf", &left).await;

    env.graph
        .access()
        .add_permission(&root, PermissionKind::Write, &bob, Some(&alice))
        .await
        .unwrap();

    assert_subtree_consistent(&env, &root, &[&left, &right, &leaf]).await;
    for id in [&left, &right, &leaf] {
        assert!(
            env.graph
                .access()
                .effective_permission(id, Some(&bob), PermissionKind::Write)
                .await
                .unwrap()
        );
    }
}

#[tokio::test]
async fn test_moving_subtree_between_roots() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let bob = did("bob");
    let first = env.root(&alice, "first").await;
    let second = env.root(&bob, "second").await;
    let mid = env.child(&alice, "mid", &first).await;
    let leaf = env.child(&alice, "leaf", &mid).await;

    // Alice administers mid; the target only has to exist.
    env.graph
        .access()
        .set_delegation(&mid, Some(&second), Some(&alice))
        .await
        .unwrap();

    assert_subtree_consistent(&env, &second, &[&mid, &leaf]).await;
    let err = env.graph.get_perspective(&leaf, Some(&alice)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound, "alice lost access with the move");
    assert!(env.graph.get_perspective(&leaf, Some(&bob)).await.is_ok());
    assert!(env.graph.audit().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_cycles_are_rejected() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let top = env.root(&alice, "top").await;
    let mid = env.child(&alice, "mid", &top).await;
    let bottom = env.child(&alice, "bottom", &mid).await;

    let err = env
        .graph
        .access()
        .set_delegation(&top, Some(&bottom), Some(&alice))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Cycle { .. }), "got {err}");
    assert_eq!(err.kind(), ErrorKind::Delegation);

    let err = env
        .graph
        .access()
        .set_delegation(&top, Some(&top), Some(&alice))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Cycle { .. }));
    assert!(env.graph.access().access_config(&top).await.unwrap().is_root());
}

#[tokio::test]
async fn test_permissions_edited_only_on_roots() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let root = env.root(&alice, "root").await;
    let child = env.child(&alice, "child", &root).await;

    let err = env
        .graph
        .access()
        .add_permission(&child, PermissionKind::Read, &did("bob"), Some(&alice))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::PermissionsDelegated { .. }));
}

#[tokio::test]
async fn test_caller_checks() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let reader = did("reader");
    let p = env.root(&alice, "p").await;
    env.graph
        .access()
        .add_permission(&p, PermissionKind::Read, &reader, Some(&alice))
        .await
        .unwrap();

    let access = env.graph.access();
    let err = access.set_delegation(&p, None, None).await.unwrap_err();
    assert!(matches!(err, AccessError::AnonymousUser));
    let err = access
        .remove_all_permissions(&p, Some(&did("stranger")))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::NotFound(_)));
    let err = access.remove_all_permissions(&p, Some(&reader)).await.unwrap_err();
    assert!(matches!(err, AccessError::NotAuthorized { .. }));
}

#[tokio::test]
async fn test_parent_created_in_same_batch_later() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let parent_id = env.perspective_id(&alice, "late-parent");
    let ids = env
        .graph
        .create_perspectives(
            vec![
                perspective(&alice, "early-child").with_parent(parent_id.clone()),
                perspective(&alice, "late-parent"),
            ],
            Some(&alice),
        )
        .await
        .unwrap();

    assert_eq!(ids[1], parent_id);
    assert_subtree_consistent(&env, &parent_id, &[&ids[0]]).await;
    assert!(env.graph.audit().await.unwrap().is_clean());
}
