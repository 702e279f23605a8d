//! Integration test: graph state survives reopening a Fjall store.

use std::sync::Arc;

use lens_integration_tests::{TestEnv, did};
use lens_store::{FjallGraphStore, RetryPolicy};
use lens_types::{HeadUpdate, NewProposal, PermissionKind, ProposalState};

fn open(dir: &std::path::Path) -> TestEnv {
    let store = FjallGraphStore::open(dir).unwrap();
    TestEnv::on_store(Arc::new(store), RetryPolicy::immediate(10))
}

#[tokio::test]
async fn test_reopen_preserves_graph() {
    let dir = tempfile::tempdir().unwrap();
    let alice = did("alice");
    let bob = did("bob");

    let (root, child, head, proposal, counts) = {
        let env = open(dir.path());
        let d = env.data("persisted").await;
        let head = env.commit(&alice, &d, vec![], "init").await;
        let root = env.root(&alice, "root").await;
        let child = env.child(&alice, "child", &root).await;
        env.link(&root, &[&child], &alice).await;
        env.graph
            .update_perspectives(&[HeadUpdate::new(child.clone(), head.clone())], Some(&alice))
            .await
            .unwrap();
        env.graph
            .access()
            .add_permission(&root, PermissionKind::Read, &bob, Some(&alice))
            .await
            .unwrap();
        let proposal = env
            .workflow
            .create(
                NewProposal::new(child.clone(), root.clone())
                    .with_updates(vec![HeadUpdate::new(root.clone(), head.clone())]),
                Some(&bob),
            )
            .await
            .unwrap();
        let counts = env.graph.key_family_counts().await.unwrap();
        (root, child, head, proposal.id, counts)
    };

    let env = open(dir.path());
    assert_eq!(env.graph.key_family_counts().await.unwrap(), counts);

    let read = env.graph.get_perspective(&child, Some(&bob)).await.unwrap();
    assert_eq!(read.head, Some(head));
    let access = env.graph.access().access_config(&child).await.unwrap();
    assert_eq!(access.fin_delegated_to, root);
    assert!(access.permissions.can_read.contains(&bob));
    assert!(env.graph.ecosystem().ecosystem(&root).await.unwrap().contains(&child));

    let stored = env.workflow.get(&proposal).await.unwrap();
    assert_eq!(stored.state, ProposalState::Open);
    assert_eq!(env.workflow.proposals_for(&root).await.unwrap().len(), 1);

    let report = env.graph.audit().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
}

#[tokio::test]
async fn test_writes_continue_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let alice = did("alice");

    let root = {
        let env = open(dir.path());
        env.root(&alice, "root").await
    };

    let env = open(dir.path());
    let child = env.child(&alice, "child", &root).await;
    env.link(&root, &[&child], &alice).await;
    assert_eq!(
        env.graph.access().access_config(&child).await.unwrap().fin_delegated_to,
        root
    );
    assert!(env.graph.audit().await.unwrap().is_clean());
}
