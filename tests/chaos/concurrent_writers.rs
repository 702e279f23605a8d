//! Chaos test: real contention between concurrent writers.
//!
//! Many tasks mutate the same records at once. Optimistic commits force the
//! losers to retry; at the end no update may be lost and every stored
//! invariant must hold.

use std::sync::Arc;
use std::time::Duration;

use lens_integration_tests::{TestEnv, did};
use lens_proposals::ProposalError;
use lens_store::{MemoryGraphStore, RetryPolicy};
use lens_types::{ElementId, HeadUpdate, NewProposal, PermissionKind};

fn contended_env() -> Arc<TestEnv> {
    let retry = RetryPolicy {
        max_attempts: 200,
        delay: Duration::from_millis(1),
    };
    Arc::new(TestEnv::on_store(Arc::new(MemoryGraphStore::new()), retry))
}

/// Sixteen tasks granting distinct users on one root at once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_grants_are_all_kept() {
    let env = contended_env();
    let alice = did("alice");
    let root = env.root(&alice, "root").await;
    let child = env.child(&alice, "child", &root).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let env = env.clone();
        let root = root.clone();
        let alice = alice.clone();
        handles.push(tokio::spawn(async move {
            env.graph
                .access()
                .add_permission(&root, PermissionKind::Read, &did(&format!("user-{i}")), Some(&alice))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let config = env.graph.access().access_config(&child).await.unwrap();
    assert_eq!(config.permissions.can_read.len(), 16);
    assert!(env.graph.audit().await.unwrap().is_clean());
}

/// Children linked to one parent from parallel tasks all reach its ecosystem.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_links_keep_ecosystem_complete() {
    let env = contended_env();
    let alice = did("alice");
    let parent = env.root(&alice, "parent").await;
    let grandparent = env.root(&alice, "grandparent").await;
    env.link(&grandparent, &[&parent], &alice).await;

    let mut children: Vec<ElementId> = Vec::new();
    for i in 0..8 {
        children.push(env.root(&alice, &format!("child-{i}")).await);
    }

    let mut handles = Vec::new();
    for child in children.clone() {
        let env = env.clone();
        let parent = parent.clone();
        let alice = alice.clone();
        handles.push(tokio::spawn(async move {
            env.link(&parent, &[&child], &alice).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let linked = env.graph.ecosystem().children_of(&parent).await.unwrap();
    assert_eq!(linked.len(), 8);
    let top = env.graph.ecosystem().ecosystem(&grandparent).await.unwrap();
    for child in &children {
        assert!(top.contains(child), "{child} missing from grandparent");
    }
    let report = env.graph.audit().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
}

/// Two owners accepting the same proposal: exactly one wins.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_execute_once() {
    let env = contended_env();
    let alice = did("alice");
    let bob = did("bob");
    let d = env.data("race").await;
    let c = env.commit(&alice, &d, vec![], "race").await;
    let target = env.root(&alice, "target").await;
    env.graph
        .access()
        .add_permission(&target, PermissionKind::Admin, &bob, Some(&alice))
        .await
        .unwrap();
    let proposal = env
        .workflow
        .create(
            NewProposal::new(target.clone(), target.clone())
                .with_updates(vec![HeadUpdate::new(target.clone(), c.clone())]),
            Some(&bob),
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for user in [alice.clone(), bob.clone()] {
        let env = env.clone();
        let id = proposal.id.clone();
        handles.push(tokio::spawn(async move {
            env.workflow.accept(&id, Some(&user)).await
        }));
    }
    let mut executed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => executed += 1,
            Err(ProposalError::WrongState { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(executed, 1);
    let head = env.graph.get_perspective(&target, Some(&alice)).await.unwrap().head;
    assert_eq!(head, Some(c));
}
