//! Chaos test: injected commit conflicts.
//!
//! The store randomly rejects commits as conflicting. Every operation must
//! either complete with the same result as on a quiet store or fail with
//! ConflictExhausted without applying anything.

use lens_graph::GraphError;
use lens_integration_tests::{TestEnv, did};
use lens_store::{RetryPolicy, StoreError};
use lens_types::{ErrorKind, HeadUpdate, NewData, NewProposal, PermissionKind, ProposalState};
use serde_json::json;

/// A full workflow over a store failing a third of all commits.
#[tokio::test]
async fn test_workflow_survives_conflicts() {
    let (env, flaky) = TestEnv::flaky(0.3, 7, RetryPolicy::immediate(50));
    let alice = did("alice");
    let bob = did("bob");

    let d = env.data("chaos").await;
    let c = env.commit(&alice, &d, vec![], "init").await;
    let root = env.root(&alice, "root").await;
    let mut children = Vec::new();
    for i in 0..6 {
        let parent = children.last().unwrap_or(&root).clone();
        children.push(env.child(&alice, &format!("child-{i}"), &parent).await);
    }
    let refs: Vec<&_> = children.iter().collect();
    env.link(&root, &refs, &alice).await;
    env.graph
        .access()
        .add_permission(&root, PermissionKind::Write, &bob, Some(&alice))
        .await
        .unwrap();

    let proposal = env
        .workflow
        .create(
            NewProposal::new(root.clone(), root.clone())
                .with_updates(vec![HeadUpdate::new(children[5].clone(), c.clone())]),
            Some(&alice),
        )
        .await
        .unwrap();
    let executed = env.workflow.accept(&proposal.id, Some(&bob)).await.unwrap();
    assert_eq!(executed.state, ProposalState::Executed);

    assert!(flaky.injected() > 0, "the run should have hit conflicts");
    for child in &children {
        let access = env.graph.access().access_config(child).await.unwrap();
        assert_eq!(access.fin_delegated_to, root);
        assert!(access.permissions.can_write.contains(&bob));
    }
    let head = env.graph.get_perspective(&children[5], Some(&bob)).await.unwrap().head;
    assert_eq!(head, Some(c));

    let report = env.graph.audit().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
}

/// Every commit conflicts: the budget runs out and nothing is written.
#[tokio::test]
async fn test_exhaustion_applies_nothing() {
    let (env, flaky) = TestEnv::flaky(1.0, 1, RetryPolicy::immediate(4));

    let err = env
        .graph
        .create_data(vec![NewData::new(json!({"text": "never"}))])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictExhausted);
    assert!(matches!(
        err,
        GraphError::Store(StoreError::ConflictExhausted { attempts: 4, .. })
    ));
    assert_eq!(flaky.injected(), 4);
    assert!(env.graph.key_family_counts().await.unwrap().is_empty());
}
