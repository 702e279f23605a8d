//! Integration test: end-to-end scenarios over a memory store.
//!
//! Each test drives the public graph and access APIs the way a client would
//! and checks the stored state afterwards.

use std::collections::BTreeSet;

use lens_integration_tests::{TestEnv, did, perspective};
use lens_types::{AccessConfig, ElementId, NewData, PermissionKind};
use serde_json::json;

fn set(ids: &[&ElementId]) -> BTreeSet<ElementId> {
    ids.iter().map(|id| (*id).clone()).collect()
}

/// Creating the same data twice yields one id and one record.
#[tokio::test]
async fn test_duplicate_data_is_stored_once() {
    let env = TestEnv::memory();
    let first = env.data("hello").await;
    let second = env.data("hello").await;
    assert_eq!(first, second);

    let counts = env.graph.key_family_counts().await.unwrap();
    assert_eq!(counts.get("element"), Some(&1));
}

/// Ids are content ids: stable, order-independent, and invalidated by any
/// change to the content.
#[tokio::test]
async fn test_ids_follow_content() {
    let env = TestEnv::memory();
    let ids = env
        .graph
        .create_data(vec![
            NewData::new(json!({"title": "notes", "tags": ["a", "b"], "n": 1})),
            NewData::new(json!({"n": 1, "tags": ["a", "b"], "title": "notes"})),
        ])
        .await
        .unwrap();
    assert_eq!(ids[0], ids[1]);
    assert!(lens_cid::validate(
        ids[0].as_str(),
        &json!({"title": "notes", "tags": ["a", "b"], "n": 1})
    ));
    assert!(!lens_cid::validate(
        ids[0].as_str(),
        &json!({"title": "notes", "tags": ["b", "a"], "n": 1})
    ));
    assert!(!lens_cid::validate(
        ids[0].as_str(),
        &json!({"title": "notes", "tags": ["a", "b"], "n": 2})
    ));
}

/// Data, a commit on it and a perspective pointing at the commit.
#[tokio::test]
async fn test_data_commit_perspective_flow() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let d = env.data("hello").await;
    let c = env.commit(&alice, &d, vec![], "init").await;
    let p = env
        .graph
        .create_perspectives(
            vec![perspective(&alice, "main").with_head(c.clone())],
            Some(&alice),
        )
        .await
        .unwrap()
        .remove(0);

    let read = env.graph.get_perspective(&p, Some(&alice)).await.unwrap();
    assert_eq!(read.head, Some(c.clone()));
    let commit = env.graph.get_commit(&c).await.unwrap();
    assert_eq!(commit.content.data_id, d);
    let data = env.graph.get_data(&d).await.unwrap();
    assert_eq!(data.payload.value(), &json!({"text": "hello"}));

    let c2 = env.commit(&alice, &d, vec![c.clone()], "second").await;
    env.graph
        .update_perspectives(
            &[lens_types::HeadUpdate::new(p.clone(), c2.clone())],
            Some(&alice),
        )
        .await
        .unwrap();
    let read = env.graph.get_perspective(&p, Some(&alice)).await.unwrap();
    assert_eq!(read.id, p, "perspective id survives head moves");
    assert_eq!(read.head, Some(c2));
}

/// A root perspective and a child delegating to it.
#[tokio::test]
async fn test_child_inherits_root_permissions() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let p1 = env.root(&alice, "p1").await;
    let p2 = env.child(&alice, "p2", &p1).await;

    let root: AccessConfig = env.graph.access().access_config(&p1).await.unwrap();
    assert!(!root.delegate);
    assert_eq!(root.fin_delegated_to, p1);

    let child = env.graph.access().access_config(&p2).await.unwrap();
    assert!(child.delegate);
    assert_eq!(child.delegate_to, Some(p1.clone()));
    assert_eq!(child.fin_delegated_to, p1);
    assert_eq!(child.permissions.can_read, root.permissions.can_read);
    assert_eq!(child.permissions.can_write, root.permissions.can_write);
    assert_eq!(child.permissions.can_admin, root.permissions.can_admin);
}

/// Detaching a middle element makes it the root of everything below it.
#[tokio::test]
async fn test_detach_reroots_descendants() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let p1 = env.root(&alice, "p1").await;
    let p2 = env.child(&alice, "p2", &p1).await;
    let p3 = env.child(&alice, "p3", &p2).await;
    assert_eq!(
        env.graph.access().access_config(&p3).await.unwrap().fin_delegated_to,
        p1
    );

    env.graph
        .access()
        .set_delegation(&p2, None, Some(&alice))
        .await
        .unwrap();

    let access = env.graph.access();
    assert_eq!(access.access_config(&p2).await.unwrap().fin_delegated_to, p2);
    assert_eq!(access.access_config(&p3).await.unwrap().fin_delegated_to, p2);
    assert_eq!(access.access_config(&p1).await.unwrap().fin_delegated_to, p1);
    assert!(env.graph.audit().await.unwrap().is_clean());
}

/// A later grant replaces the user's earlier role.
#[tokio::test]
async fn test_regrant_replaces_role() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let xavier = did("xavier");
    let p1 = env.root(&alice, "p1").await;
    let access = env.graph.access();

    access
        .add_permission(&p1, PermissionKind::Write, &xavier, Some(&alice))
        .await
        .unwrap();
    let permissions = access
        .add_permission(&p1, PermissionKind::Read, &xavier, Some(&alice))
        .await
        .unwrap();

    assert!(permissions.can_read.contains(&xavier));
    assert!(!permissions.can_write.contains(&xavier));
    assert_eq!(
        access.permissions_of(&p1, &xavier).await.unwrap(),
        Some(PermissionKind::Read)
    );
    assert!(
        !access
            .effective_permission(&p1, Some(&xavier), PermissionKind::Write)
            .await
            .unwrap()
    );
}

/// Ecosystem of a two-level tree covers every descendant.
#[tokio::test]
async fn test_ecosystem_of_tree() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let p = env.root(&alice, "p").await;
    let c1 = env.root(&alice, "c1").await;
    let c2 = env.root(&alice, "c2").await;
    let c11 = env.root(&alice, "c11").await;

    env.link(&p, &[&c1, &c2], &alice).await;
    env.link(&c1, &[&c11], &alice).await;

    let ecosystem = env.graph.ecosystem();
    assert_eq!(ecosystem.ecosystem(&p).await.unwrap(), set(&[&p, &c1, &c2, &c11]));
    assert_eq!(ecosystem.ecosystem(&c1).await.unwrap(), set(&[&c1, &c11]));
    assert_eq!(ecosystem.ecosystem(&c2).await.unwrap(), set(&[&c2]));

    let readable = env.graph.readable_ecosystem(&p, Some(&alice)).await.unwrap();
    assert_eq!(readable.len(), 4);
    assert!(env.graph.audit().await.unwrap().is_clean());
}

/// A single-child chain still propagates to the top.
#[tokio::test]
async fn test_ecosystem_of_single_child_chain() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let ids: Vec<ElementId> = {
        let mut ids = Vec::new();
        for depth in 0..5 {
            ids.push(env.root(&alice, &format!("level-{depth}")).await);
        }
        ids
    };
    // Top-down, so each new edge has to reach every existing ancestor.
    for pair in ids.windows(2) {
        env.link(&pair[0], &[&pair[1]], &alice).await;
    }

    let top = env.graph.ecosystem().ecosystem(&ids[0]).await.unwrap();
    assert_eq!(top, ids.iter().cloned().collect::<BTreeSet<_>>());
}

/// Readers that lack access see the same error as for missing elements.
#[tokio::test]
async fn test_unreadable_looks_missing() {
    let env = TestEnv::memory();
    let alice = did("alice");
    let mallory = did("mallory");
    let p = env.root(&alice, "secret").await;

    let hidden = env.graph.get_perspective(&p, Some(&mallory)).await.unwrap_err();
    let missing = env
        .graph
        .get_perspective(&ElementId::new("zDoesNotExist"), Some(&mallory))
        .await
        .unwrap_err();
    assert_eq!(hidden.kind(), missing.kind());

    let hidden = env
        .graph
        .access()
        .add_permission(&p, PermissionKind::Read, &mallory, Some(&mallory))
        .await
        .unwrap_err();
    assert_eq!(hidden.kind(), lens_types::ErrorKind::NotFound);
}
