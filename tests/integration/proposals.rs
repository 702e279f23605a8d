//! Integration test: proposals between perspectives owned by different users.

use lens_integration_tests::{TestEnv, did, perspective};
use lens_proposals::ProposalError;
use lens_types::{ErrorKind, HeadUpdate, NewProposal, PermissionKind, ProposalState};

/// A user who may write only one of two updated perspectives cannot accept
/// the proposal, and neither update lands.
#[tokio::test]
async fn test_partial_write_access_blocks_accept() {
    let env = TestEnv::memory();
    let owner = did("owner");
    let author = did("author");
    let yvonne = did("yvonne");

    let d = env.data("change").await;
    let c = env.commit(&author, &d, vec![], "change").await;
    let first = env.root(&owner, "first").await;
    let second = env.root(&owner, "second").await;
    let fork = env.root(&author, "fork").await;
    env.graph
        .access()
        .add_permission(&first, PermissionKind::Write, &yvonne, Some(&owner))
        .await
        .unwrap();

    let proposal = env
        .workflow
        .create(
            NewProposal::new(fork.clone(), first.clone()).with_updates(vec![
                HeadUpdate::new(first.clone(), c.clone()),
                HeadUpdate::new(second.clone(), c.clone()),
            ]),
            Some(&author),
        )
        .await
        .unwrap();

    let err = env.workflow.accept(&proposal.id, Some(&yvonne)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    for id in [&first, &second] {
        let read = env.graph.get_perspective(id, Some(&owner)).await.unwrap();
        assert_eq!(read.head, None);
    }

    let executed = env.workflow.accept(&proposal.id, Some(&owner)).await.unwrap();
    assert_eq!(executed.state, ProposalState::Executed);
    for id in [&first, &second] {
        let read = env.graph.get_perspective(id, Some(&owner)).await.unwrap();
        assert_eq!(read.head, Some(c.clone()));
    }
}

/// Accepting a proposal that brings new perspectives under the target.
#[tokio::test]
async fn test_accept_grows_target_tree() {
    let env = TestEnv::memory();
    let owner = did("owner");
    let author = did("author");
    let target = env.root(&owner, "doc").await;

    let section_id = env.perspective_id(&author, "doc/section");
    let paragraph_id = env.perspective_id(&author, "doc/section/paragraph");
    let proposal = env
        .workflow
        .create(
            NewProposal::new(target.clone(), target.clone())
                .with_new_perspectives(vec![
                    perspective(&author, "doc/section/paragraph")
                        .with_parent(section_id.clone()),
                    perspective(&author, "doc/section")
                        .with_parent(target.clone())
                        .with_children(vec![paragraph_id.clone()]),
                ])
                .with_updates(vec![
                    HeadUpdate::children(target.clone(), Default::default())
                        .with_added_children(vec![section_id.clone()]),
                ]),
            Some(&author),
        )
        .await
        .unwrap();

    env.workflow.accept(&proposal.id, Some(&owner)).await.unwrap();

    let ecosystem = env.graph.ecosystem().ecosystem(&target).await.unwrap();
    assert!(ecosystem.contains(&section_id));
    assert!(ecosystem.contains(&paragraph_id));
    for id in [&section_id, &paragraph_id] {
        let access = env.graph.access().access_config(id).await.unwrap();
        assert_eq!(access.fin_delegated_to, target, "{id}");
    }
    let report = env.graph.audit().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
}

#[tokio::test]
async fn test_listings_track_state() {
    let env = TestEnv::memory();
    let owner = did("owner");
    let author = did("author");
    let d = env.data("x").await;
    let c = env.commit(&author, &d, vec![], "x").await;
    let target = env.root(&owner, "target").await;
    let other = env.root(&owner, "other").await;

    let mut ids = Vec::new();
    for to in [&target, &target, &other] {
        let proposal = env
            .workflow
            .create(
                NewProposal::new(other.clone(), to.clone())
                    .with_updates(vec![HeadUpdate::new(to.clone(), c.clone())]),
                Some(&author),
            )
            .await
            .unwrap();
        ids.push(proposal.id);
    }

    assert_eq!(env.workflow.proposals_for(&target).await.unwrap().len(), 2);
    assert_eq!(env.workflow.proposals_for(&other).await.unwrap().len(), 1);

    env.workflow.reject(&ids[0], Some(&owner)).await.unwrap();
    env.workflow.decline(&ids[1], Some(&author)).await.unwrap();

    let count = |state: ProposalState| {
        let workflow = env.workflow.clone();
        async move { workflow.proposals_in_state(state).await.unwrap().len() }
    };
    assert_eq!(count(ProposalState::Open).await, 1);
    assert_eq!(count(ProposalState::Rejected).await, 1);
    assert_eq!(count(ProposalState::Declined).await, 1);
    assert_eq!(count(ProposalState::Executed).await, 0);
    assert_eq!(env.workflow.proposals_for(&target).await.unwrap().len(), 2);

    let err = env.workflow.accept(&ids[0], Some(&owner)).await.unwrap_err();
    assert!(matches!(err, ProposalError::WrongState { state: ProposalState::Rejected, .. }));
}
