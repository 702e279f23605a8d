//! Shared test harness for Lens integration tests.
//!
//! [`TestEnv`] wires an [`EntityGraph`] and a [`ProposalWorkflow`] over any
//! [`GraphStore`], with shortcuts for the element shapes most tests need.

use std::sync::Arc;

use lens_graph::EntityGraph;
use lens_proposals::ProposalWorkflow;
use lens_store::{FlakyStore, GraphStore, MemoryGraphStore, RetryPolicy, TxExecutor};
use lens_types::{
    ChildrenDelta, CidConfig, CommitContent, Did, ElementId, HeadUpdate, NewCommit, NewData,
    NewPerspective, PerspectiveContent,
};
use serde_json::json;

/// Fixed timestamp so ids are reproducible across runs.
pub const TIMESTAMP: u64 = 1_700_000_000;

pub fn did(name: &str) -> Did {
    Did::new(format!("did:test:{name}"))
}

/// Perspective input with deterministic content.
pub fn perspective(creator: &Did, path: &str) -> NewPerspective {
    NewPerspective::new(PerspectiveContent {
        creator_id: creator.clone(),
        remote: "local".into(),
        path: path.into(),
        timestamp: TIMESTAMP,
        context: "integration".into(),
    })
}

pub struct TestEnv {
    pub graph: EntityGraph,
    pub workflow: ProposalWorkflow,
}

impl TestEnv {
    /// Volatile store, retries without delay.
    pub fn memory() -> Self {
        Self::on_store(Arc::new(MemoryGraphStore::new()), RetryPolicy::immediate(10))
    }

    /// Memory store behind a [`FlakyStore`] failing `rate` of commits.
    pub fn flaky(rate: f64, seed: u64, retry: RetryPolicy) -> (Self, Arc<FlakyStore>) {
        let flaky = Arc::new(
            FlakyStore::new(Arc::new(MemoryGraphStore::new()))
                .conflict_rate(rate)
                .seed(seed),
        );
        (Self::on_store(flaky.clone(), retry), flaky)
    }

    pub fn on_store(store: Arc<dyn GraphStore>, retry: RetryPolicy) -> Self {
        let graph = EntityGraph::new(TxExecutor::new(store, retry), CidConfig::default());
        Self {
            workflow: ProposalWorkflow::new(graph.clone()),
            graph,
        }
    }

    /// Id `perspective(creator, path)` will get.
    pub fn perspective_id(&self, creator: &Did, path: &str) -> ElementId {
        lens_cid::compute_id_of(&perspective(creator, path).content, self.graph.cid_config())
            .unwrap()
    }

    pub async fn data(&self, text: &str) -> ElementId {
        self.graph
            .create_data(vec![NewData::new(json!({ "text": text }))])
            .await
            .unwrap()
            .remove(0)
    }

    pub async fn commit(
        &self,
        creator: &Did,
        data: &ElementId,
        parents: Vec<ElementId>,
        message: &str,
    ) -> ElementId {
        self.graph
            .create_commits(vec![NewCommit::new(CommitContent {
                creators_ids: vec![creator.clone()],
                timestamp: TIMESTAMP,
                message: message.into(),
                parents_ids: parents,
                data_id: data.clone(),
            })])
            .await
            .unwrap()
            .remove(0)
    }

    /// Self-rooted perspective administered by `creator`.
    pub async fn root(&self, creator: &Did, path: &str) -> ElementId {
        self.graph
            .create_perspectives(vec![perspective(creator, path)], Some(creator))
            .await
            .unwrap()
            .remove(0)
    }

    /// Perspective delegating to `parent`.
    pub async fn child(&self, creator: &Did, path: &str, parent: &ElementId) -> ElementId {
        self.graph
            .create_perspectives(
                vec![perspective(creator, path).with_parent(parent.clone())],
                Some(creator),
            )
            .await
            .unwrap()
            .remove(0)
    }

    /// Add children edges `parent → children` as `caller`.
    pub async fn link(&self, parent: &ElementId, children: &[&ElementId], caller: &Did) {
        let delta = ChildrenDelta {
            added: children.iter().map(|c| (*c).clone()).collect(),
            removed: Vec::new(),
        };
        self.graph
            .update_perspectives(&[HeadUpdate::children(parent.clone(), delta)], Some(caller))
            .await
            .unwrap();
    }
}
