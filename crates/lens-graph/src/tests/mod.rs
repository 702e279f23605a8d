//! Tests for the lens-graph crate.


use std::sync::Arc;

use lens_store::{MemoryGraphStore, RetryPolicy, TxExecutor};
use lens_types::{
    CidConfig, CommitContent, Did, ElementId, NewCommit, NewData, NewPerspective,
    PerspectiveContent,
};
use serde_json::json;

use crate::graph::EntityGraph;

fn test_graph() -> EntityGraph {
    let executor = TxExecutor::new(Arc::new(MemoryGraphStore::new()), RetryPolicy::immediate(10));
    EntityGraph::new(executor, CidConfig::default())
}

fn alice() -> Did {
    Did::new("did:alice")
}

fn bob() -> Did {
    Did::new("did:bob")
}

fn perspective(creator: &Did, path: &str) -> NewPerspective {
    NewPerspective::new(PerspectiveContent {
        creator_id: creator.clone(),
        remote: "local".into(),
        path: path.into(),
        timestamp: 1_700_000_000,
        context: format!("ctx-{path}"),
    })
}

fn commit(creator: &Did, data: &ElementId, parents: Vec<ElementId>, message: &str) -> NewCommit {
    NewCommit::new(CommitContent {
        creators_ids: vec![creator.clone()],
        timestamp: 1_700_000_000,
        message: message.into(),
        parents_ids: parents,
        data_id: data.clone(),
    })
}

/// Store `{"text": text}` and return its id.
async fn data(graph: &EntityGraph, text: &str) -> ElementId {
    let ids = graph
        .create_data(vec![NewData::new(json!({ "text": text }))])
        .await
        .unwrap();
    ids[0].clone()
}

/// Create one root perspective owned by `creator`.
async fn root_perspective(graph: &EntityGraph, creator: &Did, path: &str) -> ElementId {
    let ids = graph
        .create_perspectives(vec![perspective(creator, path)], Some(creator))
        .await
        .unwrap();
    ids[0].clone()
}
