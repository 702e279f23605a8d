//! Tests for the lens-access crate.


use std::sync::Arc;

use lens_store::{MemoryGraphStore, RetryPolicy, Transaction, Tx, TxExecutor};
use lens_types::{Did, ElementId};

use crate::engine::AccessEngine;
use crate::error::AccessError;
use crate::records;

fn id(s: &str) -> ElementId {
    ElementId::new(s)
}

fn alice() -> Did {
    Did::new("did:alice")
}

fn bob() -> Did {
    Did::new("did:bob")
}

fn carol() -> Did {
    Did::new("did:carol")
}

/// Creates root configs administered by `admin`.
struct SeedRoots {
    ids: Vec<ElementId>,
    admin: Did,
}

#[async_trait::async_trait]
impl Transaction for SeedRoots {
    type Output = ();
    type Error = AccessError;

    fn name(&self) -> &'static str {
        "seed-roots"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<(), AccessError> {
        for id in &self.ids {
            records::init_root(tx, id, &self.admin).await?;
        }
        Ok(())
    }
}

/// Engine over a fresh memory store, plus its executor.
fn test_engine() -> (AccessEngine, TxExecutor) {
    let executor = TxExecutor::new(Arc::new(MemoryGraphStore::new()), RetryPolicy::immediate(10));
    (AccessEngine::new(executor.clone()), executor)
}

/// Seed root configs for `ids`, administered by alice.
async fn seed(executor: &TxExecutor, ids: &[&str]) {
    executor
        .run(&SeedRoots {
            ids: ids.iter().map(|s| id(s)).collect(),
            admin: alice(),
        })
        .await
        .unwrap();
}
