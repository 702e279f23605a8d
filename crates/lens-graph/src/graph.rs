//! [`EntityGraph`]: the public read/write surface over elements.

use std::collections::{BTreeMap, BTreeSet};

use lens_access::{AccessEngine, AccessError};
use lens_ecosystem::{EcosystemMaintainer, RefreshMode};
use lens_store::TxExecutor;
use lens_types::{
    AccessConfig, CidConfig, Commit, Data, Did, ElementId, HeadUpdate, NewCommit, NewData,
    NewPerspective, PermissionKind, Perspective,
};
use tracing::{info, warn};

use crate::error::GraphError;
use crate::identity::{resolve_id, resolve_value_id};
use crate::records::{ElementBody, ElementRecord, element_key};
use crate::writes::{
    CreateCommitsTx, CreateDataTx, CreatePerspectivesTx, DeletePerspectiveTx, PerspectivePlan,
    UpdateOutcome, UpdatePerspectivesTx,
};

type Result<T> = std::result::Result<T, GraphError>;

/// A perspective together with its structure and access state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerspectiveDetails {
    pub perspective: Perspective,
    pub children: BTreeSet<ElementId>,
    pub ecosystem: BTreeSet<ElementId>,
    pub access: AccessConfig,
}

/// Content-addressed store of data, commits and perspectives.
///
/// Every write is one transaction run through the shared [`TxExecutor`];
/// delegation follow-ups and ecosystem passes run as their own transactions
/// after it commits.
#[derive(Clone)]
pub struct EntityGraph {
    executor: TxExecutor,
    cid: CidConfig,
    access: AccessEngine,
    ecosystem: EcosystemMaintainer,
}

impl EntityGraph {
    pub fn new(executor: TxExecutor, cid: CidConfig) -> Self {
        Self {
            access: AccessEngine::new(executor.clone()),
            ecosystem: EcosystemMaintainer::new(executor.clone()),
            executor,
            cid,
        }
    }

    pub fn access(&self) -> &AccessEngine {
        &self.access
    }

    pub fn ecosystem(&self) -> &EcosystemMaintainer {
        &self.ecosystem
    }

    pub fn executor(&self) -> &TxExecutor {
        &self.executor
    }

    pub fn cid_config(&self) -> &CidConfig {
        &self.cid
    }

    // ----- Writes -----

    /// Store data payloads. Returns their ids in input order; payloads that
    /// already exist are left untouched.
    pub async fn create_data(&self, batch: Vec<NewData>) -> Result<Vec<ElementId>> {
        let mut items = Vec::with_capacity(batch.len());
        for item in batch {
            let id = resolve_value_id(item.id.as_ref(), &item.payload, &self.cid)?;
            items.push((id, item.payload));
        }
        let ids: Vec<ElementId> = items.iter().map(|(id, _)| id.clone()).collect();

        self.executor.run(&CreateDataTx { items }).await?;
        info!(count = ids.len(), "data batch stored");
        Ok(ids)
    }

    /// Store commits. Referenced parents and data that do not exist yet are
    /// recorded as stubs; creators get a profile on first reference.
    pub async fn create_commits(&self, batch: Vec<NewCommit>) -> Result<Vec<ElementId>> {
        let mut items = Vec::with_capacity(batch.len());
        for item in batch {
            let id = resolve_id(item.id.as_ref(), &item.content, &self.cid)?;
            items.push((id, item.content));
        }
        let ids: Vec<ElementId> = items.iter().map(|(id, _)| id.clone()).collect();

        self.executor.run(&CreateCommitsTx { items }).await?;
        info!(count = ids.len(), "commit batch stored");
        Ok(ids)
    }

    /// Create perspectives with their initial head, children and delegation.
    ///
    /// A perspective whose parent appears neither in the store nor earlier in
    /// the batch starts as its own root and is re-delegated once the whole
    /// batch has committed.
    pub async fn create_perspectives(
        &self,
        batch: Vec<NewPerspective>,
        caller: Option<&Did>,
    ) -> Result<Vec<ElementId>> {
        if caller.is_none() {
            return Err(GraphError::AnonymousUser);
        }

        let items = self.resolve_perspectives(batch)?;
        let ids: Vec<ElementId> = items.iter().map(|(id, _)| id.clone()).collect();

        let plan = self.executor.run(&CreatePerspectivesTx { items }).await?;
        self.settle_perspectives(&plan).await?;

        info!(
            count = ids.len(),
            created = plan.created.len(),
            deferred = plan.deferred.len(),
            "perspective batch stored"
        );
        Ok(ids)
    }

    /// Pair every perspective with its verified content id.
    pub fn resolve_perspectives(
        &self,
        batch: Vec<NewPerspective>,
    ) -> Result<Vec<(ElementId, NewPerspective)>> {
        batch
            .into_iter()
            .map(|item| Ok((resolve_id(item.id.as_ref(), &item.content, &self.cid)?, item)))
            .collect()
    }

    /// Follow-up work after a perspective batch committed: deferred
    /// delegations, then the ecosystem pass over new perspectives.
    pub async fn settle_perspectives(&self, plan: &PerspectivePlan) -> Result<()> {
        for (element, parent) in &plan.deferred {
            match self.access.set_delegation_unchecked(element, Some(parent)).await {
                Ok(_) => {}
                Err(AccessError::TargetUnresolved { .. }) => {
                    warn!(%element, %parent, "delegation parent unresolved, element stays its own root");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.ecosystem
            .refresh(&plan.created, RefreshMode::Grow)
            .await?;
        Ok(())
    }

    /// Apply head and children changes. The caller needs write access to
    /// every perspective in the batch, checked inside the update transaction.
    pub async fn update_perspectives(&self, updates: &[HeadUpdate], caller: Option<&Did>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let outcome = self
            .executor
            .run(&UpdatePerspectivesTx {
                updates: updates.to_vec(),
                caller: caller.cloned(),
            })
            .await?;
        self.settle_updates(&outcome).await?;

        info!(
            updates = updates.len(),
            restructured = outcome.restructured.len(),
            "perspectives updated"
        );
        Ok(())
    }

    /// Ecosystem pass after an update batch committed.
    pub async fn settle_updates(&self, outcome: &UpdateOutcome) -> Result<()> {
        let mode = if outcome.removed_edges {
            RefreshMode::Recompute
        } else {
            RefreshMode::Grow
        };
        self.ecosystem.refresh(&outcome.restructured, mode).await?;
        Ok(())
    }

    /// Tombstone a perspective. Requires admin permission.
    pub async fn delete_perspective(&self, id: &ElementId, caller: Option<&Did>) -> Result<()> {
        let caller = caller.ok_or(GraphError::AnonymousUser)?;
        self.executor
            .run(&DeletePerspectiveTx {
                id: id.clone(),
                caller: caller.clone(),
            })
            .await?;
        info!(%id, %caller, "perspective deleted");
        Ok(())
    }

    // ----- Reads -----

    async fn record(&self, id: &ElementId) -> Result<ElementRecord> {
        self.executor
            .read(&element_key(id))
            .await?
            .ok_or_else(|| GraphError::NotFound(id.clone()))
    }

    pub async fn get_data(&self, id: &ElementId) -> Result<Data> {
        match self.record(id).await?.body {
            ElementBody::Data(payload) => Ok(Data {
                id: id.clone(),
                payload,
            }),
            _ => Err(GraphError::NotFound(id.clone())),
        }
    }

    pub async fn get_commit(&self, id: &ElementId) -> Result<Commit> {
        match self.record(id).await?.body {
            ElementBody::Commit(content) => Ok(Commit {
                id: id.clone(),
                content,
            }),
            _ => Err(GraphError::NotFound(id.clone())),
        }
    }

    /// A live perspective the caller can read. Anything else is NotFound.
    pub async fn get_perspective(&self, id: &ElementId, caller: Option<&Did>) -> Result<Perspective> {
        let ElementBody::Perspective(state) = self.record(id).await?.body else {
            return Err(GraphError::NotFound(id.clone()));
        };
        if state.deleted || !self.can_read(id, caller).await? {
            return Err(GraphError::NotFound(id.clone()));
        }
        Ok(Perspective {
            id: id.clone(),
            content: state.content,
            proof: state.proof,
            head: state.head,
            deleted: false,
        })
    }

    pub async fn perspective_details(
        &self,
        id: &ElementId,
        caller: Option<&Did>,
    ) -> Result<PerspectiveDetails> {
        let perspective = self.get_perspective(id, caller).await?;
        Ok(PerspectiveDetails {
            perspective,
            children: self.ecosystem.children_of(id).await?,
            ecosystem: self.ecosystem.ecosystem(id).await?,
            access: self.access.access_config(id).await?,
        })
    }

    /// Members of `id`'s ecosystem that are live perspectives readable by
    /// the caller, `id` included.
    pub async fn readable_ecosystem(
        &self,
        id: &ElementId,
        caller: Option<&Did>,
    ) -> Result<Vec<ElementId>> {
        self.get_perspective(id, caller).await?;

        let mut readable = Vec::new();
        for member in self.ecosystem.ecosystem(id).await? {
            match self.get_perspective(&member, caller).await {
                Ok(_) => readable.push(member),
                Err(GraphError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(readable)
    }

    async fn can_read(&self, id: &ElementId, caller: Option<&Did>) -> Result<bool> {
        match self
            .access
            .effective_permission(id, caller, PermissionKind::Read)
            .await
        {
            Ok(allowed) => Ok(allowed),
            Err(AccessError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of stored keys per key family (the segment before the first `/`).
    pub async fn key_family_counts(&self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for (key, _) in self.executor.store().scan_prefix("").await? {
            let family = key.split('/').next().unwrap_or_default().to_owned();
            *counts.entry(family).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
