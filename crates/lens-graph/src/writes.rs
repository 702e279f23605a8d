//! Transactions behind the entity graph's write operations.
//!
//! [`plan_perspectives`] and [`plan_updates`] are public so that other
//! transactions (proposal acceptance) can compose them.

use std::collections::BTreeSet;

use lens_access::records as access;
use lens_ecosystem::records as structure;
use lens_store::{Transaction, Tx};
use lens_types::{
    ChildrenDelta, CommitContent, Did, ElementId, HeadUpdate, NewPerspective, Payload,
    PermissionKind,
};
use serde_json::Value;
use tracing::debug;

use crate::error::GraphError;
use crate::records::{self, ElementBody, ElementRecord, PerspectiveState, element_key};

type Result<T> = std::result::Result<T, GraphError>;

/// Whether an element with a real (non-stub) record exists in `tx`'s view.
async fn is_stored(tx: &mut Tx<'_>, id: &ElementId) -> Result<bool> {
    Ok(records::load_element(tx, id)
        .await?
        .is_some_and(|record| record.is_stored()))
}

pub(crate) struct CreateDataTx {
    pub items: Vec<(ElementId, Value)>,
}

#[async_trait::async_trait]
impl Transaction for CreateDataTx {
    type Output = ();
    type Error = GraphError;

    fn name(&self) -> &'static str {
        "create-data"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<()> {
        for (id, payload) in &self.items {
            if is_stored(tx, id).await? {
                continue;
            }
            let record = ElementRecord {
                id: id.clone(),
                body: ElementBody::Data(Payload::new(payload.clone())),
            };
            tx.put(element_key(id), &record)?;
            debug!(%id, "stored data");
        }
        Ok(())
    }
}

pub(crate) struct CreateCommitsTx {
    pub items: Vec<(ElementId, CommitContent)>,
}

#[async_trait::async_trait]
impl Transaction for CreateCommitsTx {
    type Output = ();
    type Error = GraphError;

    fn name(&self) -> &'static str {
        "create-commits"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<()> {
        for (id, content) in &self.items {
            if is_stored(tx, id).await? {
                continue;
            }
            for creator in &content.creators_ids {
                records::upsert_profile(tx, creator).await?;
            }
            for parent in &content.parents_ids {
                records::ensure_element(tx, parent).await?;
            }
            records::ensure_element(tx, &content.data_id).await?;

            let record = ElementRecord {
                id: id.clone(),
                body: ElementBody::Commit(content.clone()),
            };
            tx.put(element_key(id), &record)?;
            debug!(%id, parents = content.parents_ids.len(), "stored commit");
        }
        Ok(())
    }
}

/// What a perspective batch did, for the follow-up passes.
#[derive(Debug, Default)]
pub struct PerspectivePlan {
    /// Perspectives written by this batch (pre-existing ones excluded).
    pub created: Vec<ElementId>,
    /// `(element, parent)` pairs whose parent was not resolvable in the batch.
    pub deferred: Vec<(ElementId, ElementId)>,
}

/// Write perspectives with their stubs, children edges and initial access
/// config inside `tx`. Perspectives that already exist are skipped.
///
/// The caller must hand the returned plan to
/// [`EntityGraph::settle_perspectives`](crate::EntityGraph::settle_perspectives)
/// once `tx` has committed.
pub async fn plan_perspectives(
    tx: &mut Tx<'_>,
    items: &[(ElementId, NewPerspective)],
) -> Result<PerspectivePlan> {
    let mut plan = PerspectivePlan::default();
    for (id, item) in items {
        if is_stored(tx, id).await? {
            debug!(%id, "perspective already exists");
            continue;
        }

        let creator = &item.content.creator_id;
        records::upsert_profile(tx, creator).await?;
        if let Some(head) = &item.head {
            records::ensure_element(tx, head).await?;
        }
        for child in &item.children {
            records::ensure_element(tx, child).await?;
        }

        let record = ElementRecord {
            id: id.clone(),
            body: ElementBody::Perspective(PerspectiveState {
                content: item.content.clone(),
                proof: item.proof.clone(),
                head: item.head.clone(),
                deleted: false,
            }),
        };
        tx.put(element_key(id), &record)?;

        let delta = ChildrenDelta {
            added: item.children.clone(),
            removed: Vec::new(),
        };
        structure::apply_children_delta(tx, id, &delta).await?;

        match &item.parent_id {
            None => {
                access::init_root(tx, id, creator).await?;
            }
            Some(parent) => {
                if access::try_delegate_new(tx, id, parent).await?.is_none() {
                    access::init_root(tx, id, creator).await?;
                    plan.deferred.push((id.clone(), parent.clone()));
                }
            }
        }

        debug!(%id, %creator, "stored perspective");
        plan.created.push(id.clone());
    }
    Ok(plan)
}

pub(crate) struct CreatePerspectivesTx {
    pub items: Vec<(ElementId, NewPerspective)>,
}

#[async_trait::async_trait]
impl Transaction for CreatePerspectivesTx {
    type Output = PerspectivePlan;
    type Error = GraphError;

    fn name(&self) -> &'static str {
        "create-perspectives"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<PerspectivePlan> {
        plan_perspectives(tx, &self.items).await
    }
}

/// Perspectives whose children changed, and whether any edge was removed.
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub restructured: Vec<ElementId>,
    pub removed_edges: bool,
}

/// Apply head and children changes inside `tx`. Authorization is the
/// caller's job. Fails with NotFound on a missing or deleted perspective.
pub async fn plan_updates(tx: &mut Tx<'_>, updates: &[HeadUpdate]) -> Result<UpdateOutcome> {
    let mut restructured = BTreeSet::new();
    let mut removed_edges = false;

    for update in updates {
        let id = &update.perspective_id;
        let Some(mut record) = records::load_element(tx, id).await? else {
            return Err(GraphError::NotFound(id.clone()));
        };
        let ElementBody::Perspective(state) = &mut record.body else {
            return Err(GraphError::NotFound(id.clone()));
        };
        if state.deleted {
            return Err(GraphError::NotFound(id.clone()));
        }

        if let Some(head) = &update.new_head_id {
            records::ensure_element(tx, head).await?;
            state.head = Some(head.clone());
            tx.put(element_key(id), &record)?;
        }

        for child in &update.children.added {
            records::ensure_element(tx, child).await?;
        }
        let change = structure::apply_children_delta(tx, id, &update.children).await?;
        if !change.is_empty() {
            restructured.insert(id.clone());
            removed_edges |= change.removed > 0;
        }
        debug!(
            %id,
            head = ?update.new_head_id,
            added = change.added,
            removed = change.removed,
            "updated perspective"
        );
    }

    Ok(UpdateOutcome {
        restructured: restructured.into_iter().collect(),
        removed_edges,
    })
}

/// Authorized update batch: the Write check runs in the same transaction as
/// the updates, so a concurrent revoke forces a re-plan.
pub(crate) struct UpdatePerspectivesTx {
    pub updates: Vec<HeadUpdate>,
    pub caller: Option<Did>,
}

#[async_trait::async_trait]
impl Transaction for UpdatePerspectivesTx {
    type Output = UpdateOutcome;
    type Error = GraphError;

    fn name(&self) -> &'static str {
        "update-perspectives"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<UpdateOutcome> {
        if !access::can_update_batch(tx, &self.updates, self.caller.as_ref()).await? {
            return Err(GraphError::NotAuthorized {
                action: format!("update {} perspective(s)", self.updates.len()),
            });
        }
        plan_updates(tx, &self.updates).await
    }
}

pub(crate) struct DeletePerspectiveTx {
    pub id: ElementId,
    pub caller: Did,
}

#[async_trait::async_trait]
impl Transaction for DeletePerspectiveTx {
    type Output = ();
    type Error = GraphError;

    fn name(&self) -> &'static str {
        "delete-perspective"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<()> {
        let id = &self.id;
        let Some(mut record) = records::load_element(tx, id).await? else {
            return Err(GraphError::NotFound(id.clone()));
        };
        let ElementBody::Perspective(state) = &mut record.body else {
            return Err(GraphError::NotFound(id.clone()));
        };
        if state.deleted {
            return Err(GraphError::NotFound(id.clone()));
        }

        let caller = Some(&self.caller);
        if access::check(tx, id, caller, PermissionKind::Read).await? != Some(true) {
            return Err(GraphError::NotFound(id.clone()));
        }
        if access::check(tx, id, caller, PermissionKind::Admin).await? != Some(true) {
            return Err(GraphError::NotAuthorized {
                action: format!("delete perspective {id}"),
            });
        }

        state.deleted = true;
        tx.put(element_key(id), &record)?;
        debug!(%id, caller = %self.caller, "perspective tombstoned");
        Ok(())
    }
}
