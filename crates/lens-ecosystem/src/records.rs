//! Structural records and transaction-level helpers.
//!
//! Key families owned here, each holding a set of element ids:
//!
//! - `children/<id>`: structural children of a perspective
//! - `parents/<id>`: reverse index of `children`
//! - `ecosystem/<id>`: reflexive-transitive closure over `children`

use std::collections::BTreeSet;

use lens_store::{StoreError, Tx};
use lens_types::{ChildrenDelta, ElementId};

pub const CHILDREN_PREFIX: &str = "children/";
pub const PARENTS_PREFIX: &str = "parents/";
pub const ECOSYSTEM_PREFIX: &str = "ecosystem/";

pub fn children_key(id: &ElementId) -> String {
    format!("{CHILDREN_PREFIX}{id}")
}

pub fn parents_key(id: &ElementId) -> String {
    format!("{PARENTS_PREFIX}{id}")
}

pub fn ecosystem_key(id: &ElementId) -> String {
    format!("{ECOSYSTEM_PREFIX}{id}")
}

/// Edge counts actually changed by [`apply_children_delta`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeChange {
    pub added: usize,
    pub removed: usize,
}

impl EdgeChange {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

pub async fn children(tx: &mut Tx<'_>, id: &ElementId) -> Result<BTreeSet<ElementId>, StoreError> {
    Ok(tx.get(&children_key(id)).await?.unwrap_or_default())
}

pub async fn parents(tx: &mut Tx<'_>, id: &ElementId) -> Result<BTreeSet<ElementId>, StoreError> {
    Ok(tx.get(&parents_key(id)).await?.unwrap_or_default())
}

/// Stored ecosystem of `id`, if one was ever computed.
pub async fn ecosystem(
    tx: &mut Tx<'_>,
    id: &ElementId,
) -> Result<Option<BTreeSet<ElementId>>, StoreError> {
    tx.get(&ecosystem_key(id)).await
}

fn write_set(tx: &mut Tx<'_>, key: String, set: &BTreeSet<ElementId>) -> Result<(), StoreError> {
    if set.is_empty() {
        tx.delete(key);
        Ok(())
    } else {
        tx.put(key, set)
    }
}

/// Add and remove children edges of `parent`, keeping the parents index in
/// step. Edges already present (or already absent) are skipped.
pub async fn apply_children_delta(
    tx: &mut Tx<'_>,
    parent: &ElementId,
    delta: &ChildrenDelta,
) -> Result<EdgeChange, StoreError> {
    let mut current = children(tx, parent).await?;
    let mut change = EdgeChange::default();

    for child in &delta.added {
        if current.insert(child.clone()) {
            let mut back = parents(tx, child).await?;
            back.insert(parent.clone());
            write_set(tx, parents_key(child), &back)?;
            change.added += 1;
        }
    }
    for child in &delta.removed {
        if current.remove(child) {
            let mut back = parents(tx, child).await?;
            back.remove(parent);
            write_set(tx, parents_key(child), &back)?;
            change.removed += 1;
        }
    }

    if !change.is_empty() {
        write_set(tx, children_key(parent), &current)?;
    }
    Ok(change)
}

/// `{id}` plus everything reachable through children edges, by an
/// explicit-stack traversal with a visited set.
pub async fn closure(tx: &mut Tx<'_>, id: &ElementId) -> Result<BTreeSet<ElementId>, StoreError> {
    let mut visited = BTreeSet::new();
    let mut stack = vec![id.clone()];
    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        for child in children(tx, &current).await? {
            if !visited.contains(&child) {
                stack.push(child);
            }
        }
    }
    Ok(visited)
}

/// Every element from which one of `ids` is reachable through children
/// edges, excluding `ids` themselves unless they sit on a cycle.
pub async fn ancestors(
    tx: &mut Tx<'_>,
    ids: &BTreeSet<ElementId>,
) -> Result<BTreeSet<ElementId>, StoreError> {
    let mut found = BTreeSet::new();
    let mut stack: Vec<ElementId> = ids.iter().cloned().collect();
    let mut expanded = BTreeSet::new();
    while let Some(current) = stack.pop() {
        if !expanded.insert(current.clone()) {
            continue;
        }
        for parent in parents(tx, &current).await? {
            found.insert(parent.clone());
            stack.push(parent);
        }
    }
    Ok(found)
}

/// Store `ecosystem` for `id`.
pub fn put_ecosystem(
    tx: &mut Tx<'_>,
    id: &ElementId,
    ecosystem: &BTreeSet<ElementId>,
) -> Result<(), StoreError> {
    tx.put(ecosystem_key(id), ecosystem)
}
