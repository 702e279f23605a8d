//! Access-config records and transaction-level helpers.
//!
//! Two key families are owned here:
//!
//! - `access/<id>` → [`AccessConfig`]
//! - `delegators/<id>` → set of elements whose `delegate_to` is `<id>`
//!
//! The helpers run inside a caller's [`Tx`], so element creation and its
//! initial delegation commit together.

use std::collections::{BTreeMap, BTreeSet};

use lens_store::{StoreError, Tx};
use lens_types::{AccessConfig, Did, ElementId, HeadUpdate, PermissionKind, PermissionSet};
use tracing::debug;

use crate::error::AccessError;

pub const ACCESS_PREFIX: &str = "access/";
pub const DELEGATORS_PREFIX: &str = "delegators/";

pub fn access_key(id: &ElementId) -> String {
    format!("{ACCESS_PREFIX}{id}")
}

pub fn delegators_key(id: &ElementId) -> String {
    format!("{DELEGATORS_PREFIX}{id}")
}

/// Access config of `id`, if it has one.
pub async fn load(tx: &mut Tx<'_>, id: &ElementId) -> Result<Option<AccessConfig>, StoreError> {
    tx.get(&access_key(id)).await
}

/// Elements delegating directly to `id`.
pub async fn delegators(tx: &mut Tx<'_>, id: &ElementId) -> Result<BTreeSet<ElementId>, StoreError> {
    Ok(tx.get(&delegators_key(id)).await?.unwrap_or_default())
}

pub(crate) async fn add_delegator(
    tx: &mut Tx<'_>,
    target: &ElementId,
    delegator: &ElementId,
) -> Result<(), StoreError> {
    let mut set = delegators(tx, target).await?;
    if set.insert(delegator.clone()) {
        tx.put(delegators_key(target), &set)?;
    }
    Ok(())
}

pub(crate) async fn remove_delegator(
    tx: &mut Tx<'_>,
    target: &ElementId,
    delegator: &ElementId,
) -> Result<(), StoreError> {
    let mut set = delegators(tx, target).await?;
    if set.remove(delegator) {
        if set.is_empty() {
            tx.delete(delegators_key(target));
        } else {
            tx.put(delegators_key(target), &set)?;
        }
    }
    Ok(())
}

/// Write a self-rooted config for `id`, administered by `admin`.
pub async fn init_root(
    tx: &mut Tx<'_>,
    id: &ElementId,
    admin: &Did,
) -> Result<AccessConfig, StoreError> {
    let config = AccessConfig::root(id.clone(), PermissionSet::admin(admin.clone()));
    tx.put(access_key(id), &config)?;
    debug!(%id, %admin, "initialized access root");
    Ok(config)
}

/// Write a config for a new element `id` delegating to `parent`, cloning the
/// parent's root and permissions.
///
/// Returns `None` and writes nothing when `parent` has no access config in
/// this transaction's view yet.
pub async fn try_delegate_new(
    tx: &mut Tx<'_>,
    id: &ElementId,
    parent: &ElementId,
) -> Result<Option<AccessConfig>, StoreError> {
    let Some(parent_config) = load(tx, parent).await? else {
        return Ok(None);
    };
    let config = AccessConfig {
        element: id.clone(),
        delegate: true,
        delegate_to: Some(parent.clone()),
        fin_delegated_to: parent_config.fin_delegated_to.clone(),
        permissions: parent_config.permissions,
    };
    tx.put(access_key(id), &config)?;
    add_delegator(tx, parent, id).await?;
    debug!(%id, %parent, root = %config.fin_delegated_to, "delegated new element");
    Ok(Some(config))
}

/// Whether `user` holds `kind` on `id`. `None` when `id` has no config.
pub async fn check(
    tx: &mut Tx<'_>,
    id: &ElementId,
    user: Option<&Did>,
    kind: PermissionKind,
) -> Result<Option<bool>, StoreError> {
    Ok(load(tx, id)
        .await?
        .map(|config| config.permissions.allows(user, kind)))
}

/// Whether `user` holds Write on every perspective touched by `updates`.
///
/// The access configs join `tx`'s read set, so a permission change that
/// commits before `tx` forces a re-plan. Perspectives without an access
/// config cannot be authorized.
pub async fn can_update_batch(
    tx: &mut Tx<'_>,
    updates: &[HeadUpdate],
    user: Option<&Did>,
) -> Result<bool, StoreError> {
    let perspectives: BTreeSet<&ElementId> =
        updates.iter().map(|update| &update.perspective_id).collect();
    for perspective in perspectives {
        if check(tx, perspective, user, PermissionKind::Write).await? != Some(true) {
            debug!(%perspective, user = ?user, "batch update not authorized");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Configs of `id` and every element whose delegation chain passes through
/// it, walked through the delegators index with an explicit stack.
pub(crate) async fn load_subtree(
    tx: &mut Tx<'_>,
    id: &ElementId,
) -> Result<BTreeMap<ElementId, AccessConfig>, AccessError> {
    let mut out = BTreeMap::new();
    let mut stack = vec![id.clone()];
    while let Some(current) = stack.pop() {
        if out.contains_key(&current) {
            continue;
        }
        let config = load(tx, &current)
            .await?
            .ok_or_else(|| AccessError::NotFound(current.clone()))?;
        stack.extend(delegators(tx, &current).await?);
        out.insert(current, config);
    }
    Ok(out)
}
