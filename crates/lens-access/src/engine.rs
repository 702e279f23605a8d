//! [`AccessEngine`]: delegation and permission operations.

use std::collections::BTreeSet;

use lens_store::{Transaction, Tx, TxExecutor};
use lens_types::{AccessConfig, Did, ElementId, HeadUpdate, PermissionKind, PermissionSet};
use tracing::{debug, info};

use crate::error::AccessError;
use crate::forest::DelegationForest;
use crate::records::{self, access_key};

type Result<T> = std::result::Result<T, AccessError>;

/// Delegation and permission management over a shared store.
///
/// Mutating operations take the authenticated caller, who must hold Admin on
/// the element. Callers that cannot even read the element get
/// [`AccessError::NotFound`].
#[derive(Clone)]
pub struct AccessEngine {
    executor: TxExecutor,
}

impl AccessEngine {
    pub fn new(executor: TxExecutor) -> Self {
        Self { executor }
    }

    /// Make `element` delegate to `target`, or become a root when `None`.
    pub async fn set_delegation(
        &self,
        element: &ElementId,
        target: Option<&ElementId>,
        caller: Option<&Did>,
    ) -> Result<AccessConfig> {
        let tx = SetDelegationTx {
            element: element.clone(),
            target: target.cloned(),
            caller: Some(caller.ok_or(AccessError::AnonymousUser)?.clone()),
        };
        self.executor.run(&tx).await
    }

    /// [`set_delegation`](Self::set_delegation) without the caller check,
    /// for the system's own follow-up work.
    pub async fn set_delegation_unchecked(
        &self,
        element: &ElementId,
        target: Option<&ElementId>,
    ) -> Result<AccessConfig> {
        let tx = SetDelegationTx {
            element: element.clone(),
            target: target.cloned(),
            caller: None,
        };
        self.executor.run(&tx).await
    }

    /// Grant `kind` to `user`, replacing any other role they held.
    pub async fn add_permission(
        &self,
        element: &ElementId,
        kind: PermissionKind,
        user: &Did,
        caller: Option<&Did>,
    ) -> Result<PermissionSet> {
        self.modify(
            element,
            caller,
            PermissionChange::Grant {
                user: user.clone(),
                kind,
            },
        )
        .await
    }

    /// Revoke every role of `user`.
    pub async fn remove_permissions(
        &self,
        element: &ElementId,
        user: &Did,
        caller: Option<&Did>,
    ) -> Result<PermissionSet> {
        self.modify(element, caller, PermissionChange::Revoke { user: user.clone() })
            .await
    }

    /// Clear the read, write and admin sets. Public flags are kept.
    pub async fn remove_all_permissions(
        &self,
        element: &ElementId,
        caller: Option<&Did>,
    ) -> Result<PermissionSet> {
        self.modify(element, caller, PermissionChange::ClearRoles).await
    }

    /// Set the public read or public write flag.
    pub async fn set_public_permission(
        &self,
        element: &ElementId,
        kind: PermissionKind,
        value: bool,
        caller: Option<&Did>,
    ) -> Result<PermissionSet> {
        if kind == PermissionKind::Admin {
            return Err(AccessError::InvalidPublicPermission(kind));
        }
        self.modify(element, caller, PermissionChange::SetPublic { kind, value })
            .await
    }

    async fn modify(
        &self,
        element: &ElementId,
        caller: Option<&Did>,
        change: PermissionChange,
    ) -> Result<PermissionSet> {
        let tx = ModifyPermissionsTx {
            element: element.clone(),
            caller: caller.ok_or(AccessError::AnonymousUser)?.clone(),
            change,
        };
        self.executor.run(&tx).await
    }

    /// Stored access config of `element`.
    pub async fn access_config(&self, element: &ElementId) -> Result<AccessConfig> {
        self.executor
            .read(&access_key(element))
            .await?
            .ok_or_else(|| AccessError::NotFound(element.clone()))
    }

    /// Whether `user` (anonymous when `None`) holds `kind` on `element`.
    pub async fn effective_permission(
        &self,
        element: &ElementId,
        user: Option<&Did>,
        kind: PermissionKind,
    ) -> Result<bool> {
        let config = self.access_config(element).await?;
        Ok(config.permissions.allows(user, kind))
    }

    /// Highest role explicitly granted to `user` on `element`.
    pub async fn permissions_of(
        &self,
        element: &ElementId,
        user: &Did,
    ) -> Result<Option<PermissionKind>> {
        let config = self.access_config(element).await?;
        Ok(config.permissions.role_of(user))
    }

    /// Whether `user` may write every perspective touched by `updates`.
    ///
    /// A point-in-time answer. Writers must repeat the check inside their
    /// own transaction with [`records::can_update_batch`].
    pub async fn can_update_batch(&self, updates: &[HeadUpdate], user: Option<&Did>) -> Result<bool> {
        self.executor.run(&CanUpdateBatchTx { updates, user }).await
    }
}

struct CanUpdateBatchTx<'a> {
    updates: &'a [HeadUpdate],
    user: Option<&'a Did>,
}

#[async_trait::async_trait]
impl Transaction for CanUpdateBatchTx<'_> {
    type Output = bool;
    type Error = AccessError;

    fn name(&self) -> &'static str {
        "can-update-batch"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<bool> {
        Ok(records::can_update_batch(tx, self.updates, self.user).await?)
    }
}

/// Admin check used by every mutating operation.
fn authorize_admin(config: &AccessConfig, caller: &Did) -> Result<()> {
    if !config.permissions.allows(Some(caller), PermissionKind::Read) {
        return Err(AccessError::NotFound(config.element.clone()));
    }
    if !config.permissions.allows(Some(caller), PermissionKind::Admin) {
        return Err(AccessError::NotAuthorized {
            element: config.element.clone(),
            user: caller.clone(),
            kind: PermissionKind::Admin,
        });
    }
    Ok(())
}

struct SetDelegationTx {
    element: ElementId,
    target: Option<ElementId>,
    /// `None` skips authorization.
    caller: Option<Did>,
}

#[async_trait::async_trait]
impl Transaction for SetDelegationTx {
    type Output = AccessConfig;
    type Error = AccessError;

    fn name(&self) -> &'static str {
        "set-delegation"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<AccessConfig> {
        let element = &self.element;
        let current = records::load(tx, element)
            .await?
            .ok_or_else(|| AccessError::NotFound(element.clone()))?;
        if let Some(caller) = &self.caller {
            authorize_admin(&current, caller)?;
        }

        let mut configs = records::load_subtree(tx, element).await?;
        let mut forest = DelegationForest::from_configs(configs.values());
        if let Some(target) = &self.target {
            if !forest.contains(target) {
                let target_config =
                    records::load(tx, target)
                        .await?
                        .ok_or_else(|| AccessError::TargetUnresolved {
                            element: element.clone(),
                            target: target.clone(),
                        })?;
                forest.add(&target_config);
            }
        }

        let changed = forest.set_delegation(element, self.target.as_ref())?;
        let new_root = forest
            .root_of(element)
            .cloned()
            .unwrap_or_else(|| element.clone());
        let permissions = if &new_root == element {
            current.permissions.clone()
        } else {
            records::load(tx, &new_root)
                .await?
                .ok_or_else(|| AccessError::TargetUnresolved {
                    element: element.clone(),
                    target: new_root.clone(),
                })?
                .permissions
        };

        let old_target = current.delegate_to.clone().filter(|_| current.delegate);
        if old_target != self.target {
            if let Some(old) = &old_target {
                records::remove_delegator(tx, old, element).await?;
            }
            if let Some(new) = &self.target {
                records::add_delegator(tx, new, element).await?;
            }
        }

        let mut dirty: BTreeSet<ElementId> = changed.iter().cloned().collect();
        dirty.insert(element.clone());
        for id in &changed {
            if let Some(config) = configs.get_mut(id) {
                config.fin_delegated_to = new_root.clone();
                config.permissions = permissions.clone();
            }
        }
        let Some(updated) = configs.get_mut(element) else {
            return Err(AccessError::NotFound(element.clone()));
        };
        updated.delegate = self.target.is_some();
        updated.delegate_to = self.target.clone();
        let updated = updated.clone();

        for id in &dirty {
            if let Some(config) = configs.get(id) {
                tx.put(access_key(id), config)?;
            }
        }

        info!(
            %element,
            target = ?self.target,
            root = %new_root,
            rerooted = changed.len(),
            "delegation updated"
        );
        Ok(updated)
    }
}

enum PermissionChange {
    Grant { user: Did, kind: PermissionKind },
    Revoke { user: Did },
    ClearRoles,
    SetPublic { kind: PermissionKind, value: bool },
}

struct ModifyPermissionsTx {
    element: ElementId,
    caller: Did,
    change: PermissionChange,
}

#[async_trait::async_trait]
impl Transaction for ModifyPermissionsTx {
    type Output = PermissionSet;
    type Error = AccessError;

    fn name(&self) -> &'static str {
        "modify-permissions"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<PermissionSet> {
        let element = &self.element;
        let mut config = records::load(tx, element)
            .await?
            .ok_or_else(|| AccessError::NotFound(element.clone()))?;
        authorize_admin(&config, &self.caller)?;
        if config.delegate {
            return Err(AccessError::PermissionsDelegated {
                element: element.clone(),
                root: config.fin_delegated_to.clone(),
            });
        }

        let permissions = &mut config.permissions;
        match &self.change {
            PermissionChange::Grant { user, kind } => permissions.grant(user.clone(), *kind),
            PermissionChange::Revoke { user } => {
                permissions.revoke(user);
            }
            PermissionChange::ClearRoles => permissions.clear_roles(),
            PermissionChange::SetPublic { kind, value } => match kind {
                PermissionKind::Read => permissions.public_read = *value,
                PermissionKind::Write => permissions.public_write = *value,
                PermissionKind::Admin => return Err(AccessError::InvalidPublicPermission(*kind)),
            },
        }
        tx.put(access_key(element), &config)?;

        let subtree = records::load_subtree(tx, element).await?;
        let mut propagated = 0usize;
        for (id, mut delegator) in subtree {
            if &id == element {
                continue;
            }
            delegator.permissions = config.permissions.clone();
            tx.put(access_key(&id), &delegator)?;
            propagated += 1;
        }

        debug!(%element, propagated, "permissions updated");
        Ok(config.permissions)
    }
}
