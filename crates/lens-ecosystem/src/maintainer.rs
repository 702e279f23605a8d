//! [`EcosystemMaintainer`]: downward and upward ecosystem passes.

use std::collections::BTreeSet;

use lens_store::{Transaction, Tx, TxExecutor};
use lens_types::ElementId;
use tracing::{debug, info};

use crate::error::EcosystemError;
use crate::records::{
    self, CHILDREN_PREFIX, ECOSYSTEM_PREFIX, PARENTS_PREFIX, children_key, ecosystem_key,
    parents_key,
};

type Result<T> = std::result::Result<T, EcosystemError>;

/// Ids per transaction when rebuilding every ecosystem.
const REBUILD_BATCH: usize = 64;

/// How ancestors of touched perspectives are brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Only edges were added: union the new ecosystems into ancestors.
    Grow,
    /// Some edge was removed: recompute every ancestor from its children.
    Recompute,
}

/// Keeps `ecosystem(p) ⊇ {p} ∪ ⋃ ecosystem(c)` after structural updates.
///
/// Each pass is its own transaction, run after the structural change has
/// committed, so readers may briefly observe a stale ecosystem.
#[derive(Clone)]
pub struct EcosystemMaintainer {
    executor: TxExecutor,
}

impl EcosystemMaintainer {
    pub fn new(executor: TxExecutor) -> Self {
        Self { executor }
    }

    /// Run the downward pass for `touched`, then the upward pass over their
    /// ancestors.
    pub async fn refresh(&self, touched: &[ElementId], mode: RefreshMode) -> Result<()> {
        if touched.is_empty() {
            return Ok(());
        }
        let sources: BTreeSet<ElementId> = touched.iter().cloned().collect();

        self.executor
            .run(&DownwardTx {
                roots: sources.clone(),
            })
            .await?;
        let updated = self.executor.run(&UpwardTx { sources, mode }).await?;

        debug!(touched = touched.len(), ancestors = updated, ?mode, "ecosystems refreshed");
        Ok(())
    }

    /// Recompute the ecosystem of every perspective that has structure.
    /// Returns how many were rewritten.
    pub async fn rebuild_all(&self) -> Result<usize> {
        let mut ids = BTreeSet::new();
        for prefix in [CHILDREN_PREFIX, PARENTS_PREFIX, ECOSYSTEM_PREFIX] {
            for (key, _) in self.executor.store().scan_prefix(prefix).await? {
                if let Some(id) = key.strip_prefix(prefix) {
                    ids.insert(ElementId::new(id));
                }
            }
        }

        let ids: Vec<ElementId> = ids.into_iter().collect();
        for batch in ids.chunks(REBUILD_BATCH) {
            self.executor
                .run(&DownwardTx {
                    roots: batch.iter().cloned().collect(),
                })
                .await?;
        }

        info!(count = ids.len(), "rebuilt ecosystems");
        Ok(ids.len())
    }

    /// Stored ecosystem of `id`; `{id}` when none was computed.
    pub async fn ecosystem(&self, id: &ElementId) -> Result<BTreeSet<ElementId>> {
        let stored: Option<BTreeSet<ElementId>> = self.executor.read(&ecosystem_key(id)).await?;
        Ok(stored.unwrap_or_else(|| BTreeSet::from([id.clone()])))
    }

    pub async fn children_of(&self, id: &ElementId) -> Result<BTreeSet<ElementId>> {
        Ok(self
            .executor
            .read(&children_key(id))
            .await?
            .unwrap_or_default())
    }

    pub async fn parents_of(&self, id: &ElementId) -> Result<BTreeSet<ElementId>> {
        Ok(self
            .executor
            .read(&parents_key(id))
            .await?
            .unwrap_or_default())
    }
}

/// Recompute the ecosystem of each root from committed children edges.
struct DownwardTx {
    roots: BTreeSet<ElementId>,
}

#[async_trait::async_trait]
impl Transaction for DownwardTx {
    type Output = ();
    type Error = EcosystemError;

    fn name(&self) -> &'static str {
        "ecosystem-down"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<()> {
        for root in &self.roots {
            let closure = records::closure(tx, root).await?;
            records::put_ecosystem(tx, root, &closure)?;
        }
        Ok(())
    }
}

/// Bring every ancestor of `sources` up to date. Returns the ancestor count.
struct UpwardTx {
    sources: BTreeSet<ElementId>,
    mode: RefreshMode,
}

#[async_trait::async_trait]
impl Transaction for UpwardTx {
    type Output = usize;
    type Error = EcosystemError;

    fn name(&self) -> &'static str {
        "ecosystem-up"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<usize> {
        let mut touched = BTreeSet::new();
        match self.mode {
            RefreshMode::Grow => {
                for source in &self.sources {
                    let ancestors =
                        records::ancestors(tx, &BTreeSet::from([source.clone()])).await?;
                    if ancestors.is_empty() {
                        continue;
                    }
                    let grown = match records::ecosystem(tx, source).await? {
                        Some(ecosystem) => ecosystem,
                        None => records::closure(tx, source).await?,
                    };
                    for ancestor in ancestors {
                        let mut ecosystem = match records::ecosystem(tx, &ancestor).await? {
                            Some(ecosystem) => ecosystem,
                            None => records::closure(tx, &ancestor).await?,
                        };
                        let before = ecosystem.len();
                        ecosystem.extend(grown.iter().cloned());
                        if ecosystem.len() != before {
                            records::put_ecosystem(tx, &ancestor, &ecosystem)?;
                        }
                        touched.insert(ancestor);
                    }
                }
            }
            RefreshMode::Recompute => {
                for ancestor in records::ancestors(tx, &self.sources).await? {
                    let closure = records::closure(tx, &ancestor).await?;
                    records::put_ecosystem(tx, &ancestor, &closure)?;
                    touched.insert(ancestor);
                }
            }
        }
        Ok(touched.len())
    }
}
