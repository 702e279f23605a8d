//! In-memory graph store backend.

use std::collections::BTreeMap;
use std::sync::RwLock;

use bytes::Bytes;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{ABSENT, CommitReceipt, GraphStore, Versioned, WriteSet};

struct Inner {
    /// Version of the last commit.
    seq: u64,
    records: BTreeMap<String, Versioned>,
}

/// In-memory graph store backed by a `RwLock<BTreeMap>`.
///
/// Useful for tests and for running the daemon without persistence.
pub struct MemoryGraphStore {
    inner: RwLock<Inner>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                seq: 0,
                records: BTreeMap::new(),
            }),
        }
    }

    /// Version of the last successful commit.
    pub fn version(&self) -> u64 {
        self.inner.read().expect("lock poisoned").seq
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryGraphStore {
    async fn read(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.records.get(key).cloned())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Bytes)>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .records
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, record)| (key.clone(), record.value.clone()))
            .collect())
    }

    async fn commit(&self, writes: WriteSet) -> Result<CommitReceipt, StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");

        for (key, observed) in &writes.reads {
            let current = inner.records.get(key).map_or(ABSENT, |r| r.version);
            if current != *observed {
                debug!(%key, observed, current, "commit validation failed");
                return Err(StoreError::Conflict { key: key.clone() });
            }
        }

        let version = inner.seq + 1;
        inner.seq = version;

        let mut created = Vec::new();
        for (key, value) in writes.writes {
            match value {
                Some(value) => {
                    let previous = inner
                        .records
                        .insert(key.clone(), Versioned { version, value });
                    if previous.is_none() {
                        created.push(key);
                    }
                }
                None => {
                    inner.records.remove(&key);
                }
            }
        }

        debug!(version, created = created.len(), "committed to memory store");
        Ok(CommitReceipt { version, created })
    }
}
