//! The [`GraphStore`] trait and the values that cross it.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::StoreError;

/// Version observed for a key that does not exist.
pub const ABSENT: u64 = 0;

/// A stored value together with the commit version that last wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub value: Bytes,
}

/// The buffered effects of one transaction attempt.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    /// Every key read while planning, with the version first observed
    /// ([`ABSENT`] when the key did not exist).
    pub reads: BTreeMap<String, u64>,
    /// Keys to put (`Some`) or delete (`None`).
    pub writes: BTreeMap<String, Option<Bytes>>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Version stamped on every key written by this commit.
    pub version: u64,
    /// Keys that did not exist before this commit.
    pub created: Vec<String>,
}

/// A versioned key-value store with atomic, optimistically validated commits.
///
/// Implementations must be safe for concurrent use. `commit` must either
/// apply every write or none of them.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// Read a key with its current version.
    async fn read(&self, key: &str) -> Result<Option<Versioned>, StoreError>;

    /// Every committed key starting with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Bytes)>, StoreError>;

    /// Validate that every key in `writes.reads` still has its observed
    /// version, then apply `writes.writes` atomically.
    ///
    /// Returns [`StoreError::Conflict`] without applying anything when
    /// validation fails.
    async fn commit(&self, writes: WriteSet) -> Result<CommitReceipt, StoreError>;
}
