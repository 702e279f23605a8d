//! Optimistic transactions over a [`GraphStore`].
//!
//! A [`Transaction`] is a value whose [`plan`](Transaction::plan) reads
//! through a [`Tx`] (recording every version it observes) and buffers its
//! writes in the same `Tx`. [`TxExecutor::run`] commits the buffered writes
//! and, when the store reports a conflict, plans the transaction again from
//! scratch. `plan` must therefore have no effects outside the `Tx`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::traits::{ABSENT, GraphStore, WriteSet};

/// How often and how fast conflicting transactions are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` attempts with no pause in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Read/write context of a single transaction attempt.
///
/// Reads go through the buffered writes first, so a transaction sees its
/// own effects.
pub struct Tx<'a> {
    store: &'a dyn GraphStore,
    reads: BTreeMap<String, u64>,
    writes: BTreeMap<String, Option<Bytes>>,
}

impl<'a> Tx<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Raw value of `key`, seen through this transaction's writes.
    pub async fn get_raw(&mut self, key: &str) -> Result<Option<Bytes>, StoreError> {
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }
        let found = self.store.read(key).await?;
        let version = found.as_ref().map_or(ABSENT, |v| v.version);
        // Keep the first observation; a later, different one fails validation.
        self.reads.entry(key.to_owned()).or_insert(version);
        Ok(found.map(|v| v.value))
    }

    /// Decode the value of `key`.
    pub async fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_raw(key).await? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get_raw(key).await?.is_some())
    }

    /// Buffer a put of `value` under `key`.
    pub fn put<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = postcard::to_allocvec(value)?;
        self.writes.insert(key.into(), Some(Bytes::from(bytes)));
        Ok(())
    }

    /// Buffer a delete of `key`.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.insert(key.into(), None);
    }

    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    pub fn into_write_set(self) -> WriteSet {
        WriteSet {
            reads: self.reads,
            writes: self.writes,
        }
    }
}

/// A unit of work run atomically by a [`TxExecutor`].
#[async_trait::async_trait]
pub trait Transaction: Send + Sync {
    type Output: Send;
    type Error: From<StoreError> + Send;

    /// Short name used in logs and in [`StoreError::ConflictExhausted`].
    fn name(&self) -> &'static str;

    /// Read through `tx` and buffer writes in it. May run several times.
    async fn plan(&self, tx: &mut Tx<'_>) -> Result<Self::Output, Self::Error>;
}

/// Runs [`Transaction`]s against a shared store, retrying on conflict.
#[derive(Clone)]
pub struct TxExecutor {
    store: Arc<dyn GraphStore>,
    retry: RetryPolicy,
}

impl TxExecutor {
    pub fn new(store: Arc<dyn GraphStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Plan and commit `transaction`, re-planning it after every conflict
    /// until the retry budget is spent.
    ///
    /// A planning error aborts immediately and applies nothing.
    pub async fn run<T: Transaction + ?Sized>(&self, transaction: &T) -> Result<T::Output, T::Error> {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            let mut tx = Tx::new(self.store.as_ref());
            let output = transaction.plan(&mut tx).await?;
            if !tx.has_writes() {
                return Ok(output);
            }

            match self.store.commit(tx.into_write_set()).await {
                Ok(receipt) => {
                    debug!(
                        tx = transaction.name(),
                        attempt,
                        version = receipt.version,
                        created = receipt.created.len(),
                        "transaction committed"
                    );
                    return Ok(output);
                }
                Err(StoreError::Conflict { key }) => {
                    warn!(tx = transaction.name(), attempt, %key, "transaction conflicted");
                    if attempt < attempts && !self.retry.delay.is_zero() {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::ConflictExhausted {
            name: transaction.name(),
            attempts,
        }
        .into())
    }

    /// Read and decode one committed value outside any transaction.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.read(key).await? {
            Some(record) => Ok(Some(postcard::from_bytes(&record.value)?)),
            None => Ok(None),
        }
    }

    /// Decode every committed value under `prefix`.
    pub async fn scan<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, StoreError> {
        self.store
            .scan_prefix(prefix)
            .await?
            .into_iter()
            .map(|(key, bytes)| {
                let value = postcard::from_bytes(&bytes)?;
                Ok((key, value))
            })
            .collect::<Result<Vec<_>, StoreError>>()
    }
}
