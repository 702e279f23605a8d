//! [`GraphStore`] implementation backed by a Fjall keyspace.

use std::path::Path;
use std::sync::RwLock;

use bytes::Bytes;
use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tempfile::TempDir;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{ABSENT, CommitReceipt, GraphStore, Versioned, WriteSet};

type Result<T> = std::result::Result<T, StoreError>;

const VERSION_LEN: usize = 8;
const SEQ_KEY: &[u8] = b"seq";

/// Persistent graph store backed by Fjall.
///
/// Every value is stored as `version (8 bytes BE) ++ payload`. Commits are
/// serialized by an in-process gate, so version validation and the writes
/// that follow it are never interleaved with another commit. The writes of
/// one commit and the new sequence number land in a single Fjall batch.
pub struct FjallGraphStore {
    /// Database handle, source of the write batches spanning both keyspaces.
    db: Database,
    /// Graph records.
    records: Keyspace,
    /// Store bookkeeping (commit sequence).
    meta: Keyspace,
    /// Last committed version. Write-locked for the whole of a commit.
    gate: RwLock<u64>,
    /// Backing directory of a temporary store, removed on drop.
    _tmp: Option<TempDir>,
}

impl FjallGraphStore {
    /// Open a persistent store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init(db, None)
    }

    /// Open a temporary store that is cleaned up on drop.
    ///
    /// Useful for tests.
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        Self::init(db, Some(tmp))
    }

    fn init(db: Database, tmp: Option<TempDir>) -> Result<Self> {
        let records = db.keyspace("records", KeyspaceCreateOptions::default)?;
        let meta = db.keyspace("meta", KeyspaceCreateOptions::default)?;
        let seq = match meta.get(SEQ_KEY)? {
            Some(bytes) => decode_u64("meta/seq", &bytes)?,
            None => 0,
        };
        debug!(seq, "opened fjall graph store");
        Ok(Self {
            db,
            records,
            meta,
            gate: RwLock::new(seq),
            _tmp: tmp,
        })
    }

    /// Version of the last successful commit.
    pub fn version(&self) -> u64 {
        *self.gate.read().expect("lock poisoned")
    }

    fn current_version(&self, key: &str) -> Result<u64> {
        match self.records.get(key.as_bytes())? {
            Some(bytes) => decode_u64(key, &bytes),
            None => Ok(ABSENT),
        }
    }
}

#[async_trait::async_trait]
impl GraphStore for FjallGraphStore {
    async fn read(&self, key: &str) -> Result<Option<Versioned>> {
        let _gate = self.gate.read().expect("lock poisoned");
        match self.records.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record(key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Bytes)>> {
        let _gate = self.gate.read().expect("lock poisoned");
        let mut out = Vec::new();
        for guard in self.records.prefix(prefix.as_bytes()) {
            let (k, v) = guard.into_inner()?;
            let key = std::str::from_utf8(&k)
                .map_err(|e| StoreError::Corrupt {
                    key: String::from_utf8_lossy(&k).into_owned(),
                    reason: e.to_string(),
                })?
                .to_owned();
            let record = decode_record(&key, &v)?;
            out.push((key, record.value));
        }
        Ok(out)
    }

    async fn commit(&self, writes: WriteSet) -> Result<CommitReceipt> {
        let mut seq = self.gate.write().expect("lock poisoned");

        for (key, observed) in &writes.reads {
            let current = self.current_version(key)?;
            if current != *observed {
                debug!(%key, observed, current, "commit validation failed");
                return Err(StoreError::Conflict { key: key.clone() });
            }
        }

        let version = *seq + 1;
        let mut created = Vec::new();
        let mut batch = self.db.batch();
        for (key, value) in writes.writes {
            match value {
                Some(value) => {
                    if self.records.get(key.as_bytes())?.is_none() {
                        created.push(key.clone());
                    }
                    let mut encoded = Vec::with_capacity(VERSION_LEN + value.len());
                    encoded.extend_from_slice(&version.to_be_bytes());
                    encoded.extend_from_slice(&value);
                    batch.insert(&self.records, key.as_bytes(), encoded.as_slice());
                }
                None => {
                    batch.remove(&self.records, key.as_bytes());
                }
            }
        }
        batch.insert(&self.meta, SEQ_KEY, version.to_be_bytes().as_slice());
        batch.commit()?;
        *seq = version;

        debug!(version, created = created.len(), "committed to fjall store");
        Ok(CommitReceipt { version, created })
    }
}

fn decode_u64(key: &str, bytes: &[u8]) -> Result<u64> {
    let head: [u8; VERSION_LEN] = bytes
        .get(..VERSION_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| StoreError::Corrupt {
            key: key.to_owned(),
            reason: format!("expected at least {VERSION_LEN} bytes, got {}", bytes.len()),
        })?;
    Ok(u64::from_be_bytes(head))
}

fn decode_record(key: &str, bytes: &[u8]) -> Result<Versioned> {
    let version = decode_u64(key, bytes)?;
    Ok(Versioned {
        version,
        value: Bytes::copy_from_slice(&bytes[VERSION_LEN..]),
    })
}
