//! A [`GraphStore`] wrapper that injects commit conflicts.
//!
//! `FlakyStore` wraps any `Arc<dyn GraphStore>` and rejects commits with
//! [`StoreError::Conflict`] before they reach the inner store: the first `n`
//! commits, and then each commit with a fixed probability. The RNG is seeded
//! for deterministic, reproducible behaviour across test runs.
//!
//! # Example
//!
//! ```ignore
//! let flaky = FlakyStore::new(inner)
//!     .fail_first(3)          // first three commits conflict
//!     .conflict_rate(0.2)     // then one in five
//!     .seed(42);
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{CommitReceipt, GraphStore, Versioned, WriteSet};

/// A [`GraphStore`] wrapper that fails commits with synthetic conflicts.
pub struct FlakyStore {
    inner: Arc<dyn GraphStore>,
    fail_first: AtomicU32,
    conflict_rate: f64,
    rng: Mutex<StdRng>,
    injected: AtomicU64,
}

impl FlakyStore {
    /// Wrap an existing store with no injected conflicts (pass-through).
    pub fn new(inner: Arc<dyn GraphStore>) -> Self {
        Self {
            inner,
            fail_first: AtomicU32::new(0),
            conflict_rate: 0.0,
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            injected: AtomicU64::new(0),
        }
    }

    /// Make the next `n` commits conflict unconditionally.
    pub fn fail_first(self, n: u32) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// Probability in `[0, 1]` that any later commit conflicts.
    pub fn conflict_rate(mut self, rate: f64) -> Self {
        self.conflict_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the RNG seed for deterministic behaviour.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Number of conflicts injected so far.
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        let forced = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        forced
            || (self.conflict_rate > 0.0
                && self
                    .rng
                    .lock()
                    .expect("lock poisoned")
                    .random_bool(self.conflict_rate))
    }
}

#[async_trait::async_trait]
impl GraphStore for FlakyStore {
    async fn read(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        self.inner.read(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Bytes)>, StoreError> {
        self.inner.scan_prefix(prefix).await
    }

    async fn commit(&self, writes: WriteSet) -> Result<CommitReceipt, StoreError> {
        if self.should_fail() {
            self.injected.fetch_add(1, Ordering::SeqCst);
            let key = writes.writes.keys().next().cloned().unwrap_or_default();
            debug!(%key, "injecting commit conflict");
            return Err(StoreError::Conflict { key });
        }
        self.inner.commit(writes).await
    }
}
