//! Versioned graph storage and optimistic transactions.
//!
//! This crate defines the [`GraphStore`] trait, a versioned key-value store
//! with atomic validated commits, along with three implementations:
//!
//! - [`MemoryGraphStore`]: volatile storage backed by a `RwLock<BTreeMap>`.
//! - [`FjallGraphStore`]: persistent storage in a Fjall keyspace.
//! - [`FlakyStore`]: a wrapper that injects commit conflicts, for tests.
//!
//! On top of the trait, [`TxExecutor`] runs [`Transaction`] values with
//! read-your-writes semantics and retries them on conflict according to a
//! [`RetryPolicy`].

mod error;
mod fjall_store;
mod flaky_store;
mod memory_store;
mod traits;
mod tx;


pub use error::StoreError;
pub use fjall_store::FjallGraphStore;
pub use flaky_store::FlakyStore;
pub use memory_store::MemoryGraphStore;
pub use traits::{ABSENT, CommitReceipt, GraphStore, Versioned, WriteSet};
pub use tx::{RetryPolicy, Transaction, Tx, TxExecutor};
