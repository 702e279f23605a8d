//! Entity graph store.
//!
//! Stores content-addressed [`Data`](lens_types::Data) payloads, the
//! [`Commit`](lens_types::Commit) DAG and mutable
//! [`Perspective`](lens_types::Perspective) pointers, and composes the access
//! and ecosystem record helpers into single batch transactions:
//!
//! - ids are derived (or verified) from canonical content before any write;
//! - references to unknown elements are recorded as stubs and filled in when
//!   the element is created later;
//! - perspective creation sets up delegation in the same transaction, with a
//!   follow-up pass for parents that only become resolvable later in the batch;
//! - ecosystem passes run after every structural change.
//!
//! [`EntityGraph::audit`] re-checks these invariants across the whole store.

mod audit;
pub mod error;
mod graph;
mod identity;
pub mod records;
pub mod writes;

#[cfg(test)]
mod tests;

pub use audit::{AuditReport, Violation};
pub use error::GraphError;
pub use graph::{EntityGraph, PerspectiveDetails};
pub use writes::{PerspectivePlan, UpdateOutcome};
