//! Permission and delegation engine.
//!
//! Every element with access control has an [`AccessConfig`]: either it is a
//! root holding its own permission sets, or it delegates to another element
//! and carries a copy of its root's sets. The engine keeps three things true
//! under concurrent mutation:
//!
//! - `fin_delegated_to` names the end of a finite, acyclic `delegate_to`
//!   chain, and equals the element itself exactly for roots;
//! - every element's permission sets equal those of its root;
//! - permission edits only happen on roots and are copied to all delegators.
//!
//! [`records`] exposes transaction-level helpers so that callers creating
//! elements can set up delegation inside their own transaction.
//!
//! [`AccessConfig`]: lens_types::AccessConfig

mod engine;
pub mod error;
mod forest;
pub mod records;

#[cfg(test)]
mod tests;

pub use engine::AccessEngine;
pub use error::AccessError;
pub use forest::DelegationForest;
