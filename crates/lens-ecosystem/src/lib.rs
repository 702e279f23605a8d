//! Ecosystem consistency maintenance.
//!
//! A perspective's ecosystem is the reflexive-transitive closure of its
//! structural children. This crate owns the `children`, `parents` and
//! `ecosystem` record families: [`records`] updates edges inside a caller's
//! transaction, and [`EcosystemMaintainer`] recomputes closures afterwards
//! in separate downward and upward passes.

pub mod error;
mod maintainer;
pub mod records;


pub use error::EcosystemError;
pub use maintainer::{EcosystemMaintainer, RefreshMode};
pub use records::EdgeChange;
