//! Proposal workflow.
//!
//! A proposal bundles head updates (and perspectives to create) aimed at a
//! target perspective. It starts Open, may collect more updates, and ends in
//! exactly one terminal state: Executed when accepted, Rejected, or Declined
//! by its creator. Acceptance applies the whole bundle and the transition in
//! a single transaction.

pub mod error;
pub mod records;
mod workflow;


pub use error::ProposalError;
pub use workflow::ProposalWorkflow;
