//! Content addressing for Lens elements.
//!
//! Elements are named by a CIDv1 string computed over the canonical JSON form
//! of their identity payload: object keys sorted at every level, compact
//! encoding, then hashed with the configured multihash function. Ids carry
//! their own codec/hash/base, so [`validate`] works for any supported
//! combination without knowing the configuration that produced them.

mod canonical;
pub mod error;
mod id;

pub use canonical::{MAX_DEPTH, canonicalize};
pub use error::CidError;
pub use id::{compute_id, compute_id_of, config_of, validate, validate_of};
