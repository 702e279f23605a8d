//! Proposal records and their indexes.
//!
//! - `proposal/<id>` → [`Proposal`]
//! - `proposal-to/<perspective>/<id>` → [`ProposalId`]
//! - `proposal-state/<state>/<id>` → [`ProposalId`]

use lens_store::{StoreError, Tx};
use lens_types::{ElementId, Proposal, ProposalId, ProposalState};
use tracing::debug;

pub const PROPOSAL_PREFIX: &str = "proposal/";
pub const TARGET_PREFIX: &str = "proposal-to/";
pub const STATE_PREFIX: &str = "proposal-state/";

pub fn proposal_key(id: &ProposalId) -> String {
    format!("{PROPOSAL_PREFIX}{id}")
}

pub fn target_prefix(perspective: &ElementId) -> String {
    format!("{TARGET_PREFIX}{perspective}/")
}

pub fn target_key(perspective: &ElementId, id: &ProposalId) -> String {
    format!("{}{id}", target_prefix(perspective))
}

pub fn state_prefix(state: ProposalState) -> String {
    format!("{STATE_PREFIX}{state}/")
}

pub fn state_key(state: ProposalState, id: &ProposalId) -> String {
    format!("{}{id}", state_prefix(state))
}

pub async fn load(tx: &mut Tx<'_>, id: &ProposalId) -> Result<Option<Proposal>, StoreError> {
    tx.get(&proposal_key(id)).await
}

/// Write a new proposal together with both index entries.
pub fn insert(tx: &mut Tx<'_>, proposal: &Proposal) -> Result<(), StoreError> {
    tx.put(proposal_key(&proposal.id), proposal)?;
    tx.put(target_key(&proposal.to_perspective_id, &proposal.id), &proposal.id)?;
    tx.put(state_key(proposal.state, &proposal.id), &proposal.id)?;
    Ok(())
}

/// Rewrite the record only. Indexes are unaffected by appends.
pub fn save(tx: &mut Tx<'_>, proposal: &Proposal) -> Result<(), StoreError> {
    tx.put(proposal_key(&proposal.id), proposal)
}

/// Move `proposal` to `to`, keeping the state index in step.
pub fn transition(
    tx: &mut Tx<'_>,
    proposal: &mut Proposal,
    to: ProposalState,
) -> Result<(), StoreError> {
    tx.delete(state_key(proposal.state, &proposal.id));
    debug!(id = %proposal.id, from = %proposal.state, %to, "proposal transition");
    proposal.state = to;
    tx.put(state_key(to, &proposal.id), &proposal.id)?;
    save(tx, proposal)
}
