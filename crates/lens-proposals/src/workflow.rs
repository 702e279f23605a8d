//! [`ProposalWorkflow`]: the proposal state machine.

use lens_access::records as access;
use lens_graph::writes::{self, PerspectivePlan, UpdateOutcome};
use lens_graph::{EntityGraph, records::upsert_profile};
use lens_store::{Transaction, Tx, TxExecutor};
use lens_types::{Did, ElementId, HeadUpdate, NewProposal, Proposal, ProposalId, ProposalState};
use tracing::{info, warn};

use crate::error::ProposalError;
use crate::records::{self, proposal_key, state_prefix, target_prefix};

type Result<T> = std::result::Result<T, ProposalError>;

/// Creates, amends and decides proposals against an [`EntityGraph`].
#[derive(Clone)]
pub struct ProposalWorkflow {
    executor: TxExecutor,
    graph: EntityGraph,
}

impl ProposalWorkflow {
    pub fn new(graph: EntityGraph) -> Self {
        Self {
            executor: graph.executor().clone(),
            graph,
        }
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    /// Open a proposal owned by `creator`.
    ///
    /// Ids of new perspectives are verified (or computed) here so that
    /// acceptance only ever sees resolved ids.
    pub async fn create(&self, data: NewProposal, creator: Option<&Did>) -> Result<Proposal> {
        let creator = creator.ok_or(ProposalError::AnonymousUser)?;
        let new_perspectives = self
            .graph
            .resolve_perspectives(data.new_perspectives)?
            .into_iter()
            .map(|(id, mut perspective)| {
                perspective.id = Some(id);
                perspective
            })
            .collect();

        let proposal = Proposal {
            id: ProposalId::generate(),
            creator_id: creator.clone(),
            from_perspective_id: data.from_perspective_id,
            to_perspective_id: data.to_perspective_id,
            from_head_id: data.from_head_id,
            to_head_id: data.to_head_id,
            updates: data.updates,
            new_perspectives,
            state: ProposalState::Open,
        };
        self.executor
            .run(&CreateTx {
                proposal: proposal.clone(),
            })
            .await?;

        info!(
            id = %proposal.id,
            creator = %creator,
            to = %proposal.to_perspective_id,
            updates = proposal.updates.len(),
            "proposal opened"
        );
        Ok(proposal)
    }

    /// Append updates to an open proposal.
    pub async fn add_updates(
        &self,
        id: &ProposalId,
        updates: Vec<HeadUpdate>,
        user: Option<&Did>,
    ) -> Result<Proposal> {
        let user = user.ok_or(ProposalError::AnonymousUser)?;
        let proposal = self
            .executor
            .run(&AddUpdatesTx {
                id: id.clone(),
                updates,
            })
            .await?;
        info!(%id, %user, updates = proposal.updates.len(), "proposal amended");
        Ok(proposal)
    }

    /// Create the proposal's new perspectives, apply its updates and mark it
    /// Executed, all in one transaction. `user` needs write access to every
    /// updated perspective.
    pub async fn accept(&self, id: &ProposalId, user: Option<&Did>) -> Result<Proposal> {
        let user = user.ok_or(ProposalError::AnonymousUser)?;
        let outcome = self
            .executor
            .run(&AcceptTx {
                graph: &self.graph,
                id: id.clone(),
                user: user.clone(),
            })
            .await?;

        self.graph.settle_perspectives(&outcome.perspectives).await?;
        self.graph.settle_updates(&outcome.updates).await?;

        info!(
            %id,
            %user,
            created = outcome.perspectives.created.len(),
            updates = outcome.proposal.updates.len(),
            "proposal executed"
        );
        Ok(outcome.proposal)
    }

    /// Close the proposal without applying it. Same authorization as accept.
    pub async fn reject(&self, id: &ProposalId, user: Option<&Did>) -> Result<Proposal> {
        self.decide(id, user, ProposalState::Rejected).await
    }

    /// Withdraw the proposal. Only its creator may do this.
    pub async fn decline(&self, id: &ProposalId, user: Option<&Did>) -> Result<Proposal> {
        self.decide(id, user, ProposalState::Declined).await
    }

    async fn decide(
        &self,
        id: &ProposalId,
        user: Option<&Did>,
        to: ProposalState,
    ) -> Result<Proposal> {
        let user = user.ok_or(ProposalError::AnonymousUser)?;
        let proposal = self
            .executor
            .run(&CloseTx {
                id: id.clone(),
                user: user.clone(),
                to,
            })
            .await?;
        info!(%id, %user, state = %to, "proposal closed");
        Ok(proposal)
    }

    pub async fn get(&self, id: &ProposalId) -> Result<Proposal> {
        self.executor
            .read(&proposal_key(id))
            .await?
            .ok_or_else(|| ProposalError::NotFound(id.clone()))
    }

    /// Proposals targeting `perspective`, in any state.
    pub async fn proposals_for(&self, perspective: &ElementId) -> Result<Vec<Proposal>> {
        self.from_index(&target_prefix(perspective)).await
    }

    pub async fn proposals_in_state(&self, state: ProposalState) -> Result<Vec<Proposal>> {
        self.from_index(&state_prefix(state)).await
    }

    async fn from_index(&self, prefix: &str) -> Result<Vec<Proposal>> {
        let mut proposals = Vec::new();
        for (key, id) in self.executor.scan::<ProposalId>(prefix).await? {
            match self.executor.read(&proposal_key(&id)).await? {
                Some(proposal) => proposals.push(proposal),
                None => warn!(%key, %id, "index entry without proposal"),
            }
        }
        Ok(proposals)
    }
}

/// Load `id` and require it to be Open.
async fn load_open(tx: &mut Tx<'_>, id: &ProposalId) -> Result<Proposal> {
    let proposal = records::load(tx, id)
        .await?
        .ok_or_else(|| ProposalError::NotFound(id.clone()))?;
    if proposal.state != ProposalState::Open {
        return Err(ProposalError::WrongState {
            id: id.clone(),
            state: proposal.state,
        });
    }
    Ok(proposal)
}

/// Require write access to every perspective the proposal updates.
async fn authorize_updates(tx: &mut Tx<'_>, proposal: &Proposal, user: &Did) -> Result<()> {
    if proposal.updates.is_empty() {
        return Err(ProposalError::NoUpdates(proposal.id.clone()));
    }
    if !access::can_update_batch(tx, &proposal.updates, Some(user)).await? {
        return Err(ProposalError::NotAuthorized {
            id: proposal.id.clone(),
            user: user.clone(),
        });
    }
    Ok(())
}

struct CreateTx {
    proposal: Proposal,
}

#[async_trait::async_trait]
impl Transaction for CreateTx {
    type Output = ();
    type Error = ProposalError;

    fn name(&self) -> &'static str {
        "proposal-create"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<()> {
        upsert_profile(tx, &self.proposal.creator_id).await?;
        records::insert(tx, &self.proposal)?;
        Ok(())
    }
}

struct AddUpdatesTx {
    id: ProposalId,
    updates: Vec<HeadUpdate>,
}

#[async_trait::async_trait]
impl Transaction for AddUpdatesTx {
    type Output = Proposal;
    type Error = ProposalError;

    fn name(&self) -> &'static str {
        "proposal-add-updates"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<Proposal> {
        let mut proposal = load_open(tx, &self.id).await?;
        proposal.updates.extend(self.updates.iter().cloned());
        records::save(tx, &proposal)?;
        Ok(proposal)
    }
}

struct AcceptOutcome {
    proposal: Proposal,
    perspectives: PerspectivePlan,
    updates: UpdateOutcome,
}

struct AcceptTx<'a> {
    graph: &'a EntityGraph,
    id: ProposalId,
    user: Did,
}

#[async_trait::async_trait]
impl Transaction for AcceptTx<'_> {
    type Output = AcceptOutcome;
    type Error = ProposalError;

    fn name(&self) -> &'static str {
        "proposal-accept"
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<AcceptOutcome> {
        let mut proposal = load_open(tx, &self.id).await?;
        if proposal.updates.is_empty() {
            return Err(ProposalError::NoUpdates(self.id.clone()));
        }

        // New perspectives come first so updates may target them. Nothing
        // is applied unless the whole plan succeeds.
        let items = self
            .graph
            .resolve_perspectives(proposal.new_perspectives.clone())?;
        let perspectives = writes::plan_perspectives(tx, &items).await?;
        authorize_updates(tx, &proposal, &self.user).await?;
        let updates = writes::plan_updates(tx, &proposal.updates).await?;

        records::transition(tx, &mut proposal, ProposalState::Executed)?;
        Ok(AcceptOutcome {
            proposal,
            perspectives,
            updates,
        })
    }
}

/// Reject or decline an open proposal.
struct CloseTx {
    id: ProposalId,
    user: Did,
    to: ProposalState,
}

#[async_trait::async_trait]
impl Transaction for CloseTx {
    type Output = Proposal;
    type Error = ProposalError;

    fn name(&self) -> &'static str {
        match self.to {
            ProposalState::Declined => "proposal-decline",
            _ => "proposal-reject",
        }
    }

    async fn plan(&self, tx: &mut Tx<'_>) -> Result<Proposal> {
        let mut proposal = load_open(tx, &self.id).await?;
        match self.to {
            ProposalState::Declined => {
                if proposal.creator_id != self.user {
                    return Err(ProposalError::NotAuthorized {
                        id: self.id.clone(),
                        user: self.user.clone(),
                    });
                }
            }
            _ => authorize_updates(tx, &proposal, &self.user).await?,
        }
        records::transition(tx, &mut proposal, self.to)?;
        Ok(proposal)
    }
}
