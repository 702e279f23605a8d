use lens_graph::GraphError;
use lens_store::StoreError;
use lens_types::{Did, ErrorKind, ProposalId, ProposalState};

#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("operation requires an authenticated user")]
    AnonymousUser,

    #[error("proposal not found: {0}")]
    NotFound(ProposalId),

    #[error("proposal {id} is {state}, expected open")]
    WrongState { id: ProposalId, state: ProposalState },

    #[error("proposal {0} has no updates")]
    NoUpdates(ProposalId),

    #[error("{user} is not authorized to decide proposal {id}")]
    NotAuthorized { id: ProposalId, user: Did },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProposalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AnonymousUser | Self::NotAuthorized { .. } => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::WrongState { .. } | Self::NoUpdates(_) => ErrorKind::State,
            Self::Graph(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}
