//! Error types for the entity graph.

use lens_access::AccessError;
use lens_cid::CidError;
use lens_ecosystem::EcosystemError;
use lens_store::StoreError;
use lens_types::{ElementId, ErrorKind};

/// Errors that can occur during entity graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A supplied id does not match the id computed from its content.
    #[error("invalid identity: {supplied} does not match computed id {computed}")]
    InvalidIdentity {
        supplied: ElementId,
        computed: ElementId,
    },

    /// The element is absent, a stub, deleted, or not readable by the caller.
    #[error("element not found: {0}")]
    NotFound(ElementId),

    /// The operation needs an authenticated caller.
    #[error("operation requires an authenticated user")]
    AnonymousUser,

    /// The caller lacks the permission the operation needs.
    #[error("not authorized to {action}")]
    NotAuthorized { action: String },

    #[error(transparent)]
    Cid(#[from] CidError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Ecosystem(#[from] EcosystemError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentity { .. } => ErrorKind::Identity,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AnonymousUser | Self::NotAuthorized { .. } => ErrorKind::Authorization,
            Self::Cid(e) => e.kind(),
            Self::Access(e) => e.kind(),
            Self::Ecosystem(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}
