//! Error types for the access engine.

use lens_store::StoreError;
use lens_types::{Did, ElementId, ErrorKind, PermissionKind};

/// Errors that can occur during delegation and permission operations.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The element has no access config, or the caller cannot read it.
    #[error("element not found: {0}")]
    NotFound(ElementId),

    /// The operation needs an authenticated caller.
    #[error("operation requires an authenticated user")]
    AnonymousUser,

    /// The caller lacks the required permission.
    #[error("{user} lacks {kind} permission on {element}")]
    NotAuthorized {
        element: ElementId,
        user: Did,
        kind: PermissionKind,
    },

    /// The delegation target has no access config yet.
    #[error("delegation target {target} of {element} is unresolved")]
    TargetUnresolved { element: ElementId, target: ElementId },

    /// The target is the element itself or one of its delegators.
    #[error("delegating {element} to {target} would create a cycle")]
    Cycle { element: ElementId, target: ElementId },

    /// Permissions can only be edited on a delegation root.
    #[error("permissions of {element} are delegated to {root}")]
    PermissionsDelegated { element: ElementId, root: ElementId },

    /// Only read and write can be made public.
    #[error("{0} permission cannot be made public")]
    InvalidPublicPermission(PermissionKind),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AnonymousUser | Self::NotAuthorized { .. } => ErrorKind::Authorization,
            Self::TargetUnresolved { .. } | Self::Cycle { .. } | Self::PermissionsDelegated { .. } => {
                ErrorKind::Delegation
            }
            Self::InvalidPublicPermission(_) => ErrorKind::Config,
            Self::Store(e) => e.kind(),
        }
    }
}
