//! Error types for ecosystem maintenance.

use lens_store::StoreError;
use lens_types::ErrorKind;

/// Errors that can occur while maintaining children and ecosystem records.
#[derive(Debug, thiserror::Error)]
pub enum EcosystemError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EcosystemError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) => e.kind(),
        }
    }
}
