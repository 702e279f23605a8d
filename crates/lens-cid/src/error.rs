//! Error types for content addressing.

use lens_types::ErrorKind;

/// Errors that can occur while computing or decoding content ids.
#[derive(Debug, thiserror::Error)]
pub enum CidError {
    /// The value cannot be turned into canonical bytes.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The string is not a well-formed content id.
    #[error("malformed content id: {0}")]
    Decode(String),

    /// Version, codec, hash or base outside the supported set.
    #[error("unsupported cid configuration: {0}")]
    UnsupportedConfig(String),
}

impl CidError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Encoding(_) | Self::Decode(_) => ErrorKind::Identity,
            Self::UnsupportedConfig(_) => ErrorKind::Config,
        }
    }
}
