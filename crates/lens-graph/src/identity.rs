//! Id derivation and verification for new elements.

use lens_cid::CidError;
use lens_types::{CidConfig, ElementId};
use serde::Serialize;
use serde_json::Value;

use crate::error::GraphError;

/// The id of `content`: computed under `config` when none is supplied, or
/// the supplied id after checking it against the content.
///
/// A supplied id is validated under the configuration it encodes itself, so
/// ids produced by peers with other settings are accepted.
pub(crate) fn resolve_id<T: Serialize + ?Sized>(
    supplied: Option<&ElementId>,
    content: &T,
    config: &CidConfig,
) -> Result<ElementId, GraphError> {
    let value = serde_json::to_value(content).map_err(|e| CidError::Encoding(e.to_string()))?;
    resolve_value_id(supplied, &value, config)
}

pub(crate) fn resolve_value_id(
    supplied: Option<&ElementId>,
    value: &Value,
    config: &CidConfig,
) -> Result<ElementId, GraphError> {
    match supplied {
        None => Ok(lens_cid::compute_id(value, config)?),
        Some(id) if lens_cid::validate(id.as_str(), value) => Ok(id.clone()),
        Some(id) => Err(GraphError::InvalidIdentity {
            supplied: id.clone(),
            computed: lens_cid::compute_id(value, config)?,
        }),
    }
}
