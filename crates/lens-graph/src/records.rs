//! Element and profile records.
//!
//! - `element/<id>` → [`ElementRecord`]
//! - `profile/<did>` → [`ProfileRecord`]

use lens_store::{StoreError, Tx};
use lens_types::{CommitContent, Did, ElementId, Payload, PerspectiveContent, Proof};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ELEMENT_PREFIX: &str = "element/";
pub const PROFILE_PREFIX: &str = "profile/";

pub fn element_key(id: &ElementId) -> String {
    format!("{ELEMENT_PREFIX}{id}")
}

pub fn profile_key(did: &Did) -> String {
    format!("{PROFILE_PREFIX}{did}")
}

/// Mutable state stored alongside a perspective's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerspectiveState {
    pub content: PerspectiveContent,
    pub proof: Option<Proof>,
    pub head: Option<ElementId>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementBody {
    /// Referenced but never created.
    Stub,
    Data(Payload),
    Commit(CommitContent),
    Perspective(PerspectiveState),
}

/// One stored graph element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub id: ElementId,
    pub body: ElementBody,
}

impl ElementRecord {
    pub fn stub(id: ElementId) -> Self {
        Self {
            id,
            body: ElementBody::Stub,
        }
    }

    /// `false` for stubs.
    pub fn is_stored(&self) -> bool {
        !matches!(self.body, ElementBody::Stub)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub did: Did,
}

pub async fn load_element(
    tx: &mut Tx<'_>,
    id: &ElementId,
) -> Result<Option<ElementRecord>, StoreError> {
    tx.get(&element_key(id)).await
}

/// Write a stub for `id` unless a record (stub or real) already exists.
pub async fn ensure_element(tx: &mut Tx<'_>, id: &ElementId) -> Result<(), StoreError> {
    if !tx.exists(&element_key(id)).await? {
        tx.put(element_key(id), &ElementRecord::stub(id.clone()))?;
        debug!(%id, "materialized stub");
    }
    Ok(())
}

/// Create the profile of `did` on first reference.
pub async fn upsert_profile(tx: &mut Tx<'_>, did: &Did) -> Result<(), StoreError> {
    if !tx.exists(&profile_key(did)).await? {
        tx.put(profile_key(did), &ProfileRecord { did: did.clone() })?;
        debug!(%did, "created profile");
    }
    Ok(())
}
