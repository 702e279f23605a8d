//! Shared types and identifiers for Lens.
//!
//! This crate defines the core types used across the Lens workspace:
//! identifiers ([`ElementId`], [`ProposalId`], [`Did`]),
//! graph entities ([`Data`], [`Commit`], [`Perspective`], [`HeadUpdate`]),
//! access control ([`AccessConfig`], [`PermissionSet`], [`PermissionKind`]),
//! proposals ([`Proposal`], [`ProposalState`]),
//! content-addressing configuration ([`CidConfig`]) and the error taxonomy
//! shared by every crate ([`ErrorKind`]).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an already-formatted identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the textual form.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID, returning the textual form.
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Content identifier of a Data, Commit or Perspective element.
    ElementId
);

define_id!(
    /// Identifier of a proposal (random UUID, proposals are not content-addressed).
    ProposalId
);

define_id!(
    /// Decentralized identifier of a user profile.
    Did
);

impl ProposalId {
    /// Generate a fresh random proposal id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// ---------------------------------------------------------------------------
// Graph entities
// ---------------------------------------------------------------------------

/// JSON payload carried by a Data element.
///
/// Serialized as JSON text so that non-self-describing encoders (postcard)
/// can store it.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(serde_json::Value);

impl Payload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// An immutable, content-addressed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub id: ElementId,
    pub payload: Payload,
}

/// Input for creating a Data element. When `id` is set it must match the
/// id computed from the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewData {
    pub id: Option<ElementId>,
    pub payload: serde_json::Value,
}

impl NewData {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { id: None, payload }
    }
}

/// The hashed part of a commit.
///
/// Field names serialize in camelCase because the JSON form of this struct
/// is what gets content-addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitContent {
    pub creators_ids: Vec<Did>,
    pub timestamp: u64,
    pub message: String,
    pub parents_ids: Vec<ElementId>,
    pub data_id: ElementId,
}

/// An immutable node of the commit DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: ElementId,
    pub content: CommitContent,
}

/// Input for creating a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub id: Option<ElementId>,
    pub content: CommitContent,
}

impl NewCommit {
    pub fn new(content: CommitContent) -> Self {
        Self { id: None, content }
    }
}

/// The hashed part of a perspective. Head, children and access metadata are
/// deliberately absent: they mutate while the id stays fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveContent {
    pub creator_id: Did,
    pub remote: String,
    pub path: String,
    pub timestamp: u64,
    pub context: String,
}

/// Signature attached to a perspective by its creator. Stored, never verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub signature: String,
    pub kind: String,
}

/// A named mutable pointer into the commit DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perspective {
    pub id: ElementId,
    pub content: PerspectiveContent,
    pub proof: Option<Proof>,
    /// Current head commit, if any.
    pub head: Option<ElementId>,
    /// Tombstone flag; deleted perspectives are never physically removed.
    pub deleted: bool,
}

/// Input for creating a perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPerspective {
    pub id: Option<ElementId>,
    pub content: PerspectiveContent,
    pub proof: Option<Proof>,
    pub head: Option<ElementId>,
    /// Initial structural children.
    pub children: Vec<ElementId>,
    /// Element to delegate permissions to. `None` makes the perspective a
    /// delegation root administered by its creator.
    pub parent_id: Option<ElementId>,
}

impl NewPerspective {
    pub fn new(content: PerspectiveContent) -> Self {
        Self {
            id: None,
            content,
            proof: None,
            head: None,
            children: Vec::new(),
            parent_id: None,
        }
    }

    pub fn with_head(mut self, head: ElementId) -> Self {
        self.head = Some(head);
        self
    }

    pub fn with_children(mut self, children: Vec<ElementId>) -> Self {
        self.children = children;
        self
    }

    pub fn with_parent(mut self, parent: ElementId) -> Self {
        self.parent_id = Some(parent);
        self
    }
}

/// Added and removed structural children of one perspective.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildrenDelta {
    pub added: Vec<ElementId>,
    pub removed: Vec<ElementId>,
}

impl ChildrenDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A requested change to one perspective's head and/or children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadUpdate {
    pub perspective_id: ElementId,
    pub from_perspective_id: Option<ElementId>,
    /// Head the update was computed against. Informational only.
    pub old_head_id: Option<ElementId>,
    /// New head; `None` leaves the head untouched.
    pub new_head_id: Option<ElementId>,
    pub children: ChildrenDelta,
}

impl HeadUpdate {
    /// Move `perspective` to `new_head`.
    pub fn new(perspective: ElementId, new_head: ElementId) -> Self {
        Self {
            perspective_id: perspective,
            from_perspective_id: None,
            old_head_id: None,
            new_head_id: Some(new_head),
            children: ChildrenDelta::default(),
        }
    }

    /// Change only the children of `perspective`.
    pub fn children(perspective: ElementId, children: ChildrenDelta) -> Self {
        Self {
            perspective_id: perspective,
            from_perspective_id: None,
            old_head_id: None,
            new_head_id: None,
            children,
        }
    }

    pub fn with_added_children(mut self, added: Vec<ElementId>) -> Self {
        self.children.added = added;
        self
    }

    pub fn with_removed_children(mut self, removed: Vec<ElementId>) -> Self {
        self.children.removed = removed;
        self
    }
}

// ---------------------------------------------------------------------------
// Access control
// ---------------------------------------------------------------------------

/// Permission level. Ordered so that a higher level implies every lower one:
/// Admin ⇒ Write ⇒ Read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermissionKind {
    Read,
    Write,
    Admin,
}

impl PermissionKind {
    /// Whether holding `self` grants `other`.
    pub fn implies(self, other: PermissionKind) -> bool {
        self >= other
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// The permission sets and public flags of an element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub public_read: bool,
    pub public_write: bool,
    pub can_read: BTreeSet<Did>,
    pub can_write: BTreeSet<Did>,
    pub can_admin: BTreeSet<Did>,
}

impl PermissionSet {
    /// A private set administered by `admin` alone.
    pub fn admin(admin: Did) -> Self {
        let mut set = Self::default();
        set.can_admin.insert(admin);
        set
    }

    /// Highest role explicitly granted to `user`.
    pub fn role_of(&self, user: &Did) -> Option<PermissionKind> {
        if self.can_admin.contains(user) {
            Some(PermissionKind::Admin)
        } else if self.can_write.contains(user) {
            Some(PermissionKind::Write)
        } else if self.can_read.contains(user) {
            Some(PermissionKind::Read)
        } else {
            None
        }
    }

    /// Whether `user` (or an anonymous caller when `None`) holds `kind`.
    ///
    /// Public flags are checked first: public write grants write and read,
    /// public read grants read. Anonymous callers only get public access.
    pub fn allows(&self, user: Option<&Did>, kind: PermissionKind) -> bool {
        let public = match kind {
            PermissionKind::Read => self.public_read || self.public_write,
            PermissionKind::Write => self.public_write,
            PermissionKind::Admin => false,
        };
        if public {
            return true;
        }
        user.and_then(|user| self.role_of(user))
            .is_some_and(|role| role.implies(kind))
    }

    /// Grant `kind` to `user`, dropping any other role they held.
    pub fn grant(&mut self, user: Did, kind: PermissionKind) {
        self.revoke(&user);
        self.members_mut(kind).insert(user);
    }

    /// Drop every role of `user`. Returns whether anything was removed.
    pub fn revoke(&mut self, user: &Did) -> bool {
        let read = self.can_read.remove(user);
        let write = self.can_write.remove(user);
        let admin = self.can_admin.remove(user);
        read || write || admin
    }

    /// Clear the three membership sets, keeping the public flags.
    pub fn clear_roles(&mut self) {
        self.can_read.clear();
        self.can_write.clear();
        self.can_admin.clear();
    }

    fn members_mut(&mut self, kind: PermissionKind) -> &mut BTreeSet<Did> {
        match kind {
            PermissionKind::Read => &mut self.can_read,
            PermissionKind::Write => &mut self.can_write,
            PermissionKind::Admin => &mut self.can_admin,
        }
    }
}

/// Delegation state and effective permissions of one element.
///
/// `permissions` always mirrors the permissions of `fin_delegated_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    pub element: ElementId,
    pub delegate: bool,
    pub delegate_to: Option<ElementId>,
    pub fin_delegated_to: ElementId,
    pub permissions: PermissionSet,
}

impl AccessConfig {
    /// A self-rooted config.
    pub fn root(element: ElementId, permissions: PermissionSet) -> Self {
        Self {
            fin_delegated_to: element.clone(),
            element,
            delegate: false,
            delegate_to: None,
            permissions,
        }
    }

    pub fn is_root(&self) -> bool {
        !self.delegate
    }
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

/// Lifecycle state of a proposal. Open is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    Open,
    Executed,
    Rejected,
    Declined,
}

impl ProposalState {
    pub const ALL: [ProposalState; 4] = [
        ProposalState::Open,
        ProposalState::Executed,
        ProposalState::Rejected,
        ProposalState::Declined,
    ];

    pub fn is_terminal(self) -> bool {
        self != Self::Open
    }

    /// Lowercase name, used in index keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
            Self::Declined => "declined",
        }
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cross-perspective batch of head updates awaiting a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub creator_id: Did,
    pub from_perspective_id: ElementId,
    pub to_perspective_id: ElementId,
    pub from_head_id: Option<ElementId>,
    pub to_head_id: Option<ElementId>,
    pub updates: Vec<HeadUpdate>,
    pub new_perspectives: Vec<NewPerspective>,
    pub state: ProposalState,
}

/// Input for opening a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProposal {
    pub from_perspective_id: ElementId,
    pub to_perspective_id: ElementId,
    pub from_head_id: Option<ElementId>,
    pub to_head_id: Option<ElementId>,
    pub updates: Vec<HeadUpdate>,
    pub new_perspectives: Vec<NewPerspective>,
}

impl NewProposal {
    pub fn new(from: ElementId, to: ElementId) -> Self {
        Self {
            from_perspective_id: from,
            to_perspective_id: to,
            from_head_id: None,
            to_head_id: None,
            updates: Vec::new(),
            new_perspectives: Vec::new(),
        }
    }

    pub fn with_updates(mut self, updates: Vec<HeadUpdate>) -> Self {
        self.updates = updates;
        self
    }

    pub fn with_new_perspectives(mut self, perspectives: Vec<NewPerspective>) -> Self {
        self.new_perspectives = perspectives;
        self
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Multicodec of the content being addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Codec {
    Raw,
    Json,
    DagJson,
    DagCbor,
}

impl Codec {
    /// Multicodec table code.
    pub const fn code(self) -> u64 {
        match self {
            Self::Raw => 0x55,
            Self::Json => 0x0200,
            Self::DagJson => 0x0129,
            Self::DagCbor => 0x71,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x55 => Some(Self::Raw),
            0x0200 => Some(Self::Json),
            0x0129 => Some(Self::DagJson),
            0x71 => Some(Self::DagCbor),
            _ => None,
        }
    }
}

/// Multihash function used for ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "sha2-256")]
    Sha2_256,
    #[serde(rename = "sha2-512")]
    Sha2_512,
    #[serde(rename = "blake3")]
    Blake3,
}

impl HashAlgorithm {
    /// Multihash table code.
    pub const fn code(self) -> u64 {
        match self {
            Self::Sha2_256 => 0x12,
            Self::Sha2_512 => 0x13,
            Self::Blake3 => 0x1e,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x12 => Some(Self::Sha2_256),
            0x13 => Some(Self::Sha2_512),
            0x1e => Some(Self::Blake3),
            _ => None,
        }
    }
}

/// Multibase encoding of the textual id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CidBase {
    Base58btc,
    Base32,
}

/// How new ids are computed. Ids carry their own configuration, so
/// validation works for any supported combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CidConfig {
    pub version: u64,
    pub codec: Codec,
    pub hash: HashAlgorithm,
    pub base: CidBase,
}

impl Default for CidConfig {
    fn default() -> Self {
        Self {
            version: 1,
            codec: Codec::Raw,
            hash: HashAlgorithm::Sha2_256,
            base: CidBase::Base58btc,
        }
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Coarse classification shared by every crate's error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Supplied id does not match its content, or content cannot be encoded.
    Identity,
    /// Element or proposal absent, a stub, or not readable by the caller.
    NotFound,
    /// Caller lacks the required permission, or is anonymous.
    Authorization,
    /// Operation not allowed in the current proposal state.
    State,
    /// Transaction kept conflicting until the retry budget ran out.
    ConflictExhausted,
    /// Unsupported or invalid configuration.
    Config,
    /// Delegation target unresolved, cycle, or permissions held by a root.
    Delegation,
    /// Backend failure.
    Storage,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
