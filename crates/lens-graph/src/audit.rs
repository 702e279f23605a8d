//! Offline consistency audit over the whole store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lens_access::records::ACCESS_PREFIX;
use lens_ecosystem::records::{CHILDREN_PREFIX, ECOSYSTEM_PREFIX};
use lens_types::{AccessConfig, ElementId};
use tracing::{info, warn};

use crate::error::GraphError;
use crate::graph::EntityGraph;
use crate::records::{ELEMENT_PREFIX, ElementBody, ElementRecord};

/// Upper bound on delegation chain length walked by the audit.
const MAX_CHAIN: usize = 10_000;

/// One broken invariant found by [`EntityGraph::audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Stored id is not the content id of the stored content.
    IdentityMismatch { id: ElementId },
    /// A perspective has no access config.
    MissingAccessConfig { id: ElementId },
    /// `delegate`, `delegate_to` and `fin_delegated_to` disagree.
    DelegationFlags { id: ElementId },
    /// The `delegate_to` chain is dangling, cyclic or too long.
    BrokenChain { id: ElementId, reason: String },
    /// `fin_delegated_to` is not the end of the chain.
    WrongRoot {
        id: ElementId,
        expected: ElementId,
        found: ElementId,
    },
    /// Permission sets differ from the root's.
    PermissionDrift { id: ElementId, root: ElementId },
    /// The ecosystem misses members reachable through children.
    EcosystemIncomplete {
        id: ElementId,
        missing: Vec<ElementId>,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityMismatch { id } => write!(f, "{id}: id does not match content"),
            Self::MissingAccessConfig { id } => write!(f, "{id}: perspective has no access config"),
            Self::DelegationFlags { id } => write!(f, "{id}: inconsistent delegation flags"),
            Self::BrokenChain { id, reason } => write!(f, "{id}: broken delegation chain ({reason})"),
            Self::WrongRoot {
                id,
                expected,
                found,
            } => write!(f, "{id}: root is {expected} but finDelegatedTo is {found}"),
            Self::PermissionDrift { id, root } => {
                write!(f, "{id}: permissions differ from root {root}")
            }
            Self::EcosystemIncomplete { id, missing } => {
                write!(f, "{id}: ecosystem misses {} member(s)", missing.len())
            }
        }
    }
}

/// Result of an audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub elements: usize,
    pub stubs: usize,
    pub perspectives: usize,
    pub access_configs: usize,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

fn id_from_key(key: &str, prefix: &str) -> ElementId {
    ElementId::new(key.strip_prefix(prefix).unwrap_or(key))
}

impl EntityGraph {
    /// Check content identity, delegation roots, permission clones and
    /// ecosystem closure across every stored record.
    ///
    /// Reads committed state key by key, so an audit running next to writers
    /// may report transient violations.
    pub async fn audit(&self) -> Result<AuditReport, GraphError> {
        let executor = self.executor();
        let mut report = AuditReport::default();

        let access: BTreeMap<ElementId, AccessConfig> = executor
            .scan::<AccessConfig>(ACCESS_PREFIX)
            .await?
            .into_iter()
            .map(|(key, config)| (id_from_key(&key, ACCESS_PREFIX), config))
            .collect();
        report.access_configs = access.len();

        for (_, record) in executor.scan::<ElementRecord>(ELEMENT_PREFIX).await? {
            report.elements += 1;
            let id = record.id;
            let valid = match &record.body {
                ElementBody::Stub => {
                    report.stubs += 1;
                    continue;
                }
                ElementBody::Data(payload) => lens_cid::validate(id.as_str(), payload.value()),
                ElementBody::Commit(content) => lens_cid::validate_of(id.as_str(), content),
                ElementBody::Perspective(state) => {
                    report.perspectives += 1;
                    if !access.contains_key(&id) {
                        report
                            .violations
                            .push(Violation::MissingAccessConfig { id: id.clone() });
                    }
                    lens_cid::validate_of(id.as_str(), &state.content)
                }
            };
            if !valid {
                report.violations.push(Violation::IdentityMismatch { id });
            }
        }

        for (id, config) in &access {
            audit_delegation(id, config, &access, &mut report.violations);
        }

        audit_ecosystems(self, &mut report.violations).await?;

        if report.is_clean() {
            info!(elements = report.elements, "audit clean");
        } else {
            warn!(violations = report.violations.len(), "audit found violations");
        }
        Ok(report)
    }
}

fn audit_delegation(
    id: &ElementId,
    config: &AccessConfig,
    access: &BTreeMap<ElementId, AccessConfig>,
    violations: &mut Vec<Violation>,
) {
    if !config.delegate {
        if config.fin_delegated_to != *id || config.delegate_to.is_some() {
            violations.push(Violation::DelegationFlags { id: id.clone() });
        }
        return;
    }

    let mut visited = BTreeSet::from([id.clone()]);
    let mut current = config;
    let root = loop {
        let Some(next) = &current.delegate_to else {
            violations.push(Violation::DelegationFlags { id: id.clone() });
            return;
        };
        if !visited.insert(next.clone()) || visited.len() > MAX_CHAIN {
            violations.push(Violation::BrokenChain {
                id: id.clone(),
                reason: format!("cycle through {next}"),
            });
            return;
        }
        let Some(next_config) = access.get(next) else {
            violations.push(Violation::BrokenChain {
                id: id.clone(),
                reason: format!("{next} has no access config"),
            });
            return;
        };
        if !next_config.delegate {
            break next.clone();
        }
        current = next_config;
    };

    if config.fin_delegated_to != root {
        violations.push(Violation::WrongRoot {
            id: id.clone(),
            expected: root.clone(),
            found: config.fin_delegated_to.clone(),
        });
    }
    if access
        .get(&root)
        .is_some_and(|root_config| root_config.permissions != config.permissions)
    {
        violations.push(Violation::PermissionDrift {
            id: id.clone(),
            root,
        });
    }
}

async fn audit_ecosystems(
    graph: &EntityGraph,
    violations: &mut Vec<Violation>,
) -> Result<(), GraphError> {
    let executor = graph.executor();
    let children: BTreeMap<ElementId, BTreeSet<ElementId>> = executor
        .scan::<BTreeSet<ElementId>>(CHILDREN_PREFIX)
        .await?
        .into_iter()
        .map(|(key, set)| (id_from_key(&key, CHILDREN_PREFIX), set))
        .collect();
    let ecosystems: BTreeMap<ElementId, BTreeSet<ElementId>> = executor
        .scan::<BTreeSet<ElementId>>(ECOSYSTEM_PREFIX)
        .await?
        .into_iter()
        .map(|(key, set)| (id_from_key(&key, ECOSYSTEM_PREFIX), set))
        .collect();

    let ecosystem_of = |id: &ElementId| {
        ecosystems
            .get(id)
            .cloned()
            .unwrap_or_else(|| BTreeSet::from([id.clone()]))
    };

    for (parent, kids) in &children {
        let have = ecosystem_of(parent);
        let mut required = BTreeSet::from([parent.clone()]);
        for child in kids {
            required.insert(child.clone());
            required.extend(ecosystem_of(child));
        }
        let missing: Vec<ElementId> = required.difference(&have).cloned().collect();
        if !missing.is_empty() {
            violations.push(Violation::EcosystemIncomplete {
                id: parent.clone(),
                missing,
            });
        }
    }
    Ok(())
}
