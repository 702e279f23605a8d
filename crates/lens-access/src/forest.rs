//! In-memory delegation forest.
//!
//! Each element points at the element it delegates to (its parent) and
//! caches the root of its chain. Re-pointing an element reassigns the cached
//! root of its whole subtree with an explicit worklist, so arbitrarily deep
//! chains never recurse.

use std::collections::{BTreeSet, HashMap};

use lens_types::{AccessConfig, ElementId};

use crate::error::AccessError;

#[derive(Debug, Clone)]
struct Node {
    parent: Option<ElementId>,
    root: ElementId,
    children: BTreeSet<ElementId>,
}

/// Parent-pointer forest over delegation edges.
#[derive(Debug, Default)]
pub struct DelegationForest {
    nodes: HashMap<ElementId, Node>,
}

impl DelegationForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a forest from stored access configs.
    ///
    /// Parents that are not among `configs` are remembered as pointers but
    /// have no node of their own.
    pub fn from_configs<'a>(configs: impl IntoIterator<Item = &'a AccessConfig>) -> Self {
        let mut forest = Self::new();
        for config in configs {
            forest.nodes.insert(
                config.element.clone(),
                Node {
                    parent: config.delegate_to.clone().filter(|_| config.delegate),
                    root: config.fin_delegated_to.clone(),
                    children: BTreeSet::new(),
                },
            );
        }

        let edges: Vec<(ElementId, ElementId)> = forest
            .nodes
            .iter()
            .filter_map(|(id, node)| node.parent.clone().map(|parent| (parent, id.clone())))
            .collect();
        for (parent, child) in edges {
            if let Some(node) = forest.nodes.get_mut(&parent) {
                node.children.insert(child);
            }
        }
        forest
    }

    /// Add one element, linking it under its parent if the parent is known
    /// and adopting any already-added element that delegates to it.
    pub fn add(&mut self, config: &AccessConfig) {
        let id = config.element.clone();
        let parent = config.delegate_to.clone().filter(|_| config.delegate);

        let adopted: BTreeSet<ElementId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.as_ref() == Some(&id))
            .map(|(child, _)| child.clone())
            .collect();

        if let Some(parent_node) = parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
            parent_node.children.insert(id.clone());
        }

        self.nodes.insert(
            id,
            Node {
                parent,
                root: config.fin_delegated_to.clone(),
                children: adopted,
            },
        );
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn root_of(&self, id: &ElementId) -> Option<&ElementId> {
        self.nodes.get(id).map(|node| &node.root)
    }

    pub fn parent_of(&self, id: &ElementId) -> Option<&ElementId> {
        self.nodes.get(id).and_then(|node| node.parent.as_ref())
    }

    /// `id` and every element whose chain passes through it.
    pub fn subtree(&self, id: &ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().cloned());
            }
            out.push(current);
        }
        out
    }

    /// Point `id` at `target` (or make it a root when `None`) and reassign
    /// the root of its subtree.
    ///
    /// Returns the elements whose root changed. On error nothing changes.
    pub fn set_delegation(
        &mut self,
        id: &ElementId,
        target: Option<&ElementId>,
    ) -> Result<Vec<ElementId>, AccessError> {
        if !self.nodes.contains_key(id) {
            return Err(AccessError::NotFound(id.clone()));
        }

        let new_root = match target {
            None => id.clone(),
            Some(target) => {
                if self.subtree(id).contains(target) {
                    return Err(AccessError::Cycle {
                        element: id.clone(),
                        target: target.clone(),
                    });
                }
                match self.nodes.get(target) {
                    Some(node) => node.root.clone(),
                    None => {
                        return Err(AccessError::TargetUnresolved {
                            element: id.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        };

        let old_parent = self.nodes.get_mut(id).and_then(|node| node.parent.take());
        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            old.children.remove(id);
        }
        if let Some(target) = target {
            if let Some(node) = self.nodes.get_mut(target) {
                node.children.insert(id.clone());
            }
            if let Some(node) = self.nodes.get_mut(id) {
                node.parent = Some(target.clone());
            }
        }

        let mut changed = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&current) else {
                continue;
            };
            if node.root != new_root {
                node.root = new_root.clone();
                changed.push(current);
            }
            stack.extend(node.children.iter().cloned());
        }
        Ok(changed)
    }
}
