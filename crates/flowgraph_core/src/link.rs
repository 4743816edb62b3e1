// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property links: a value set on one property is pushed to linked properties.

use crate::node::NodeId;
use crate::property::PropertyPath;
use indexmap::IndexSet;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Address of a property inside a network
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    /// Owning processor
    pub node: NodeId,
    /// Path from the processor's property root
    pub path: PropertyPath,
}

impl PropertyRef {
    /// Create a property address
    pub fn new(node: NodeId, path: impl Into<PropertyPath>) -> Self {
        Self {
            node,
            path: path.into(),
        }
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.path)
    }
}

/// A one-directional link; a bidirectional link is two of these
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyLink {
    /// Property whose changes are propagated
    pub source: PropertyRef,
    /// Property that receives the value
    pub destination: PropertyRef,
}

impl PropertyLink {
    /// Create a link
    pub fn new(source: PropertyRef, destination: PropertyRef) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Check if this link touches a node
    pub fn involves_node(&self, node: NodeId) -> bool {
        self.source.node == node || self.destination.node == node
    }

    /// Check if this link touches a property
    pub fn involves_property(&self, property: &PropertyRef) -> bool {
        &self.source == property || &self.destination == property
    }
}

/// Ordered set of links with propagation planning
#[derive(Debug, Clone, Default)]
pub(crate) struct LinkTable {
    links: IndexSet<PropertyLink>,
}

impl LinkTable {
    pub(crate) fn contains(&self, link: &PropertyLink) -> bool {
        self.links.contains(link)
    }

    pub(crate) fn insert(&mut self, link: PropertyLink) -> bool {
        self.links.insert(link)
    }

    pub(crate) fn remove(&mut self, link: &PropertyLink) -> bool {
        self.links.shift_remove(link)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &PropertyLink> {
        self.links.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    /// Links touching `node`
    pub(crate) fn involving_node(&self, node: NodeId) -> Vec<PropertyLink> {
        self.links
            .iter()
            .filter(|link| link.involves_node(node))
            .cloned()
            .collect()
    }

    /// Links touching `property`
    pub(crate) fn involving_property(&self, property: &PropertyRef) -> Vec<PropertyLink> {
        self.links
            .iter()
            .filter(|link| link.involves_property(property))
            .cloned()
            .collect()
    }

    /// Properties reachable from `start` over links in either direction
    pub(crate) fn linked_to(&self, start: &PropertyRef) -> Vec<PropertyRef> {
        let mut visited: HashSet<&PropertyRef> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut found = Vec::new();
        while let Some(current) = queue.pop_front() {
            for link in &self.links {
                let next = if &link.source == current {
                    &link.destination
                } else if &link.destination == current {
                    &link.source
                } else {
                    continue;
                };
                if visited.insert(next) {
                    found.push(next.clone());
                    queue.push_back(next);
                }
            }
        }
        found
    }

    /// Destinations to update, in breadth-first order, when `start` changes.
    ///
    /// Every property appears at most once and `start` never appears, so
    /// bidirectional pairs and longer loops terminate.
    pub(crate) fn propagation_plan(&self, start: &PropertyRef) -> Vec<PropertyLink> {
        let mut visited: HashSet<&PropertyRef> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut plan = Vec::new();
        while let Some(current) = queue.pop_front() {
            for link in self.links.iter().filter(|link| &link.source == current) {
                if visited.insert(&link.destination) {
                    plan.push(link.clone());
                    queue.push_back(&link.destination);
                }
            }
        }
        plan
    }
}
