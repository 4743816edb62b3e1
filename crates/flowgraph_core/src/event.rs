// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural and evaluation-lifecycle notifications.

use crate::connection::Connection;
use crate::link::PropertyLink;
use crate::node::NodeId;

/// Something that happened to a network
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// A processor is about to be added
    WillAddProcessor {
        /// Node ID
        node: NodeId,
        /// Identifier after uniquification
        identifier: String,
    },
    /// A processor was added
    DidAddProcessor {
        /// Node ID
        node: NodeId,
        /// Identifier after uniquification
        identifier: String,
    },
    /// A processor is about to be removed; its connections and links are already gone
    WillRemoveProcessor {
        /// Node ID
        node: NodeId,
        /// Identifier
        identifier: String,
    },
    /// A processor was removed
    DidRemoveProcessor {
        /// Node ID
        node: NodeId,
        /// Identifier
        identifier: String,
    },
    /// A processor got a new identifier
    ProcessorRenamed {
        /// Node ID
        node: NodeId,
        /// Previous identifier
        old: String,
        /// Identifier after uniquification
        new: String,
    },
    /// A connection is about to be added
    WillAddConnection(Connection),
    /// A connection was added
    DidAddConnection(Connection),
    /// A connection is about to be removed
    WillRemoveConnection(Connection),
    /// A connection was removed
    DidRemoveConnection(Connection),
    /// A link is about to be added
    WillAddLink(PropertyLink),
    /// A link was added
    DidAddLink(PropertyLink),
    /// A link is about to be removed
    WillRemoveLink(PropertyLink),
    /// A link was removed
    DidRemoveLink(PropertyLink),
    /// An evaluation pass starts
    EvaluationBegin,
    /// An evaluation pass finished
    EvaluationEnd,
    /// The sorter found cycles among active connections
    CyclicDependency {
        /// Nodes on a cycle
        cyclic: Vec<NodeId>,
        /// Nodes downstream of a cycle, also left out of the order
        excluded: Vec<NodeId>,
    },
}

/// Receives network events
pub trait NetworkObserver {
    /// Called synchronously, after the state change for `Did*` events and before it for `Will*` events
    fn on_event(&mut self, event: &NetworkEvent);
}

impl<F> NetworkObserver for F
where
    F: FnMut(&NetworkEvent),
{
    fn on_event(&mut self, event: &NetworkEvent) {
        self(event);
    }
}

/// Handle returned by `Network::add_observer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub(crate) struct ObserverList {
    next_id: u64,
    observers: Vec<(ObserverId, Box<dyn NetworkObserver>)>,
}

impl ObserverList {
    pub(crate) fn add(&mut self, observer: Box<dyn NetworkObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn notify(&mut self, event: &NetworkEvent) {
        tracing::trace!(?event, "Network event");
        for (_, observer) in &mut self.observers {
            observer.on_event(event);
        }
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.observers.len())
            .finish()
    }
}
