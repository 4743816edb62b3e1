// SPDX-License-Identifier: MIT OR Apache-2.0
//! The processor network: structure, invalidation and locking.
//!
//! The network owns every node, connection and link. Structural changes are
//! wrapped in a lock so observers see paired will/did events and any
//! evaluation they cause runs once, after the change is complete.

mod document;
mod evaluator;

pub use evaluator::EvaluationReport;

use crate::connection::{Connection, ConnectionEnd, ConnectionState};
use crate::context::{NetworkConfig, NetworkContext};
use crate::dispatch::PostQueue;
use crate::error::{ConnectionError, ErrorHandler, NetworkError};
use crate::event::{NetworkEvent, NetworkObserver, ObserverId, ObserverList};
use crate::gate::{EvaluationGate, GateState};
use crate::invalidation::InvalidationLevel;
use crate::link::{LinkTable, PropertyLink, PropertyRef};
use crate::node::{Node, NodeId};
use crate::port::{DataType, InportRef, OutportRef};
use crate::property::{Property, PropertyKind, PropertyPath, PropertyValue};
use crate::sort::{topological_sort, SortNode, SortOutcome};
use indexmap::IndexMap;
use std::sync::Arc;

/// A graph of processors evaluated on demand
#[derive(Debug)]
pub struct Network {
    nodes: IndexMap<NodeId, Node>,
    connections: IndexMap<Connection, ConnectionState>,
    links: LinkTable,
    gate: EvaluationGate,
    needs_sorting: bool,
    sorted: SortOutcome,
    observers: ObserverList,
    context: NetworkContext,
    last_report: Option<EvaluationReport>,
    modified: bool,
    pub(crate) posted: PostQueue,
}

impl Network {
    /// Create an empty network with default settings
    pub fn new() -> Self {
        Self::with_context(NetworkContext::default())
    }

    /// Create an empty network with an explicit context
    pub fn with_context(context: NetworkContext) -> Self {
        Self {
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            links: LinkTable::default(),
            gate: EvaluationGate::new(),
            needs_sorting: false,
            sorted: SortOutcome::default(),
            observers: ObserverList::default(),
            context,
            last_report: None,
            modified: true,
            posted: PostQueue::default(),
        }
    }

    /// Evaluation settings
    pub fn config(&self) -> &NetworkConfig {
        &self.context.config
    }

    /// Replace the evaluation settings
    pub fn set_config(&mut self, config: NetworkConfig) {
        self.context.config = config;
    }

    /// Replace the handler receiving per-node failures
    pub fn set_error_handler(&mut self, handler: impl ErrorHandler + 'static) {
        self.context.error_handler = Box::new(handler);
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register an observer for structural and evaluation events
    pub fn add_observer(&mut self, observer: impl NetworkObserver + 'static) -> ObserverId {
        self.observers.add(Box::new(observer))
    }

    /// Unregister an observer; returns whether it was registered
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    fn notify(&mut self, event: NetworkEvent) {
        self.observers.notify(&event);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a node by ID
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a node by its identifier
    pub fn node_by_identifier(&self, identifier: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.identifier() == identifier)
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All node IDs in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All connections in insertion order
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.keys()
    }

    /// Number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether the edge exists
    pub fn is_connected(&self, outport: OutportRef, inport: InportRef) -> bool {
        self.connections
            .contains_key(&Connection::new(outport, inport))
    }

    /// Activity flag of an edge as of the last refresh, `None` if absent
    pub fn is_connection_active(&self, connection: &Connection) -> Option<bool> {
        self.connections.get(connection).map(|state| state.active)
    }

    /// Connections into an inport, in connection order
    pub fn connections_to(&self, inport: InportRef) -> impl Iterator<Item = &Connection> {
        self.connections.keys().filter(move |c| c.inport == inport)
    }

    /// Connections out of an outport
    pub fn connections_from(&self, outport: OutportRef) -> impl Iterator<Item = &Connection> {
        self.connections.keys().filter(move |c| c.outport == outport)
    }

    fn active_connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(|(_, state)| state.active)
            .map(|(connection, _)| connection)
    }

    /// Nodes feeding `id` through active connections
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        for c in self.active_connections().filter(|c| c.to_node() == id) {
            if !found.contains(&c.from_node()) {
                found.push(c.from_node());
            }
        }
        found
    }

    /// Nodes fed by `id` through active connections
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        for c in self.active_connections().filter(|c| c.from_node() == id) {
            if !found.contains(&c.to_node()) {
                found.push(c.to_node());
            }
        }
        found
    }

    /// Property at `path` on a node
    pub fn property(&self, node: NodeId, path: impl Into<PropertyPath>) -> Option<&Property> {
        self.nodes.get(&node)?.properties().get(&path.into())
    }

    fn property_value(&self, property: &PropertyRef) -> Option<&PropertyValue> {
        self.nodes
            .get(&property.node)?
            .properties()
            .value(&property.path)
    }

    /// Typed value currently published on an outport
    pub fn outport_data<T: DataType>(&self, outport: OutportRef) -> Option<Arc<T>> {
        self.nodes
            .get(&outport.node)?
            .outports()
            .get(outport.index)?
            .data_as::<T>()
    }

    /// Evaluation order, sorting first if the structure changed
    pub fn evaluation_order(&mut self) -> &[NodeId] {
        self.ensure_sorted();
        &self.sorted.order
    }

    /// Who currently holds the evaluation gate
    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Whether a lock is held
    pub fn is_locked(&self) -> bool {
        self.gate.lock_count() > 0
    }

    /// Whether link propagation is running
    pub fn is_linking(&self) -> bool {
        self.gate.state() == GateState::Linking
    }

    /// Whether an evaluation was requested but has not run yet
    pub fn has_pending_evaluation(&self) -> bool {
        self.gate.is_pending()
    }

    /// Report of the most recent evaluation that ran
    pub fn last_report(&self) -> Option<&EvaluationReport> {
        self.last_report.as_ref()
    }

    /// Whether the structure or a property changed since the flag was last cleared.
    /// A new network starts out modified.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Set or clear the modified flag, e.g. after saving
    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    fn mark_modified(&mut self) {
        self.modified = true;
    }

    // ========================================================================
    // Locking
    // ========================================================================

    /// Hold back evaluation until the matching [`Network::unlock`]
    pub fn lock(&mut self) {
        self.gate.lock();
    }

    /// Release one lock level; the last release runs a queued evaluation
    pub fn unlock(&mut self) {
        if self.gate.unlock() {
            self.drain();
        }
    }

    /// Run `f` under one lock, so any number of changes cause at most one evaluation
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.lock();
        let result = f(self);
        self.unlock();
        result
    }

    /// Ask for an evaluation pass.
    ///
    /// Runs immediately when nothing holds the gate and automatic evaluation
    /// is on; otherwise only the pending flag is set.
    pub fn request_evaluate(&mut self) {
        if self.gate.defer() {
            return;
        }
        if !self.context.config.auto_evaluate {
            self.gate.set_pending();
            return;
        }
        self.evaluate();
    }

    /// Run the queued evaluation, if any and if the gate is idle
    pub fn evaluate_pending(&mut self) -> Option<EvaluationReport> {
        if self.gate.is_pending() && self.gate.is_idle() {
            Some(self.evaluate())
        } else {
            None
        }
    }

    fn drain(&mut self) {
        if self.context.config.auto_evaluate {
            self.evaluate();
        }
    }

    // ========================================================================
    // Processors
    // ========================================================================

    /// Add a processor; its identifier is made unique within the network
    pub fn add_processor(&mut self, mut node: Node) -> NodeId {
        self.lock();
        let identifier = self.unique_identifier(node.identifier());
        node.set_identifier(identifier.clone());
        node.raise(InvalidationLevel::InvalidResources);
        let id = node.id();

        self.notify(NetworkEvent::WillAddProcessor {
            node: id,
            identifier: identifier.clone(),
        });
        self.nodes.insert(id, node);
        self.needs_sorting = true;
        self.mark_modified();
        self.notify(NetworkEvent::DidAddProcessor {
            node: id,
            identifier: identifier.clone(),
        });
        tracing::debug!(%identifier, "Added processor");

        self.request_evaluate();
        self.unlock();
        id
    }

    fn unique_identifier(&self, wanted: &str) -> String {
        self.unique_identifier_except(wanted, None)
    }

    fn unique_identifier_except(&self, wanted: &str, except: Option<NodeId>) -> String {
        let taken = |candidate: &str| {
            self.nodes
                .values()
                .any(|n| Some(n.id()) != except && n.identifier() == candidate)
        };
        if !wanted.is_empty() && !taken(wanted) {
            return wanted.to_owned();
        }
        let base = match wanted.rsplit_once(' ') {
            Some((base, suffix)) if suffix.parse::<u32>().is_ok() => base,
            _ => wanted,
        };
        let base = if base.is_empty() { "Processor" } else { base };
        (2..)
            .map(|n| format!("{base} {n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_owned())
    }

    /// Give a processor a new identifier, made unique like on insertion.
    ///
    /// Returns the identifier actually assigned.
    pub fn rename_processor(&mut self, id: NodeId, wanted: &str) -> Result<String, NetworkError> {
        let current = self
            .nodes
            .get(&id)
            .ok_or(NetworkError::NodeNotFound(id))?
            .identifier()
            .to_owned();
        let identifier = self.unique_identifier_except(wanted, Some(id));
        if identifier == current {
            return Ok(identifier);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.set_identifier(identifier.clone());
        }
        self.mark_modified();
        self.notify(NetworkEvent::ProcessorRenamed {
            node: id,
            old: current.clone(),
            new: identifier.clone(),
        });
        tracing::debug!(old = %current, new = %identifier, "Renamed processor");
        Ok(identifier)
    }

    /// Remove a processor after detaching its connections and links
    pub fn remove_processor(&mut self, id: NodeId) -> Option<Node> {
        let identifier = self.nodes.get(&id)?.identifier().to_owned();
        self.lock();

        let incident: Vec<Connection> = self
            .connections
            .keys()
            .filter(|c| c.involves_node(id))
            .copied()
            .collect();
        for connection in incident {
            self.remove_connection(connection.outport, connection.inport);
        }
        for link in self.links.involving_node(id) {
            self.remove_link(&link);
        }

        self.notify(NetworkEvent::WillRemoveProcessor {
            node: id,
            identifier: identifier.clone(),
        });
        let node = self.nodes.shift_remove(&id);
        self.needs_sorting = true;
        self.mark_modified();
        self.notify(NetworkEvent::DidRemoveProcessor {
            node: id,
            identifier: identifier.clone(),
        });
        tracing::debug!(%identifier, "Removed processor");

        self.unlock();
        node
    }

    /// Remove every processor
    pub fn clear(&mut self) {
        self.lock();
        let ids: Vec<NodeId> = self.nodes.keys().rev().copied().collect();
        for id in ids {
            self.remove_processor(id);
        }
        self.unlock();
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Connect an outport to an inport.
    ///
    /// Connecting an existing pair again succeeds without changing anything.
    pub fn add_connection(
        &mut self,
        outport: OutportRef,
        inport: InportRef,
    ) -> Result<(), NetworkError> {
        let source = self
            .nodes
            .get(&outport.node)
            .ok_or(ConnectionError::NodeNotFound(outport.node))?;
        let target = self
            .nodes
            .get(&inport.node)
            .ok_or(ConnectionError::NodeNotFound(inport.node))?;
        let out = source
            .outports()
            .get(outport.index)
            .ok_or(ConnectionError::PortNotFound {
                node: outport.node,
                index: outport.index,
            })?;
        let inp = target
            .inports()
            .get(inport.index)
            .ok_or(ConnectionError::PortNotFound {
                node: inport.node,
                index: inport.index,
            })?;

        if outport.node == inport.node {
            return Err(ConnectionError::SelfLoop.into());
        }
        if !inp.can_connect_to(out) {
            return Err(ConnectionError::IncompatiblePorts {
                from: out.port_type(),
                to: inp.port_type(),
            }
            .into());
        }

        let connection = Connection::new(outport, inport);
        if self.connections.contains_key(&connection) {
            return Ok(());
        }
        if !inp.is_multi_connect() && self.connections.keys().any(|c| c.inport == inport) {
            return Err(ConnectionError::PortAlreadyConnected(inport).into());
        }

        self.lock();
        self.notify(NetworkEvent::WillAddConnection(connection));
        self.connections
            .insert(connection, ConnectionState { active: false });
        self.needs_sorting = true;
        self.mark_modified();
        self.notify_ends(&connection, true);
        self.notify(NetworkEvent::DidAddConnection(connection));
        tracing::debug!(?connection, "Added connection");

        // A new edge starts inactive; the refresh activates it if the receiver agrees
        self.refresh_connection_activity(inport.node);
        self.invalidate_processor(inport.node, InvalidationLevel::InvalidOutput);
        self.unlock();
        Ok(())
    }

    /// Remove an edge; returns whether it existed
    pub fn remove_connection(&mut self, outport: OutportRef, inport: InportRef) -> bool {
        let connection = Connection::new(outport, inport);
        if !self.connections.contains_key(&connection) {
            return false;
        }

        self.lock();
        self.notify(NetworkEvent::WillRemoveConnection(connection));
        self.connections.shift_remove(&connection);
        self.needs_sorting = true;
        self.mark_modified();
        self.notify_ends(&connection, false);
        self.notify(NetworkEvent::DidRemoveConnection(connection));
        tracing::debug!(?connection, "Removed connection");

        if let Some(receiver) = self.nodes.get_mut(&inport.node) {
            if let Some(port) = receiver.inports.get_mut(inport.index) {
                port.set_changed(true);
            }
            // Positions of the remaining connections into the port may have shifted
            self.refresh_connection_activity(inport.node);
            self.invalidate_processor(inport.node, InvalidationLevel::InvalidOutput);
        }
        self.unlock();
        true
    }

    /// Run the connect or disconnect callback of both endpoint processors
    fn notify_ends(&mut self, connection: &Connection, connected: bool) {
        for (node, end) in ConnectionEnd::of(connection) {
            if let Some(node) = self.nodes.get_mut(&node) {
                node.notify_connection(end, connected);
            }
        }
    }

    /// Re-ask a node which of its incoming connections are active.
    ///
    /// A change marks the order stale. An edge that flipped either way marks
    /// its inport changed and raises the receiver to `InvalidOutput`.
    pub fn refresh_connection_activity(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };

        let mut changes = Vec::new();
        for index in 0..node.inports().len() {
            let inport = InportRef { node: id, index };
            let incoming = self
                .connections
                .iter()
                .filter(|(c, _)| c.inport == inport);
            for (position, (connection, state)) in incoming.enumerate() {
                let active = node.is_connection_active(index, connection.outport, position);
                if active != state.active {
                    changes.push((*connection, active));
                }
            }
        }
        if changes.is_empty() {
            return;
        }

        self.needs_sorting = true;
        for (connection, active) in changes {
            if let Some(state) = self.connections.get_mut(&connection) {
                state.active = active;
            }
            if let Some(port) = self
                .nodes
                .get_mut(&id)
                .and_then(|n| n.inports.get_mut(connection.inport.index))
            {
                port.set_changed(true);
            }
        }
        tracing::debug!(node = %id, "Connection activity changed");
        self.invalidate_processor(id, InvalidationLevel::InvalidOutput);
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Raise a node's validity level and request an evaluation.
    ///
    /// Downstream nodes reached through active connections get their inport
    /// marked changed; their own level is left alone.
    pub fn invalidate_processor(&mut self, id: NodeId, level: InvalidationLevel) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.raise(level);
        let outports: Vec<usize> = (0..node.outports().len()).collect();
        self.mark_downstream_changed(id, &outports);
        self.request_evaluate();
    }

    fn mark_downstream_changed(&mut self, id: NodeId, outports: &[usize]) {
        let receivers: Vec<InportRef> = self
            .active_connections()
            .filter(|c| c.from_node() == id && outports.contains(&c.outport.index))
            .map(|c| c.inport)
            .collect();
        for inport in receivers {
            if let Some(port) = self
                .nodes
                .get_mut(&inport.node)
                .and_then(|n| n.inports.get_mut(inport.index))
            {
                port.set_changed(true);
            }
        }
    }

    // ========================================================================
    // Properties and links
    // ========================================================================

    /// Set a property value, invalidate its processor and push it through links
    pub fn set_property(
        &mut self,
        node: NodeId,
        path: impl Into<PropertyPath>,
        value: PropertyValue,
    ) -> Result<(), NetworkError> {
        let path = path.into();
        let target = self
            .nodes
            .get_mut(&node)
            .ok_or(NetworkError::NodeNotFound(node))?;
        let Some(level) = target.properties.set_value(&path, value)? else {
            return Ok(());
        };
        self.mark_modified();

        self.gate.begin_linking();
        self.property_changed(node, level);
        self.propagate_links(&PropertyRef::new(node, path));
        if self.gate.end_linking() {
            self.drain();
        }
        Ok(())
    }

    fn property_changed(&mut self, node: NodeId, level: InvalidationLevel) {
        self.refresh_connection_activity(node);
        self.invalidate_processor(node, level);
    }

    /// Push the value of `start` along every link reachable from it
    fn propagate_links(&mut self, start: &PropertyRef) {
        for link in self.links.propagation_plan(start) {
            let Some(value) = self.property_value(&link.source).cloned() else {
                continue;
            };
            let Some(target) = self.nodes.get_mut(&link.destination.node) else {
                continue;
            };
            match target.properties.set_value(&link.destination.path, value) {
                Ok(Some(level)) => self.property_changed(link.destination.node, level),
                Ok(None) => {}
                Err(err) => tracing::warn!(destination = %link.destination, "Link not applied: {err}"),
            }
        }
    }

    /// Link two properties; changes to `source` are pushed to `destination`
    pub fn add_link(
        &mut self,
        source: PropertyRef,
        destination: PropertyRef,
    ) -> Result<(), NetworkError> {
        if source == destination {
            return Err(NetworkError::InvalidLink(format!(
                "{source} cannot be linked to itself"
            )));
        }
        let source_kind = self
            .property(source.node, &source.path)
            .filter(|p| p.value().is_some())
            .ok_or_else(|| NetworkError::PropertyNotFound(source.clone()))?
            .kind();
        let destination_kind = self
            .property(destination.node, &destination.path)
            .filter(|p| p.value().is_some())
            .ok_or_else(|| NetworkError::PropertyNotFound(destination.clone()))?
            .kind();
        if source_kind != destination_kind {
            return Err(NetworkError::InvalidLink(format!(
                "{source} ({source_kind:?}) and {destination} ({destination_kind:?}) have different kinds"
            )));
        }

        let link = PropertyLink::new(source, destination);
        if self.links.contains(&link) {
            return Ok(());
        }
        self.lock();
        self.notify(NetworkEvent::WillAddLink(link.clone()));
        self.links.insert(link.clone());
        self.mark_modified();
        self.notify(NetworkEvent::DidAddLink(link.clone()));
        tracing::debug!(source = %link.source, destination = %link.destination, "Added link");
        self.unlock();
        Ok(())
    }

    /// Link two properties in both directions
    pub fn add_bidirectional_link(
        &mut self,
        a: PropertyRef,
        b: PropertyRef,
    ) -> Result<(), NetworkError> {
        self.batch(|network| {
            network.add_link(a.clone(), b.clone())?;
            network.add_link(b, a)
        })
    }

    /// Remove a link; returns whether it existed
    pub fn remove_link(&mut self, link: &PropertyLink) -> bool {
        if !self.links.contains(link) {
            return false;
        }
        self.lock();
        self.notify(NetworkEvent::WillRemoveLink(link.clone()));
        self.links.remove(link);
        self.mark_modified();
        self.notify(NetworkEvent::DidRemoveLink(link.clone()));
        self.unlock();
        true
    }

    /// Link each property of `id` both ways to the first property elsewhere in
    /// the network with the same path and kind.
    ///
    /// The existing property's value is pushed to the new one first. Returns the
    /// properties of `id` that were linked.
    pub fn auto_link_processor(&mut self, id: NodeId) -> Result<Vec<PropertyRef>, NetworkError> {
        let node = self.nodes.get(&id).ok_or(NetworkError::NodeNotFound(id))?;
        let wanted: Vec<(PropertyPath, PropertyKind)> = node
            .properties()
            .leaf_paths()
            .into_iter()
            .filter_map(|path| {
                let kind = node.properties().value(&path)?.kind();
                Some((path, kind))
            })
            .collect();

        let mut pairs = Vec::new();
        for (path, kind) in wanted {
            let candidate = self.nodes.values().find(|other| {
                other.id() != id
                    && other
                        .properties()
                        .value(&path)
                        .is_some_and(|value| value.kind() == kind)
            });
            if let Some(other) = candidate {
                pairs.push((PropertyRef::new(other.id(), &path), PropertyRef::new(id, path)));
            }
        }

        self.batch(|network| {
            for (existing, added) in &pairs {
                network.add_link(existing.clone(), added.clone())?;
                if let Some(value) = network.property_value(existing).cloned() {
                    network.set_property(added.node, &added.path, value)?;
                }
                network.add_link(added.clone(), existing.clone())?;
            }
            Ok::<_, NetworkError>(())
        })?;
        if !pairs.is_empty() {
            tracing::debug!(node = %id, linked = pairs.len(), "Auto-linked processor");
        }
        Ok(pairs.into_iter().map(|(_, added)| added).collect())
    }

    /// All links in insertion order
    pub fn links(&self) -> impl Iterator<Item = &PropertyLink> {
        self.links.iter()
    }

    /// Number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Whether `source` pushes to `destination` directly
    pub fn is_linked(&self, source: &PropertyRef, destination: &PropertyRef) -> bool {
        self.links
            .contains(&PropertyLink::new(source.clone(), destination.clone()))
    }

    /// Whether the two properties are linked both ways
    pub fn is_linked_bidirectional(&self, a: &PropertyRef, b: &PropertyRef) -> bool {
        self.is_linked(a, b) && self.is_linked(b, a)
    }

    /// Every property connected to `property` through links, in either direction
    pub fn properties_linked_to(&self, property: &PropertyRef) -> Vec<PropertyRef> {
        self.links.linked_to(property)
    }

    /// Links touching a property
    pub fn links_of(&self, property: &PropertyRef) -> Vec<PropertyLink> {
        self.links.involving_property(property)
    }

    /// Links running between two nodes, in either direction
    pub fn links_between(&self, a: NodeId, b: NodeId) -> Vec<PropertyLink> {
        self.links
            .iter()
            .filter(|link| {
                (link.source.node == a && link.destination.node == b)
                    || (link.source.node == b && link.destination.node == a)
            })
            .cloned()
            .collect()
    }

    // ========================================================================
    // Sorting
    // ========================================================================

    fn ensure_sorted(&mut self) {
        if !self.needs_sorting {
            return;
        }
        let nodes: Vec<SortNode> = self
            .nodes
            .values()
            .map(|n| SortNode {
                id: n.id(),
                sink: n.processor().is_sink(),
            })
            .collect();
        let edges: Vec<(NodeId, NodeId)> = self
            .active_connections()
            .map(|c| (c.from_node(), c.to_node()))
            .collect();

        self.sorted = topological_sort(&nodes, &edges);
        self.needs_sorting = false;
        tracing::debug!(nodes = self.sorted.order.len(), "Sorted network");

        if self.sorted.has_cycles() {
            tracing::warn!(
                cyclic = self.sorted.cyclic.len(),
                excluded = self.sorted.excluded.len(),
                "Cyclic dependency among active connections"
            );
            self.notify(NetworkEvent::CyclicDependency {
                cyclic: self.sorted.cyclic.clone(),
                excluded: self.sorted.excluded.clone(),
            });
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}
