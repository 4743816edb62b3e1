// SPDX-License-Identifier: MIT OR Apache-2.0
//! Processor instances as stored in a network.

use crate::connection::{ConnectionEnd, ConnectionQuery};
use crate::invalidation::InvalidationLevel;
use crate::port::{
    DataType, Inport, InportHandle, InportRef, Outport, OutportHandle, OutportRef, PortType,
};
use crate::processor::{
    InputSnapshot, ProcessContext, Processor, ProcessorError, ReadyContext, SideEffects,
};
use crate::property::{Property, PropertyError, PropertyOwner};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error while declaring a processor's ports and properties
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    /// Two ports share a name
    #[error("Port identifier already exists: {0}")]
    DuplicatePort(String),

    /// Property declaration failed
    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// Collects the ports and properties a processor declares
#[derive(Debug, Default)]
pub struct NodeBuilder {
    inports: Vec<Inport>,
    outports: Vec<Outport>,
    properties: PropertyOwner,
    error: Option<NodeError>,
}

impl NodeBuilder {
    fn check_name(&mut self, name: &str) {
        let taken = self.inports.iter().any(|p| p.name() == name)
            || self.outports.iter().any(|p| p.name() == name);
        if taken && self.error.is_none() {
            self.error = Some(NodeError::DuplicatePort(name.to_owned()));
        }
    }

    fn push_inport<T>(&mut self, inport: Inport) -> InportHandle<T> {
        self.check_name(inport.name());
        self.inports.push(inport);
        InportHandle::new(self.inports.len() - 1)
    }

    /// Declare an inport accepting a single connection
    pub fn inport<T: DataType>(&mut self, name: &str) -> InportHandle<T> {
        self.push_inport(Inport::new(name, PortType::of::<T>()))
    }

    /// Declare an inport that does not block readiness while unconnected
    pub fn optional_inport<T: DataType>(&mut self, name: &str) -> InportHandle<T> {
        self.push_inport(Inport::new(name, PortType::of::<T>()).with_optional())
    }

    /// Declare an inport accepting any number of connections
    pub fn multi_inport<T: DataType>(&mut self, name: &str) -> InportHandle<T> {
        self.push_inport(Inport::new(name, PortType::of::<T>()).with_multi_connect())
    }

    /// Declare an outport
    pub fn outport<T: DataType>(&mut self, name: &str) -> OutportHandle<T> {
        self.check_name(name);
        self.outports.push(Outport::new(name, PortType::of::<T>()));
        OutportHandle::new(self.outports.len() - 1)
    }

    /// Add a property to the processor's root
    pub fn property(&mut self, property: Property) {
        if let Err(err) = self.properties.add_property(property) {
            self.error.get_or_insert(NodeError::Property(err));
        }
    }
}

/// A processor instance together with the state the network tracks for it
pub struct Node {
    id: NodeId,
    identifier: String,
    processor: Box<dyn Processor>,
    pub(crate) inports: Vec<Inport>,
    pub(crate) outports: Vec<Outport>,
    pub(crate) properties: PropertyOwner,
    level: InvalidationLevel,
    ready: bool,
}

impl Node {
    /// Build a node: `build` declares ports and properties and returns the processor
    pub fn build<P: Processor>(
        identifier: impl Into<String>,
        build: impl FnOnce(&mut NodeBuilder) -> P,
    ) -> Result<Self, NodeError> {
        let mut builder = NodeBuilder::default();
        let processor = build(&mut builder);
        if let Some(err) = builder.error {
            return Err(err);
        }
        Ok(Self {
            id: NodeId::new(),
            identifier: identifier.into(),
            processor: Box::new(processor),
            inports: builder.inports,
            outports: builder.outports,
            properties: builder.properties,
            level: InvalidationLevel::InvalidResources,
            ready: false,
        })
    }

    /// Unique instance ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Identifier, unique within a network
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn set_identifier(&mut self, identifier: String) {
        self.identifier = identifier;
    }

    /// Class identifier of the processor
    pub fn class_identifier(&self) -> String {
        self.processor.class_identifier()
    }

    /// The processor
    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }

    pub(crate) fn processor_mut(&mut self) -> &mut dyn Processor {
        self.processor.as_mut()
    }

    /// Input ports, in declaration order
    pub fn inports(&self) -> &[Inport] {
        &self.inports
    }

    /// Output ports, in declaration order
    pub fn outports(&self) -> &[Outport] {
        &self.outports
    }

    /// Address of the inport called `name`
    pub fn inport_ref(&self, name: &str) -> Option<InportRef> {
        self.inports
            .iter()
            .position(|p| p.name() == name)
            .map(|index| InportRef { node: self.id, index })
    }

    /// Address of the outport called `name`
    pub fn outport_ref(&self, name: &str) -> Option<OutportRef> {
        self.outports
            .iter()
            .position(|p| p.name() == name)
            .map(|index| OutportRef { node: self.id, index })
    }

    /// Property tree
    pub fn properties(&self) -> &PropertyOwner {
        &self.properties
    }

    /// Current validity level
    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.level
    }

    /// Whether nothing is stale
    pub fn is_valid(&self) -> bool {
        self.level.is_valid()
    }

    /// Readiness as of the last evaluation pass that reached this node
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Raise the validity level; returns whether it changed
    pub(crate) fn raise(&mut self, level: InvalidationLevel) -> bool {
        let raised = self.level.raised(level);
        let changed = raised != self.level;
        self.level = raised;
        changed
    }

    pub(crate) fn lower_to(&mut self, level: InvalidationLevel) {
        self.level = self.level.min(level);
    }

    /// Ask the processor whether a connection into one of its inports is active
    pub(crate) fn is_connection_active(
        &self,
        inport: usize,
        source: OutportRef,
        position: usize,
    ) -> bool {
        self.processor.is_connection_active(&ConnectionQuery {
            inport,
            source,
            position,
            properties: &self.properties,
        })
    }

    pub(crate) fn check_ready(&self, inputs: &[InputSnapshot]) -> bool {
        self.processor
            .is_ready(&ReadyContext::new(inputs, &self.properties))
    }

    /// Run one processor hook with a fresh context.
    ///
    /// With `catch_panics`, a panic inside the hook is returned as
    /// [`ProcessorError::Panicked`] and the node is left as the hook left it.
    pub(crate) fn run_hook(
        &mut self,
        inputs: &[InputSnapshot],
        effects: &mut SideEffects,
        catch_panics: bool,
        hook: impl FnOnce(&mut dyn Processor, &mut ProcessContext<'_>) -> Result<(), ProcessorError>,
    ) -> Result<(), ProcessorError> {
        let mut ctx = ProcessContext::new(
            self.id,
            &self.identifier,
            inputs,
            &mut self.outports,
            &mut self.properties,
            effects,
        );
        let processor = self.processor.as_mut();
        if !catch_panics {
            return hook(processor, &mut ctx);
        }
        std::panic::catch_unwind(AssertUnwindSafe(|| hook(processor, &mut ctx)))
            .unwrap_or_else(|payload| Err(ProcessorError::Panicked(panic_message(payload.as_ref()))))
    }

    /// Tell the processor a connection to one of its ports came or went.
    /// A panic in the callback is logged and otherwise ignored.
    pub(crate) fn notify_connection(&mut self, end: ConnectionEnd, connected: bool) {
        let processor = self.processor.as_mut();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            if connected {
                processor.on_connect(end);
            } else {
                processor.on_disconnect(end);
            }
        }));
        if let Err(payload) = outcome {
            tracing::warn!(
                identifier = %self.identifier,
                "Connection callback panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    /// Mark everything up to date; only the evaluator calls this after a successful run
    pub(crate) fn set_valid(&mut self) {
        self.level = InvalidationLevel::Valid;
        for inport in &mut self.inports {
            inport.set_changed(false);
        }
        self.properties.clear_modified();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("class", &self.processor.class_identifier())
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}
