// SPDX-License-Identifier: MIT OR Apache-2.0
//! The contract a processor implements, and the contexts it runs in.

use crate::connection::{ConnectionEnd, ConnectionQuery};
use crate::invalidation::InvalidationLevel;
use crate::node::NodeId;
use crate::persistence::{Deserializer, SerializationError, Serializer};
use crate::port::{DataType, InportHandle, Outport, OutportHandle, PortData};
use crate::property::{PropertyError, PropertyOwner, PropertyPath, PropertyValue};
use std::sync::Arc;

/// Error returned by processor hooks
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// A required input has no data
    #[error("Inport '{0}' has no data")]
    MissingInput(String),

    /// Property access failed
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// The hook panicked
    #[error("Processor panicked: {0}")]
    Panicked(String),

    /// Free-form failure
    #[error("{0}")]
    Message(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProcessorError {
    /// Create a free-form error
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// A computation node.
///
/// Processors only see their own ports and properties, through the context
/// passed to each hook. Every hook except [`Processor::process`] has a
/// default implementation.
pub trait Processor: 'static {
    /// Identifier of the processor class, used by registries and persistence
    fn class_identifier(&self) -> String;

    /// Compute outputs from inputs and properties
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError>;

    /// Whether the processor can run. Defaults to every inport being ready.
    fn is_ready(&self, ctx: &ReadyContext<'_>) -> bool {
        ctx.all_inports_ready()
    }

    /// Called instead of [`Processor::process`] when the processor is not ready
    fn do_if_not_ready(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Rebuild resources after a resource-affecting change
    fn initialize_resources(
        &mut self,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Called for each inport whose upstream data changed since the last run
    fn on_inport_change(
        &mut self,
        _inport: usize,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Whether a connection into one of this processor's inports currently counts
    /// for ordering and invalidation
    fn is_connection_active(&self, _query: &ConnectionQuery<'_>) -> bool {
        true
    }

    /// A connection to one of this processor's ports was added
    fn on_connect(&mut self, _end: ConnectionEnd) {}

    /// A connection to one of this processor's ports was removed
    fn on_disconnect(&mut self, _end: ConnectionEnd) {}

    /// Explicit root of demand, sorted even when its outputs feed other processors
    fn is_sink(&self) -> bool {
        false
    }

    /// Write processor state that is not held in properties
    fn serialize(&self, _s: &mut dyn Serializer) -> Result<(), SerializationError> {
        Ok(())
    }

    /// Restore processor state written by [`Processor::serialize`]
    fn deserialize(&mut self, _d: &dyn Deserializer) -> Result<(), SerializationError> {
        Ok(())
    }
}

/// State of one inport gathered right before a processor runs
#[derive(Debug, Clone, Default)]
pub(crate) struct InputSnapshot {
    pub(crate) name: String,
    pub(crate) optional: bool,
    pub(crate) changed: bool,
    /// One entry per active upstream connection, in connection order
    pub(crate) sources: Vec<Option<PortData>>,
}

impl InputSnapshot {
    fn is_connected(&self) -> bool {
        !self.sources.is_empty()
    }

    fn has_data(&self) -> bool {
        self.is_connected() && self.sources.iter().all(Option::is_some)
    }

    fn is_ready(&self) -> bool {
        (self.optional && !self.is_connected()) || self.has_data()
    }

    fn first<T: DataType>(&self) -> Option<Arc<T>> {
        self.sources
            .iter()
            .flatten()
            .find_map(|data| data.clone().downcast::<T>().ok())
    }

    fn all<T: DataType>(&self) -> Vec<Arc<T>> {
        self.sources
            .iter()
            .flatten()
            .filter_map(|data| data.clone().downcast::<T>().ok())
            .collect()
    }
}

/// Requests a processor made while it was running, applied by the network afterwards
#[derive(Debug, Default)]
pub(crate) struct SideEffects {
    pub(crate) published: Vec<usize>,
    pub(crate) modified: Vec<PropertyPath>,
    pub(crate) invalidation: Option<InvalidationLevel>,
}

impl SideEffects {
    fn invalidate(&mut self, level: InvalidationLevel) {
        let current = self.invalidation.unwrap_or_default();
        self.invalidation = Some(current.raised(level));
    }
}

/// Read-only view used to decide readiness
pub struct ReadyContext<'a> {
    inputs: &'a [InputSnapshot],
    properties: &'a PropertyOwner,
}

impl<'a> ReadyContext<'a> {
    pub(crate) fn new(inputs: &'a [InputSnapshot], properties: &'a PropertyOwner) -> Self {
        Self { inputs, properties }
    }

    /// Every inport is either optional and unconnected, or has data on all active sources
    pub fn all_inports_ready(&self) -> bool {
        self.inputs.iter().all(InputSnapshot::is_ready)
    }

    /// Whether the inport has at least one active connection
    pub fn is_connected<T>(&self, port: InportHandle<T>) -> bool {
        self.inputs
            .get(port.index())
            .is_some_and(InputSnapshot::is_connected)
    }

    /// Whether every active source of the inport has published data
    pub fn has_data<T>(&self, port: InportHandle<T>) -> bool {
        self.inputs
            .get(port.index())
            .is_some_and(InputSnapshot::has_data)
    }

    /// Processor properties
    pub fn properties(&self) -> &PropertyOwner {
        self.properties
    }
}

/// Mutable view handed to processor hooks
pub struct ProcessContext<'a> {
    node: NodeId,
    identifier: &'a str,
    inputs: &'a [InputSnapshot],
    outports: &'a mut [Outport],
    properties: &'a mut PropertyOwner,
    effects: &'a mut SideEffects,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        node: NodeId,
        identifier: &'a str,
        inputs: &'a [InputSnapshot],
        outports: &'a mut [Outport],
        properties: &'a mut PropertyOwner,
        effects: &'a mut SideEffects,
    ) -> Self {
        Self {
            node,
            identifier,
            inputs,
            outports,
            properties,
            effects,
        }
    }

    /// Id of the running processor
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Identifier of the running processor
    pub fn identifier(&self) -> &str {
        self.identifier
    }

    /// Value from the first active source of an inport
    pub fn input<T: DataType>(&self, port: InportHandle<T>) -> Option<Arc<T>> {
        self.inputs.get(port.index()).and_then(InputSnapshot::first::<T>)
    }

    /// Like [`ProcessContext::input`], failing with [`ProcessorError::MissingInput`]
    pub fn require_input<T: DataType>(
        &self,
        port: InportHandle<T>,
    ) -> Result<Arc<T>, ProcessorError> {
        self.input(port).ok_or_else(|| {
            let name = self
                .inputs
                .get(port.index())
                .map(|input| input.name.clone())
                .unwrap_or_default();
            ProcessorError::MissingInput(name)
        })
    }

    /// Values from every active source of a multi-inport, in connection order
    pub fn inputs<T: DataType>(&self, port: InportHandle<T>) -> Vec<Arc<T>> {
        self.inputs
            .get(port.index())
            .map(InputSnapshot::all::<T>)
            .unwrap_or_default()
    }

    /// Whether the inport has at least one active connection
    pub fn is_connected<T>(&self, port: InportHandle<T>) -> bool {
        self.inputs
            .get(port.index())
            .is_some_and(InputSnapshot::is_connected)
    }

    /// Whether upstream data changed since the processor last ran
    pub fn is_changed<T>(&self, port: InportHandle<T>) -> bool {
        self.inputs.get(port.index()).is_some_and(|input| input.changed)
    }

    /// Publish a new value. Downstream readers keep any reference they hold to the old one.
    pub fn set_output<T: DataType>(&mut self, port: OutportHandle<T>, value: impl Into<Arc<T>>) {
        let value: Arc<T> = value.into();
        if let Some(outport) = self.outports.get_mut(port.index()) {
            outport.publish(value);
            self.effects.published.push(port.index());
        }
    }

    /// Forward a shared value without copying it
    pub fn forward<T: DataType>(&mut self, port: OutportHandle<T>, value: Arc<T>) {
        self.set_output(port, value);
    }

    /// Remove the published value
    pub fn clear_output<T>(&mut self, port: OutportHandle<T>) {
        if let Some(outport) = self.outports.get_mut(port.index()) {
            outport.clear();
            self.effects.published.push(port.index());
        }
    }

    /// Processor properties
    pub fn properties(&self) -> &PropertyOwner {
        &*self.properties
    }

    /// Value of a leaf property
    pub fn property(&self, path: impl Into<PropertyPath>) -> Option<&PropertyValue> {
        self.properties.value(&path.into())
    }

    /// Float property value
    pub fn float(&self, path: impl Into<PropertyPath>) -> Option<f64> {
        self.property(path).and_then(PropertyValue::as_float)
    }

    /// Integer property value
    pub fn int(&self, path: impl Into<PropertyPath>) -> Option<i64> {
        self.property(path).and_then(PropertyValue::as_int)
    }

    /// Set one of the processor's own properties.
    ///
    /// The change invalidates this processor, so it is not marked valid at the
    /// end of the current run; links are propagated once the hook returns.
    pub fn set_property(
        &mut self,
        path: impl Into<PropertyPath>,
        value: PropertyValue,
    ) -> Result<(), PropertyError> {
        let path = path.into();
        if let Some(level) = self.properties.set_value(&path, value)? {
            self.effects.invalidate(level);
            self.effects.modified.push(path);
        }
        Ok(())
    }

    /// Ask for another run of this processor
    pub fn invalidate(&mut self, level: InvalidationLevel) {
        self.effects.invalidate(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortType;

    fn snapshot(optional: bool, sources: Vec<Option<PortData>>) -> InputSnapshot {
        InputSnapshot {
            name: "in".to_string(),
            optional,
            changed: false,
            sources,
        }
    }

    #[test]
    fn test_readiness_rules() {
        let data: PortData = Arc::new(1.0_f64);
        let properties = PropertyOwner::new();

        let inputs = [snapshot(true, vec![]), snapshot(false, vec![Some(data.clone())])];
        assert!(ReadyContext::new(&inputs, &properties).all_inports_ready());

        let inputs = [snapshot(false, vec![])];
        assert!(!ReadyContext::new(&inputs, &properties).all_inports_ready());

        let inputs = [snapshot(true, vec![Some(data), None])];
        assert!(!ReadyContext::new(&inputs, &properties).all_inports_ready());
    }

    #[test]
    fn test_outputs_are_recorded() {
        let data: PortData = Arc::new(2.0_f64);
        let inputs = [snapshot(false, vec![Some(data)])];
        let mut outports = vec![Outport::new("out", PortType::of::<f64>())];
        let mut properties = PropertyOwner::new();
        let mut effects = SideEffects::default();
        let node = NodeId::new();

        let mut ctx = ProcessContext::new(
            node,
            "p",
            &inputs,
            &mut outports,
            &mut properties,
            &mut effects,
        );
        let value = ctx.input(InportHandle::<f64>::new(0)).unwrap();
        assert_eq!(*value, 2.0);
        assert!(ctx.input(InportHandle::<i64>::new(0)).is_none());
        ctx.set_output(OutportHandle::<f64>::new(0), *value * 2.0);

        assert_eq!(effects.published, vec![0]);
        assert_eq!(*outports[0].data_as::<f64>().unwrap(), 4.0);
    }

    #[test]
    fn test_missing_input_error_names_port() {
        let inputs = [snapshot(false, vec![])];
        let mut outports = Vec::new();
        let mut properties = PropertyOwner::new();
        let mut effects = SideEffects::default();
        let ctx = ProcessContext::new(
            NodeId::new(),
            "p",
            &inputs,
            &mut outports,
            &mut properties,
            &mut effects,
        );
        let err = ctx.require_input(InportHandle::<f64>::new(0)).unwrap_err();
        assert!(matches!(err, ProcessorError::MissingInput(name) if name == "in"));
    }
}
