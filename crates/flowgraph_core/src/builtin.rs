// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generic processors shipped with the engine.
//!
//! Each one is written once over a data type and registered for every
//! [`PropertyData`] type, so `Source<f64>` and `Source<String>` share code.

use crate::connection::ConnectionQuery;
use crate::node::{Node, NodeError};
use crate::persistence::{Deserializer, SerializationError, Serializer};
use crate::port::{DataType, InportHandle, OutportHandle};
use crate::processor::{ProcessContext, Processor, ProcessorError, ReadyContext};
use crate::property::{Property, PropertyValue};
use crate::registry::{ProcessorCategory, ProcessorInfo, ProcessorRegistry};

/// Port data that can also be stored in a property
pub trait PropertyData: DataType + Clone + Default {
    /// Wrap as a property value
    fn to_property(&self) -> PropertyValue;

    /// Unwrap a property value of the matching kind
    fn from_property(value: &PropertyValue) -> Option<Self>;
}

impl PropertyData for f64 {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::Float(*self)
    }

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_float()
    }
}

impl PropertyData for i64 {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::Int(*self)
    }

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_int()
    }
}

impl PropertyData for bool {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::Bool(*self)
    }

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_bool()
    }
}

impl PropertyData for String {
    fn to_property(&self) -> PropertyValue {
        PropertyValue::String(self.clone())
    }

    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

fn class_name<T: DataType>(kind: &str) -> String {
    format!("flowgraph.{kind}.{}", T::NAME)
}

// ============================================================================
// Source
// ============================================================================

/// Publishes the value of its `value` property
pub struct Source<T> {
    out: OutportHandle<T>,
}

impl<T: PropertyData> Source<T> {
    /// Build a source node holding `value`
    pub fn node(identifier: &str, value: T) -> Result<Node, NodeError> {
        Node::build(identifier, |b| {
            b.property(Property::new("value", value.to_property()));
            Self {
                out: b.outport("out"),
            }
        })
    }
}

impl<T: PropertyData> Processor for Source<T> {
    fn class_identifier(&self) -> String {
        class_name::<T>("Source")
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let value = ctx
            .property("value")
            .and_then(T::from_property)
            .ok_or_else(|| ProcessorError::msg("value property missing"))?;
        ctx.set_output(self.out, value);
        Ok(())
    }
}

// ============================================================================
// PassThrough
// ============================================================================

/// Forwards its input without copying it
pub struct PassThrough<T> {
    input: InportHandle<T>,
    out: OutportHandle<T>,
}

impl<T: DataType> PassThrough<T> {
    /// Build a pass-through node
    pub fn node(identifier: &str) -> Result<Node, NodeError> {
        Node::build(identifier, |b| Self {
            input: b.inport("in"),
            out: b.outport("out"),
        })
    }
}

impl<T: DataType> Processor for PassThrough<T> {
    fn class_identifier(&self) -> String {
        class_name::<T>("PassThrough")
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let value = ctx.require_input(self.input)?;
        ctx.forward(self.out, value);
        Ok(())
    }
}

// ============================================================================
// Selector
// ============================================================================

/// Forwards one of several wired inputs, chosen by the `selected` property.
///
/// Only the connection at the selected position is active, so unselected
/// upstream branches neither order nor invalidate this node.
pub struct Selector<T> {
    inputs: InportHandle<T>,
    out: OutportHandle<T>,
}

impl<T: DataType> Selector<T> {
    /// Build a selector listening to connection `selected`
    pub fn node(identifier: &str, selected: i64) -> Result<Node, NodeError> {
        Node::build(identifier, |b| {
            b.property(Property::int("selected", selected));
            Self {
                inputs: b.multi_inport("inputs"),
                out: b.outport("out"),
            }
        })
    }
}

impl<T: DataType> Processor for Selector<T> {
    fn class_identifier(&self) -> String {
        class_name::<T>("Selector")
    }

    fn is_connection_active(&self, query: &ConnectionQuery<'_>) -> bool {
        if query.inport != self.inputs.index() {
            return true;
        }
        let selected = query
            .properties
            .value(&"selected".into())
            .and_then(PropertyValue::as_int);
        selected == i64::try_from(query.position).ok()
    }

    fn do_if_not_ready(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        ctx.clear_output(self.out);
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        match ctx.inputs(self.inputs).into_iter().next() {
            Some(value) => ctx.forward(self.out, value),
            None => ctx.clear_output(self.out),
        }
        Ok(())
    }
}

// ============================================================================
// Probe
// ============================================================================

/// Sink that logs every value it receives and forwards it
pub struct Probe<T> {
    input: InportHandle<T>,
    out: OutportHandle<T>,
    received: u64,
}

impl<T: DataType> Probe<T> {
    /// Build a probe node
    pub fn node(identifier: &str) -> Result<Node, NodeError> {
        Node::build(identifier, |b| Self {
            input: b.inport("in"),
            out: b.outport("out"),
            received: 0,
        })
    }
}

impl<T: DataType> Processor for Probe<T> {
    fn class_identifier(&self) -> String {
        class_name::<T>("Probe")
    }

    fn is_sink(&self) -> bool {
        true
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let value = ctx.require_input(self.input)?;
        self.received += 1;
        tracing::info!(
            probe = ctx.identifier(),
            received = self.received,
            value = ?value,
            "Probe received value"
        );
        ctx.forward(self.out, value);
        Ok(())
    }

    fn serialize(&self, s: &mut dyn Serializer) -> Result<(), SerializationError> {
        s.write("received", &self.received)
    }

    fn deserialize(&mut self, d: &dyn Deserializer) -> Result<(), SerializationError> {
        if let Some(received) = d.read("received")? {
            self.received = received;
        }
        Ok(())
    }
}

// ============================================================================
// Sum
// ============================================================================

/// Adds every connected float; zero when nothing is connected
pub struct Sum {
    terms: InportHandle<f64>,
    out: OutportHandle<f64>,
}

impl Sum {
    /// Class identifier
    pub const CLASS_IDENTIFIER: &'static str = "flowgraph.Sum";

    /// Build a sum node
    pub fn node(identifier: &str) -> Result<Node, NodeError> {
        Node::build(identifier, |b| Self {
            terms: b.multi_inport("terms"),
            out: b.outport("sum"),
        })
    }
}

impl Processor for Sum {
    fn class_identifier(&self) -> String {
        Self::CLASS_IDENTIFIER.to_string()
    }

    fn is_ready(&self, ctx: &ReadyContext<'_>) -> bool {
        !ctx.is_connected(self.terms) || ctx.has_data(self.terms)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let total: f64 = ctx.inputs(self.terms).iter().map(|term| **term).sum();
        ctx.set_output(self.out, total);
        Ok(())
    }
}

// ============================================================================
// Registration
// ============================================================================

fn register_typed<T: PropertyData>(registry: &mut ProcessorRegistry) {
    registry.register(
        ProcessorInfo::new(
            class_name::<T>("Source"),
            format!("{} Source", T::NAME),
            ProcessorCategory::Source,
            |id| Source::<T>::node(id, T::default()),
        )
        .with_description("Publishes its value property"),
    );
    registry.register(
        ProcessorInfo::new(
            class_name::<T>("PassThrough"),
            format!("{} Pass Through", T::NAME),
            ProcessorCategory::Flow,
            PassThrough::<T>::node,
        )
        .with_description("Forwards its input unchanged"),
    );
    registry.register(
        ProcessorInfo::new(
            class_name::<T>("Selector"),
            format!("{} Selector", T::NAME),
            ProcessorCategory::Flow,
            |id| Selector::<T>::node(id, 0),
        )
        .with_description("Forwards the selected input"),
    );
    registry.register(
        ProcessorInfo::new(
            class_name::<T>("Probe"),
            format!("{} Probe", T::NAME),
            ProcessorCategory::Sink,
            Probe::<T>::node,
        )
        .with_description("Logs received values"),
    );
}

/// Register every builtin processor class
pub fn register_builtins(registry: &mut ProcessorRegistry) {
    register_typed::<f64>(registry);
    register_typed::<i64>(registry);
    register_typed::<bool>(registry);
    register_typed::<String>(registry);
    registry.register(
        ProcessorInfo::new(
            Sum::CLASS_IDENTIFIER,
            "Sum",
            ProcessorCategory::Math,
            Sum::node,
        )
        .with_description("Adds all connected floats"),
    );
}
