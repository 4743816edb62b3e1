// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for processor inputs/outputs.
//!
//! Ports never own upstream data. An outport holds the most recently published
//! value as a shared reference and inports read that reference through the
//! network, so a value is never copied on its way downstream.

use crate::node::NodeId;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Data that can flow through ports.
pub trait DataType: Any + Send + Sync + fmt::Debug {
    /// Name used for port type checks in diagnostics and class identifiers
    const NAME: &'static str;
}

impl DataType for f64 {
    const NAME: &'static str = "Float";
}

impl DataType for i64 {
    const NAME: &'static str = "Int";
}

impl DataType for bool {
    const NAME: &'static str = "Bool";
}

impl DataType for String {
    const NAME: &'static str = "String";
}

impl DataType for Vec<f64> {
    const NAME: &'static str = "FloatVector";
}

/// Opaque, shared payload published on an outport
pub type PortData = Arc<dyn Any + Send + Sync>;

/// Data type carried by a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortType {
    name: &'static str,
    type_id: TypeId,
}

impl PortType {
    /// Port type for values of `T`
    pub fn of<T: DataType>() -> Self {
        Self {
            name: T::NAME,
            type_id: TypeId::of::<T>(),
        }
    }

    /// Type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check if this type can connect to another type
    pub fn can_connect_to(&self, other: &PortType) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Address of an outport inside a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutportRef {
    /// Owning processor
    pub node: NodeId,
    /// Position in the processor's outport list
    pub index: usize,
}

/// Address of an inport inside a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InportRef {
    /// Owning processor
    pub node: NodeId,
    /// Position in the processor's inport list
    pub index: usize,
}

/// Typed handle to one of a processor's inports.
///
/// Handles are created while the processor declares its ports, so reading
/// through them never has to recover the type afterwards.
pub struct InportHandle<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> InportHandle<T> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Position in the processor's inport list
    pub fn index(&self) -> usize {
        self.index
    }

    /// Address of this inport on a given processor
    pub fn at(&self, node: NodeId) -> InportRef {
        InportRef {
            node,
            index: self.index,
        }
    }
}

impl<T> Clone for InportHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for InportHandle<T> {}

impl<T> fmt::Debug for InportHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InportHandle").field(&self.index).finish()
    }
}

/// Typed handle to one of a processor's outports
pub struct OutportHandle<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> OutportHandle<T> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Position in the processor's outport list
    pub fn index(&self) -> usize {
        self.index
    }

    /// Address of this outport on a given processor
    pub fn at(&self, node: NodeId) -> OutportRef {
        OutportRef {
            node,
            index: self.index,
        }
    }
}

impl<T> Clone for OutportHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for OutportHandle<T> {}

impl<T> fmt::Debug for OutportHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OutportHandle").field(&self.index).finish()
    }
}

/// An input port on a processor
#[derive(Debug, Clone)]
pub struct Inport {
    name: String,
    port_type: PortType,
    multi_connect: bool,
    optional: bool,
    changed: bool,
}

impl Inport {
    pub(crate) fn new(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
            multi_connect: false,
            optional: false,
            changed: false,
        }
    }

    pub(crate) fn with_multi_connect(mut self) -> Self {
        self.multi_connect = true;
        self
    }

    pub(crate) fn with_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Port name, unique among the processor's ports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data type
    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    /// Whether several outports may feed this inport
    pub fn is_multi_connect(&self) -> bool {
        self.multi_connect
    }

    /// Whether the processor can run while this inport is unconnected
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Whether upstream data changed since the processor last ran
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub(crate) fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Check if an outport may be connected to this inport
    pub fn can_connect_to(&self, outport: &Outport) -> bool {
        outport.port_type.can_connect_to(&self.port_type)
    }
}

/// An output port on a processor
#[derive(Debug, Clone)]
pub struct Outport {
    name: String,
    port_type: PortType,
    data: Option<PortData>,
}

impl Outport {
    pub(crate) fn new(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
            data: None,
        }
    }

    /// Port name, unique among the processor's ports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data type
    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    /// Whether a value has been published
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Shared reference to the published value
    pub fn data(&self) -> Option<&PortData> {
        self.data.as_ref()
    }

    /// Typed shared reference to the published value
    pub fn data_as<T: DataType>(&self) -> Option<Arc<T>> {
        self.data.clone().and_then(|data| data.downcast::<T>().ok())
    }

    /// Replace the published value with a new reference
    pub(crate) fn publish(&mut self, data: PortData) {
        self.data = Some(data);
    }

    pub(crate) fn clear(&mut self) {
        self.data = None;
    }
}
