// SPDX-License-Identifier: MIT OR Apache-2.0
//! Demand-driven dataflow engine.
//!
//! A [`Network`] holds processors connected through typed ports. Changing a
//! property or publishing new data invalidates the affected processors; an
//! evaluation pass re-runs only those, in dependency order, and reports
//! per-node failures instead of stopping.
//!
//! ## Architecture
//!
//! - Processors implement [`Processor`] and declare ports and properties
//!   through a [`NodeBuilder`], which hands back typed port handles
//! - Connections carry an activity flag asked from the receiving processor,
//!   so a selector can ignore inputs it is not listening to
//! - The [`EvaluationGate`] queues evaluation requests while the network is
//!   locked, linking properties or already evaluating
//! - Networks persist to a versioned JSON [`NetworkDocument`]

pub mod builtin;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod gate;
pub mod invalidation;
pub mod link;
pub mod network;
pub mod node;
pub mod persistence;
pub mod port;
pub mod processor;
pub mod property;
pub mod registry;
pub mod sort;

pub use builtin::{PassThrough, Probe, PropertyData, Selector, Source, Sum};
pub use connection::{Connection, ConnectionEnd, ConnectionQuery};
pub use context::{ConfigError, NetworkConfig, NetworkContext};
pub use dispatch::PostHandle;
pub use error::{
    ConnectionError, ErrorHandler, EvaluationFailure, EvaluationPhase, LoggingErrorHandler,
    NetworkError,
};
pub use event::{NetworkEvent, NetworkObserver, ObserverId};
pub use gate::{EvaluationGate, GateState};
pub use invalidation::InvalidationLevel;
pub use link::{PropertyLink, PropertyRef};
pub use network::{EvaluationReport, Network};
pub use node::{Node, NodeBuilder, NodeError, NodeId};
pub use persistence::{
    Deserializer, LoadError, LoadReport, NetworkDocument, SerializationError, Serializer,
    StateMap, DOCUMENT_VERSION,
};
pub use port::{
    DataType, Inport, InportHandle, InportRef, Outport, OutportHandle, OutportRef, PortData,
    PortType,
};
pub use processor::{ProcessContext, Processor, ProcessorError, ReadyContext};
pub use property::{
    Property, PropertyError, PropertyKind, PropertyOwner, PropertyPath, PropertyValue,
};
pub use registry::{ProcessorCategory, ProcessorInfo, ProcessorRegistry};
pub use sort::{topological_sort, SortNode, SortOutcome};
