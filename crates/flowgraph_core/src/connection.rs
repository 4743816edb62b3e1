// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the network.

use crate::node::NodeId;
use crate::port::{InportRef, OutportRef};
use crate::property::PropertyOwner;

/// A directed edge from an outport to an inport.
///
/// A connection is identified by its endpoint pair, so a network never holds
/// the same pair twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Source port
    pub outport: OutportRef,
    /// Target port
    pub inport: InportRef,
}

impl Connection {
    /// Create a new connection
    pub fn new(outport: OutportRef, inport: InportRef) -> Self {
        Self { outport, inport }
    }

    /// Source node ID
    pub fn from_node(&self) -> NodeId {
        self.outport.node
    }

    /// Target node ID
    pub fn to_node(&self) -> NodeId {
        self.inport.node
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from_node() == node_id || self.to_node() == node_id
    }
}

/// One end of a connection, as seen by the processor owning that port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Outport `port` of this processor feeds `peer`
    Outport {
        /// Outport index
        port: usize,
        /// Receiving inport
        peer: InportRef,
    },
    /// Inport `port` of this processor is fed by `peer`
    Inport {
        /// Inport index
        port: usize,
        /// Feeding outport
        peer: OutportRef,
    },
}

impl ConnectionEnd {
    /// The two ends of `connection`, outport side first
    pub fn of(connection: &Connection) -> [(NodeId, Self); 2] {
        [
            (
                connection.from_node(),
                Self::Outport {
                    port: connection.outport.index,
                    peer: connection.inport,
                },
            ),
            (
                connection.to_node(),
                Self::Inport {
                    port: connection.inport.index,
                    peer: connection.outport,
                },
            ),
        ]
    }

    /// Index of the local port
    pub fn port(&self) -> usize {
        match self {
            Self::Outport { port, .. } | Self::Inport { port, .. } => *port,
        }
    }
}

/// Runtime state kept next to each connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnectionState {
    /// Result of the receiving processor's activity predicate at the last refresh
    pub(crate) active: bool,
}

/// Question put to a receiving processor: is this connection live right now?
#[derive(Debug)]
pub struct ConnectionQuery<'a> {
    /// Inport index on the receiving processor
    pub inport: usize,
    /// Upstream outport
    pub source: OutportRef,
    /// Position of this connection among all connections into the inport
    pub position: usize,
    /// Properties of the receiving processor
    pub properties: &'a PropertyOwner,
}
