// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural errors and the per-node failure channel.

use crate::link::PropertyRef;
use crate::node::{NodeError, NodeId};
use crate::port::{InportRef, PortType};
use crate::property::PropertyError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error when creating a connection
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port not found
    #[error("Port {index} not found on node {node}")]
    PortNotFound {
        /// Node that was searched
        node: NodeId,
        /// Requested port index
        index: usize,
    },

    /// Incompatible port types
    #[error("Incompatible port types: {from} -> {to}")]
    IncompatiblePorts {
        /// Outport type
        from: PortType,
        /// Inport type
        to: PortType,
    },

    /// Inport accepts one connection and already has it
    #[error("Port already connected: {0:?}")]
    PortAlreadyConnected(InportRef),

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,
}

/// Error returned by structural network operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    /// Connection rejected
    #[error("Invalid connection: {0}")]
    InvalidConnection(#[from] ConnectionError),

    /// No processor with this ID
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// No property at this address
    #[error("Property not found: {0}")]
    PropertyNotFound(PropertyRef),

    /// Link rejected
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    /// Property update failed
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// Processor declaration failed
    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Stage of a node's evaluation in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluationPhase {
    /// `initialize_resources`
    InitResource,
    /// `on_inport_change`
    PortOnChange,
    /// `process`
    Process,
    /// `do_if_not_ready`
    NotReady,
}

impl fmt::Display for EvaluationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InitResource => "initialize resources",
            Self::PortOnChange => "inport change",
            Self::Process => "process",
            Self::NotReady => "not ready",
        };
        f.write_str(name)
    }
}

/// A failure caught while evaluating one node
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationFailure {
    /// Failing node
    pub node: NodeId,
    /// Its identifier at the time of failure
    pub identifier: String,
    /// Where it failed
    pub phase: EvaluationPhase,
    /// Rendered error
    pub message: String,
}

impl fmt::Display for EvaluationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error in {} ({}): {}",
            self.identifier, self.phase, self.message
        )
    }
}

/// Receives per-node evaluation failures
pub trait ErrorHandler {
    /// Called once per failure; evaluation continues afterwards
    fn handle(&mut self, failure: &EvaluationFailure);
}

impl<F> ErrorHandler for F
where
    F: FnMut(&EvaluationFailure),
{
    fn handle(&mut self, failure: &EvaluationFailure) {
        self(failure);
    }
}

/// Default handler: log and continue
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&mut self, failure: &EvaluationFailure) {
        tracing::error!(
            node = %failure.node,
            identifier = %failure.identifier,
            phase = %failure.phase,
            "{}",
            failure.message
        );
    }
}
