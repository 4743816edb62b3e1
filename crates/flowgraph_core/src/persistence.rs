// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistence boundary.
//!
//! Processors read and write their private state through the abstract
//! [`Serializer`] / [`Deserializer`] pair; the network turns itself into a
//! versioned [`NetworkDocument`] stored as JSON.

use crate::node::{NodeError, NodeId};
use crate::property::PropertyValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current document format version
pub const DOCUMENT_VERSION: u32 = 1;

/// Error converting processor state
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// Value could not be converted
    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A required key is absent
    #[error("Missing key: {0}")]
    MissingKey(String),

    /// The stored state is inconsistent
    #[error("Invalid state: {0}")]
    Invalid(String),
}

/// Key/value sink for processor state
pub trait Serializer {
    /// Store a value under `key`, replacing any previous one
    fn insert(&mut self, key: &str, value: Value);
}

/// Key/value source for processor state
pub trait Deserializer {
    /// Value stored under `key`
    fn get(&self, key: &str) -> Option<&Value>;
}

impl dyn Serializer + '_ {
    /// Serialize `value` under `key`
    pub fn write<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
    ) -> Result<(), SerializationError> {
        let value = serde_json::to_value(value)?;
        self.insert(key, value);
        Ok(())
    }
}

impl dyn Deserializer + '_ {
    /// Deserialize the value under `key`, if present
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SerializationError> {
        self.get(key)
            .map(|value| T::deserialize(value).map_err(SerializationError::from))
            .transpose()
    }

    /// Deserialize the value under `key`, failing if it is absent
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, SerializationError> {
        self.read(key)?
            .ok_or_else(|| SerializationError::MissingKey(key.to_owned()))
    }
}

/// JSON object holding one processor's state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMap(Map<String, Value>);

impl StateMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serializer for StateMap {
    fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_owned(), value);
    }
}

impl Deserializer for StateMap {
    fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// One processor in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorEntry {
    /// Class identifier used to look up the constructor
    pub class: String,
    /// Identifier within the network
    pub identifier: String,
    /// Leaf property values by dotted path
    #[serde(default)]
    pub properties: Vec<PropertyEntry>,
    /// Processor state written through [`Serializer`]
    #[serde(default, skip_serializing_if = "StateMap::is_empty")]
    pub state: StateMap,
}

/// One stored property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    /// Dotted path
    pub path: String,
    /// Value
    pub value: PropertyValue,
}

/// One stored connection; ports are written as `"<processor>/<port>"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    /// Outport address
    pub from: String,
    /// Inport address
    pub to: String,
}

/// Property address inside a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyAddress {
    /// Processor identifier
    pub processor: String,
    /// Dotted property path
    pub property: String,
}

/// One stored link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    /// Property whose changes are propagated
    pub source: PropertyAddress,
    /// Property receiving the value
    pub destination: PropertyAddress,
}

/// Versioned description of a whole network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDocument {
    /// Format version
    pub version: u32,
    /// Processors in insertion order
    #[serde(default)]
    pub processors: Vec<ProcessorEntry>,
    /// Connections in insertion order
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
    /// Property links
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

impl Default for NetworkDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            processors: Vec::new(),
            connections: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl NetworkDocument {
    /// Parse a JSON document
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Split `"<processor>/<port>"` at the last slash
pub(crate) fn split_port_address(address: &str) -> Option<(&str, &str)> {
    address
        .rsplit_once('/')
        .filter(|(processor, port)| !processor.is_empty() && !port.is_empty())
}

/// Load failure that aborts the whole load
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Not a valid document
    #[error("Malformed network document: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document was written by a newer format
    #[error("Unsupported document version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version in the document
        found: u32,
        /// Highest version this build reads
        supported: u32,
    },

    /// Processor state could not be restored
    #[error("Failed to restore state of '{identifier}': {source}")]
    State {
        /// Processor identifier in the document
        identifier: String,
        /// Cause
        #[source]
        source: SerializationError,
    },

    /// A registered constructor failed
    #[error("Failed to construct '{identifier}': {source}")]
    Construct {
        /// Processor identifier in the document
        identifier: String,
        /// Cause
        #[source]
        source: NodeError,
    },
}

/// Outcome of a successful load
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Processors added, in document order
    pub added: Vec<NodeId>,
    /// Elements that were skipped
    pub warnings: Vec<String>,
}

impl LoadReport {
    pub(crate) fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}
