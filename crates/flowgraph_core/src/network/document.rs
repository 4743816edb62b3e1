// SPDX-License-Identifier: MIT OR Apache-2.0
//! Saving a network to a [`NetworkDocument`] and loading it back.

use super::Network;
use crate::link::PropertyRef;
use crate::node::NodeId;
use crate::persistence::{
    split_port_address, ConnectionEntry, LinkEntry, LoadError, LoadReport, NetworkDocument,
    ProcessorEntry, PropertyAddress, PropertyEntry, SerializationError, StateMap,
    DOCUMENT_VERSION,
};
use crate::port::{InportRef, OutportRef};
use crate::property::PropertyPath;
use crate::registry::ProcessorRegistry;
use std::collections::HashMap;

impl Network {
    /// Describe the network as a document
    pub fn to_document(&self) -> Result<NetworkDocument, SerializationError> {
        let mut doc = NetworkDocument::default();

        for node in self.nodes.values() {
            let mut state = StateMap::new();
            node.processor().serialize(&mut state)?;
            let properties = node
                .properties()
                .leaf_paths()
                .into_iter()
                .filter_map(|path| {
                    let value = node.properties().value(&path)?.clone();
                    Some(PropertyEntry {
                        path: path.to_string(),
                        value,
                    })
                })
                .collect();
            doc.processors.push(ProcessorEntry {
                class: node.class_identifier(),
                identifier: node.identifier().to_owned(),
                properties,
                state,
            });
        }

        for connection in self.connections.keys() {
            let (Some(from), Some(to)) = (
                self.outport_address(connection.outport),
                self.inport_address(connection.inport),
            ) else {
                continue;
            };
            doc.connections.push(ConnectionEntry { from, to });
        }

        for link in self.links.iter() {
            let (Some(source), Some(destination)) = (
                self.property_address(&link.source),
                self.property_address(&link.destination),
            ) else {
                continue;
            };
            doc.links.push(LinkEntry {
                source,
                destination,
            });
        }

        Ok(doc)
    }

    /// Render the network as pretty JSON
    pub fn to_json(&self) -> Result<String, SerializationError> {
        self.to_document()?.to_json()
    }

    /// Parse a JSON document and add its contents; see [`Network::load_document`]
    pub fn load_json(
        &mut self,
        text: &str,
        registry: &ProcessorRegistry,
    ) -> Result<LoadReport, LoadError> {
        let doc = NetworkDocument::from_json(text)?;
        self.load_document(doc, registry)
    }

    /// Add the contents of a document to this network.
    ///
    /// Unknown classes and unresolvable connections or links are skipped and
    /// recorded as warnings. An unsupported version or processor state that
    /// cannot be restored aborts the load and removes whatever it had added.
    /// The whole load runs under one lock, so it causes a single evaluation.
    pub fn load_document(
        &mut self,
        doc: NetworkDocument,
        registry: &ProcessorRegistry,
    ) -> Result<LoadReport, LoadError> {
        if doc.version > DOCUMENT_VERSION || doc.version == 0 {
            return Err(LoadError::UnsupportedVersion {
                found: doc.version,
                supported: DOCUMENT_VERSION,
            });
        }

        self.lock();
        let mut report = LoadReport::default();
        let result = self.load_locked(doc, registry, &mut report);
        if result.is_err() {
            for id in report.added.iter().rev() {
                self.remove_processor(*id);
            }
        }
        self.unlock();

        match result {
            Ok(()) => {
                tracing::info!(
                    processors = report.added.len(),
                    warnings = report.warnings.len(),
                    "Loaded network"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::error!("Network load aborted: {err}");
                Err(err)
            }
        }
    }

    fn load_locked(
        &mut self,
        doc: NetworkDocument,
        registry: &ProcessorRegistry,
        report: &mut LoadReport,
    ) -> Result<(), LoadError> {
        let mut ids: HashMap<String, NodeId> = HashMap::new();

        for entry in doc.processors {
            let mut node = match registry.create(&entry.class, &entry.identifier) {
                None => {
                    report.warn(format!(
                        "Unknown processor class '{}' for '{}'",
                        entry.class, entry.identifier
                    ));
                    continue;
                }
                Some(Err(source)) => {
                    return Err(LoadError::Construct {
                        identifier: entry.identifier,
                        source,
                    })
                }
                Some(Ok(node)) => node,
            };

            for property in entry.properties {
                let path = PropertyPath::parse(&property.path);
                if let Err(err) = node.properties.set_value(&path, property.value) {
                    report.warn(format!(
                        "Property '{}' of '{}' not restored: {err}",
                        property.path, entry.identifier
                    ));
                }
            }
            node.properties.clear_modified();

            if let Err(source) = node.processor_mut().deserialize(&entry.state) {
                return Err(LoadError::State {
                    identifier: entry.identifier,
                    source,
                });
            }

            let id = self.add_processor(node);
            report.added.push(id);
            ids.insert(entry.identifier, id);
        }

        for entry in doc.connections {
            let endpoints = self
                .resolve_outport(&ids, &entry.from)
                .zip(self.resolve_inport(&ids, &entry.to));
            let Some((outport, inport)) = endpoints else {
                report.warn(format!(
                    "Connection {} -> {} refers to a missing port",
                    entry.from, entry.to
                ));
                continue;
            };
            if let Err(err) = self.add_connection(outport, inport) {
                report.warn(format!(
                    "Connection {} -> {} rejected: {err}",
                    entry.from, entry.to
                ));
            }
        }

        for entry in doc.links {
            let endpoints = resolve_property(&ids, &entry.source)
                .zip(resolve_property(&ids, &entry.destination));
            let Some((source, destination)) = endpoints else {
                report.warn(format!(
                    "Link {}.{} -> {}.{} refers to a missing processor",
                    entry.source.processor,
                    entry.source.property,
                    entry.destination.processor,
                    entry.destination.property
                ));
                continue;
            };
            if let Err(err) = self.add_link(source, destination) {
                report.warn(format!("Link rejected: {err}"));
            }
        }

        Ok(())
    }

    fn outport_address(&self, outport: OutportRef) -> Option<String> {
        let node = self.nodes.get(&outport.node)?;
        let port = node.outports().get(outport.index)?;
        Some(format!("{}/{}", node.identifier(), port.name()))
    }

    fn inport_address(&self, inport: InportRef) -> Option<String> {
        let node = self.nodes.get(&inport.node)?;
        let port = node.inports().get(inport.index)?;
        Some(format!("{}/{}", node.identifier(), port.name()))
    }

    fn property_address(&self, property: &PropertyRef) -> Option<PropertyAddress> {
        let node = self.nodes.get(&property.node)?;
        Some(PropertyAddress {
            processor: node.identifier().to_owned(),
            property: property.path.to_string(),
        })
    }

    fn resolve_outport(&self, ids: &HashMap<String, NodeId>, address: &str) -> Option<OutportRef> {
        let (processor, port) = split_port_address(address)?;
        self.nodes.get(ids.get(processor)?)?.outport_ref(port)
    }

    fn resolve_inport(&self, ids: &HashMap<String, NodeId>, address: &str) -> Option<InportRef> {
        let (processor, port) = split_port_address(address)?;
        self.nodes.get(ids.get(processor)?)?.inport_ref(port)
    }
}

fn resolve_property(ids: &HashMap<String, NodeId>, address: &PropertyAddress) -> Option<PropertyRef> {
    let node = *ids.get(&address.processor)?;
    Some(PropertyRef::new(node, address.property.as_str()))
}
