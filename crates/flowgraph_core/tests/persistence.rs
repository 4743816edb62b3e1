// SPDX-License-Identifier: MIT OR Apache-2.0
//! Saving networks to documents and loading them back.

use flowgraph_core::{
    LoadError, Network, NetworkConfig, NetworkContext, NetworkDocument, NodeId, Probe,
    ProcessorRegistry, PropertyRef, PropertyValue, Selector, Source, DOCUMENT_VERSION,
};

fn manual() -> Network {
    Network::with_context(NetworkContext::new(NetworkConfig {
        auto_evaluate: false,
        ..NetworkConfig::default()
    }))
}

fn connect(network: &mut Network, from: NodeId, to: NodeId, inport: &str) {
    let outport = network.node(from).unwrap().outport_ref("out").unwrap();
    let inport = network.node(to).unwrap().inport_ref(inport).unwrap();
    network.add_connection(outport, inport).unwrap();
}

/// Two sources behind a selector feeding a probe, with the sources linked
fn sample() -> (Network, NodeId) {
    let mut network = manual();
    let low = network.add_processor(Source::node("low", 1.0_f64).unwrap());
    let high = network.add_processor(Source::node("high", 9.0_f64).unwrap());
    let select = network.add_processor(Selector::<f64>::node("select", 1).unwrap());
    let probe = network.add_processor(Probe::<f64>::node("probe").unwrap());
    connect(&mut network, low, select, "inputs");
    connect(&mut network, high, select, "inputs");
    connect(&mut network, select, probe, "in");
    network
        .add_link(PropertyRef::new(low, "value"), PropertyRef::new(high, "value"))
        .unwrap();
    network.evaluate();
    (network, probe)
}

#[test]
fn test_save_and_load_roundtrip() {
    let (network, _) = sample();
    let json = network.to_json().unwrap();
    let registry = ProcessorRegistry::with_builtins();

    let mut loaded = manual();
    let report = loaded.load_json(&json, &registry).unwrap();
    assert_eq!(report.added.len(), 4);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(loaded.connection_count(), 3);
    assert_eq!(loaded.link_count(), 1);

    // Probe state and properties survive
    assert_eq!(loaded.to_document().unwrap(), network.to_document().unwrap());

    let select = loaded.node_by_identifier("select").unwrap().id();
    assert_eq!(
        loaded.property(select, "selected").unwrap().value(),
        Some(&PropertyValue::Int(1))
    );

    loaded.evaluate();
    let probe = loaded.node_by_identifier("probe").unwrap();
    let out = probe.outport_ref("out").unwrap();
    assert_eq!(*loaded.outport_data::<f64>(out).unwrap(), 9.0);
}

#[test]
fn test_loading_into_populated_network_renames() {
    let (network, _) = sample();
    let doc = network.to_document().unwrap();
    let registry = ProcessorRegistry::with_builtins();

    let mut target = manual();
    target.add_processor(Source::node("low", 0.0_f64).unwrap());
    let report = target.load_document(doc, &registry).unwrap();
    assert!(report.warnings.is_empty());
    assert_eq!(target.node_count(), 5);
    assert!(target.node_by_identifier("low 2").is_some());
    // Connections follow the renamed processor, not the existing one
    let existing = target.node_by_identifier("low").unwrap().id();
    assert!(target.successors(existing).is_empty());
}

#[test]
fn test_unknown_class_is_skipped_with_warning() {
    let text = r#"{
        "version": 1,
        "processors": [
            { "class": "flowgraph.Source.Float", "identifier": "source" },
            { "class": "vendor.Mystery", "identifier": "mystery" },
            { "class": "flowgraph.Probe.Float", "identifier": "probe" }
        ],
        "connections": [
            { "from": "source/out", "to": "probe/in" },
            { "from": "mystery/out", "to": "probe/in" }
        ]
    }"#;
    let registry = ProcessorRegistry::with_builtins();
    let mut network = manual();
    let report = network.load_json(text, &registry).unwrap();

    assert_eq!(report.added.len(), 2);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[0].contains("vendor.Mystery"));
    assert_eq!(network.connection_count(), 1);
}

#[test]
fn test_unsupported_version_is_rejected() {
    let doc = NetworkDocument {
        version: DOCUMENT_VERSION + 1,
        ..NetworkDocument::default()
    };
    let mut network = manual();
    let err = network
        .load_document(doc, &ProcessorRegistry::with_builtins())
        .unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedVersion { found, .. } if found == DOCUMENT_VERSION + 1));
    assert!(matches!(
        network.load_json("{ not json", &ProcessorRegistry::new()),
        Err(LoadError::Parse(_))
    ));
}

#[test]
fn test_bad_state_aborts_and_rolls_back() {
    let text = r#"{
        "version": 1,
        "processors": [
            { "class": "flowgraph.Source.Float", "identifier": "source" },
            { "class": "flowgraph.Probe.Float", "identifier": "probe", "state": { "received": "many" } }
        ]
    }"#;
    let mut network = manual();
    let kept = network.add_processor(Source::node("kept", 1.0_f64).unwrap());

    let err = network
        .load_json(text, &ProcessorRegistry::with_builtins())
        .unwrap_err();
    match err {
        LoadError::State { identifier, .. } => assert_eq!(identifier, "probe"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(network.node_ids().collect::<Vec<_>>(), vec![kept]);
}
