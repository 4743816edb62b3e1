// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation order, invalidation and failure handling across whole networks.

use flowgraph_core::{
    EvaluationFailure, EvaluationPhase, InportHandle, InvalidationLevel, Network, NetworkConfig,
    NetworkContext, NetworkEvent, Node, NodeId, OutportHandle, ProcessContext, Processor,
    ProcessorError, Property, PropertyValue, Selector,
};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

/// Writes its identifier to a shared log and outputs `input * gain`, or `gain`
/// when nothing is connected
struct Recorder {
    input: InportHandle<f64>,
    out: OutportHandle<f64>,
    log: Log,
}

impl Recorder {
    fn node(identifier: &str, log: &Log) -> Node {
        let log = Rc::clone(log);
        Node::build(identifier, |b| {
            b.property(Property::float("gain", 1.0));
            b.property(Property::string("fail", ""));
            Self {
                input: b.optional_inport("in"),
                out: b.outport("out"),
                log,
            }
        })
        .unwrap()
    }
}

impl Processor for Recorder {
    fn class_identifier(&self) -> String {
        "test.Recorder".to_string()
    }

    fn initialize_resources(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        if ctx.property("fail").and_then(PropertyValue::as_str) == Some("init") {
            return Err(ProcessorError::msg("no resources"));
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        self.log.borrow_mut().push(ctx.identifier().to_string());
        match ctx.property("fail").and_then(PropertyValue::as_str) {
            Some("process") => return Err(ProcessorError::msg("bad input")),
            Some("panic") => panic!("recorder exploded"),
            _ => {}
        }
        let gain = ctx.float("gain").unwrap_or(1.0);
        let value = ctx.input(self.input).map_or(gain, |input| *input * gain);
        ctx.set_output(self.out, value);
        Ok(())
    }
}

/// Invalidates itself on each of its first `restless_runs` runs
struct Restless {
    runs: u32,
    restless_runs: u32,
}

impl Restless {
    fn node(identifier: &str, restless_runs: u32) -> Node {
        Node::build(identifier, |_| Self {
            runs: 0,
            restless_runs,
        })
        .unwrap()
    }
}

impl Processor for Restless {
    fn class_identifier(&self) -> String {
        "test.Restless".to_string()
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        self.runs += 1;
        if self.runs <= self.restless_runs {
            ctx.invalidate(InvalidationLevel::InvalidOutput);
        }
        Ok(())
    }
}

/// Adds `left + right`, recording which inports it was told changed.
///
/// The `fail` property makes `on_inport_change` ("change") or
/// `do_if_not_ready` ("not-ready") fail.
struct Sensitive {
    left: InportHandle<f64>,
    right: InportHandle<f64>,
    out: OutportHandle<f64>,
    changes: Rc<RefCell<Vec<usize>>>,
}

impl Sensitive {
    fn node(identifier: &str, changes: &Rc<RefCell<Vec<usize>>>) -> Node {
        let changes = Rc::clone(changes);
        Node::build(identifier, |b| {
            b.property(Property::string("fail", ""));
            Self {
                left: b.inport("left"),
                right: b.optional_inport("right"),
                out: b.outport("out"),
                changes,
            }
        })
        .unwrap()
    }

    fn failing(ctx: &ProcessContext<'_>, mode: &str) -> bool {
        ctx.property("fail").and_then(PropertyValue::as_str) == Some(mode)
    }
}

impl Processor for Sensitive {
    fn class_identifier(&self) -> String {
        "test.Sensitive".to_string()
    }

    fn on_inport_change(
        &mut self,
        inport: usize,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<(), ProcessorError> {
        self.changes.borrow_mut().push(inport);
        if Self::failing(ctx, "change") {
            return Err(ProcessorError::msg("cannot follow the change"));
        }
        Ok(())
    }

    fn do_if_not_ready(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        if Self::failing(ctx, "not-ready") {
            return Err(ProcessorError::msg("still waiting"));
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let left = ctx.require_input(self.left)?;
        let right = ctx.input(self.right).map_or(0.0, |right| *right);
        ctx.set_output(self.out, *left + right);
        Ok(())
    }
}

fn connect_to(network: &mut Network, from: NodeId, to: NodeId, inport: &str) {
    let outport = network.node(from).unwrap().outport_ref("out").unwrap();
    let inport = network.node(to).unwrap().inport_ref(inport).unwrap();
    network.add_connection(outport, inport).unwrap();
}

fn manual() -> Network {
    Network::with_context(NetworkContext::new(NetworkConfig {
        auto_evaluate: false,
        ..NetworkConfig::default()
    }))
}

fn connect(network: &mut Network, from: NodeId, to: NodeId) {
    let outport = network.node(from).unwrap().outport_ref("out").unwrap();
    let inport = network.node(to).unwrap().inport_ref("in").unwrap();
    network.add_connection(outport, inport).unwrap();
}

fn output(network: &Network, node: NodeId) -> Option<f64> {
    let outport = network.node(node)?.outport_ref("out")?;
    network.outport_data::<f64>(outport).map(|value| *value)
}

fn chain(network: &mut Network, log: &Log) -> (NodeId, NodeId, NodeId) {
    let a = network.add_processor(Recorder::node("A", log));
    let b = network.add_processor(Recorder::node("B", log));
    let c = network.add_processor(Recorder::node("C", log));
    connect(network, a, b);
    connect(network, b, c);
    (a, b, c)
}

fn taken(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}

#[test]
fn test_chain_runs_in_dependency_order() {
    let log = Log::default();
    let mut network = manual();
    // Added downstream first so insertion order disagrees with data flow
    let c = network.add_processor(Recorder::node("C", &log));
    let b = network.add_processor(Recorder::node("B", &log));
    let a = network.add_processor(Recorder::node("A", &log));
    connect(&mut network, a, b);
    connect(&mut network, b, c);
    network.set_property(a, "gain", PropertyValue::Float(3.0)).unwrap();

    let report = network.evaluate();
    assert_eq!(taken(&log), vec!["A", "B", "C"]);
    assert_eq!(report.processed, vec![a, b, c]);
    assert_eq!(report.passes, 1);
    assert_eq!(output(&network, c), Some(3.0));
    assert!(network.nodes().all(Node::is_valid));
}

#[test]
fn test_invalidation_reruns_downstream_only() {
    let log = Log::default();
    let mut network = manual();
    let (a, b, c) = chain(&mut network, &log);
    network.evaluate();
    taken(&log);

    network.invalidate_processor(b, InvalidationLevel::InvalidOutput);
    let report = network.evaluate();
    assert_eq!(taken(&log), vec!["B", "C"]);
    assert!(!report.ran(a));
    assert_eq!(report.run_count(b), 1);
}

#[test]
fn test_property_change_propagates_value() {
    let log = Log::default();
    let mut network = manual();
    let (a, b, c) = chain(&mut network, &log);
    network.evaluate();

    network.set_property(b, "gain", PropertyValue::Float(5.0)).unwrap();
    assert!(network.has_pending_evaluation());
    network.evaluate();
    assert_eq!(output(&network, c), Some(5.0));

    network.set_property(a, "gain", PropertyValue::Float(2.0)).unwrap();
    network.evaluate();
    assert_eq!(output(&network, c), Some(10.0));
}

#[test]
fn test_evaluating_valid_network_does_nothing() {
    let log = Log::default();
    let mut network = manual();
    chain(&mut network, &log);
    network.evaluate();
    taken(&log);

    let report = network.evaluate();
    assert!(report.processed.is_empty());
    assert!(taken(&log).is_empty());
    assert_eq!(network.last_report(), Some(&report));
}

#[test]
fn test_inactive_connection_does_not_propagate() {
    let log = Log::default();
    let mut network = manual();
    let first = network.add_processor(Recorder::node("first", &log));
    let second = network.add_processor(Recorder::node("second", &log));
    let select = network.add_processor(Selector::<f64>::node("select", 0).unwrap());
    let inputs = network.node(select).unwrap().inport_ref("inputs").unwrap();
    for source in [first, second] {
        let outport = network.node(source).unwrap().outport_ref("out").unwrap();
        network.add_connection(outport, inputs).unwrap();
    }
    network.evaluate();

    network.invalidate_processor(second, InvalidationLevel::InvalidOutput);
    let report = network.evaluate();
    assert_eq!(report.processed, vec![second]);
    assert!(!report.ran(select));

    network.invalidate_processor(first, InvalidationLevel::InvalidOutput);
    let report = network.evaluate();
    assert!(report.ran(first));
    assert!(report.ran(select));
}

#[test]
fn test_cycle_is_reported_and_rest_still_runs() {
    let log = Log::default();
    let mut network = manual();
    let a = network.add_processor(Recorder::node("A", &log));
    let b = network.add_processor(Recorder::node("B", &log));
    let after = network.add_processor(Recorder::node("after", &log));
    let c = network.add_processor(Recorder::node("C", &log));
    let d = network.add_processor(Recorder::node("D", &log));
    connect(&mut network, a, b);
    connect(&mut network, b, a);
    connect(&mut network, b, after);
    connect(&mut network, c, d);

    let cycles = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&cycles);
    network.add_observer(move |event: &NetworkEvent| {
        if matches!(event, NetworkEvent::CyclicDependency { .. }) {
            *seen.borrow_mut() += 1;
        }
    });

    let report = network.evaluate();
    let mut cyclic = report.cyclic.clone();
    cyclic.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(cyclic, expected);
    assert_eq!(report.excluded, vec![after]);
    assert_eq!(report.processed, vec![c, d]);
    assert_eq!(*cycles.borrow(), 1);

    // Breaking the cycle lets everything run
    let b_out = network.node(b).unwrap().outport_ref("out").unwrap();
    let a_in = network.node(a).unwrap().inport_ref("in").unwrap();
    assert!(network.remove_connection(b_out, a_in));
    let report = network.evaluate();
    assert!(report.cyclic.is_empty());
    assert_eq!(report.processed, vec![a, b, after]);
}

#[test]
fn test_locked_changes_evaluate_once() {
    let log = Log::default();
    let mut network = Network::new();
    let (a, b, c) = chain(&mut network, &log);
    assert!(network.nodes().all(Node::is_valid));
    taken(&log);

    let passes = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&passes);
    network.add_observer(move |event: &NetworkEvent| {
        if matches!(event, NetworkEvent::EvaluationBegin) {
            *seen.borrow_mut() += 1;
        }
    });

    network.lock();
    network.lock();
    network.set_property(a, "gain", PropertyValue::Float(2.0)).unwrap();
    network.set_property(b, "gain", PropertyValue::Float(3.0)).unwrap();
    network.invalidate_processor(c, InvalidationLevel::InvalidResources);
    network.unlock();
    assert_eq!(*passes.borrow(), 0);
    assert!(network.has_pending_evaluation());
    network.unlock();

    assert_eq!(*passes.borrow(), 1);
    assert_eq!(taken(&log), vec!["A", "B", "C"]);
    assert_eq!(output(&network, c), Some(6.0));
    assert!(!network.has_pending_evaluation());
}

#[test]
fn test_evaluation_requested_mid_pass_runs_after() {
    let mut network = Network::new();
    let restless = network.add_processor(Restless::node("restless", 1));
    let report = network.last_report().unwrap();
    assert_eq!(report.passes, 2);
    assert_eq!(report.run_count(restless), 2);
    assert!(network.node(restless).unwrap().is_valid());
}

#[test]
fn test_failures_are_isolated_per_node() {
    let log = Log::default();
    let mut network = manual();
    let failures: Rc<RefCell<Vec<EvaluationFailure>>> = Rc::default();
    let sink = Rc::clone(&failures);
    network.set_error_handler(move |failure: &EvaluationFailure| {
        sink.borrow_mut().push(failure.clone());
    });

    let (a, b, c) = chain(&mut network, &log);
    let init = network.add_processor(Recorder::node("init", &log));
    let panics = network.add_processor(Recorder::node("panics", &log));
    let healthy = network.add_processor(Recorder::node("healthy", &log));
    network.set_property(b, "fail", PropertyValue::String("process".into())).unwrap();
    network.set_property(init, "fail", PropertyValue::String("init".into())).unwrap();
    network.set_property(panics, "fail", PropertyValue::String("panic".into())).unwrap();

    let report = network.evaluate();
    assert!(report.has_failures());
    let phases: Vec<(String, EvaluationPhase)> = failures
        .borrow()
        .iter()
        .map(|f| (f.identifier.clone(), f.phase))
        .collect();
    assert_eq!(
        phases,
        vec![
            ("B".to_string(), EvaluationPhase::Process),
            ("init".to_string(), EvaluationPhase::InitResource),
            ("panics".to_string(), EvaluationPhase::Process),
        ]
    );
    assert!(failures.borrow()[2].message.contains("recorder exploded"));
    assert_eq!(report.failures, *failures.borrow());

    assert!(report.ran(a));
    assert!(report.ran(healthy));
    // B never published, so C is not ready
    assert!(!report.ran(c));
    assert!(!network.node(c).unwrap().is_ready());
    assert!(!network.node(b).unwrap().is_valid());
    assert!(network.node(healthy).unwrap().is_valid());

    // Fixing the processor lets the chain complete
    network.set_property(b, "fail", PropertyValue::String(String::new())).unwrap();
    let report = network.evaluate();
    assert!(report.ran(b));
    assert!(report.ran(c));
    assert_eq!(output(&network, c), Some(1.0));
}

#[test]
fn test_removed_processor_is_not_evaluated() {
    let log = Log::default();
    let mut network = manual();
    let (a, b, c) = chain(&mut network, &log);
    network.set_property(a, "gain", PropertyValue::Float(4.0)).unwrap();
    network.evaluate();
    assert_eq!(output(&network, c), Some(4.0));
    taken(&log);

    network.remove_processor(b).unwrap();
    assert!(!network.evaluation_order().contains(&b));
    let report = network.evaluate();
    assert_eq!(taken(&log), vec!["C"]);
    assert_eq!(report.processed, vec![c]);
    assert_eq!(output(&network, c), Some(1.0));
    assert_eq!(network.connection_count(), 0);
}

#[test]
fn test_only_changed_inports_are_reported() {
    let log = Log::default();
    let changes = Rc::new(RefCell::new(Vec::new()));
    let mut network = manual();
    let left = network.add_processor(Recorder::node("left", &log));
    let right = network.add_processor(Recorder::node("right", &log));
    let sum = network.add_processor(Sensitive::node("sum", &changes));
    connect_to(&mut network, left, sum, "left");
    connect_to(&mut network, right, sum, "right");
    network.set_property(right, "gain", PropertyValue::Float(2.0)).unwrap();

    network.evaluate();
    assert_eq!(std::mem::take(&mut *changes.borrow_mut()), vec![0, 1]);
    assert_eq!(output(&network, sum), Some(3.0));

    network.invalidate_processor(right, InvalidationLevel::InvalidOutput);
    network.evaluate();
    assert_eq!(std::mem::take(&mut *changes.borrow_mut()), vec![1]);

    network.set_property(left, "gain", PropertyValue::Float(4.0)).unwrap();
    network.evaluate();
    assert_eq!(std::mem::take(&mut *changes.borrow_mut()), vec![0]);
    assert_eq!(output(&network, sum), Some(6.0));

    // Nothing upstream changed, so the hook is not called at all
    network.evaluate();
    assert!(changes.borrow().is_empty());
}

#[test]
fn test_inport_change_and_not_ready_failures_are_reported() {
    let log = Log::default();
    let changes = Rc::new(RefCell::new(Vec::new()));
    let mut network = manual();
    let feeder = network.add_processor(Recorder::node("feeder", &log));
    let on_change = network.add_processor(Sensitive::node("oc", &changes));
    // No connection to its required inport, so it is never ready
    let not_ready = network.add_processor(Sensitive::node("nr", &changes));
    connect_to(&mut network, feeder, on_change, "left");
    network.set_property(on_change, "fail", PropertyValue::String("change".into())).unwrap();
    network.set_property(not_ready, "fail", PropertyValue::String("not-ready".into())).unwrap();

    let report = network.evaluate();
    let phases: Vec<(&str, EvaluationPhase)> = report
        .failures
        .iter()
        .map(|f| (f.identifier.as_str(), f.phase))
        .collect();
    assert_eq!(
        phases,
        vec![("oc", EvaluationPhase::PortOnChange), ("nr", EvaluationPhase::NotReady)]
    );
    assert!(report.ran(feeder));
    assert!(!report.ran(on_change));
    assert!(!report.ran(not_ready));

    assert!(!network.node(on_change).unwrap().is_valid());
    assert!(network.node(on_change).unwrap().is_ready());
    assert!(!network.node(not_ready).unwrap().is_valid());
    assert!(!network.node(not_ready).unwrap().is_ready());
    assert_eq!(output(&network, on_change), None);

    // The changed inport is still pending, so the hook is retried once fixed
    network.set_property(on_change, "fail", PropertyValue::String(String::new())).unwrap();
    let report = network.evaluate();
    assert!(report.ran(on_change));
    assert_eq!(output(&network, on_change), Some(1.0));
}

#[test]
fn test_follow_up_passes_stop_at_the_limit() {
    let mut network = Network::with_context(NetworkContext::new(NetworkConfig {
        max_follow_up_passes: 3,
        ..NetworkConfig::default()
    }));
    let restless = network.add_processor(Restless::node("restless", u32::MAX));

    let report = network.last_report().unwrap().clone();
    assert_eq!(report.passes, 4);
    assert_eq!(report.run_count(restless), 4);
    assert!(!report.has_failures());
    assert!(network.has_pending_evaluation());
    assert!(!network.node(restless).unwrap().is_valid());

    // The request left pending is picked up by the next call
    let report = network.evaluate_pending().unwrap();
    assert_eq!(report.passes, 4);
    assert!(network.has_pending_evaluation());
}
