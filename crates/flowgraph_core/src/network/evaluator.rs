// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation passes.
//!
//! A pass walks the cached order once. Each node is checked for validity and
//! readiness, has its resources and changed inports handled, and then runs
//! `process`. A failing node is reported to the error handler and left
//! invalid; the pass moves on to the next node.

use super::Network;
use crate::error::{EvaluationFailure, EvaluationPhase};
use crate::event::NetworkEvent;
use crate::invalidation::InvalidationLevel;
use crate::link::PropertyRef;
use crate::node::{Node, NodeId};
use crate::port::InportRef;
use crate::processor::{InputSnapshot, ProcessorError, SideEffects};

/// What an [`Network::evaluate`] call did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    /// Nodes whose `process` ran, in execution order, across all passes
    pub processed: Vec<NodeId>,
    /// Failures handed to the error handler
    pub failures: Vec<EvaluationFailure>,
    /// Nodes left out because they are on a cycle
    pub cyclic: Vec<NodeId>,
    /// Nodes left out because they are downstream of a cycle
    pub excluded: Vec<NodeId>,
    /// Passes run; follow-up passes handle invalidations raised mid-pass
    pub passes: usize,
    /// The gate was held, so nothing ran and the request is pending
    pub deferred: bool,
}

impl EvaluationReport {
    /// Whether `process` ran for `node`
    pub fn ran(&self, node: NodeId) -> bool {
        self.processed.contains(&node)
    }

    /// How many times `process` ran for `node`
    pub fn run_count(&self, node: NodeId) -> usize {
        self.processed.iter().filter(|&&n| n == node).count()
    }

    /// Whether any node failed
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Result of running the hooks of one node
#[derive(Default)]
struct NodeRun {
    processed: bool,
    failure: Option<(EvaluationPhase, ProcessorError)>,
    effects: SideEffects,
}

impl Network {
    /// Evaluate every invalid node in dependency order.
    ///
    /// If anything holds the gate the request is queued and the returned report
    /// is marked `deferred`. Invalidations raised while a pass runs are picked
    /// up by follow-up passes, bounded by `max_follow_up_passes`.
    pub fn evaluate(&mut self) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        if !self.gate.is_idle() {
            self.gate.set_pending();
            report.deferred = true;
            return report;
        }

        self.gate.take_pending();
        loop {
            self.run_pass(&mut report);
            if !self.gate.is_pending() || !self.context.config.auto_evaluate {
                break;
            }
            if report.passes > self.context.config.max_follow_up_passes {
                tracing::warn!(
                    passes = report.passes,
                    "Evaluation still pending after the follow-up pass limit"
                );
                break;
            }
            self.gate.take_pending();
        }

        self.last_report = Some(report.clone());
        report
    }

    fn run_pass(&mut self, report: &mut EvaluationReport) {
        if !self.gate.begin_evaluation() {
            return;
        }
        self.notify(NetworkEvent::EvaluationBegin);
        self.ensure_sorted();
        report.cyclic.clone_from(&self.sorted.cyclic);
        report.excluded.clone_from(&self.sorted.excluded);

        let order = self.sorted.order.clone();
        tracing::debug!(nodes = order.len(), pass = report.passes + 1, "Evaluation pass");
        for id in order {
            self.evaluate_node(id, report);
        }

        report.passes += 1;
        self.notify(NetworkEvent::EvaluationEnd);
        self.gate.end_evaluation();
    }

    fn evaluate_node(&mut self, id: NodeId, report: &mut EvaluationReport) {
        let inputs = self.gather_inputs(id);
        let catch_panics = self.context.config.catch_panics;
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let Some(run) = run_node(node, &inputs, catch_panics) else {
            return;
        };
        let identifier = node.identifier().to_owned();

        if run.processed {
            report.processed.push(id);
        }
        if let Some((phase, error)) = run.failure {
            let failure = EvaluationFailure {
                node: id,
                identifier,
                phase,
                message: error.to_string(),
            };
            self.context.error_handler.handle(&failure);
            report.failures.push(failure);
        }
        self.apply_effects(id, run.effects);
    }

    /// Snapshot every inport of `id` over its active connections
    fn gather_inputs(&self, id: NodeId) -> Vec<InputSnapshot> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        node.inports()
            .iter()
            .enumerate()
            .map(|(index, inport)| {
                let target = InportRef { node: id, index };
                let sources = self
                    .active_connections()
                    .filter(|c| c.inport == target)
                    .map(|c| {
                        self.nodes
                            .get(&c.outport.node)
                            .and_then(|source| source.outports().get(c.outport.index))
                            .and_then(|outport| outport.data().cloned())
                    })
                    .collect();
                InputSnapshot {
                    name: inport.name().to_owned(),
                    optional: inport.is_optional(),
                    changed: inport.is_changed(),
                    sources,
                }
            })
            .collect()
    }

    /// Apply what a node asked for while its hooks ran
    fn apply_effects(&mut self, id: NodeId, effects: SideEffects) {
        if !effects.published.is_empty() {
            self.mark_downstream_changed(id, &effects.published);
        }
        if !effects.modified.is_empty() {
            self.gate.begin_linking();
            self.refresh_connection_activity(id);
            for path in effects.modified {
                self.propagate_links(&PropertyRef::new(id, path));
            }
            self.gate.end_linking();
        }
        if let Some(level) = effects.invalidation {
            self.invalidate_processor(id, level);
        }
    }
}

/// Run the hooks of one node; `None` if the node is valid and nothing changed
fn run_node(node: &mut Node, inputs: &[InputSnapshot], catch_panics: bool) -> Option<NodeRun> {
    let changed: Vec<usize> = node
        .inports()
        .iter()
        .enumerate()
        .filter(|(_, inport)| inport.is_changed())
        .map(|(index, _)| index)
        .collect();
    if node.is_valid() {
        if changed.is_empty() {
            return None;
        }
        node.raise(InvalidationLevel::InvalidOutput);
    }

    let mut run = NodeRun::default();
    let ready = node.check_ready(inputs);
    node.set_ready(ready);
    if !ready {
        if let Err(err) = node.run_hook(inputs, &mut run.effects, catch_panics, |p, ctx| {
            p.do_if_not_ready(ctx)
        }) {
            run.failure = Some((EvaluationPhase::NotReady, err));
        }
        return Some(run);
    }

    if node.invalidation_level().requires_resources() {
        if let Err(err) = node.run_hook(inputs, &mut run.effects, catch_panics, |p, ctx| {
            p.initialize_resources(ctx)
        }) {
            run.failure = Some((EvaluationPhase::InitResource, err));
            return Some(run);
        }
        node.lower_to(InvalidationLevel::InvalidOutput);
    }

    for inport in changed {
        if let Err(err) = node.run_hook(inputs, &mut run.effects, catch_panics, |p, ctx| {
            p.on_inport_change(inport, ctx)
        }) {
            run.failure = Some((EvaluationPhase::PortOnChange, err));
            return Some(run);
        }
    }

    let result = node.run_hook(inputs, &mut run.effects, catch_panics, |p, ctx| {
        p.process(ctx)
    });
    run.processed = true;
    match result {
        // A node that invalidated itself, or lost readiness, runs again later
        Ok(()) if run.effects.invalidation.is_none() && node.check_ready(inputs) => {
            node.set_valid();
        }
        Ok(()) => {}
        Err(err) => run.failure = Some((EvaluationPhase::Process, err)),
    }
    Some(run)
}
