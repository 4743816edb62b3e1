// SPDX-License-Identifier: MIT OR Apache-2.0
//! Topological ordering over active connections.
//!
//! Works on plain node and edge lists so it can be tested without processors.
//! Roots of demand are nodes with no outgoing edge to another orderable node,
//! plus nodes flagged as sinks. A depth-first walk backwards from each root,
//! in insertion order, records nodes in post-order, which already places every
//! predecessor before its successors.

use crate::node::NodeId;
use std::collections::HashMap;

/// Result of sorting a network
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOutcome {
    /// Evaluation order
    pub order: Vec<NodeId>,
    /// Nodes on a cycle of active connections
    pub cyclic: Vec<NodeId>,
    /// Nodes downstream of a cycle
    pub excluded: Vec<NodeId>,
}

impl SortOutcome {
    /// Whether a cycle was found
    pub fn has_cycles(&self) -> bool {
        !self.cyclic.is_empty()
    }
}

/// A node as seen by the sorter
#[derive(Debug, Clone, Copy)]
pub struct SortNode {
    /// Node ID
    pub id: NodeId,
    /// Explicit root of demand
    pub sink: bool,
}

/// Sort `nodes` (given in insertion order) along active `edges` (`from -> to`).
///
/// Edges naming unknown nodes are ignored. Never fails: cycles are reported in
/// the outcome and the affected nodes are left out of the order.
pub fn topological_sort(nodes: &[SortNode], edges: &[(NodeId, NodeId)]) -> SortOutcome {
    let index: HashMap<NodeId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id, i))
        .collect();

    let mut predecessors = vec![Vec::new(); nodes.len()];
    let mut successors = vec![Vec::new(); nodes.len()];
    for (from, to) in edges {
        if let (Some(&from), Some(&to)) = (index.get(from), index.get(to)) {
            successors[from].push(to);
            predecessors[to].push(from);
        }
    }

    let on_cycle = find_cyclic(&successors);
    let blocked = downstream_of(&on_cycle, &successors);

    let mut visited = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if blocked[i] {
            continue;
        }
        let is_root = node.sink || successors[i].iter().all(|&s| blocked[s]);
        if is_root {
            visit(i, &predecessors, &blocked, &mut visited, &mut order);
        }
    }

    let pick = |keep: &dyn Fn(usize) -> bool| {
        nodes
            .iter()
            .enumerate()
            .filter(|&(i, _)| keep(i))
            .map(|(_, node)| node.id)
            .collect::<Vec<_>>()
    };

    SortOutcome {
        order: order.into_iter().map(|i| nodes[i].id).collect(),
        cyclic: pick(&|i| on_cycle[i]),
        excluded: pick(&|i| blocked[i] && !on_cycle[i]),
    }
}

/// Backward post-order walk from `root`, with an explicit stack so long chains
/// cannot exhaust the thread stack
fn visit(
    root: usize,
    predecessors: &[Vec<usize>],
    blocked: &[bool],
    visited: &mut [bool],
    order: &mut Vec<usize>,
) {
    if visited[root] {
        return;
    }
    visited[root] = true;
    // (node, next predecessor to look at)
    let mut stack = vec![(root, 0usize)];
    while let Some(top) = stack.len().checked_sub(1) {
        let (node, next) = stack[top];
        match predecessors[node].get(next) {
            Some(&pred) => {
                stack[top].1 += 1;
                // Blocked nodes never feed an unblocked one, but stay safe on bad input
                if !blocked[pred] && !visited[pred] {
                    visited[pred] = true;
                    stack.push((pred, 0));
                }
            }
            None => {
                stack.pop();
                order.push(node);
            }
        }
    }
}

/// Nodes belonging to a strongly connected component with a cycle (Tarjan)
fn find_cyclic(successors: &[Vec<usize>]) -> Vec<bool> {
    struct Tarjan<'a> {
        successors: &'a [Vec<usize>],
        counter: usize,
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        cyclic: Vec<bool>,
    }

    impl Tarjan<'_> {
        fn enter(&mut self, v: usize) {
            self.index[v] = Some(self.counter);
            self.low[v] = self.counter;
            self.counter += 1;
            self.stack.push(v);
            self.on_stack[v] = true;
        }

        /// Pops the component rooted at `v` once all its successors are done
        fn close(&mut self, v: usize) {
            if Some(self.low[v]) != self.index[v] {
                return;
            }
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            let self_loop = self.successors[v].contains(&v);
            if component.len() > 1 || self_loop {
                for w in component {
                    self.cyclic[w] = true;
                }
            }
        }

        fn connect(&mut self, start: usize) {
            let successors = self.successors;
            self.enter(start);
            let mut work = vec![(start, 0usize)];
            while let Some(top) = work.len().checked_sub(1) {
                let (v, next) = work[top];
                if let Some(&w) = successors[v].get(next) {
                    work[top].1 += 1;
                    match self.index[w] {
                        None => {
                            self.enter(w);
                            work.push((w, 0));
                        }
                        Some(w_index) if self.on_stack[w] => {
                            self.low[v] = self.low[v].min(w_index);
                        }
                        Some(_) => {}
                    }
                } else {
                    work.pop();
                    self.close(v);
                    if let Some(&(parent, _)) = work.last() {
                        self.low[parent] = self.low[parent].min(self.low[v]);
                    }
                }
            }
        }
    }

    let n = successors.len();
    let mut tarjan = Tarjan {
        successors,
        counter: 0,
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        cyclic: vec![false; n],
    };
    for v in 0..n {
        if tarjan.index[v].is_none() {
            tarjan.connect(v);
        }
    }
    tarjan.cyclic
}

/// Cyclic nodes plus everything reachable from them
fn downstream_of(cyclic: &[bool], successors: &[Vec<usize>]) -> Vec<bool> {
    let mut blocked = cyclic.to_vec();
    let mut stack: Vec<usize> = (0..cyclic.len()).filter(|&i| cyclic[i]).collect();
    while let Some(node) = stack.pop() {
        for &next in &successors[node] {
            if !blocked[next] {
                blocked[next] = true;
                stack.push(next);
            }
        }
    }
    blocked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<SortNode> {
        (0..n)
            .map(|_| SortNode {
                id: NodeId::new(),
                sink: false,
            })
            .collect()
    }

    fn position(outcome: &SortOutcome, id: NodeId) -> Option<usize> {
        outcome.order.iter().position(|&n| n == id)
    }

    #[test]
    fn test_chain_sorted_upstream_first() {
        let n = nodes(3);
        // Inserted in reverse to make sure the edges decide, not insertion order
        let reversed = vec![n[2], n[1], n[0]];
        let edges = [(n[0].id, n[1].id), (n[1].id, n[2].id)];
        let outcome = topological_sort(&reversed, &edges);
        assert_eq!(outcome.order, vec![n[0].id, n[1].id, n[2].id]);
        assert!(!outcome.has_cycles());
    }

    #[test]
    fn test_isolated_nodes_keep_insertion_order() {
        let n = nodes(3);
        let outcome = topological_sort(&n, &[]);
        assert_eq!(outcome.order, n.iter().map(|node| node.id).collect::<Vec<_>>());
    }

    #[test]
    fn test_cycle_excludes_downstream_only() {
        // up -> a <-> b -> down, plus an unrelated node
        let n = nodes(5);
        let (up, a, b, down, other) = (n[0].id, n[1].id, n[2].id, n[3].id, n[4].id);
        let edges = [(up, a), (a, b), (b, a), (b, down)];
        let outcome = topological_sort(&n, &edges);

        assert_eq!(outcome.cyclic, vec![a, b]);
        assert_eq!(outcome.excluded, vec![down]);
        assert_eq!(outcome.order, vec![up, other]);
    }

    #[test]
    fn test_sink_with_successors_is_still_a_root() {
        let mut n = nodes(2);
        n[0].sink = true;
        let edges = [(n[0].id, n[1].id)];
        let outcome = topological_sort(&n, &edges);
        assert_eq!(outcome.order, vec![n[0].id, n[1].id]);
    }

    #[test]
    fn test_unknown_edge_endpoints_ignored() {
        let n = nodes(2);
        let edges = [(NodeId::new(), n[1].id), (n[0].id, n[1].id)];
        let outcome = topological_sort(&n, &edges);
        assert_eq!(outcome.order, vec![n[0].id, n[1].id]);
    }

    #[test]
    fn test_diamond() {
        let n = nodes(4);
        let (a, b, c, d) = (n[0].id, n[1].id, n[2].id, n[3].id);
        let edges = [(a, b), (a, c), (b, d), (c, d)];
        let outcome = topological_sort(&n, &edges);
        assert_eq!(outcome.order.len(), 4);
        for (from, to) in edges {
            assert!(position(&outcome, from) < position(&outcome, to));
        }
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let n = nodes(200_000);
        let edges: Vec<_> = n.windows(2).map(|pair| (pair[0].id, pair[1].id)).collect();
        let outcome = topological_sort(&n, &edges);
        assert_eq!(outcome.order.len(), n.len());
        assert_eq!(outcome.order.first(), Some(&n[0].id));
        assert_eq!(outcome.order.last(), Some(&n[n.len() - 1].id));
        assert!(!outcome.has_cycles());
    }

    #[test]
    fn test_long_ring_is_one_cycle() {
        let n = nodes(150_000);
        let mut edges: Vec<_> = n.windows(2).map(|pair| (pair[0].id, pair[1].id)).collect();
        edges.push((n[n.len() - 1].id, n[0].id));
        let outcome = topological_sort(&n, &edges);
        assert_eq!(outcome.cyclic.len(), n.len());
        assert!(outcome.order.is_empty());
        assert!(outcome.excluded.is_empty());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_random_dags_respect_every_edge(
            size in 1usize..24,
            raw_edges in prop::collection::vec((0usize..24, 0usize..24), 0..60),
            sinks in prop::collection::vec(any::<bool>(), 24),
        ) {
            let mut n = nodes(size);
            for (node, sink) in n.iter_mut().zip(&sinks) {
                node.sink = *sink;
            }
            // Lower index to higher index only, so the graph is acyclic
            let edges: Vec<_> = raw_edges
                .iter()
                .map(|&(a, b)| (a % size, b % size))
                .filter(|(a, b)| a < b)
                .map(|(a, b)| (n[a].id, n[b].id))
                .collect();

            let outcome = topological_sort(&n, &edges);
            prop_assert!(outcome.cyclic.is_empty());
            prop_assert_eq!(outcome.order.len(), size);
            for (from, to) in &edges {
                prop_assert!(position(&outcome, *from) < position(&outcome, *to));
            }
        }

        #[test]
        fn test_random_graphs_terminate_and_partition(
            size in 1usize..16,
            raw_edges in prop::collection::vec((0usize..16, 0usize..16), 0..40),
        ) {
            let n = nodes(size);
            let edges: Vec<_> = raw_edges
                .iter()
                .map(|&(a, b)| (a % size, b % size))
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (n[a].id, n[b].id))
                .collect();

            let outcome = topological_sort(&n, &edges);
            let total = outcome.order.len() + outcome.cyclic.len() + outcome.excluded.len();
            prop_assert_eq!(total, size);
            for (from, to) in &edges {
                if let (Some(f), Some(t)) = (position(&outcome, *from), position(&outcome, *to)) {
                    prop_assert!(f < t);
                }
                // Nothing downstream of an excluded node may be ordered
                if position(&outcome, *from).is_none() {
                    prop_assert!(position(&outcome, *to).is_none());
                }
            }
        }
    }
}
