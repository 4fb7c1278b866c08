// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bipartite dependency graph of operators and tensors.
//!
//! Edges run `tensor -> operator` for inputs and `operator -> tensor` for
//! outputs. The graph is kept acyclic and every tensor has at most one
//! producer. Both the operator group and the kernel component graph are
//! built on it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tensor_core::TensorId;

/// Identifier of an operator or kernel component inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct OperatorId(pub u32);

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Operator(OperatorId),
    Tensor(TensorId),
}

/// An operator with its inputs and outputs, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpPack {
    pub op: OperatorId,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<Node, ()>,
    operators: BTreeMap<OperatorId, NodeIndex>,
    tensors: BTreeMap<TensorId, NodeIndex>,
    op_inputs: BTreeMap<OperatorId, Vec<TensorId>>,
    op_outputs: BTreeMap<OperatorId, Vec<TensorId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether `op` can be appended so that the graph stays a single
    /// linear chain.
    ///
    /// An empty graph accepts anything. Otherwise exactly one input must be
    /// an output of the current tail operator, and every other input that
    /// is already known must be a global input of the graph.
    pub fn try_add_operator_as_linear(&self, op: OperatorId, inputs: &[TensorId]) -> bool {
        if self.operators.contains_key(&op) {
            return false;
        }
        if self.operators.is_empty() {
            return true;
        }
        let tails = self.tail_ops();
        let [tail] = tails.as_slice() else {
            return false;
        };
        let tail_outputs = self.dst_tensors(*tail);

        let mut linked = BTreeSet::new();
        for &t in inputs {
            if !self.tensors.contains_key(&t) {
                continue;
            }
            if tail_outputs.contains(&t) {
                linked.insert(t);
            } else if self.producer(t).is_some() {
                return false;
            }
        }
        linked.len() == 1
    }

    /// Adds `op` with its tensors. Returns `false` and leaves the graph
    /// unchanged if the operator exists, if an output already has a
    /// producer, or if the new edges would close a cycle.
    pub fn add_operator(&mut self, op: OperatorId, inputs: &[TensorId], outputs: &[TensorId]) -> bool {
        if self.operators.contains_key(&op) {
            return false;
        }
        for &out in outputs {
            if inputs.contains(&out) || self.producer(out).is_some() {
                return false;
            }
            let Some(&out_idx) = self.tensors.get(&out) else {
                continue;
            };
            for input in inputs {
                if let Some(&in_idx) = self.tensors.get(input) {
                    if has_path_connecting(&self.graph, out_idx, in_idx, None) {
                        return false;
                    }
                }
            }
        }

        let op_idx = self.graph.add_node(Node::Operator(op));
        self.operators.insert(op, op_idx);
        for &t in inputs {
            let t_idx = self.tensor_node(t);
            self.graph.add_edge(t_idx, op_idx, ());
        }
        for &t in outputs {
            let t_idx = self.tensor_node(t);
            self.graph.add_edge(op_idx, t_idx, ());
        }
        self.op_inputs.insert(op, inputs.to_vec());
        self.op_outputs.insert(op, outputs.to_vec());
        true
    }

    /// Operators in dependency order. Ties are broken by operator id, so
    /// the order is stable across runs.
    pub fn topological_sort(&self) -> Vec<OpPack> {
        let mut in_degree: BTreeMap<OperatorId, usize> = self
            .operators
            .keys()
            .map(|&op| (op, self.src_ops(op).len()))
            .collect();
        let mut ready: BTreeSet<OperatorId> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&op, _)| op)
            .collect();

        let mut sorted = Vec::with_capacity(self.operators.len());
        while let Some(op) = ready.pop_first() {
            sorted.push(OpPack {
                op,
                inputs: self.src_tensors(op),
                outputs: self.dst_tensors(op),
            });
            for next in self.dst_ops(op) {
                if let Some(d) = in_degree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(next);
                    }
                }
            }
        }
        sorted
    }

    pub fn all_ops(&self) -> Vec<OperatorId> {
        self.operators.keys().copied().collect()
    }

    pub fn all_tensors(&self) -> Vec<TensorId> {
        self.tensors.keys().copied().collect()
    }

    pub fn num_ops(&self) -> usize {
        self.operators.len()
    }

    pub fn contains_tensor(&self, tensor: TensorId) -> bool {
        self.tensors.contains_key(&tensor)
    }

    pub fn src_tensors(&self, op: OperatorId) -> Vec<TensorId> {
        self.op_inputs.get(&op).cloned().unwrap_or_default()
    }

    pub fn dst_tensors(&self, op: OperatorId) -> Vec<TensorId> {
        self.op_outputs.get(&op).cloned().unwrap_or_default()
    }

    /// Operators producing any input of `op`.
    pub fn src_ops(&self, op: OperatorId) -> BTreeSet<OperatorId> {
        self.src_tensors(op)
            .into_iter()
            .filter_map(|t| self.producer(t))
            .collect()
    }

    /// Operators consuming any output of `op`.
    pub fn dst_ops(&self, op: OperatorId) -> BTreeSet<OperatorId> {
        self.dst_tensors(op)
            .into_iter()
            .flat_map(|t| self.consumers(t))
            .collect()
    }

    pub fn producer(&self, tensor: TensorId) -> Option<OperatorId> {
        let idx = *self.tensors.get(&tensor)?;
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .find_map(|n| self.operator_at(n))
    }

    pub fn consumers(&self, tensor: TensorId) -> BTreeSet<OperatorId> {
        let Some(&idx) = self.tensors.get(&tensor) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.operator_at(n))
            .collect()
    }

    /// Operators with no predecessor.
    pub fn root_ops(&self) -> Vec<OperatorId> {
        self.operators
            .keys()
            .copied()
            .filter(|&op| self.src_ops(op).is_empty())
            .collect()
    }

    /// Operators whose outputs nobody consumes.
    pub fn tail_ops(&self) -> Vec<OperatorId> {
        self.operators
            .keys()
            .copied()
            .filter(|&op| self.dst_ops(op).is_empty())
            .collect()
    }

    /// Tensors no operator in the graph produces.
    pub fn global_src_tensors(&self) -> Vec<TensorId> {
        self.tensors
            .keys()
            .copied()
            .filter(|&t| self.producer(t).is_none())
            .collect()
    }

    /// Tensors no operator in the graph consumes.
    pub fn global_dst_tensors(&self) -> Vec<TensorId> {
        self.tensors
            .keys()
            .copied()
            .filter(|&t| self.consumers(t).is_empty())
            .collect()
    }

    /// Tensors both produced and consumed inside the graph.
    pub fn intermediate_tensors(&self) -> Vec<TensorId> {
        self.tensors
            .keys()
            .copied()
            .filter(|&t| self.producer(t).is_some() && !self.consumers(t).is_empty())
            .collect()
    }

    fn tensor_node(&mut self, tensor: TensorId) -> NodeIndex {
        if let Some(&idx) = self.tensors.get(&tensor) {
            return idx;
        }
        let idx = self.graph.add_node(Node::Tensor(tensor));
        self.tensors.insert(tensor, idx);
        idx
    }

    fn operator_at(&self, idx: NodeIndex) -> Option<OperatorId> {
        match self.graph[idx] {
            Node::Operator(op) => Some(op),
            Node::Tensor(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(i: i32) -> TensorId {
        TensorId(i)
    }

    fn op(i: u32) -> OperatorId {
        OperatorId(i)
    }

    /// `op0: t1, t2 -> t3`, `op1: t3 -> t4`
    fn chain() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        assert!(g.add_operator(op(0), &[t(1), t(2)], &[t(3)]));
        assert!(g.add_operator(op(1), &[t(3)], &[t(4)]));
        g
    }

    #[test]
    fn test_tensor_classes() {
        let g = chain();
        assert_eq!(g.global_src_tensors(), vec![t(1), t(2)]);
        assert_eq!(g.global_dst_tensors(), vec![t(4)]);
        assert_eq!(g.intermediate_tensors(), vec![t(3)]);
        assert_eq!(g.root_ops(), vec![op(0)]);
        assert_eq!(g.tail_ops(), vec![op(1)]);
    }

    #[test]
    fn test_duplicate_operator_rejected() {
        let mut g = chain();
        assert!(!g.add_operator(op(1), &[t(4)], &[t(5)]));
        assert_eq!(g.num_ops(), 2);
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let mut g = chain();
        let tensors_before = g.all_tensors();
        // t4 is downstream of t1, so writing t1 from t4 would close a loop.
        assert!(!g.add_operator(op(2), &[t(4)], &[t(1)]));
        assert!(!g.add_operator(op(3), &[t(5)], &[t(5)]));
        assert_eq!(g.num_ops(), 2);
        assert_eq!(g.all_tensors(), tensors_before);
        assert!(!g.contains_tensor(t(5)));
    }

    #[test]
    fn test_second_producer_rejected() {
        let mut g = chain();
        assert!(!g.add_operator(op(2), &[t(1)], &[t(4)]));
    }

    #[test]
    fn test_linear_checks() {
        let g = DependencyGraph::new();
        assert!(g.try_add_operator_as_linear(op(0), &[t(1)]));

        let g = chain();
        assert!(g.try_add_operator_as_linear(op(2), &[t(4)]));
        // Extra global input next to the linked tensor is fine.
        assert!(g.try_add_operator_as_linear(op(2), &[t(4), t(1)]));
        assert!(g.try_add_operator_as_linear(op(2), &[t(4), t(9)]));
        // Not connected to the tail.
        assert!(!g.try_add_operator_as_linear(op(2), &[t(9)]));
        // Reads an intermediate tensor: would branch.
        assert!(!g.try_add_operator_as_linear(op(2), &[t(4), t(3)]));
        assert!(!g.try_add_operator_as_linear(op(1), &[t(4)]));
    }

    #[test]
    fn test_topological_sort_is_dependency_ordered() {
        let mut g = DependencyGraph::new();
        // Added out of id order on purpose.
        assert!(g.add_operator(op(5), &[t(3)], &[t(4)]));
        assert!(g.add_operator(op(1), &[t(1)], &[t(3)]));
        assert!(g.add_operator(op(0), &[t(2)], &[t(6)]));
        let order: Vec<_> = g.topological_sort().into_iter().map(|p| p.op).collect();
        assert_eq!(order, vec![op(0), op(1), op(5)]);

        let packs = g.topological_sort();
        assert_eq!(packs[1].inputs, vec![t(1)]);
        assert_eq!(packs[1].outputs, vec![t(3)]);
    }

    #[test]
    fn test_repeated_input() {
        let mut g = DependencyGraph::new();
        assert!(g.add_operator(op(0), &[t(1), t(1)], &[t(2)]));
        assert_eq!(g.src_tensors(op(0)), vec![t(1), t(1)]);
        assert_eq!(g.consumers(t(1)).len(), 1);
    }
}
