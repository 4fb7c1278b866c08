// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator records and the fusion test.

use std::collections::BTreeMap;
use std::fmt;

use tensor_core::{TensorId, TensorInfo};
use tracing::debug;

use crate::error::{FusionError, Status};
use crate::graph::{DependencyGraph, OperatorId};

/// Fusion class of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuOperatorType {
    /// Elementwise; may follow any fusable root.
    Simple,
    /// May only root a fused group, e.g. matrix multiplication.
    Complex,
    /// Always runs in a group of its own.
    Unfusable,
}

impl fmt::Display for GpuOperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GpuOperatorType::Simple => "simple",
            GpuOperatorType::Complex => "complex",
            GpuOperatorType::Unfusable => "unfusable",
        };
        f.write_str(s)
    }
}

/// Candidate operator offered to the fusion test.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuOperator {
    id: OperatorId,
    operator_type: GpuOperatorType,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl GpuOperator {
    pub fn id(&self) -> OperatorId {
        self.id
    }

    pub fn operator_type(&self) -> GpuOperatorType {
        self.operator_type
    }

    pub fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn input_ids(&self) -> Vec<TensorId> {
        self.inputs.iter().map(TensorInfo::id).collect()
    }

    fn output_ids(&self) -> Vec<TensorId> {
        self.outputs.iter().map(TensorInfo::id).collect()
    }
}

/// The operators of one sketch, constrained to a single fusable chain.
#[derive(Debug, Clone, Default)]
pub struct GpuOperatorGroup {
    graph: DependencyGraph,
    operators: BTreeMap<OperatorId, GpuOperator>,
}

impl GpuOperatorGroup {
    pub const MAX_FUSED_OPERATORS: usize = 32;

    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record with the next free id. The group is not modified.
    pub fn new_operator(
        &self,
        operator_type: GpuOperatorType,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> GpuOperator {
        GpuOperator {
            id: OperatorId(self.operators.len() as u32),
            operator_type,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        }
    }

    /// The fusion test. `is_output` marks the operator that stores the
    /// group's result to user memory; it is exempt from the type and count
    /// rules.
    pub fn try_add_operator(&self, op: &GpuOperator, is_output: bool) -> Status {
        let reject = |reason: String| {
            debug!("Fusion test rejected {} ({}): {}", op.id, op.operator_type, reason);
            Err(FusionError::FusionTestFailed(reason))
        };

        if !self.graph.try_add_operator_as_linear(op.id, &op.input_ids()) {
            return reject("operator does not extend the chain linearly".into());
        }
        if !is_output && self.operators.len() >= Self::MAX_FUSED_OPERATORS {
            return reject(format!("group already holds {} operators", self.operators.len()));
        }
        if let Some(root) = self.root_operator() {
            if !is_output && root.operator_type == GpuOperatorType::Unfusable {
                return reject("nothing may fuse after an unfusable operator".into());
            }
            if !is_output && op.operator_type != GpuOperatorType::Simple {
                return reject(format!("a {} operator cannot follow the root", op.operator_type));
            }
        }
        if op.operator_type != GpuOperatorType::Unfusable && op.outputs.len() != 1 {
            return reject(format!("expected one destination, got {}", op.outputs.len()));
        }
        if let Some(root) = self.root_operator() {
            let Some(first) = root.outputs.first() else {
                return reject("root operator has no destination".into());
            };
            let reference = first.shape();
            if let Some(t) = root
                .outputs
                .iter()
                .chain(&op.outputs)
                .find(|t| t.shape() != reference)
            {
                return reject(format!(
                    "destination shape {} differs from root shape {}",
                    t.shape(),
                    reference
                ));
            }
        }
        Ok(())
    }

    /// Runs the fusion test and records the operator.
    pub fn add_operator(&mut self, op: GpuOperator, is_output: bool) -> Status {
        self.try_add_operator(&op, is_output)?;
        if !self.graph.add_operator(op.id, &op.input_ids(), &op.output_ids()) {
            return Err(FusionError::FusionTestFailed(
                "operator would introduce a cycle".into(),
            ));
        }
        self.operators.insert(op.id, op);
        Ok(())
    }

    /// Returns `true` if some operator in the group writes `tensor`.
    pub fn produces(&self, tensor: TensorId) -> bool {
        self.graph.producer(tensor).is_some()
    }

    pub fn root_operator(&self) -> Option<&GpuOperator> {
        let roots = self.graph.root_ops();
        roots.first().and_then(|id| self.operators.get(id))
    }

    /// Operators in dependency order.
    pub fn operators(&self) -> Vec<&GpuOperator> {
        self.graph
            .topological_sort()
            .iter()
            .filter_map(|pack| self.operators.get(&pack.op))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, Shape};

    fn info(id: i32, shape: impl Into<Shape>) -> TensorInfo {
        TensorInfo::new(shape, DType::F32).with_id(TensorId(id))
    }

    fn add_simple(group: &mut GpuOperatorGroup, src: i32, dst: i32) -> Status {
        let op = group.new_operator(
            GpuOperatorType::Simple,
            &[info(src, [4, 4])],
            &[info(dst, [4, 4])],
        );
        group.add_operator(op, false)
    }

    #[test]
    fn test_simple_chain_fuses() {
        let mut group = GpuOperatorGroup::new();
        add_simple(&mut group, 1, 2).unwrap();
        add_simple(&mut group, 2, 3).unwrap();
        add_simple(&mut group, 3, 4).unwrap();
        assert_eq!(group.len(), 3);
        let ids: Vec<_> = group.operators().iter().map(|o| o.id()).collect();
        assert_eq!(ids, vec![OperatorId(0), OperatorId(1), OperatorId(2)]);
    }

    #[test]
    fn test_nothing_follows_unfusable_root() {
        let mut group = GpuOperatorGroup::new();
        let softmax = group.new_operator(
            GpuOperatorType::Unfusable,
            &[info(1, [4, 4])],
            &[info(2, [4, 4])],
        );
        group.add_operator(softmax, false).unwrap();
        let err = add_simple(&mut group, 2, 3).unwrap_err();
        assert!(matches!(err, FusionError::FusionTestFailed(_)));
        assert_eq!(group.len(), 1);

        let store = group.new_operator(
            GpuOperatorType::Simple,
            &[info(2, [4, 4])],
            &[info(3, [4, 4])],
        );
        group.add_operator(store, true).unwrap();
    }

    #[test]
    fn test_complex_only_as_root() {
        let mut group = GpuOperatorGroup::new();
        add_simple(&mut group, 1, 2).unwrap();
        let matmul = group.new_operator(
            GpuOperatorType::Complex,
            &[info(2, [4, 4]), info(5, [4, 4])],
            &[info(6, [4, 4])],
        );
        assert!(group.try_add_operator(&matmul, false).is_err());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut group = GpuOperatorGroup::new();
        add_simple(&mut group, 1, 2).unwrap();
        let wide = group.new_operator(
            GpuOperatorType::Simple,
            &[info(2, [4, 4]), info(7, [4, 8])],
            &[info(8, [4, 8])],
        );
        let err = group.try_add_operator(&wide, false).unwrap_err();
        assert!(err.to_string().contains("differs from root shape"));
    }

    #[test]
    fn test_operator_cap() {
        let mut group = GpuOperatorGroup::new();
        for i in 0..GpuOperatorGroup::MAX_FUSED_OPERATORS as i32 {
            add_simple(&mut group, i + 1, i + 2).unwrap();
        }
        let next = GpuOperatorGroup::MAX_FUSED_OPERATORS as i32 + 1;
        assert!(add_simple(&mut group, next, next + 1).is_err());
        assert_eq!(group.len(), GpuOperatorGroup::MAX_FUSED_OPERATORS);
    }

    #[test]
    fn test_try_add_has_no_side_effects() {
        let mut group = GpuOperatorGroup::new();
        add_simple(&mut group, 1, 2).unwrap();
        let op = group.new_operator(GpuOperatorType::Simple, &[info(2, [4, 4])], &[info(3, [4, 4])]);
        group.try_add_operator(&op, false).unwrap();
        group.try_add_operator(&op, false).unwrap();
        assert_eq!(group.len(), 1);
        group.add_operator(op, false).unwrap();
        assert_eq!(group.len(), 2);
    }
}
