// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Kernel components: the building blocks a fused kernel is written from.
//!
//! A sketch operator lowers to one or more components. The component graph
//! then groups components into kernels.

use std::fmt;

use tensor_core::ops::ArithmeticOp;
use tensor_core::TensorInfo;

use crate::graph::OperatorId;
use crate::source_code::UnitWorkloadStage;

pub type ComponentId = OperatorId;

/// Fusion class of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuComponentType {
    Simple,
    Complex,
    Unfusable,
    /// Stores a result to memory; closes a kernel.
    Output,
}

/// What a component computes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentKind {
    ElementwiseBinary { op: ArithmeticOp },
    Clamp { min: f32, max: f32 },
    /// `[K, N]` to `[N, K]`.
    ReshapeRhs,
    /// `lhs [M, K]` times a reshaped `rhs [N, K]`.
    MatMul,
    /// Max-shifted exponentials and their row sums.
    SoftmaxExpSum { beta: f32 },
    SoftmaxNorm,
    Store,
}

impl ComponentKind {
    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::ElementwiseBinary { op } => op.name(),
            ComponentKind::Clamp { .. } => "clamp",
            ComponentKind::ReshapeRhs => "reshape_rhs",
            ComponentKind::MatMul => "matmul",
            ComponentKind::SoftmaxExpSum { .. } => "softmax_exp_sum",
            ComponentKind::SoftmaxNorm => "softmax_norm",
            ComponentKind::Store => "store",
        }
    }

    /// Name of the tera template the component is written with.
    pub(crate) fn template(&self) -> &'static str {
        match self {
            ComponentKind::ElementwiseBinary { .. } => "elementwise",
            other => other.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelComponent {
    id: ComponentId,
    kind: ComponentKind,
    component_type: GpuComponentType,
    stage: UnitWorkloadStage,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl KernelComponent {
    pub(crate) fn new(
        id: ComponentId,
        kind: ComponentKind,
        component_type: GpuComponentType,
        stage: UnitWorkloadStage,
        inputs: Vec<TensorInfo>,
        outputs: Vec<TensorInfo>,
    ) -> Self {
        Self {
            id,
            kind,
            component_type,
            stage,
            inputs,
            outputs,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn component_type(&self) -> GpuComponentType {
        self.component_type
    }

    pub fn stage(&self) -> UnitWorkloadStage {
        self.stage
    }

    pub fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }
}

impl fmt::Display for KernelComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind.name(), self.id.0)
    }
}
