// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sketch operators.
//!
//! Every operator exposes the same three entry points:
//! - `is_supported_op` checks the arguments against the context only;
//! - `validate_op` additionally runs the fusion test against a sketch;
//! - `create_op` validates, then records the operator and its kernel
//!   components and returns the destination info.

mod clamp;
mod elementwise;
mod matmul;
mod output;
mod softmax;

pub use clamp::{ClampAttributes, GpuClamp};
pub use elementwise::{GpuAdd, GpuMul, GpuSub};
pub use matmul::GpuMatMul;
pub use output::GpuOutput;
pub use softmax::{GpuSoftmax, SoftmaxAttributes};

use tensor_core::{DType, TensorInfo};

use crate::component_graph::ComponentSpec;
use crate::context::GpuWorkloadContext;
use crate::error::{FusionError, Status};
use crate::memory::MemoryType;
use crate::operator_group::GpuOperatorType;
use crate::sketch::GpuWorkloadSketch;

fn unsupported(op: &'static str, reason: impl Into<String>) -> FusionError {
    FusionError::UnsupportedOperator {
        op,
        reason: reason.into(),
    }
}

/// F32 always, F16 only on devices with half-precision arithmetic.
fn check_dtype(op: &'static str, context: &GpuWorkloadContext, info: &TensorInfo) -> Status {
    match info.dtype() {
        DType::F32 => Ok(()),
        DType::F16 if context.capabilities().fp16 => Ok(()),
        DType::F16 => Err(unsupported(op, "device has no fp16 support")),
        other => Err(unsupported(op, format!("data type {other}"))),
    }
}

/// Sketch arguments must come from the context, and a virtual input must be
/// produced earlier in the same sketch.
fn check_source(op: &'static str, sketch: &GpuWorkloadSketch<'_>, info: &TensorInfo) -> Status {
    let memory = sketch
        .gpu_context()
        .memory_descriptor(info.id())
        .ok_or(FusionError::UnknownTensor(info.id()))?;
    if memory.memory_type == MemoryType::Virtual && !sketch.operator_group().produces(info.id()) {
        return Err(unsupported(
            op,
            format!("virtual tensor {} is not produced in this sketch", info.id()),
        ));
    }
    Ok(())
}

/// The destination of an operator that writes user memory directly.
fn check_user_destination(op: &'static str, sketch: &GpuWorkloadSketch<'_>, dst: &TensorInfo) -> Status {
    let memory = sketch
        .gpu_context()
        .memory_descriptor(dst.id())
        .ok_or(FusionError::UnknownTensor(dst.id()))?;
    if memory.memory_type != MemoryType::User {
        return Err(unsupported(op, format!("destination {} must be user memory", dst.id())));
    }
    if sketch.operator_group().produces(dst.id()) {
        return Err(unsupported(op, format!("destination {} is already written", dst.id())));
    }
    Ok(())
}

fn fusion_test(
    sketch: &GpuWorkloadSketch<'_>,
    operator_type: GpuOperatorType,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
    is_output: bool,
) -> Status {
    let group = sketch.operator_group();
    let candidate = group.new_operator(operator_type, inputs, outputs);
    group.try_add_operator(&candidate, is_output)
}

/// Records an already validated operator together with the components it
/// lowers to. Either all of it is added or the sketch is left unchanged.
fn record_operator(
    sketch: &mut GpuWorkloadSketch<'_>,
    op_name: &'static str,
    operator_type: GpuOperatorType,
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
    is_output: bool,
    lowering: Vec<ComponentSpec>,
) -> Status {
    let (group, graph) = sketch.parts_mut();
    let staged = graph
        .stage_components(lowering)
        .ok_or_else(|| unsupported(op_name, "component graph rejected the lowering"))?;
    let op = group.new_operator(operator_type, inputs, outputs);
    group.add_operator(op, is_output)?;
    graph.commit_components(staged);
    Ok(())
}
