// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Softmax over the innermost dimension, written straight to user memory.
//!
//! Runs as two kernels: max-shifted exponentials plus row sums into two
//! auxiliary tensors, then normalisation into the destination.

use tensor_core::{Shape, TensorInfo};

use super::{check_dtype, check_source, check_user_destination, fusion_test, record_operator, unsupported};
use crate::component_graph::ComponentSpec;
use crate::components::{ComponentKind, GpuComponentType};
use crate::context::GpuWorkloadContext;
use crate::error::Status;
use crate::operator_group::GpuOperatorType;
use crate::sketch::GpuWorkloadSketch;
use crate::source_code::UnitWorkloadStage;

const NAME: &str = "GpuSoftmax";

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SoftmaxAttributes {
    /// Scale applied to the inputs before exponentiation.
    pub beta: f32,
}

impl Default for SoftmaxAttributes {
    fn default() -> Self {
        Self { beta: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GpuSoftmax;

impl GpuSoftmax {
    pub fn is_supported_op(
        context: &GpuWorkloadContext,
        src: &TensorInfo,
        dst: &TensorInfo,
        attributes: &SoftmaxAttributes,
    ) -> Status {
        check_dtype(NAME, context, src)?;
        if !src.same_layout(dst) {
            return Err(unsupported(NAME, format!("destination {dst} does not match source {src}")));
        }
        if src.shape().rank() == 0 || src.shape().innermost() == 0 {
            return Err(unsupported(NAME, "source has no innermost dimension"));
        }
        if !(attributes.beta.is_finite() && attributes.beta > 0.0) {
            return Err(unsupported(NAME, format!("beta must be positive, got {}", attributes.beta)));
        }
        Ok(())
    }

    pub fn validate_op(
        sketch: &GpuWorkloadSketch<'_>,
        src: &TensorInfo,
        dst: &TensorInfo,
        attributes: &SoftmaxAttributes,
    ) -> Status {
        Self::is_supported_op(sketch.gpu_context(), src, dst, attributes)?;
        check_source(NAME, sketch, src)?;
        check_user_destination(NAME, sketch, dst)?;
        fusion_test(
            sketch,
            GpuOperatorType::Unfusable,
            &[src.clone()],
            &[dst.clone()],
            false,
        )
    }

    pub fn create_op(
        sketch: &mut GpuWorkloadSketch<'_>,
        src: &TensorInfo,
        dst: &TensorInfo,
        attributes: &SoftmaxAttributes,
    ) -> Status {
        Self::validate_op(sketch, src, dst, attributes)?;
        let row_len = src.shape().innermost();
        let rows = src.num_elements() / row_len;

        let context = sketch.gpu_context();
        let exp = context.create_auxiliary_tensor(TensorInfo::new(src.shape().clone(), src.dtype()));
        let sum = context.create_auxiliary_tensor(TensorInfo::new(Shape::vector(rows), src.dtype()));

        let lowering = vec![
            ComponentSpec {
                kind: ComponentKind::SoftmaxExpSum {
                    beta: attributes.beta,
                },
                component_type: GpuComponentType::Unfusable,
                stage: UnitWorkloadStage::Run,
                inputs: vec![src.clone()],
                outputs: vec![exp.clone(), sum.clone()],
            },
            ComponentSpec {
                kind: ComponentKind::SoftmaxNorm,
                component_type: GpuComponentType::Unfusable,
                stage: UnitWorkloadStage::Run,
                inputs: vec![exp, sum],
                outputs: vec![dst.clone()],
            },
        ];
        record_operator(
            sketch,
            NAME,
            GpuOperatorType::Unfusable,
            &[src.clone()],
            &[dst.clone()],
            false,
            lowering,
        )?;
        Ok(())
    }
}
