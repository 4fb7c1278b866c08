// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use tensor_core::TensorInfo;

use super::{check_dtype, check_source, fusion_test, record_operator, unsupported};
use crate::component_graph::ComponentSpec;
use crate::components::{ComponentKind, GpuComponentType};
use crate::context::GpuWorkloadContext;
use crate::error::{FusionError, Status};
use crate::operator_group::GpuOperatorType;
use crate::sketch::GpuWorkloadSketch;
use crate::source_code::UnitWorkloadStage;

const NAME: &str = "GpuClamp";

/// Bounds of a clamp. Unbounded on both sides by default.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClampAttributes {
    pub min_val: f32,
    pub max_val: f32,
}

impl Default for ClampAttributes {
    fn default() -> Self {
        Self {
            min_val: f32::NEG_INFINITY,
            max_val: f32::INFINITY,
        }
    }
}

impl ClampAttributes {
    pub fn new(min_val: f32, max_val: f32) -> Self {
        Self { min_val, max_val }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GpuClamp;

impl GpuClamp {
    pub fn is_supported_op(context: &GpuWorkloadContext, src: &TensorInfo, attributes: &ClampAttributes) -> Status {
        check_dtype(NAME, context, src)?;
        if attributes.min_val.is_nan() || attributes.max_val.is_nan() || attributes.min_val > attributes.max_val {
            return Err(unsupported(
                NAME,
                format!("invalid bounds [{}, {}]", attributes.min_val, attributes.max_val),
            ));
        }
        Ok(())
    }

    pub fn validate_op(sketch: &GpuWorkloadSketch<'_>, src: &TensorInfo, attributes: &ClampAttributes) -> Status {
        Self::is_supported_op(sketch.gpu_context(), src, attributes)?;
        check_source(NAME, sketch, src)?;
        let dst = TensorInfo::new(src.shape().clone(), src.dtype());
        fusion_test(sketch, GpuOperatorType::Simple, &[src.clone()], &[dst], false)
    }

    /// Returns the virtual destination tensor.
    pub fn create_op(
        sketch: &mut GpuWorkloadSketch<'_>,
        src: &TensorInfo,
        attributes: &ClampAttributes,
    ) -> Result<TensorInfo, FusionError> {
        Self::validate_op(sketch, src, attributes)?;
        let dst = sketch
            .gpu_context()
            .create_virtual_tensor(TensorInfo::new(src.shape().clone(), src.dtype()));
        let inputs = [src.clone()];
        let outputs = [dst.clone()];
        let lowering = vec![ComponentSpec {
            kind: ComponentKind::Clamp {
                min: attributes.min_val,
                max: attributes.max_val,
            },
            component_type: GpuComponentType::Simple,
            stage: UnitWorkloadStage::Run,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        }];
        record_operator(sketch, NAME, GpuOperatorType::Simple, &inputs, &outputs, false, lowering)?;
        Ok(dst)
    }
}
