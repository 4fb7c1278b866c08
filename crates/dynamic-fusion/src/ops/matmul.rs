// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication.
//!
//! The right-hand side is treated as constant: it is transposed once by a
//! prepare-stage kernel into an auxiliary tensor, and the run-stage kernel
//! reads contiguous rows of both operands.

use tensor_core::ops::matmul_output_shape;
use tensor_core::{Shape, TensorInfo};

use super::{check_dtype, check_source, fusion_test, record_operator, unsupported};
use crate::component_graph::ComponentSpec;
use crate::components::{ComponentKind, GpuComponentType};
use crate::context::GpuWorkloadContext;
use crate::error::{FusionError, Status};
use crate::memory::MemoryType;
use crate::operator_group::GpuOperatorType;
use crate::sketch::GpuWorkloadSketch;
use crate::source_code::UnitWorkloadStage;

const NAME: &str = "GpuMatMul";

#[derive(Debug, Clone, Copy, Default)]
pub struct GpuMatMul;

impl GpuMatMul {
    pub fn is_supported_op(context: &GpuWorkloadContext, lhs: &TensorInfo, rhs: &TensorInfo) -> Status {
        check_dtype(NAME, context, lhs)?;
        if lhs.dtype() != rhs.dtype() {
            return Err(unsupported(NAME, "operands differ in data type"));
        }
        let dst = matmul_output_shape(lhs.shape(), rhs.shape())
            .map_err(|e| unsupported(NAME, e.to_string()))?;
        if dst.num_elements() == 0 {
            return Err(unsupported(NAME, "empty matrix"));
        }
        Ok(())
    }

    pub fn validate_op(sketch: &GpuWorkloadSketch<'_>, lhs: &TensorInfo, rhs: &TensorInfo) -> Status {
        Self::is_supported_op(sketch.gpu_context(), lhs, rhs)?;
        check_source(NAME, sketch, lhs)?;
        check_source(NAME, sketch, rhs)?;
        let rhs_memory = sketch.gpu_context().memory_descriptor(rhs.id()).map(|m| m.memory_type);
        if rhs_memory != Some(MemoryType::User) {
            return Err(unsupported(NAME, "right-hand side must be user memory"));
        }
        let dst = TensorInfo::new(Self::dst_shape(lhs, rhs)?, lhs.dtype());
        fusion_test(
            sketch,
            GpuOperatorType::Complex,
            &[lhs.clone(), rhs.clone()],
            &[dst],
            false,
        )
    }

    /// Returns the virtual `[M, N]` destination tensor.
    pub fn create_op(
        sketch: &mut GpuWorkloadSketch<'_>,
        lhs: &TensorInfo,
        rhs: &TensorInfo,
    ) -> Result<TensorInfo, FusionError> {
        Self::validate_op(sketch, lhs, rhs)?;
        let dst_shape = Self::dst_shape(lhs, rhs)?;
        let (k, n) = (rhs.shape().dims()[0], rhs.shape().dims()[1]);

        let context = sketch.gpu_context();
        let dst = context.create_virtual_tensor(TensorInfo::new(dst_shape, lhs.dtype()));
        let reshaped = context.create_auxiliary_tensor(TensorInfo::new(Shape::matrix(n, k), rhs.dtype()));

        let lowering = vec![
            ComponentSpec {
                kind: ComponentKind::ReshapeRhs,
                component_type: GpuComponentType::Unfusable,
                stage: UnitWorkloadStage::Prepare,
                inputs: vec![rhs.clone()],
                outputs: vec![reshaped.clone()],
            },
            ComponentSpec {
                kind: ComponentKind::MatMul,
                component_type: GpuComponentType::Complex,
                stage: UnitWorkloadStage::Run,
                inputs: vec![lhs.clone(), reshaped],
                outputs: vec![dst.clone()],
            },
        ];
        record_operator(
            sketch,
            NAME,
            GpuOperatorType::Complex,
            &[lhs.clone(), rhs.clone()],
            &[dst.clone()],
            false,
            lowering,
        )?;
        Ok(dst)
    }

    fn dst_shape(lhs: &TensorInfo, rhs: &TensorInfo) -> Result<Shape, FusionError> {
        matmul_output_shape(lhs.shape(), rhs.shape()).map_err(|e| unsupported(NAME, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{GpuCapabilities, GpuTarget};
    use crate::ops::GpuAdd;
    use tensor_core::DType;

    #[test]
    fn test_shapes_checked() {
        let ctx = GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default());
        let lhs = TensorInfo::new([2, 3], DType::F32);
        assert!(GpuMatMul::is_supported_op(&ctx, &lhs, &TensorInfo::new([3, 4], DType::F32)).is_ok());
        assert!(GpuMatMul::is_supported_op(&ctx, &lhs, &TensorInfo::new([2, 4], DType::F32)).is_err());
        assert!(GpuMatMul::is_supported_op(&ctx, &lhs, &TensorInfo::new([3], DType::F32)).is_err());
    }

    #[test]
    fn test_lowers_to_prepare_and_run_components() {
        let ctx = GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default());
        let lhs = ctx.create_tensor_info(TensorInfo::new([2, 3], DType::F32));
        let rhs = ctx.create_tensor_info(TensorInfo::new([3, 4], DType::F32));
        let mut sketch = GpuWorkloadSketch::new(&ctx);
        let dst = GpuMatMul::create_op(&mut sketch, &lhs, &rhs).unwrap();
        assert_eq!(dst.shape(), &Shape::matrix(2, 4));
        assert_eq!(sketch.component_graph().len(), 2);
        // Tensors so far: lhs, rhs, dst, reshaped rhs.
        assert_eq!(ctx.num_tensors(), 4);
    }

    #[test]
    fn test_cannot_follow_another_operator() {
        let ctx = GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default());
        let a = ctx.create_tensor_info(TensorInfo::new([2, 2], DType::F32));
        let w = ctx.create_tensor_info(TensorInfo::new([2, 2], DType::F32));
        let mut sketch = GpuWorkloadSketch::new(&ctx);
        let sum = GpuAdd::create_op(&mut sketch, &a, &a).unwrap();
        let err = GpuMatMul::validate_op(&sketch, &sum, &w).unwrap_err();
        assert!(matches!(err, FusionError::FusionTestFailed(_)));
        assert!(GpuMatMul::create_op(&mut sketch, &sum, &w).is_err());
        assert_eq!(sketch.operator_group().len(), 1);
    }
}
