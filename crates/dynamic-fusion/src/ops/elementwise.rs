// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Broadcasting elementwise binary operators.

use tensor_core::ops::ArithmeticOp;
use tensor_core::{Shape, TensorInfo};

use super::{check_dtype, check_source, fusion_test, record_operator, unsupported};
use crate::component_graph::ComponentSpec;
use crate::components::{ComponentKind, GpuComponentType};
use crate::context::GpuWorkloadContext;
use crate::error::{FusionError, Status};
use crate::operator_group::GpuOperatorType;
use crate::sketch::GpuWorkloadSketch;
use crate::source_code::UnitWorkloadStage;

fn output_shape(op: &'static str, lhs: &TensorInfo, rhs: &TensorInfo) -> Result<Shape, FusionError> {
    lhs.shape()
        .broadcast_with(rhs.shape())
        .ok_or_else(|| unsupported(op, format!("shapes {} and {} do not broadcast", lhs.shape(), rhs.shape())))
}

fn is_supported(op: &'static str, context: &GpuWorkloadContext, lhs: &TensorInfo, rhs: &TensorInfo) -> Status {
    check_dtype(op, context, lhs)?;
    if lhs.dtype() != rhs.dtype() {
        return Err(unsupported(op, format!("mixed data types {} and {}", lhs.dtype(), rhs.dtype())));
    }
    output_shape(op, lhs, rhs).map(|_| ())
}

fn validate(op: &'static str, sketch: &GpuWorkloadSketch<'_>, lhs: &TensorInfo, rhs: &TensorInfo) -> Status {
    is_supported(op, sketch.gpu_context(), lhs, rhs)?;
    check_source(op, sketch, lhs)?;
    check_source(op, sketch, rhs)?;
    let dst = TensorInfo::new(output_shape(op, lhs, rhs)?, lhs.dtype());
    fusion_test(
        sketch,
        GpuOperatorType::Simple,
        &[lhs.clone(), rhs.clone()],
        &[dst],
        false,
    )
}

fn create(
    op: &'static str,
    arithmetic: ArithmeticOp,
    sketch: &mut GpuWorkloadSketch<'_>,
    lhs: &TensorInfo,
    rhs: &TensorInfo,
) -> Result<TensorInfo, FusionError> {
    validate(op, sketch, lhs, rhs)?;
    let shape = output_shape(op, lhs, rhs)?;
    let dst = sketch
        .gpu_context()
        .create_virtual_tensor(TensorInfo::new(shape, lhs.dtype()));
    let inputs = [lhs.clone(), rhs.clone()];
    let outputs = [dst.clone()];
    let lowering = vec![ComponentSpec {
        kind: ComponentKind::ElementwiseBinary { op: arithmetic },
        component_type: GpuComponentType::Simple,
        stage: UnitWorkloadStage::Run,
        inputs: inputs.to_vec(),
        outputs: outputs.to_vec(),
    }];
    record_operator(sketch, op, GpuOperatorType::Simple, &inputs, &outputs, false, lowering)?;
    Ok(dst)
}

macro_rules! elementwise_operator {
    ($name:ident, $arithmetic:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl $name {
            pub fn is_supported_op(
                context: &GpuWorkloadContext,
                lhs: &TensorInfo,
                rhs: &TensorInfo,
            ) -> Status {
                is_supported(stringify!($name), context, lhs, rhs)
            }

            pub fn validate_op(sketch: &GpuWorkloadSketch<'_>, lhs: &TensorInfo, rhs: &TensorInfo) -> Status {
                validate(stringify!($name), sketch, lhs, rhs)
            }

            /// Returns the virtual destination tensor.
            pub fn create_op(
                sketch: &mut GpuWorkloadSketch<'_>,
                lhs: &TensorInfo,
                rhs: &TensorInfo,
            ) -> Result<TensorInfo, FusionError> {
                create(stringify!($name), $arithmetic, sketch, lhs, rhs)
            }
        }
    };
}

elementwise_operator!(GpuAdd, ArithmeticOp::Add, "Elementwise addition with broadcasting.");
elementwise_operator!(GpuSub, ArithmeticOp::Sub, "Elementwise subtraction with broadcasting.");
elementwise_operator!(GpuMul, ArithmeticOp::Mul, "Elementwise multiplication with broadcasting.");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{GpuCapabilities, GpuTarget};
    use tensor_core::DType;

    fn ctx() -> GpuWorkloadContext {
        GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default())
    }

    #[test]
    fn test_create_returns_virtual_destination() {
        let ctx = ctx();
        let a = ctx.create_tensor_info(TensorInfo::new([2, 3], DType::F32));
        let b = ctx.create_tensor_info(TensorInfo::new([3], DType::F32));
        let mut sketch = GpuWorkloadSketch::new(&ctx);
        let dst = GpuAdd::create_op(&mut sketch, &a, &b).unwrap();
        assert_eq!(dst.shape(), &Shape::matrix(2, 3));
        assert!(!ctx.memory_descriptor(dst.id()).unwrap().is_materialised());
        assert_eq!(sketch.operator_group().len(), 1);
        assert_eq!(sketch.component_graph().len(), 1);
    }

    #[test]
    fn test_unsupported_dtypes() {
        let ctx = ctx();
        let q = TensorInfo::new([4], DType::QAsymm8);
        assert!(GpuSub::is_supported_op(&ctx, &q, &q).is_err());
        let h = TensorInfo::new([4], DType::F16);
        assert!(GpuSub::is_supported_op(&ctx, &h, &h).is_err());
        let fp16 = GpuWorkloadContext::new(
            GpuTarget::Valhall,
            GpuCapabilities {
                fp16: true,
                ..GpuCapabilities::default()
            },
        );
        assert!(GpuSub::is_supported_op(&fp16, &h, &h).is_ok());
        let f = TensorInfo::new([4], DType::F32);
        assert!(GpuMul::is_supported_op(&fp16, &h, &f).is_err());
    }

    #[test]
    fn test_non_broadcastable_shapes() {
        let ctx = ctx();
        let a = TensorInfo::new([2, 3], DType::F32);
        let b = TensorInfo::new([2], DType::F32);
        let err = GpuMul::is_supported_op(&ctx, &a, &b).unwrap_err();
        assert!(err.to_string().contains("do not broadcast"));
    }

    #[test]
    fn test_unregistered_input_rejected() {
        let ctx = ctx();
        let mut sketch = GpuWorkloadSketch::new(&ctx);
        let loose = TensorInfo::new([4], DType::F32);
        let err = GpuAdd::create_op(&mut sketch, &loose, &loose).unwrap_err();
        assert!(matches!(err, FusionError::UnknownTensor(_)));
        assert!(sketch.is_empty());
    }
}
