// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use tensor_core::TensorInfo;

use super::{check_source, check_user_destination, fusion_test, record_operator, unsupported};
use crate::component_graph::ComponentSpec;
use crate::components::{ComponentKind, GpuComponentType};
use crate::context::GpuWorkloadContext;
use crate::error::Status;
use crate::operator_group::GpuOperatorType;
use crate::sketch::GpuWorkloadSketch;
use crate::source_code::UnitWorkloadStage;

const NAME: &str = "GpuOutput";

/// Stores a tensor produced in the sketch into a user tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuOutput;

impl GpuOutput {
    pub fn is_supported_op(_context: &GpuWorkloadContext, src: &TensorInfo, dst: &TensorInfo) -> Status {
        if !src.same_layout(dst) {
            return Err(unsupported(NAME, format!("destination {dst} does not match source {src}")));
        }
        Ok(())
    }

    pub fn validate_op(sketch: &GpuWorkloadSketch<'_>, src: &TensorInfo, dst: &TensorInfo) -> Status {
        Self::is_supported_op(sketch.gpu_context(), src, dst)?;
        check_source(NAME, sketch, src)?;
        check_user_destination(NAME, sketch, dst)?;
        if !sketch.operator_group().produces(src.id()) {
            return Err(unsupported(NAME, format!("{} is not produced in this sketch", src.id())));
        }
        fusion_test(
            sketch,
            GpuOperatorType::Simple,
            &[src.clone()],
            &[dst.clone()],
            true,
        )
    }

    pub fn create_op(sketch: &mut GpuWorkloadSketch<'_>, src: &TensorInfo, dst: &TensorInfo) -> Status {
        Self::validate_op(sketch, src, dst)?;
        let inputs = [src.clone()];
        let outputs = [dst.clone()];
        let lowering = vec![ComponentSpec {
            kind: ComponentKind::Store,
            component_type: GpuComponentType::Output,
            stage: UnitWorkloadStage::Run,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        }];
        record_operator(sketch, NAME, GpuOperatorType::Simple, &inputs, &outputs, true, lowering)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{GpuCapabilities, GpuTarget};
    use crate::ops::{ClampAttributes, GpuClamp};
    use tensor_core::DType;

    #[test]
    fn test_output_binds_virtual_result() {
        let ctx = GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default());
        let src = ctx.create_tensor_info(TensorInfo::new([8], DType::F32));
        let dst = ctx.create_tensor_info(TensorInfo::new([8], DType::F32));
        let mut sketch = GpuWorkloadSketch::new(&ctx);
        let relu6 = GpuClamp::create_op(&mut sketch, &src, &ClampAttributes::new(0.0, 6.0)).unwrap();
        GpuOutput::create_op(&mut sketch, &relu6, &dst).unwrap();

        let code = sketch.generate_source_code().unwrap();
        assert_eq!(code.len(), 1);
        let uw = code.query_unit_workload(code.unit_workloads()[0]).unwrap();
        assert_eq!(uw.code().name, "clamp_store");
        assert!(code.query_tensor(relu6.id()).is_none());
    }

    #[test]
    fn test_output_needs_user_destination() {
        let ctx = GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default());
        let src = ctx.create_tensor_info(TensorInfo::new([8], DType::F32));
        let virt = ctx.create_virtual_tensor(TensorInfo::new([8], DType::F32));
        let mut sketch = GpuWorkloadSketch::new(&ctx);
        let relu = GpuClamp::create_op(&mut sketch, &src, &ClampAttributes::new(0.0, f32::INFINITY)).unwrap();
        assert!(GpuOutput::validate_op(&sketch, &relu, &virt).is_err());
        // The source itself was never produced here.
        let dst = ctx.create_tensor_info(TensorInfo::new([8], DType::F32));
        assert!(GpuOutput::validate_op(&sketch, &src, &dst).is_err());
    }
}
