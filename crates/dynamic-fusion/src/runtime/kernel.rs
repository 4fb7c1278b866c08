// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Built kernels and their host execution.

use std::collections::{BTreeMap, BTreeSet};

use tensor_core::ops::{broadcast_binary, exp_sum_rows, gemm_bt_rows, normalize_rows, transpose_2d};
use tensor_core::{TensorHandle, TensorId};

use crate::components::{ComponentKind, KernelComponent};
use crate::context::ClCompileContext;
use crate::error::FusionError;
use crate::source_code::{GpuUnitWorkload, UnitWorkloadStage};
use crate::writer::{GpuKernelArgument, Window};

/// Tensors bound for one enqueue, keyed by sketch id.
pub type TensorLookupTable = BTreeMap<TensorId, TensorHandle>;

/// A unit workload built for a device.
#[derive(Debug, Clone)]
pub struct ClKernel {
    name: String,
    config_id: String,
    build_options: Vec<String>,
    stage: UnitWorkloadStage,
    window: Window,
    arguments: Vec<GpuKernelArgument>,
    program: Vec<KernelComponent>,
}

impl ClKernel {
    pub(crate) fn build(unit: &GpuUnitWorkload, compile_context: &ClCompileContext) -> Result<Self, FusionError> {
        let code = unit.code();
        let entry = format!("__kernel void {}(", code.name);
        if !code.code.contains(&entry) {
            return Err(FusionError::KernelBuild {
                kernel: code.name.clone(),
                reason: "entry point not found in source".into(),
            });
        }
        if code.program.is_empty() {
            return Err(FusionError::KernelBuild {
                kernel: code.name.clone(),
                reason: "kernel has no components".into(),
            });
        }
        let mut build_options = code.build_options.clone();
        build_options.extend(compile_context.build_options.iter().cloned());
        Ok(Self {
            name: code.name.clone(),
            config_id: code.config_id.clone(),
            build_options,
            stage: unit.stage(),
            window: code.window,
            arguments: code.arguments.clone(),
            program: code.program.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    pub fn build_options(&self) -> &[String] {
        &self.build_options
    }

    pub fn stage(&self) -> UnitWorkloadStage {
        self.stage
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn arguments(&self) -> &[GpuKernelArgument] {
        &self.arguments
    }

    /// Fails with [`FusionError::MissingTensor`] on the first argument
    /// without a tensor in `lut`.
    pub(crate) fn check_arguments(&self, lut: &TensorLookupTable) -> Result<(), FusionError> {
        match self.arguments.iter().find(|a| !lut.contains_key(&a.tensor)) {
            Some(missing) => Err(FusionError::MissingTensor(missing.tensor)),
            None => Ok(()),
        }
    }

    /// Runs the kernel's components on the host.
    ///
    /// Argument tensors are read from and written to `lut`; virtual
    /// tensors live in local buffers for the duration of the call.
    pub(crate) fn execute(&self, lut: &TensorLookupTable) -> Result<(), FusionError> {
        self.check_arguments(lut)?;
        let bound: BTreeSet<TensorId> = self.arguments.iter().map(|a| a.tensor).collect();
        let mut locals: BTreeMap<TensorId, Vec<f32>> = BTreeMap::new();

        for component in &self.program {
            let mut srcs = Vec::with_capacity(component.inputs().len());
            for t in component.inputs() {
                let values = match locals.get(&t.id()) {
                    Some(v) => v.clone(),
                    None => lut
                        .get(&t.id())
                        .ok_or(FusionError::MissingTensor(t.id()))?
                        .to_f32_vec()?,
                };
                srcs.push(values);
            }

            let results = compute(component, &srcs);
            for (info, values) in component.outputs().iter().zip(results) {
                if bound.contains(&info.id()) {
                    lut.get(&info.id())
                        .ok_or(FusionError::MissingTensor(info.id()))?
                        .write_from_f32(&values)?;
                } else {
                    locals.insert(info.id(), values);
                }
            }
        }
        Ok(())
    }
}

fn compute(component: &KernelComponent, srcs: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let inputs = component.inputs();
    let out_len = |i: usize| component.outputs().get(i).map_or(0, |t| t.num_elements());
    match component.kind() {
        ComponentKind::ElementwiseBinary { op } => {
            let out_shape = component.outputs()[0].shape();
            let mut out = vec![0.0f32; out_len(0)];
            broadcast_binary(
                &srcs[0],
                inputs[0].shape(),
                &srcs[1],
                inputs[1].shape(),
                out_shape,
                0,
                &mut out,
                |a, b| op.apply_f32(a, b),
            );
            vec![out]
        }
        ComponentKind::Clamp { min, max } => {
            vec![srcs[0].iter().map(|&x| x.max(min).min(max)).collect()]
        }
        ComponentKind::Store => vec![srcs[0].clone()],
        ComponentKind::ReshapeRhs => {
            let dims = inputs[0].shape().dims();
            vec![transpose_2d(&srcs[0], dims[0], dims[1])]
        }
        ComponentKind::MatMul => {
            let k = inputs[0].shape().innermost();
            let n = component.outputs()[0].shape().innermost();
            let mut out = vec![0.0f32; out_len(0)];
            gemm_bt_rows(&srcs[0], &srcs[1], k, n, 1.0, 0, &mut out);
            vec![out]
        }
        ComponentKind::SoftmaxExpSum { beta } => {
            let row_len = inputs[0].shape().innermost();
            let scaled: Vec<f32> = srcs[0].iter().map(|&x| x * beta).collect();
            let mut exp = vec![0.0f32; out_len(0)];
            let mut sums = vec![0.0f32; out_len(1)];
            exp_sum_rows(&scaled, row_len, &mut exp, &mut sums);
            vec![exp, sums]
        }
        ComponentKind::SoftmaxNorm => {
            let row_len = inputs[0].shape().innermost();
            let mut out = vec![0.0f32; out_len(0)];
            normalize_rows(&srcs[0], &srcs[1], row_len, &mut out);
            vec![out]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::GpuComponentType;
    use crate::graph::OperatorId;
    use tensor_core::{DType, Shape, Tensor, TensorInfo};

    fn user(id: i32, shape: impl Into<Shape>, values: &[f32]) -> TensorHandle {
        let t = Tensor::shared(TensorInfo::new(shape, DType::F32).with_id(TensorId(id)));
        t.allocate().unwrap();
        t.write_f32(values).unwrap();
        t
    }

    fn kernel(program: Vec<KernelComponent>, arguments: Vec<GpuKernelArgument>) -> ClKernel {
        ClKernel {
            name: "test".into(),
            config_id: "test".into(),
            build_options: Vec::new(),
            stage: UnitWorkloadStage::Run,
            window: Window::new(0),
            arguments,
            program,
        }
    }

    #[test]
    fn test_virtual_intermediate_stays_local() {
        use crate::writer::ArgumentAccess::{Read, Write};
        let a = user(1, [2, 2], &[1.0, -2.0, 3.0, -4.0]);
        let b = user(2, [2], &[1.0, 1.0]);
        let out = user(4, [2, 2], &[0.0; 4]);
        let sum_info = TensorInfo::new([2, 2], DType::F32).with_id(TensorId(3));

        let add = KernelComponent::new(
            OperatorId(0),
            ComponentKind::ElementwiseBinary {
                op: tensor_core::ops::ArithmeticOp::Add,
            },
            GpuComponentType::Simple,
            UnitWorkloadStage::Run,
            vec![a.info(), b.info()],
            vec![sum_info.clone()],
        );
        let relu = KernelComponent::new(
            OperatorId(1),
            ComponentKind::Clamp {
                min: 0.0,
                max: f32::INFINITY,
            },
            GpuComponentType::Simple,
            UnitWorkloadStage::Run,
            vec![sum_info],
            vec![out.info()],
        );
        let args = vec![
            GpuKernelArgument { tensor: TensorId(1), access: Read },
            GpuKernelArgument { tensor: TensorId(2), access: Read },
            GpuKernelArgument { tensor: TensorId(4), access: Write },
        ];
        let k = kernel(vec![add, relu], args);

        let mut lut = TensorLookupTable::new();
        for t in [&a, &b, &out] {
            lut.insert(t.info().id(), t.clone());
        }
        k.execute(&lut).unwrap();
        assert_eq!(out.read_f32().unwrap(), vec![2.0, 0.0, 4.0, 0.0]);

        lut.remove(&TensorId(2));
        assert!(matches!(k.execute(&lut), Err(FusionError::MissingTensor(TensorId(2)))));
    }
}
