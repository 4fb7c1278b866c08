// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sketch → source code → runtime, end to end.

use dynamic_fusion::ops::{
    ClampAttributes, GpuAdd, GpuClamp, GpuMatMul, GpuMul, GpuOutput, GpuSoftmax, SoftmaxAttributes,
};
use dynamic_fusion::writer::ArgumentAccess;
use dynamic_fusion::{
    ClCompileContext, ClWorkloadRuntime, FusionError, GpuCapabilities, GpuKernelArgumentBinding, GpuTarget,
    GpuWorkloadContext, GpuWorkloadSketch, MemoryType, UnitWorkloadStage,
};
use memory_manager::{MemoryBudget, MemoryPool};
use tensor_core::{DType, Tensor, TensorHandle, TensorInfo};

fn context() -> GpuWorkloadContext {
    GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default())
        .with_compile_context(ClCompileContext::new("Mali-G710"))
}

fn materialise(pool: &MemoryPool, info: &TensorInfo, values: Option<&[f32]>) -> TensorHandle {
    let t = Tensor::shared(info.clone());
    t.allocate_in(pool).unwrap();
    if let Some(v) = values {
        t.write_f32(v).unwrap();
    }
    t
}

fn approx_eq(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
}

#[test]
fn test_validate_agrees_with_create() {
    let ctx = context();
    let a = ctx.create_tensor_info(TensorInfo::new([4, 4], DType::F32));
    let b = ctx.create_tensor_info(TensorInfo::new([4, 4], DType::F32));
    let w = ctx.create_tensor_info(TensorInfo::new([4, 4], DType::F32));
    let narrow = ctx.create_tensor_info(TensorInfo::new([4, 8], DType::F32));
    let mut sketch = GpuWorkloadSketch::new(&ctx);

    let sum = {
        GpuAdd::validate_op(&sketch, &a, &b).unwrap();
        GpuAdd::create_op(&mut sketch, &a, &b).unwrap()
    };

    // Each candidate: validation result must predict the create result.
    let attempts: Vec<(bool, bool)> = vec![
        {
            let ok = GpuMatMul::validate_op(&sketch, &sum, &w).is_ok();
            (ok, GpuMatMul::create_op(&mut sketch, &sum, &w).is_ok())
        },
        {
            let ok = GpuMul::validate_op(&sketch, &sum, &narrow).is_ok();
            (ok, GpuMul::create_op(&mut sketch, &sum, &narrow).is_ok())
        },
        {
            let attrs = ClampAttributes::new(-1.0, 1.0);
            let ok = GpuClamp::validate_op(&sketch, &sum, &attrs).is_ok();
            (ok, GpuClamp::create_op(&mut sketch, &sum, &attrs).is_ok())
        },
    ];
    assert_eq!(attempts, vec![(false, false), (false, false), (true, true)]);
    assert_eq!(sketch.operator_group().len(), 2);
}

#[test]
fn test_unit_workloads_follow_dependencies() {
    let ctx = context();
    let lhs = ctx.create_tensor_info(TensorInfo::new([2, 3], DType::F32));
    let rhs = ctx.create_tensor_info(TensorInfo::new([3, 2], DType::F32));
    let bias = ctx.create_tensor_info(TensorInfo::new([2], DType::F32));
    let dst = ctx.create_tensor_info(TensorInfo::new([2, 2], DType::F32));

    let mut sketch = GpuWorkloadSketch::new(&ctx);
    let product = GpuMatMul::create_op(&mut sketch, &lhs, &rhs).unwrap();
    let biased = GpuAdd::create_op(&mut sketch, &product, &bias).unwrap();
    GpuOutput::create_op(&mut sketch, &biased, &dst).unwrap();

    let code = sketch.generate_source_code().unwrap();
    let ids = code.unit_workloads();
    assert_eq!(ids.len(), 2);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let stages: Vec<_> = ids
        .iter()
        .map(|id| code.query_unit_workload(*id).unwrap().stage())
        .collect();
    assert_eq!(stages, vec![UnitWorkloadStage::Prepare, UnitWorkloadStage::Run]);

    // Every tensor written by one workload is read only by later ones.
    for (i, id) in ids.iter().enumerate() {
        let unit = code.query_unit_workload(*id).unwrap();
        for arg in unit.code().arguments.iter().filter(|a| a.access == ArgumentAccess::Write) {
            for reader in code.get_unit_workloads_from_tensor(arg.tensor) {
                if reader != *id {
                    assert!(ids.iter().position(|x| *x == reader).unwrap() > i);
                }
            }
        }
    }

    // The fused intermediate never reaches memory.
    assert!(code.query_tensor(product.id()).is_none());
    assert!(code.query_tensor(biased.id()).is_none());
    let aux: Vec<_> = code
        .tensors()
        .into_iter()
        .filter(|t| code.query_tensor(*t).unwrap().memory_descriptor.memory_type == MemoryType::Auxiliary)
        .collect();
    assert_eq!(aux.len(), 1);
}

#[test]
fn test_tensor_arguments_list_their_kernels() {
    let ctx = context();
    let lhs = ctx.create_tensor_info(TensorInfo::new([4], DType::F32));
    let rhs = ctx.create_tensor_info(TensorInfo::new([4], DType::F32));
    let dst = ctx.create_tensor_info(TensorInfo::new([4], DType::F32));

    let mut sketch = GpuWorkloadSketch::new(&ctx);
    let sum = GpuAdd::create_op(&mut sketch, &lhs, &rhs).unwrap();
    let clamped = GpuClamp::create_op(&mut sketch, &sum, &ClampAttributes::new(0.0, 1.0)).unwrap();
    GpuOutput::create_op(&mut sketch, &clamped, &dst).unwrap();

    let code = sketch.generate_source_code().unwrap();
    let ids = code.unit_workloads();
    assert_eq!(ids.len(), 1);
    let kernel = ids[0];

    let binding = |access| GpuKernelArgumentBinding {
        unit_workload: kernel,
        access,
    };
    for (tensor, access) in [
        (&lhs, ArgumentAccess::Read),
        (&rhs, ArgumentAccess::Read),
        (&dst, ArgumentAccess::Write),
    ] {
        let arg = code.query_tensor(tensor.id()).unwrap();
        assert_eq!(arg.kernel_arguments, vec![binding(access)]);
        assert_eq!(arg.memory_descriptor.memory_type, MemoryType::User);
        assert_eq!(arg.tensor_info.id(), tensor.id());
    }
    assert_eq!(code.tensors().len(), 3);
    assert!(code.query_tensor(sum.id()).is_none());
    assert!(code.query_tensor(clamped.id()).is_none());
}

#[test]
fn test_matmul_bias_runs_and_prepares_once() {
    let ctx = context();
    let lhs = ctx.create_tensor_info(TensorInfo::new([2, 3], DType::F32));
    let rhs = ctx.create_tensor_info(TensorInfo::new([3, 2], DType::F32));
    let bias = ctx.create_tensor_info(TensorInfo::new([2], DType::F32));
    let dst = ctx.create_tensor_info(TensorInfo::new([2, 2], DType::F32));

    let mut sketch = GpuWorkloadSketch::new(&ctx);
    let product = GpuMatMul::create_op(&mut sketch, &lhs, &rhs).unwrap();
    let biased = GpuAdd::create_op(&mut sketch, &product, &bias).unwrap();
    GpuOutput::create_op(&mut sketch, &biased, &dst).unwrap();

    let pool = MemoryPool::new(MemoryBudget::from_mb(1));
    let mut runtime = ClWorkloadRuntime::new(&pool);
    runtime.configure(&sketch).unwrap();
    assert_eq!(runtime.get_auxiliary_tensors().len(), 1);
    assert_eq!(runtime.get_auxiliary_tensors()[0].1.size, 24);

    let tensors = vec![
        materialise(&pool, &lhs, Some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])),
        materialise(&pool, &rhs, Some(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0])),
        materialise(&pool, &bias, Some(&[1.0, -1.0])),
        materialise(&pool, &dst, None),
    ];

    runtime.run(&tensors).unwrap();
    assert!(runtime.is_prepared());
    assert_eq!(runtime.queue().pending(), 2);
    runtime.finish().unwrap();
    assert_eq!(tensors[3].read_f32().unwrap(), vec![59.0, 63.0, 140.0, 153.0]);

    tensors[0].write_f32(&[0.0, 0.0, 1.0, 1.0, 0.0, 0.0]).unwrap();
    runtime.run(&tensors).unwrap();
    assert_eq!(runtime.queue().pending(), 1);
    runtime.finish().unwrap();
    assert_eq!(tensors[3].read_f32().unwrap(), vec![12.0, 11.0, 8.0, 7.0]);
    assert_eq!(runtime.queue().executed(), 3);
}

#[test]
fn test_softmax_falls_back_to_second_workload() {
    let ctx = context();
    let x = ctx.create_tensor_info(TensorInfo::new([2, 3], DType::F32));
    let y = ctx.create_tensor_info(TensorInfo::new([2, 3], DType::F32));
    let hidden = ctx.create_tensor_info(TensorInfo::new([2, 3], DType::F32));
    let probs = ctx.create_tensor_info(TensorInfo::new([2, 3], DType::F32));

    let mut first = GpuWorkloadSketch::new(&ctx);
    let sum = GpuAdd::create_op(&mut first, &x, &y).unwrap();
    let err = GpuSoftmax::create_op(&mut first, &sum, &probs, &SoftmaxAttributes::default()).unwrap_err();
    assert!(matches!(err, FusionError::FusionTestFailed(_)));
    GpuOutput::create_op(&mut first, &sum, &hidden).unwrap();

    let mut second = GpuWorkloadSketch::new(&ctx);
    GpuSoftmax::create_op(&mut second, &hidden, &probs, &SoftmaxAttributes::default()).unwrap();

    let pool = MemoryPool::unbounded();
    let mut add_rt = ClWorkloadRuntime::new(&pool).with_flush_queue(true);
    add_rt.configure(&first).unwrap();
    let mut softmax_rt = ClWorkloadRuntime::new(&pool).with_flush_queue(true);
    softmax_rt.configure(&second).unwrap();
    assert_eq!(softmax_rt.get_auxiliary_tensors().len(), 2);

    let tx = materialise(&pool, &x, Some(&[0.0, 1.0, 2.0, 5.0, 5.0, 5.0]));
    let ty = materialise(&pool, &y, Some(&[0.0; 6]));
    let th = materialise(&pool, &hidden, None);
    let tp = materialise(&pool, &probs, None);

    add_rt.run(&[tx, ty, th.clone()]).unwrap();
    softmax_rt.run(&[th, tp.clone()]).unwrap();
    assert_eq!(softmax_rt.queue().pending(), 0);

    let out = tp.read_f32().unwrap();
    let e = [1.0f32, 1f32.exp(), 2f32.exp()];
    let total: f32 = e.iter().sum();
    let expected_row0: Vec<f32> = e.iter().map(|v| v / total).collect();
    assert!(approx_eq(&out[..3], &expected_row0));
    assert!(approx_eq(&out[3..], &[1.0 / 3.0; 3]));
}

#[test]
fn test_configure_requires_compile_context() {
    let ctx = GpuWorkloadContext::new(GpuTarget::Bifrost, GpuCapabilities::default());
    let a = ctx.create_tensor_info(TensorInfo::new([4], DType::F32));
    let d = ctx.create_tensor_info(TensorInfo::new([4], DType::F32));
    let mut sketch = GpuWorkloadSketch::new(&ctx);
    let r = GpuClamp::create_op(&mut sketch, &a, &ClampAttributes::new(0.0, 1.0)).unwrap();
    GpuOutput::create_op(&mut sketch, &r, &d).unwrap();

    let mut runtime = ClWorkloadRuntime::new(&MemoryPool::unbounded());
    assert!(matches!(runtime.configure(&sketch), Err(FusionError::MissingCompileContext)));
    assert!(matches!(runtime.run(&[]), Err(FusionError::NotConfigured)));
}

#[test]
fn test_binding_errors() {
    let ctx = context();
    let lhs = ctx.create_tensor_info(TensorInfo::new([2, 2], DType::F32));
    let rhs = ctx.create_tensor_info(TensorInfo::new([2, 2], DType::F32));
    let dst = ctx.create_tensor_info(TensorInfo::new([2, 2], DType::F32));
    let mut sketch = GpuWorkloadSketch::new(&ctx);
    let p = GpuMatMul::create_op(&mut sketch, &lhs, &rhs).unwrap();
    GpuOutput::create_op(&mut sketch, &p, &dst).unwrap();

    let pool = MemoryPool::unbounded();
    let mut runtime = ClWorkloadRuntime::new(&pool);
    runtime.configure(&sketch).unwrap();

    let tl = materialise(&pool, &lhs, Some(&[1.0; 4]));
    let tr = materialise(&pool, &rhs, Some(&[1.0; 4]));
    let unallocated = Tensor::shared(dst.clone());
    let err = runtime.run(&[tl.clone(), tr.clone(), unallocated]).unwrap_err();
    assert!(matches!(err, FusionError::UnallocatedTensor(id) if id == dst.id()));

    let td = materialise(&pool, &dst, None);
    let err = runtime
        .run(&[tl.clone(), tr.clone(), td.clone(), tl.clone()])
        .unwrap_err();
    assert!(matches!(err, FusionError::ClashingTensorIds(id) if id == lhs.id()));

    let aux_id = runtime.get_auxiliary_tensors()[0].0.info().id();
    let impostor = materialise(&pool, &TensorInfo::new([2, 2], DType::F32).with_id(aux_id), None);
    let err = runtime
        .run(&[tl.clone(), tr.clone(), td.clone(), impostor])
        .unwrap_err();
    assert!(matches!(err, FusionError::ClashingTensorIds(id) if id == aux_id));

    // Leaving out a kernel argument fails at enqueue time.
    let err = runtime.run(&[tl, td]).unwrap_err();
    assert!(matches!(err, FusionError::MissingTensor(id) if id == rhs.id()));
    assert_eq!(runtime.queue().pending(), 0);
    assert!(!runtime.is_prepared());
}
