// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # dynamic-fusion
//!
//! Records GPU operators into a sketch, fuses them into as few kernels as
//! the fusion rules allow, writes OpenCL source for each kernel and runs
//! the result through a workload runtime.
//!
//! The pipeline for one workload:
//! 1. [`GpuWorkloadSketch`] — operators are added through the `create_op`
//!    functions in [`ops`]. Each add runs the fusion test; a rejected
//!    operator leaves the sketch unchanged.
//! 2. [`GpuWorkloadSketch::generate_source_code`] — the component graph is
//!    fused into kernel groups and every group becomes one unit workload
//!    of a [`GpuWorkloadSourceCode`], tagged prepare or run.
//! 3. [`ClWorkloadRuntime`] — builds the kernels, allocates auxiliary
//!    tensors, runs prepare-stage kernels once and run-stage kernels on
//!    every call.
//!
//! There is no device backend: kernels execute on an in-order host queue
//! ([`ClCommandQueue`]) that keeps the asynchronous enqueue contract.
//!
//! # Example
//! ```
//! use dynamic_fusion::ops::{ClampAttributes, GpuAdd, GpuClamp, GpuOutput};
//! use dynamic_fusion::{
//!     ClCompileContext, ClWorkloadRuntime, GpuCapabilities, GpuTarget, GpuWorkloadContext,
//!     GpuWorkloadSketch,
//! };
//! use memory_manager::MemoryPool;
//! use tensor_core::{DType, Tensor, TensorInfo};
//!
//! let context = GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default())
//!     .with_compile_context(ClCompileContext::new("Mali-G710"));
//! let lhs = context.create_tensor_info(TensorInfo::new([2, 2], DType::F32));
//! let rhs = context.create_tensor_info(TensorInfo::new([2, 2], DType::F32));
//! let dst = context.create_tensor_info(TensorInfo::new([2, 2], DType::F32));
//!
//! let mut sketch = GpuWorkloadSketch::new(&context);
//! let sum = GpuAdd::create_op(&mut sketch, &lhs, &rhs).unwrap();
//! let relu6 = GpuClamp::create_op(&mut sketch, &sum, &ClampAttributes::new(0.0, 6.0)).unwrap();
//! GpuOutput::create_op(&mut sketch, &relu6, &dst).unwrap();
//!
//! let pool = MemoryPool::unbounded();
//! let mut runtime = ClWorkloadRuntime::new(&pool);
//! runtime.configure(&sketch).unwrap();
//!
//! let tensors: Vec<_> = [&lhs, &rhs, &dst].iter().map(|i| Tensor::shared((*i).clone())).collect();
//! for t in &tensors {
//!     t.allocate_in(&pool).unwrap();
//! }
//! tensors[0].write_f32(&[1.0, -4.0, 3.0, 5.0]).unwrap();
//! tensors[1].write_f32(&[1.0, 1.0, 1.0, 5.0]).unwrap();
//!
//! runtime.run(&tensors).unwrap();
//! runtime.finish().unwrap();
//! assert_eq!(tensors[2].read_f32().unwrap(), vec![2.0, 0.0, 4.0, 6.0]);
//! ```

pub mod component_graph;
pub mod components;
mod context;
mod error;
pub mod graph;
mod memory;
pub mod operator_group;
pub mod ops;
pub mod runtime;
mod sketch;
pub mod source_code;
pub mod writer;

pub use context::{ClCompileContext, GpuCapabilities, GpuLanguage, GpuTarget, GpuWorkloadContext};
pub use error::{FusionError, Status};
pub use memory::{AuxMemoryInfo, MemoryDescriptor, MemoryType};
pub use runtime::{ClCommandQueue, ClWorkloadRuntime};
pub use sketch::GpuWorkloadSketch;
pub use source_code::{
    GpuKernelArgumentBinding, GpuWorkloadArgument, GpuWorkloadSourceCode, UnitWorkloadId, UnitWorkloadStage,
};
