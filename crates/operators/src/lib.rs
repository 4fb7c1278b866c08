// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # operators
//!
//! The operator execution protocol: how an operator declares the auxiliary
//! memory it needs, how that memory is materialised into tensor packs, and
//! the uniform `run`/`prepare`/`workspace` contract through which every
//! operator is driven.
//!
//! This crate provides:
//! - [`MemoryInfo`] / [`MemoryRequirements`] — per-slot size, alignment and
//!   [`MemoryLifetime`].
//! - [`AuxTensorHandler`] — import-or-allocate resolution of one workspace
//!   slot for the duration of a scope.
//! - [`manage_workspace`] and its companions — the auxiliary-memory state
//!   machine over a [`memory_manager::MemoryGroup`].
//! - [`Operator`] — the contract, plus [`OrAbort`] for fail-fast
//!   configuration.
//! - [`HardwareCapabilities`] and [`DispatchTable`] — capability-matched
//!   kernel selection.
//! - [`CpuScheduler`] — window-splitting parallel execution.
//! - [`cpu`] — concrete operators.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use operators::cpu::CpuSub;
//! use operators::{CpuScheduler, HardwareCapabilities, Operator};
//! use tensor_core::ops::ConvertPolicy;
//! use tensor_core::{DType, Shape, SlotId, Tensor, TensorInfo, TensorPack};
//!
//! let caps = HardwareCapabilities::portable();
//! let info = TensorInfo::new([4, 4], DType::F32);
//! let mut sub = CpuSub::new(Arc::new(CpuScheduler::new(2).unwrap()));
//! sub.configure(&info, &info, &info, ConvertPolicy::Wrap, &caps).unwrap();
//! assert!(sub.workspace().is_empty());
//!
//! let dst = Tensor::shared(info);
//! dst.allocate().unwrap();
//! let mut pack = TensorPack::new();
//! pack.add_const_tensor(SlotId::SRC_0, Tensor::from_f32(Shape::matrix(4, 4), &[2.0; 16]).unwrap());
//! pack.add_const_tensor(SlotId::SRC_1, Tensor::from_f32(Shape::matrix(4, 4), &[0.5; 16]).unwrap());
//! pack.add_tensor(SlotId::DST_0, dst.clone());
//!
//! sub.run(&pack).unwrap();
//! assert_eq!(dst.read_f32().unwrap(), vec![1.5; 16]);
//! ```

mod aux_handler;
mod capabilities;
pub mod cpu;
mod dispatch;
mod error;
mod memory;
mod operator;
mod scheduler;
mod workspace;

pub use aux_handler::{AuxTensorHandler, HandlerAction, HandlerFlags, PackBinding};
pub use capabilities::HardwareCapabilities;
pub use dispatch::{DataLayout, DispatchTable, IsaRequirement, KernelEntry, KernelKey};
pub use error::{OperatorError, OrAbort, Status};
pub use memory::{MemoryInfo, MemoryLifetime, MemoryRequirements};
pub use operator::{require_dst, require_src, Operator, OperatorState};
pub use scheduler::CpuScheduler;
pub use workspace::{
    allocate_tensors, free_prepare_tensors, manage_workspace, mark_in_use, mark_prepared,
    release_prepare_tensors, AuxMemoryState, Workspace, WorkspaceEntry,
};
