// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The workload context: target description and tensor registry.
//!
//! Every tensor a sketch touches is registered here and receives a unique
//! positive [`TensorId`]. Several sketches may share one context, which is
//! how a caller falls back to a second workload when an operator fails the
//! fusion test.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;

use tensor_core::{TensorId, TensorInfo};
use tracing::debug;

use crate::memory::{AuxMemoryInfo, MemoryDescriptor};

/// Kernel language emitted for the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum GpuLanguage {
    OpenCl,
}

/// GPU architecture family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuTarget {
    Midgard,
    #[default]
    Bifrost,
    Valhall,
}

impl fmt::Display for GpuTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GpuTarget::Midgard => "midgard",
            GpuTarget::Bifrost => "bifrost",
            GpuTarget::Valhall => "valhall",
        };
        f.write_str(s)
    }
}

/// Device features that gate operator support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GpuCapabilities {
    pub fp16: bool,
    pub max_work_group_size: usize,
}

impl Default for GpuCapabilities {
    fn default() -> Self {
        Self {
            fp16: false,
            max_work_group_size: 256,
        }
    }
}

/// Compiler settings needed to build kernels for a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClCompileContext {
    pub device_name: String,
    pub build_options: Vec<String>,
}

impl ClCompileContext {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            build_options: vec!["-cl-fast-relaxed-math".to_string()],
        }
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.build_options.push(option.into());
        self
    }
}

#[derive(Debug, Clone)]
struct RegisteredTensor {
    info: TensorInfo,
    memory: MemoryDescriptor,
}

/// Target description plus the registry of every sketch tensor.
#[derive(Debug)]
pub struct GpuWorkloadContext {
    language: GpuLanguage,
    target: GpuTarget,
    capabilities: GpuCapabilities,
    compile_context: Option<ClCompileContext>,
    next_id: Cell<i32>,
    tensors: RefCell<BTreeMap<TensorId, RegisteredTensor>>,
}

impl GpuWorkloadContext {
    pub fn new(target: GpuTarget, capabilities: GpuCapabilities) -> Self {
        Self {
            language: GpuLanguage::OpenCl,
            target,
            capabilities,
            compile_context: None,
            next_id: Cell::new(1),
            tensors: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with_compile_context(mut self, compile_context: ClCompileContext) -> Self {
        self.compile_context = Some(compile_context);
        self
    }

    pub fn gpu_language(&self) -> GpuLanguage {
        self.language
    }

    pub fn gpu_target(&self) -> GpuTarget {
        self.target
    }

    pub fn capabilities(&self) -> GpuCapabilities {
        self.capabilities
    }

    pub fn compile_context(&self) -> Option<&ClCompileContext> {
        self.compile_context.as_ref()
    }

    /// Registers a caller-owned tensor and returns its info with a fresh id.
    pub fn create_tensor_info(&self, info: TensorInfo) -> TensorInfo {
        self.register(info, MemoryDescriptor::user())
    }

    /// Registers a tensor that only exists inside a kernel.
    pub fn create_virtual_tensor(&self, info: TensorInfo) -> TensorInfo {
        self.register(info, MemoryDescriptor::virtual_tensor())
    }

    /// Registers a tensor the workload runtime will allocate.
    pub fn create_auxiliary_tensor(&self, info: TensorInfo) -> TensorInfo {
        let aux = AuxMemoryInfo::new(info.total_size());
        self.register(info, MemoryDescriptor::auxiliary(aux))
    }

    pub fn memory_descriptor(&self, id: TensorId) -> Option<MemoryDescriptor> {
        self.tensors.borrow().get(&id).map(|t| t.memory)
    }

    pub fn tensor_info(&self, id: TensorId) -> Option<TensorInfo> {
        self.tensors.borrow().get(&id).map(|t| t.info.clone())
    }

    /// Returns `true` if `info` carries an id issued by this context.
    pub fn is_registered(&self, info: &TensorInfo) -> bool {
        self.tensors.borrow().contains_key(&info.id())
    }

    pub fn num_tensors(&self) -> usize {
        self.tensors.borrow().len()
    }

    fn register(&self, info: TensorInfo, memory: MemoryDescriptor) -> TensorInfo {
        let id = TensorId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let info = info.with_id(id);
        debug!("Registered {} tensor {}", memory.memory_type, info);
        self.tensors.borrow_mut().insert(
            id,
            RegisteredTensor {
                info: info.clone(),
                memory,
            },
        );
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryType;
    use tensor_core::DType;

    #[test]
    fn test_ids_are_unique_and_positive() {
        let ctx = GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default());
        let a = ctx.create_tensor_info(TensorInfo::new([4, 4], DType::F32));
        let b = ctx.create_virtual_tensor(TensorInfo::new([4, 4], DType::F32));
        let c = ctx.create_auxiliary_tensor(TensorInfo::new([4], DType::F32));
        assert!(a.id().is_valid());
        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_eq!(ctx.num_tensors(), 3);
    }

    #[test]
    fn test_descriptors_follow_creation_kind() {
        let ctx = GpuWorkloadContext::new(GpuTarget::default(), GpuCapabilities::default());
        let user = ctx.create_tensor_info(TensorInfo::new([2], DType::F32));
        let aux = ctx.create_auxiliary_tensor(TensorInfo::new([8], DType::F32));
        assert_eq!(
            ctx.memory_descriptor(user.id()).map(|d| d.memory_type),
            Some(MemoryType::User)
        );
        let aux_desc = ctx.memory_descriptor(aux.id()).unwrap();
        assert_eq!(aux_desc.aux_info.unwrap().size, 32);
        assert!(ctx.memory_descriptor(TensorId(99)).is_none());
    }

    #[test]
    fn test_unregistered_info() {
        let ctx = GpuWorkloadContext::new(GpuTarget::default(), GpuCapabilities::default());
        assert!(!ctx.is_registered(&TensorInfo::new([2], DType::F32)));
        assert!(ctx.compile_context().is_none());
        let ctx = ctx.with_compile_context(ClCompileContext::new("Mali-G78"));
        assert_eq!(ctx.compile_context().unwrap().device_name, "Mali-G78");
    }
}
