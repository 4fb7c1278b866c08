// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Generated workload source: unit workloads and the tensors they bind.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tensor_core::{TensorId, TensorInfo};

use crate::context::GpuWorkloadContext;
use crate::error::FusionError;
use crate::memory::MemoryDescriptor;
use crate::writer::{ArgumentAccess, GpuKernelSourceCode};

/// When a unit workload runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitWorkloadStage {
    /// Once, before the first run.
    Prepare,
    /// On every run.
    Run,
}

impl fmt::Display for UnitWorkloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitWorkloadStage::Prepare => f.write_str("prepare"),
            UnitWorkloadStage::Run => f.write_str("run"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct UnitWorkloadId(pub u32);

impl fmt::Display for UnitWorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uw{}", self.0)
    }
}

/// One kernel and the stage it belongs to.
#[derive(Debug, Clone)]
pub struct GpuUnitWorkload {
    id: UnitWorkloadId,
    code: GpuKernelSourceCode,
    stage: UnitWorkloadStage,
}

impl GpuUnitWorkload {
    pub fn id(&self) -> UnitWorkloadId {
        self.id
    }

    pub fn code(&self) -> &GpuKernelSourceCode {
        &self.code
    }

    pub fn stage(&self) -> UnitWorkloadStage {
        self.stage
    }
}

/// How one unit workload passes a tensor to its kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct GpuKernelArgumentBinding {
    pub unit_workload: UnitWorkloadId,
    pub access: ArgumentAccess,
}

/// A tensor bound by at least one unit workload.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuWorkloadArgument {
    pub tensor_info: TensorInfo,
    pub memory_descriptor: MemoryDescriptor,
    /// One entry per referencing kernel, in unit-workload order.
    pub kernel_arguments: Vec<GpuKernelArgumentBinding>,
}

/// Everything the workload runtime needs to build and run a sketch.
#[derive(Debug, Clone, Default)]
pub struct GpuWorkloadSourceCode {
    unit_workloads: BTreeMap<UnitWorkloadId, GpuUnitWorkload>,
    arguments: BTreeMap<TensorId, GpuWorkloadArgument>,
    tensor_workloads: BTreeMap<TensorId, BTreeSet<UnitWorkloadId>>,
}

impl GpuWorkloadSourceCode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unit workload. Ids increase with insertion order.
    pub fn add_unit_workload(
        &mut self,
        code: GpuKernelSourceCode,
        stage: UnitWorkloadStage,
        context: &GpuWorkloadContext,
    ) -> Result<UnitWorkloadId, FusionError> {
        let id = UnitWorkloadId(self.unit_workloads.len() as u32);
        let mut bound = Vec::with_capacity(code.arguments.len());
        for arg in &code.arguments {
            let tensor_info = context
                .tensor_info(arg.tensor)
                .ok_or(FusionError::UnknownTensor(arg.tensor))?;
            let memory_descriptor = context
                .memory_descriptor(arg.tensor)
                .ok_or(FusionError::UnknownTensor(arg.tensor))?;
            bound.push((tensor_info, memory_descriptor, arg.access));
        }
        for (tensor_info, memory_descriptor, access) in bound {
            let tensor = tensor_info.id();
            self.tensor_workloads.entry(tensor).or_default().insert(id);
            self.arguments
                .entry(tensor)
                .or_insert_with(|| GpuWorkloadArgument {
                    tensor_info,
                    memory_descriptor,
                    kernel_arguments: Vec::new(),
                })
                .kernel_arguments
                .push(GpuKernelArgumentBinding {
                    unit_workload: id,
                    access,
                });
        }
        self.unit_workloads
            .insert(id, GpuUnitWorkload { id, code, stage });
        Ok(id)
    }

    /// Unit-workload ids in execution order.
    pub fn unit_workloads(&self) -> Vec<UnitWorkloadId> {
        self.unit_workloads.keys().copied().collect()
    }

    pub fn query_unit_workload(&self, id: UnitWorkloadId) -> Option<&GpuUnitWorkload> {
        self.unit_workloads.get(&id)
    }

    /// Every tensor bound by some unit workload.
    pub fn tensors(&self) -> Vec<TensorId> {
        self.arguments.keys().copied().collect()
    }

    pub fn query_tensor(&self, id: TensorId) -> Option<&GpuWorkloadArgument> {
        self.arguments.get(&id)
    }

    pub fn get_unit_workloads_from_tensor(&self, id: TensorId) -> Vec<UnitWorkloadId> {
        self.tensor_workloads
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.unit_workloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unit_workloads.is_empty()
    }
}
