// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Workload runtime: builds a sketch's kernels and runs them.

mod kernel;
mod queue;

pub use kernel::{ClKernel, TensorLookupTable};
pub use queue::ClCommandQueue;

use std::collections::BTreeMap;
use std::sync::Arc;

use memory_manager::MemoryPool;
use tensor_core::{Tensor, TensorHandle};
use tracing::{debug, info};

use crate::error::FusionError;
use crate::memory::{AuxMemoryInfo, MemoryType};
use crate::sketch::GpuWorkloadSketch;
use crate::source_code::{UnitWorkloadId, UnitWorkloadStage};

/// Runs one configured workload.
///
/// ```text
/// configure(sketch) -> [prepare()] -> run(tensors) -> run(tensors) ...
/// ```
///
/// `run` enqueues without waiting; call [`ClWorkloadRuntime::finish`]
/// before reading results.
#[derive(Debug)]
pub struct ClWorkloadRuntime {
    pool: MemoryPool,
    queue: ClCommandQueue,
    flush_queue: bool,
    prepare_kernels: BTreeMap<UnitWorkloadId, Arc<ClKernel>>,
    run_kernels: BTreeMap<UnitWorkloadId, Arc<ClKernel>>,
    aux_tensors: Vec<(TensorHandle, AuxMemoryInfo)>,
    lut: TensorLookupTable,
    configured: bool,
    prepared: bool,
}

impl ClWorkloadRuntime {
    /// Auxiliary tensors are allocated from `pool`.
    pub fn new(pool: &MemoryPool) -> Self {
        Self {
            pool: pool.clone(),
            queue: ClCommandQueue::new(),
            flush_queue: false,
            prepare_kernels: BTreeMap::new(),
            run_kernels: BTreeMap::new(),
            aux_tensors: Vec::new(),
            lut: TensorLookupTable::new(),
            configured: false,
            prepared: false,
        }
    }

    /// Drain the queue after every enqueue.
    pub fn with_flush_queue(mut self, flush_queue: bool) -> Self {
        self.flush_queue = flush_queue;
        self
    }

    /// Generates the sketch's source, builds every unit workload and
    /// allocates the auxiliary tensors.
    pub fn configure(&mut self, sketch: &GpuWorkloadSketch<'_>) -> Result<(), FusionError> {
        let compile_context = sketch
            .gpu_context()
            .compile_context()
            .ok_or(FusionError::MissingCompileContext)?;
        let source_code = sketch.generate_source_code()?;

        let mut prepare_kernels = BTreeMap::new();
        let mut run_kernels = BTreeMap::new();
        for id in source_code.unit_workloads() {
            let Some(unit) = source_code.query_unit_workload(id) else {
                continue;
            };
            let kernel = Arc::new(ClKernel::build(unit, compile_context)?);
            match unit.stage() {
                UnitWorkloadStage::Prepare => prepare_kernels.insert(id, kernel),
                UnitWorkloadStage::Run => run_kernels.insert(id, kernel),
            };
        }

        let mut aux_tensors = Vec::new();
        for id in source_code.tensors() {
            let Some(arg) = source_code.query_tensor(id) else {
                continue;
            };
            if arg.memory_descriptor.memory_type != MemoryType::Auxiliary {
                continue;
            }
            let aux_info = arg
                .memory_descriptor
                .aux_info
                .unwrap_or_else(|| AuxMemoryInfo::new(arg.tensor_info.total_size()));
            let tensor = Tensor::shared(arg.tensor_info.clone());
            tensor
                .allocate_in(&self.pool)
                .map_err(|source| FusionError::AuxiliaryTensorCreation { id, source })?;
            aux_tensors.push((tensor, aux_info));
        }

        info!(
            "Configured workload on {}: {} prepare kernels, {} run kernels, {} auxiliary tensors",
            compile_context.device_name,
            prepare_kernels.len(),
            run_kernels.len(),
            aux_tensors.len()
        );
        self.prepare_kernels = prepare_kernels;
        self.run_kernels = run_kernels;
        self.aux_tensors = aux_tensors;
        self.lut.clear();
        self.configured = true;
        self.prepared = false;
        Ok(())
    }

    /// Enqueues the prepare-stage kernels against the tensors bound by the
    /// last `run`. Does nothing after the first successful call.
    pub fn prepare(&mut self) -> Result<(), FusionError> {
        if !self.configured {
            return Err(FusionError::NotConfigured);
        }
        if self.prepared {
            return Ok(());
        }
        for kernel in self.prepare_kernels.values() {
            self.queue.enqueue(Arc::clone(kernel), &self.lut, self.flush_queue)?;
        }
        self.prepared = true;
        debug!("Prepared workload ({} kernels)", self.prepare_kernels.len());
        Ok(())
    }

    /// Binds `user_tensors` plus the auxiliary tensors, prepares if needed
    /// and enqueues the run-stage kernels in unit-workload order.
    pub fn run(&mut self, user_tensors: &[TensorHandle]) -> Result<(), FusionError> {
        if !self.configured {
            return Err(FusionError::NotConfigured);
        }
        let mut lut = TensorLookupTable::new();
        for tensor in user_tensors {
            let id = tensor.info().id();
            if !tensor.is_backed() {
                return Err(FusionError::UnallocatedTensor(id));
            }
            if lut.insert(id, Arc::clone(tensor)).is_some() {
                return Err(FusionError::ClashingTensorIds(id));
            }
        }
        for (tensor, _) in &self.aux_tensors {
            let id = tensor.info().id();
            if lut.insert(id, Arc::clone(tensor)).is_some() {
                return Err(FusionError::ClashingTensorIds(id));
            }
        }
        self.lut = lut;

        self.prepare()?;
        for kernel in self.run_kernels.values() {
            self.queue.enqueue(Arc::clone(kernel), &self.lut, self.flush_queue)?;
        }
        debug!("Enqueued {} run kernels", self.run_kernels.len());
        Ok(())
    }

    /// Waits for every enqueued kernel.
    pub fn finish(&mut self) -> Result<(), FusionError> {
        self.queue.finish()
    }

    /// Auxiliary tensors owned by the runtime, in tensor-id order.
    pub fn get_auxiliary_tensors(&self) -> &[(TensorHandle, AuxMemoryInfo)] {
        &self.aux_tensors
    }

    pub fn queue(&self) -> &ClCommandQueue {
        &self.queue
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn prepare_kernels(&self) -> impl Iterator<Item = &ClKernel> {
        self.prepare_kernels.values().map(|k| k.as_ref())
    }

    pub fn run_kernels(&self) -> impl Iterator<Item = &ClKernel> {
        self.run_kernels.values().map(|k| k.as_ref())
    }
}
