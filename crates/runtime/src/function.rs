// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A configured operator bundled with its packs and workspace, driven
//! through a type-state lifecycle.
//!
//! ```text
//! Function<Configured>
//!     │  .prepare()   (allocate, transform, release prepare buffers)
//!     ▼
//! Function<Ready>
//!     │  .run()       (inside the memory-group scope)
//!     ▼
//!   outputs written to the bound destination tensors
//! ```
//!
//! Each state transition consumes the old value and returns a new one,
//! so running an unprepared function is a compile error.

use std::marker::PhantomData;
use std::time::Instant;

use memory_manager::{MemoryGroup, MemoryPool};
use operators::{
    allocate_tensors, manage_workspace, mark_in_use, mark_prepared, release_prepare_tensors,
    MemoryLifetime, Operator, OperatorState, Workspace,
};
use tensor_core::{PackElement, SlotId, TensorHandle, TensorPack};
use tracing::{debug, info};

use crate::{RunMetrics, RuntimeConfig, RuntimeError};

// ── Type-state markers ─────────────────────────────────────────

/// Workspace is materialised; `prepare` has not run.
#[derive(Debug)]
pub struct Configured;

/// Prepared; `run` may be called any number of times.
#[derive(Debug)]
pub struct Ready;

/// Sealed trait for function states.
pub trait FunctionState: std::fmt::Debug {}
impl FunctionState for Configured {}
impl FunctionState for Ready {}

// ── Function ───────────────────────────────────────────────────

/// An operator together with everything needed to run it.
///
/// # Example
/// ```
/// use memory_manager::MemoryPool;
/// use operators::cpu::CpuSub;
/// use operators::HardwareCapabilities;
/// use runtime::{Function, RuntimeConfig};
/// use tensor_core::ops::ConvertPolicy;
/// use tensor_core::{DType, Shape, SlotId, Tensor, TensorInfo, TensorPack};
///
/// let config = RuntimeConfig::default();
/// let info = TensorInfo::new([2, 2], DType::F32);
/// let mut sub = CpuSub::new(config.scheduler().unwrap());
/// sub.configure(&info, &info, &info, ConvertPolicy::Wrap, &HardwareCapabilities::portable())
///     .unwrap();
///
/// let dst = Tensor::from_f32(Shape::matrix(2, 2), &[0.0; 4]).unwrap();
/// let mut bindings = TensorPack::new();
/// bindings.add_const_tensor(SlotId::SRC_0, Tensor::from_f32(Shape::matrix(2, 2), &[3.0; 4]).unwrap());
/// bindings.add_const_tensor(SlotId::SRC_1, Tensor::from_f32(Shape::matrix(2, 2), &[1.0; 4]).unwrap());
/// bindings.add_tensor(SlotId::DST_0, dst.clone());
///
/// let pool = MemoryPool::unbounded();
/// let mut function = Function::new(Box::new(sub), &bindings, &pool, &config)
///     .unwrap()
///     .prepare()
///     .unwrap();
/// function.run().unwrap();
/// assert_eq!(dst.read_f32().unwrap(), vec![2.0; 4]);
/// ```
pub struct Function<S: FunctionState = Configured> {
    op: Box<dyn Operator>,
    pool: MemoryPool,
    group: MemoryGroup,
    run_pack: TensorPack,
    prepare_pack: TensorPack,
    workspace: Workspace,
    profiling: bool,
    metrics: RunMetrics,
    _state: PhantomData<S>,
}

// ── Any state ──────────────────────────────────────────────────

impl<S: FunctionState> Function<S> {
    pub fn operator(&self) -> &dyn Operator {
        self.op.as_ref()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn run_pack(&self) -> &TensorPack {
        &self.run_pack
    }

    pub fn memory_group(&self) -> &MemoryGroup {
        &self.group
    }

    /// Binds a mutable tensor for both `prepare` and `run`, replacing any
    /// previous binding at `slot`.
    pub fn bind(&mut self, slot: SlotId, tensor: TensorHandle) {
        self.prepare_pack.add_tensor(slot, tensor.clone());
        self.run_pack.add_tensor(slot, tensor);
    }

    /// Binds a read-only tensor for both `prepare` and `run`.
    pub fn bind_const(&mut self, slot: SlotId, tensor: TensorHandle) {
        self.prepare_pack.add_const_tensor(slot, tensor.clone());
        self.run_pack.add_const_tensor(slot, tensor);
    }

    fn into_state<T: FunctionState>(self) -> Function<T> {
        Function {
            op: self.op,
            pool: self.pool,
            group: self.group,
            run_pack: self.run_pack,
            prepare_pack: self.prepare_pack,
            workspace: self.workspace,
            profiling: self.profiling,
            metrics: self.metrics,
            _state: PhantomData,
        }
    }
}

impl<S: FunctionState> std::fmt::Debug for Function<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("op", &self.op.name())
            .field("state", &std::any::type_name::<S>())
            .field("workspace_entries", &self.workspace.len())
            .field("arena_bytes", &self.group.arena_bytes())
            .finish()
    }
}

// ── Configured → Ready ─────────────────────────────────────────

impl Function<Configured> {
    /// Materialises `op`'s workspace next to the user tensors in
    /// `bindings`.
    ///
    /// `op` must already be configured. Temporaries are managed by a
    /// memory group of `pool`; persistent and prepare buffers are
    /// allocated now or on `prepare` depending on
    /// [`RuntimeConfig::allocate_workspace_eagerly`].
    pub fn new(
        op: Box<dyn Operator>,
        bindings: &TensorPack,
        pool: &MemoryPool,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        if op.state() == OperatorState::Unconfigured {
            return Err(RuntimeError::Unconfigured(op.name()));
        }

        let mut run_pack = TensorPack::new();
        let mut prepare_pack = TensorPack::new();
        for (slot, element) in bindings.iter() {
            bind_element(&mut run_pack, slot, element);
            bind_element(&mut prepare_pack, slot, element);
        }

        let mut group = MemoryGroup::new(pool);
        let workspace = manage_workspace(
            &op.workspace(),
            &mut group,
            &mut run_pack,
            &mut prepare_pack,
            config.allocate_workspace_eagerly,
        )?;

        let mut metrics = RunMetrics::new(op.name());
        metrics.group_arena_bytes = group.arena_bytes();
        metrics.owned_bytes = workspace.owned_bytes();
        info!(
            "Function for {} created: {} bound tensors, {} workspace entries",
            op.name(),
            bindings.size(),
            workspace.len()
        );

        Ok(Self {
            op,
            pool: pool.clone(),
            group,
            run_pack,
            prepare_pack,
            workspace,
            profiling: config.enable_profiling,
            metrics,
            _state: PhantomData,
        })
    }

    /// Allocates any declared buffers, runs the operator's one-off
    /// transforms and frees the prepare-lifetime buffers.
    pub fn prepare(mut self) -> Result<Function<Ready>, RuntimeError> {
        let start = Instant::now();
        allocate_tensors(&mut self.workspace, &self.pool)?;
        self.op.prepare(&self.prepare_pack)?;
        mark_prepared(&mut self.workspace);

        let released: Vec<SlotId> = self
            .workspace
            .entries()
            .iter()
            .filter(|e| e.lifetime == MemoryLifetime::Prepare)
            .map(|e| e.slot)
            .collect();
        release_prepare_tensors(&mut self.workspace, &mut self.prepare_pack);
        for slot in &released {
            self.run_pack.remove_tensor(*slot);
        }

        let owned = self.workspace.owned_bytes();
        if self.profiling {
            self.metrics.record_prepare(start.elapsed(), owned);
        } else {
            self.metrics.owned_bytes = owned;
        }
        info!(
            "{} prepared: released {} prepare buffers, {} bytes still owned",
            self.op.name(),
            released.len(),
            owned
        );
        Ok(self.into_state())
    }
}

// ── Ready ──────────────────────────────────────────────────────

impl Function<Ready> {
    /// Runs the operator with the memory group acquired.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let start = Instant::now();
        {
            let _scope = self.group.scope()?;
            self.op.run(&self.run_pack)?;
        }
        mark_in_use(&mut self.workspace);
        if self.profiling {
            self.metrics.record_run(start.elapsed());
        }
        debug!("{} run #{} complete", self.op.name(), self.metrics.runs);
        Ok(())
    }
}

fn bind_element(pack: &mut TensorPack, slot: SlotId, element: &PackElement) {
    if element.is_const() {
        pack.add_const_tensor(slot, element.tensor().clone());
    } else {
        pack.add_tensor(slot, element.tensor().clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use operators::cpu::CpuSub;
    use operators::HardwareCapabilities;
    use tensor_core::ops::ConvertPolicy;
    use tensor_core::{DType, Shape, Tensor, TensorInfo};

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            num_threads: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_unconfigured_operator_is_rejected() {
        let cfg = config();
        let sub = CpuSub::new(cfg.scheduler().unwrap());
        let err = Function::new(Box::new(sub), &TensorPack::new(), &MemoryPool::unbounded(), &cfg).unwrap_err();
        assert!(matches!(err, RuntimeError::Unconfigured(_)));
    }

    #[test]
    fn test_rebinding_between_runs() {
        let cfg = config();
        let info = TensorInfo::new([3], DType::F32);
        let mut sub = CpuSub::new(cfg.scheduler().unwrap());
        sub.configure(&info, &info, &info, ConvertPolicy::Wrap, &HardwareCapabilities::portable())
            .unwrap();

        let dst = Tensor::from_f32(Shape::vector(3), &[0.0; 3]).unwrap();
        let mut bindings = TensorPack::new();
        bindings.add_const_tensor(SlotId::SRC_0, Tensor::from_f32(Shape::vector(3), &[5.0; 3]).unwrap());
        bindings.add_const_tensor(SlotId::SRC_1, Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap());
        bindings.add_tensor(SlotId::DST_0, dst.clone());

        let pool = MemoryPool::unbounded();
        let mut f = Function::new(Box::new(sub), &bindings, &pool, &cfg)
            .unwrap()
            .prepare()
            .unwrap();
        f.run().unwrap();
        assert_eq!(dst.read_f32().unwrap(), vec![4.0, 3.0, 2.0]);

        f.bind_const(SlotId::SRC_0, Tensor::from_f32(Shape::vector(3), &[0.0; 3]).unwrap());
        f.run().unwrap();
        assert_eq!(dst.read_f32().unwrap(), vec![-1.0, -2.0, -3.0]);
        assert_eq!(f.metrics().runs, 2);
        assert!(f.workspace().is_empty());
    }

    #[test]
    fn test_profiling_off_records_no_runs() {
        let cfg = RuntimeConfig {
            enable_profiling: false,
            ..config()
        };
        let info = TensorInfo::new([1], DType::F32);
        let mut sub = CpuSub::new(cfg.scheduler().unwrap());
        sub.configure(&info, &info, &info, ConvertPolicy::Wrap, &HardwareCapabilities::portable())
            .unwrap();
        let mut bindings = TensorPack::new();
        bindings.add_const_tensor(SlotId::SRC_0, Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap());
        bindings.add_const_tensor(SlotId::SRC_1, Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap());
        bindings.add_tensor(SlotId::DST_0, Tensor::from_f32(Shape::vector(1), &[9.0]).unwrap());

        let mut f = Function::new(Box::new(sub), &bindings, &MemoryPool::unbounded(), &cfg)
            .unwrap()
            .prepare()
            .unwrap();
        f.run().unwrap();
        assert_eq!(f.metrics().runs, 0);
    }
}
