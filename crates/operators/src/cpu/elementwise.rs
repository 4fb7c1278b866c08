// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Broadcasting elementwise arithmetic: `DST_0 = SRC_0 <op> SRC_1`.

use std::sync::Arc;
use tensor_core::ops::{broadcast_binary, ArithmeticOp, ConvertPolicy};
use tensor_core::{DType, Shape, SlotId, TensorInfo, TensorPack};
use tracing::info;

use crate::dispatch::{DataLayout, DispatchTable, IsaRequirement, KernelKey};
use crate::memory::MemoryRequirements;
use crate::operator::{require_dst, require_src, Operator, OperatorState};
use crate::{CpuScheduler, HardwareCapabilities, OperatorError, Status};

const KIND: &str = "elementwise";
const MIN_WINDOW: usize = 1024;

/// Kernel variants for elementwise arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryKernel {
    Float32,
    /// F16 and quantized types, computed in f32 and converted on store.
    Widened,
    Int32,
    UInt8,
}

fn kernel_table() -> DispatchTable<BinaryKernel> {
    let mut t = DispatchTable::new();
    t.register_all_layouts(KIND, DType::F32, "neon_fp32_elementwise", IsaRequirement::Neon, BinaryKernel::Float32)
        .register_all_layouts(KIND, DType::F32, "portable_fp32_elementwise", IsaRequirement::None, BinaryKernel::Float32)
        .register_all_layouts(KIND, DType::F16, "neon_fp16_elementwise", IsaRequirement::Fp16, BinaryKernel::Widened)
        .register_all_layouts(KIND, DType::S32, "portable_s32_elementwise", IsaRequirement::None, BinaryKernel::Int32)
        .register_all_layouts(KIND, DType::U8, "portable_u8_elementwise", IsaRequirement::None, BinaryKernel::UInt8)
        .register_all_layouts(KIND, DType::QAsymm8, "portable_qasymm8_elementwise", IsaRequirement::None, BinaryKernel::Widened)
        .register_all_layouts(
            KIND,
            DType::QAsymm8Signed,
            "portable_qasymm8_signed_elementwise",
            IsaRequirement::None,
            BinaryKernel::Widened,
        );
    t
}

#[derive(Debug, Clone)]
struct Configured {
    kernel: BinaryKernel,
    kernel_name: &'static str,
    lhs: Shape,
    rhs: Shape,
    dst: Shape,
}

/// Elementwise add, sub or mul with numpy-style broadcasting.
pub struct CpuElementwiseBinary {
    op: ArithmeticOp,
    policy: ConvertPolicy,
    scheduler: Arc<CpuScheduler>,
    configured: Option<Configured>,
}

impl CpuElementwiseBinary {
    pub fn new(op: ArithmeticOp, scheduler: Arc<CpuScheduler>) -> Self {
        Self {
            op,
            policy: ConvertPolicy::default(),
            scheduler,
            configured: None,
        }
    }

    pub fn op(&self) -> ArithmeticOp {
        self.op
    }

    /// Name of the kernel variant picked by `configure`.
    pub fn kernel_name(&self) -> Option<&'static str> {
        self.configured.as_ref().map(|c| c.kernel_name)
    }

    pub fn validate(
        op: ArithmeticOp,
        src0: &TensorInfo,
        src1: &TensorInfo,
        dst: &TensorInfo,
        layout: DataLayout,
        caps: &HardwareCapabilities,
    ) -> Status {
        Self::check(op, src0, src1, dst, layout, caps).map(|_| ())
    }

    fn check(
        op: ArithmeticOp,
        src0: &TensorInfo,
        src1: &TensorInfo,
        dst: &TensorInfo,
        layout: DataLayout,
        caps: &HardwareCapabilities,
    ) -> Result<Configured, OperatorError> {
        let name = op_name(op);
        for info in [src1, dst] {
            if info.dtype() != src0.dtype() {
                return Err(OperatorError::InvalidConfiguration {
                    op: name,
                    reason: format!("mixed data types {} and {}", src0.dtype(), info.dtype()),
                });
            }
        }
        if src0.num_elements() == 0 || src1.num_elements() == 0 {
            return Err(OperatorError::InvalidConfiguration {
                op: name,
                reason: "empty input".into(),
            });
        }
        let out = src0
            .shape()
            .broadcast_with(src1.shape())
            .ok_or_else(|| OperatorError::ShapeMismatch {
                op: name,
                lhs: src0.shape().clone(),
                rhs: src1.shape().clone(),
            })?;
        if &out != dst.shape() {
            return Err(OperatorError::ShapeMismatch {
                op: name,
                lhs: out,
                rhs: dst.shape().clone(),
            });
        }
        let entry = kernel_table().select(KernelKey::new(KIND, src0.dtype(), layout), caps)?;
        Ok(Configured {
            kernel: entry.kernel,
            kernel_name: entry.name,
            lhs: src0.shape().clone(),
            rhs: src1.shape().clone(),
            dst: out,
        })
    }

    pub fn configure(
        &mut self,
        src0: &TensorInfo,
        src1: &TensorInfo,
        dst: &TensorInfo,
        policy: ConvertPolicy,
        caps: &HardwareCapabilities,
    ) -> Result<(), OperatorError> {
        let configured = Self::check(self.op, src0, src1, dst, DataLayout::default(), caps)?;
        info!(
            "{} configured: {} {} {} -> {} ({})",
            op_name(self.op),
            src0.shape(),
            self.op.symbol(),
            src1.shape(),
            configured.dst,
            configured.kernel_name
        );
        self.policy = policy;
        self.configured = Some(configured);
        Ok(())
    }

    fn compute<T>(&self, cfg: &Configured, lhs: &[T], rhs: &[T], f: impl Fn(T, T) -> T + Sync + Send) -> Vec<T>
    where
        T: Copy + Default + Send + Sync,
    {
        let mut out = vec![T::default(); cfg.dst.num_elements()];
        self.scheduler.parallel_for(&mut out, MIN_WINDOW, |start, window| {
            broadcast_binary(lhs, &cfg.lhs, rhs, &cfg.rhs, &cfg.dst, start, window, &f)
        });
        out
    }
}

fn op_name(op: ArithmeticOp) -> &'static str {
    match op {
        ArithmeticOp::Add => "CpuAdd",
        ArithmeticOp::Sub => "CpuSub",
        ArithmeticOp::Mul => "CpuMul",
    }
}

fn check_bound_shape(op: &'static str, expected: &Shape, actual: &TensorInfo) -> Result<(), OperatorError> {
    if expected != actual.shape() {
        return Err(OperatorError::ShapeMismatch {
            op,
            lhs: expected.clone(),
            rhs: actual.shape().clone(),
        });
    }
    Ok(())
}

impl Operator for CpuElementwiseBinary {
    fn name(&self) -> &'static str {
        op_name(self.op)
    }

    fn state(&self) -> OperatorState {
        match self.configured {
            Some(_) => OperatorState::Configured,
            None => OperatorState::Unconfigured,
        }
    }

    fn run(&mut self, pack: &TensorPack) -> Result<(), OperatorError> {
        let name = self.name();
        let Some(cfg) = self.configured.as_ref() else {
            return Err(OperatorError::NotConfigured(name));
        };

        let src0 = require_src(pack, SlotId::SRC_0, name);
        let src1 = require_src(pack, SlotId::SRC_1, name);
        let dst = require_dst(pack, SlotId::DST_0, name);
        check_bound_shape(name, &cfg.lhs, &src0.info())?;
        check_bound_shape(name, &cfg.rhs, &src1.info())?;
        check_bound_shape(name, &cfg.dst, &dst.info())?;

        let op = self.op;
        let policy = self.policy;
        match cfg.kernel {
            BinaryKernel::Float32 => {
                let (a, b) = (src0.read_f32()?, src1.read_f32()?);
                dst.write_f32(&self.compute(cfg, &a, &b, |x, y| op.apply_f32(x, y)))?;
            }
            BinaryKernel::Widened => {
                let (a, b) = (src0.to_f32_vec()?, src1.to_f32_vec()?);
                dst.write_from_f32(&self.compute(cfg, &a, &b, |x, y| op.apply_f32(x, y)))?;
            }
            BinaryKernel::Int32 => {
                let (a, b) = (src0.read_elements::<i32>()?, src1.read_elements::<i32>()?);
                dst.write_elements(&self.compute(cfg, &a, &b, |x, y| op.apply_i32(x, y, policy)))?;
            }
            BinaryKernel::UInt8 => {
                let (a, b) = (src0.read_elements::<u8>()?, src1.read_elements::<u8>()?);
                dst.write_elements(&self.compute(cfg, &a, &b, |x, y| op.apply_u8(x, y, policy)))?;
            }
        }
        Ok(())
    }

    fn workspace(&self) -> MemoryRequirements {
        MemoryRequirements::new()
    }
}

/// Elementwise subtraction: `DST_0 = SRC_0 - SRC_1`.
pub struct CpuSub {
    inner: CpuElementwiseBinary,
}

impl CpuSub {
    pub fn new(scheduler: Arc<CpuScheduler>) -> Self {
        Self {
            inner: CpuElementwiseBinary::new(ArithmeticOp::Sub, scheduler),
        }
    }

    pub fn validate(
        src0: &TensorInfo,
        src1: &TensorInfo,
        dst: &TensorInfo,
        caps: &HardwareCapabilities,
    ) -> Status {
        CpuElementwiseBinary::validate(ArithmeticOp::Sub, src0, src1, dst, DataLayout::default(), caps)
    }

    pub fn configure(
        &mut self,
        src0: &TensorInfo,
        src1: &TensorInfo,
        dst: &TensorInfo,
        policy: ConvertPolicy,
        caps: &HardwareCapabilities,
    ) -> Result<(), OperatorError> {
        self.inner.configure(src0, src1, dst, policy, caps)
    }

    pub fn kernel_name(&self) -> Option<&'static str> {
        self.inner.kernel_name()
    }
}

impl Operator for CpuSub {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn state(&self) -> OperatorState {
        self.inner.state()
    }

    fn run(&mut self, pack: &TensorPack) -> Result<(), OperatorError> {
        self.inner.run(pack)
    }

    fn workspace(&self) -> MemoryRequirements {
        self.inner.workspace()
    }
}
