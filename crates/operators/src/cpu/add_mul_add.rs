// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fused residual add followed by a per-channel batch-norm scale and shift.
//!
//! | Slot | Tensor |
//! |---|---|
//! | `SRC_0`, `SRC_1` | addends |
//! | `SRC_2`, `SRC_3` | batch-norm multiplier and adder, one value per channel |
//! | `DST_0` | optional sum `SRC_0 + SRC_1` |
//! | `DST_1` | `act((SRC_0 + SRC_1) * SRC_2 + SRC_3)` |
//!
//! Quantized inputs carry quantized batch-norm vectors; they are
//! dequantized on every run into two temporary F32 workspace buffers at
//! `INT_VEC + 0` and `INT_VEC + 1`.

use std::sync::Arc;
use tensor_core::ops::{add_mul_add_f32, dequantize, ActivationInfo};
use tensor_core::{DType, Shape, SlotId, TensorInfo, TensorPack};
use tracing::info;

use crate::aux_handler::{AuxTensorHandler, HandlerFlags};
use crate::dispatch::{DataLayout, DispatchTable, IsaRequirement, KernelKey};
use crate::memory::{MemoryInfo, MemoryLifetime, MemoryRequirements};
use crate::operator::{require_dst, require_src, Operator, OperatorState};
use crate::{CpuScheduler, HardwareCapabilities, OperatorError, Status};

const NAME: &str = "CpuAddMulAdd";
const KIND: &str = "add_mul_add";
const MIN_WINDOW: usize = 1024;

const DEQUANTIZED_BN_MUL: i32 = 0;
const DEQUANTIZED_BN_ADD: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddMulAddKernel {
    Float,
    Quantized,
}

fn kernel_table() -> DispatchTable<AddMulAddKernel> {
    let mut t = DispatchTable::new();
    for layout in DataLayout::ALL {
        t.register(KernelKey::new(KIND, DType::F32, layout), "neon_fp32_add_bn_clamp", IsaRequirement::Neon, AddMulAddKernel::Float)
            .register(KernelKey::new(KIND, DType::F32, layout), "portable_fp32_add_mul_add", IsaRequirement::None, AddMulAddKernel::Float)
            .register(KernelKey::new(KIND, DType::F16, layout), "neon_fp16_add_bn_clamp", IsaRequirement::Fp16, AddMulAddKernel::Float)
            .register(KernelKey::new(KIND, DType::QAsymm8, layout), "portable_u8_add_mul_add", IsaRequirement::None, AddMulAddKernel::Quantized)
            .register(
                KernelKey::new(KIND, DType::QAsymm8Signed, layout),
                "portable_s8_add_mul_add",
                IsaRequirement::None,
                AddMulAddKernel::Quantized,
            );
    }
    t
}

#[derive(Debug, Clone)]
struct Configured {
    kernel: AddMulAddKernel,
    kernel_name: &'static str,
    shape: Shape,
    has_add_output: bool,
    dequantized_bn_mul: TensorInfo,
    dequantized_bn_add: TensorInfo,
    requirements: MemoryRequirements,
}

/// Argument descriptors for [`CpuAddMulAdd::configure`].
#[derive(Debug, Clone, Copy)]
pub struct AddMulAddArgs<'a> {
    pub input1: &'a TensorInfo,
    pub input2: &'a TensorInfo,
    pub bn_mul: &'a TensorInfo,
    pub bn_add: &'a TensorInfo,
    pub add_output: Option<&'a TensorInfo>,
    pub final_output: &'a TensorInfo,
}

pub struct CpuAddMulAdd {
    scheduler: Arc<CpuScheduler>,
    activation: ActivationInfo,
    configured: Option<Configured>,
}

impl CpuAddMulAdd {
    pub fn new(scheduler: Arc<CpuScheduler>) -> Self {
        Self {
            scheduler,
            activation: ActivationInfo::identity(),
            configured: None,
        }
    }

    pub fn kernel_name(&self) -> Option<&'static str> {
        self.configured.as_ref().map(|c| c.kernel_name)
    }

    pub fn validate(args: AddMulAddArgs<'_>, act: ActivationInfo, caps: &HardwareCapabilities) -> Status {
        Self::check(args, act, caps).map(|_| ())
    }

    fn check(
        args: AddMulAddArgs<'_>,
        act: ActivationInfo,
        caps: &HardwareCapabilities,
    ) -> Result<Configured, OperatorError> {
        let dtype = args.input1.dtype();
        if !matches!(dtype, DType::F32 | DType::F16 | DType::QAsymm8 | DType::QAsymm8Signed) {
            return Err(OperatorError::UnsupportedDType { op: NAME, dtype });
        }

        let mut same_type = vec![args.input2, args.bn_mul, args.bn_add, args.final_output];
        same_type.extend(args.add_output);
        if let Some(other) = same_type.iter().find(|info| info.dtype() != dtype) {
            return Err(OperatorError::InvalidConfiguration {
                op: NAME,
                reason: format!("expected {dtype} everywhere, found {}", other.dtype()),
            });
        }

        let shape = args.input1.shape();
        let mut same_shape = vec![args.input2, args.final_output];
        same_shape.extend(args.add_output);
        if let Some(other) = same_shape.iter().find(|info| info.shape() != shape) {
            return Err(OperatorError::ShapeMismatch {
                op: NAME,
                lhs: shape.clone(),
                rhs: other.shape().clone(),
            });
        }

        let channels = Shape::vector(shape.innermost());
        for bn in [args.bn_mul, args.bn_add] {
            if bn.shape() != &channels {
                return Err(OperatorError::ShapeMismatch {
                    op: NAME,
                    lhs: channels.clone(),
                    rhs: bn.shape().clone(),
                });
            }
        }

        let (lo, hi) = act.bounds();
        if lo > hi {
            return Err(OperatorError::InvalidConfiguration {
                op: NAME,
                reason: format!("activation lower bound {lo} exceeds upper bound {hi}"),
            });
        }

        let entry = kernel_table().select(KernelKey::new(KIND, dtype, DataLayout::Nhwc), caps)?;

        let dequantized_bn_mul = TensorInfo::new(args.bn_mul.shape().clone(), DType::F32);
        let dequantized_bn_add = TensorInfo::new(args.bn_add.shape().clone(), DType::F32);
        let requirements = match entry.kernel {
            AddMulAddKernel::Float => MemoryRequirements::new(),
            AddMulAddKernel::Quantized => vec![
                MemoryInfo::new(
                    SlotId::offset_int_vec(DEQUANTIZED_BN_MUL),
                    MemoryLifetime::Temporary,
                    dequantized_bn_mul.total_size(),
                ),
                MemoryInfo::new(
                    SlotId::offset_int_vec(DEQUANTIZED_BN_ADD),
                    MemoryLifetime::Temporary,
                    dequantized_bn_add.total_size(),
                ),
            ],
        };

        Ok(Configured {
            kernel: entry.kernel,
            kernel_name: entry.name,
            shape: shape.clone(),
            has_add_output: args.add_output.is_some(),
            dequantized_bn_mul,
            dequantized_bn_add,
            requirements,
        })
    }

    pub fn configure(
        &mut self,
        args: AddMulAddArgs<'_>,
        act: ActivationInfo,
        caps: &HardwareCapabilities,
    ) -> Result<(), OperatorError> {
        let configured = Self::check(args, act, caps)?;
        info!(
            "{NAME} configured: {} x{} channels, {} aux buffers ({})",
            configured.shape,
            configured.shape.innermost(),
            configured.requirements.len(),
            configured.kernel_name
        );
        self.activation = act;
        self.configured = Some(configured);
        Ok(())
    }
}

impl Operator for CpuAddMulAdd {
    fn name(&self) -> &'static str {
        NAME
    }

    fn state(&self) -> OperatorState {
        match self.configured {
            Some(_) => OperatorState::Configured,
            None => OperatorState::Unconfigured,
        }
    }

    fn run(&mut self, pack: &TensorPack) -> Result<(), OperatorError> {
        let Some(cfg) = self.configured.as_ref() else {
            return Err(OperatorError::NotConfigured(NAME));
        };

        let input1 = require_src(pack, SlotId::SRC_0, NAME);
        let input2 = require_src(pack, SlotId::SRC_1, NAME);
        let bn_mul = require_src(pack, SlotId::SRC_2, NAME);
        let bn_add = require_src(pack, SlotId::SRC_3, NAME);
        let final_output = require_dst(pack, SlotId::DST_1, NAME);

        let (mul, add) = match cfg.kernel {
            AddMulAddKernel::Float => (bn_mul.to_f32_vec()?, bn_add.to_f32_vec()?),
            AddMulAddKernel::Quantized => {
                let mul_aux = AuxTensorHandler::new(
                    SlotId::offset_int_vec(DEQUANTIZED_BN_MUL),
                    &cfg.dequantized_bn_mul,
                    pack,
                    HandlerFlags::default(),
                )?;
                let add_aux = AuxTensorHandler::new(
                    SlotId::offset_int_vec(DEQUANTIZED_BN_ADD),
                    &cfg.dequantized_bn_add,
                    pack,
                    HandlerFlags::default(),
                )?;
                dequantize(bn_mul, mul_aux.get())?;
                dequantize(bn_add, add_aux.get())?;
                (mul_aux.get().read_f32()?, add_aux.get().read_f32()?)
            }
        };

        let a = input1.to_f32_vec()?;
        let b = input2.to_f32_vec()?;
        let act = self.activation;
        let mut out = vec![0.0f32; cfg.shape.num_elements()];
        self.scheduler.parallel_for(&mut out, MIN_WINDOW, |start, window| {
            add_mul_add_f32(&a, &b, &mul, &add, act, start, window)
        });
        final_output.write_from_f32(&out)?;

        if cfg.has_add_output {
            let sums: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
            require_dst(pack, SlotId::DST_0, NAME).write_from_f32(&sums)?;
        }
        Ok(())
    }

    fn workspace(&self) -> MemoryRequirements {
        self.configured
            .as_ref()
            .map(|c| c.requirements.clone())
            .unwrap_or_default()
    }
}
