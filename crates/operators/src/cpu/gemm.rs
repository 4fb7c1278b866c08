// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! General matrix multiply: `DST_0 = alpha * (SRC_0 @ SRC_1) + beta * SRC_2`.
//!
//! The kernel reads B transposed so every dot product walks two contiguous
//! rows. The transposed copy lives in the workspace at `INT_VEC + 0`: when
//! B is constant (`reshape_b_only_on_first_run`) it is a persistent buffer
//! filled once by `prepare`, otherwise a temporary one refilled by every
//! `run`.

use std::sync::Arc;
use tensor_core::ops::{gemm_bt_rows, matmul_output_shape, transpose_2d};
use tensor_core::{DType, Shape, SlotId, Tensor, TensorInfo, TensorPack};
use tracing::{debug, info};

use crate::aux_handler::{AuxTensorHandler, HandlerFlags};
use crate::dispatch::{DataLayout, DispatchTable, IsaRequirement, KernelKey};
use crate::memory::{MemoryInfo, MemoryLifetime, MemoryRequirements};
use crate::operator::{ensure_runnable, require_dst, require_src, Operator, OperatorState};
use crate::{CpuScheduler, HardwareCapabilities, OperatorError, Status};

const NAME: &str = "CpuGemm";
const KIND: &str = "gemm";
const TRANSPOSED_B: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GemmKernel {
    Fp32,
}

fn kernel_table() -> DispatchTable<GemmKernel> {
    let mut t = DispatchTable::new();
    t.register_all_layouts(KIND, DType::F32, "sve_fp32_gemm_bt", IsaRequirement::Sve, GemmKernel::Fp32)
        .register_all_layouts(KIND, DType::F32, "neon_fp32_gemm_bt", IsaRequirement::Neon, GemmKernel::Fp32)
        .register_all_layouts(KIND, DType::F32, "portable_fp32_gemm_bt", IsaRequirement::None, GemmKernel::Fp32);
    t
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmInfo {
    pub alpha: f32,
    pub beta: f32,
    /// B does not change between runs; transpose it once in `prepare`.
    pub reshape_b_only_on_first_run: bool,
}

impl Default for GemmInfo {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            reshape_b_only_on_first_run: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Configured {
    kernel_name: &'static str,
    m: usize,
    k: usize,
    n: usize,
    bias: Option<Shape>,
    transposed_b: TensorInfo,
    requirements: MemoryRequirements,
}

pub struct CpuGemm {
    scheduler: Arc<CpuScheduler>,
    gemm_info: GemmInfo,
    configured: Option<Configured>,
    is_prepared: bool,
}

impl CpuGemm {
    pub fn new(scheduler: Arc<CpuScheduler>) -> Self {
        Self {
            scheduler,
            gemm_info: GemmInfo::default(),
            configured: None,
            is_prepared: false,
        }
    }

    pub fn kernel_name(&self) -> Option<&'static str> {
        self.configured.as_ref().map(|c| c.kernel_name)
    }

    /// `c` is optional; it must be `[M, N]` or a row of `N` broadcast over
    /// every output row.
    pub fn validate(
        a: &TensorInfo,
        b: &TensorInfo,
        c: Option<&TensorInfo>,
        dst: &TensorInfo,
        gemm_info: GemmInfo,
        caps: &HardwareCapabilities,
    ) -> Status {
        Self::check(a, b, c, dst, gemm_info, caps).map(|_| ())
    }

    fn check(
        a: &TensorInfo,
        b: &TensorInfo,
        c: Option<&TensorInfo>,
        dst: &TensorInfo,
        gemm_info: GemmInfo,
        caps: &HardwareCapabilities,
    ) -> Result<Configured, OperatorError> {
        for info in [Some(a), Some(b), c, Some(dst)].into_iter().flatten() {
            if info.dtype() != DType::F32 {
                return Err(OperatorError::UnsupportedDType {
                    op: NAME,
                    dtype: info.dtype(),
                });
            }
        }
        let out = matmul_output_shape(a.shape(), b.shape()).map_err(|_| OperatorError::ShapeMismatch {
            op: NAME,
            lhs: a.shape().clone(),
            rhs: b.shape().clone(),
        })?;
        if &out != dst.shape() {
            return Err(OperatorError::ShapeMismatch {
                op: NAME,
                lhs: out,
                rhs: dst.shape().clone(),
            });
        }
        let (m, k, n) = (out.dims()[0], a.shape().dims()[1], out.dims()[1]);
        if m * k * n == 0 {
            return Err(OperatorError::InvalidConfiguration {
                op: NAME,
                reason: "empty matrix".into(),
            });
        }
        if let Some(c) = c {
            let row = Shape::vector(n);
            if c.shape() != &out && c.shape() != &row {
                return Err(OperatorError::ShapeMismatch {
                    op: NAME,
                    lhs: out,
                    rhs: c.shape().clone(),
                });
            }
        }

        let entry = kernel_table().select(KernelKey::new(KIND, DType::F32, DataLayout::Nhwc), caps)?;
        let transposed_b = TensorInfo::new(Shape::matrix(n, k), DType::F32);
        let lifetime = if gemm_info.reshape_b_only_on_first_run {
            MemoryLifetime::Persistent
        } else {
            MemoryLifetime::Temporary
        };
        let requirements = vec![MemoryInfo::new(
            SlotId::offset_int_vec(TRANSPOSED_B),
            lifetime,
            transposed_b.total_size(),
        )];

        Ok(Configured {
            kernel_name: entry.name,
            m,
            k,
            n,
            bias: c.map(|c| c.shape().clone()),
            transposed_b,
            requirements,
        })
    }

    pub fn configure(
        &mut self,
        a: &TensorInfo,
        b: &TensorInfo,
        c: Option<&TensorInfo>,
        dst: &TensorInfo,
        gemm_info: GemmInfo,
        caps: &HardwareCapabilities,
    ) -> Result<(), OperatorError> {
        let configured = Self::check(a, b, c, dst, gemm_info, caps)?;
        info!(
            "{NAME} configured: [{}, {}] x [{}, {}], B reshaped {} ({})",
            configured.m,
            configured.k,
            configured.k,
            configured.n,
            if gemm_info.reshape_b_only_on_first_run { "once" } else { "every run" },
            configured.kernel_name
        );
        self.gemm_info = gemm_info;
        self.configured = Some(configured);
        self.is_prepared = false;
        Ok(())
    }

    fn transpose_b_into(cfg: &Configured, b: &Tensor, target: &Tensor) -> Result<(), OperatorError> {
        let values = b.read_f32()?;
        target.write_f32(&transpose_2d(&values, cfg.k, cfg.n))?;
        Ok(())
    }
}

impl Operator for CpuGemm {
    fn name(&self) -> &'static str {
        NAME
    }

    fn state(&self) -> OperatorState {
        match (&self.configured, self.is_prepared) {
            (None, _) => OperatorState::Unconfigured,
            (Some(_), false) => OperatorState::Configured,
            (Some(_), true) => OperatorState::Prepared,
        }
    }

    /// Transposes B into the persistent workspace buffer, which must be
    /// bound in `pack`.
    fn prepare(&mut self, pack: &TensorPack) -> Result<(), OperatorError> {
        let Some(cfg) = self.configured.as_ref() else {
            return Err(OperatorError::NotConfigured(NAME));
        };
        if self.is_prepared {
            return Ok(());
        }
        if self.gemm_info.reshape_b_only_on_first_run {
            let b = require_src(pack, SlotId::SRC_1, NAME);
            let slot = SlotId::offset_int_vec(TRANSPOSED_B);
            require_dst(pack, slot, NAME);
            let bt = AuxTensorHandler::new(slot, &cfg.transposed_b, pack, HandlerFlags::default())?;
            Self::transpose_b_into(cfg, b, bt.get())?;
            debug!("{NAME} prepared: B transposed into {slot}");
        }
        self.is_prepared = true;
        Ok(())
    }

    fn run(&mut self, pack: &TensorPack) -> Result<(), OperatorError> {
        ensure_runnable(NAME, self.state(), self.requires_prepare())?;
        let Some(cfg) = self.configured.as_ref() else {
            return Err(OperatorError::NotConfigured(NAME));
        };

        let a = require_src(pack, SlotId::SRC_0, NAME).read_f32()?;
        let dst = require_dst(pack, SlotId::DST_0, NAME);

        let slot = SlotId::offset_int_vec(TRANSPOSED_B);
        if self.gemm_info.reshape_b_only_on_first_run {
            // The persistent copy from `prepare` is the only source of B.
            require_dst(pack, slot, NAME);
        }
        let bt_aux = AuxTensorHandler::new(slot, &cfg.transposed_b, pack, HandlerFlags::default())?;
        if !self.gemm_info.reshape_b_only_on_first_run {
            let b = require_src(pack, SlotId::SRC_1, NAME);
            Self::transpose_b_into(cfg, b, bt_aux.get())?;
        }
        let bt = bt_aux.get().read_f32()?;

        let (k, n, alpha) = (cfg.k, cfg.n, self.gemm_info.alpha);
        let mut out = vec![0.0f32; cfg.m * n];
        self.scheduler.parallel_rows(&mut out, n, |row_start, rows| {
            gemm_bt_rows(&a, &bt, k, n, alpha, row_start, rows)
        });

        let beta = self.gemm_info.beta;
        if let (Some(bias_shape), true) = (&cfg.bias, beta != 0.0) {
            let c = require_src(pack, SlotId::SRC_2, NAME).read_f32()?;
            let out_shape = Shape::matrix(cfg.m, n);
            for (i, o) in out.iter_mut().enumerate() {
                *o += beta * c[bias_shape.broadcast_source_index(&out_shape, i)];
            }
        }

        dst.write_f32(&out)?;
        Ok(())
    }

    fn workspace(&self) -> MemoryRequirements {
        self.configured
            .as_ref()
            .map(|c| c.requirements.clone())
            .unwrap_or_default()
    }
}
