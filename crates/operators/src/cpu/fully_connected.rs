// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fully connected layer: `DST_0 = SRC_0 @ SRC_1ᵀ + SRC_2`.
//!
//! Weights arrive as `[N, K]`. `prepare` transposes them into a
//! prepare-lifetime buffer at `INT_VEC + 1`, hands that buffer to the inner
//! [`CpuGemm`] as its B and lets the GEMM pack it into its own persistent
//! buffer. The caller releases the prepare buffer afterwards.

use std::sync::Arc;
use tensor_core::ops::transpose_2d;
use tensor_core::{Shape, SlotId, TensorInfo, TensorPack};
use tracing::info;

use crate::aux_handler::{AuxTensorHandler, HandlerFlags};
use crate::cpu::gemm::{CpuGemm, GemmInfo};
use crate::memory::{MemoryInfo, MemoryLifetime, MemoryRequirements};
use crate::operator::{ensure_runnable, require_dst, require_src, Operator, OperatorState};
use crate::{CpuScheduler, HardwareCapabilities, OperatorError, Status};

const NAME: &str = "CpuFullyConnected";
const TRANSPOSED_WEIGHTS: i32 = 1;

pub struct CpuFullyConnected {
    gemm: CpuGemm,
    transposed_weights: Option<TensorInfo>,
    is_prepared: bool,
}

impl CpuFullyConnected {
    pub fn new(scheduler: Arc<CpuScheduler>) -> Self {
        Self {
            gemm: CpuGemm::new(scheduler),
            transposed_weights: None,
            is_prepared: false,
        }
    }

    fn gemm_info() -> GemmInfo {
        GemmInfo {
            alpha: 1.0,
            beta: 1.0,
            reshape_b_only_on_first_run: true,
        }
    }

    fn transposed_info(weights: &TensorInfo) -> Result<TensorInfo, OperatorError> {
        match weights.shape().dims() {
            &[n, k] => Ok(TensorInfo::new(Shape::matrix(k, n), weights.dtype())),
            _ => Err(OperatorError::InvalidConfiguration {
                op: NAME,
                reason: format!("weights must be [N, K], got {}", weights.shape()),
            }),
        }
    }

    pub fn validate(
        input: &TensorInfo,
        weights: &TensorInfo,
        bias: Option<&TensorInfo>,
        dst: &TensorInfo,
        caps: &HardwareCapabilities,
    ) -> Status {
        let transposed = Self::transposed_info(weights)?;
        CpuGemm::validate(input, &transposed, bias, dst, Self::gemm_info(), caps)
    }

    pub fn configure(
        &mut self,
        input: &TensorInfo,
        weights: &TensorInfo,
        bias: Option<&TensorInfo>,
        dst: &TensorInfo,
        caps: &HardwareCapabilities,
    ) -> Result<(), OperatorError> {
        let transposed = Self::transposed_info(weights)?;
        self.gemm
            .configure(input, &transposed, bias, dst, Self::gemm_info(), caps)?;
        info!("{NAME} configured: {} x {}ᵀ -> {}", input.shape(), weights.shape(), dst.shape());
        self.transposed_weights = Some(transposed);
        self.is_prepared = false;
        Ok(())
    }
}

impl Operator for CpuFullyConnected {
    fn name(&self) -> &'static str {
        NAME
    }

    fn state(&self) -> OperatorState {
        match (&self.transposed_weights, self.is_prepared) {
            (None, _) => OperatorState::Unconfigured,
            (Some(_), false) => OperatorState::Configured,
            (Some(_), true) => OperatorState::Prepared,
        }
    }

    fn prepare(&mut self, pack: &TensorPack) -> Result<(), OperatorError> {
        let Some(transposed) = self.transposed_weights.as_ref() else {
            return Err(OperatorError::NotConfigured(NAME));
        };
        if self.is_prepared {
            return Ok(());
        }

        let weights = require_src(pack, SlotId::SRC_1, NAME);
        let slot = SlotId::offset_int_vec(TRANSPOSED_WEIGHTS);
        require_dst(pack, slot, NAME);
        let aux = AuxTensorHandler::new(slot, transposed, pack, HandlerFlags::default())?;

        let (k, n) = (transposed.shape().dims()[0], transposed.shape().dims()[1]);
        let values = weights.read_f32()?;
        aux.get().write_f32(&transpose_2d(&values, n, k))?;

        let mut gemm_pack = pack.clone();
        gemm_pack.add_const_tensor(SlotId::SRC_1, aux.get().clone());
        self.gemm.prepare(&gemm_pack)?;

        self.is_prepared = true;
        Ok(())
    }

    fn run(&mut self, pack: &TensorPack) -> Result<(), OperatorError> {
        ensure_runnable(NAME, self.state(), true)?;
        self.gemm.run(pack)
    }

    fn workspace(&self) -> MemoryRequirements {
        let mut reqs = self.gemm.workspace();
        if let Some(transposed) = &self.transposed_weights {
            reqs.push(MemoryInfo::new(
                SlotId::offset_int_vec(TRANSPOSED_WEIGHTS),
                MemoryLifetime::Prepare,
                transposed.total_size(),
            ));
        }
        reqs
    }
}
