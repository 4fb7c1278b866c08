// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and the helpers they share.

pub mod caps;
pub mod fuse;
pub mod run;
pub mod workspace;

use std::path::Path;

use anyhow::Context;
use operators::cpu::{AddMulAddArgs, CpuAddMulAdd, CpuFullyConnected, CpuGemm, CpuSub, GemmInfo};
use operators::{HardwareCapabilities, Operator};
use runtime::RuntimeConfig;
use tensor_core::ops::{ActivationInfo, ConvertPolicy};
use tensor_core::{DType, QuantizationInfo, SlotId, TensorInfo};
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins over the verbosity count.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    match path {
        Some(p) => RuntimeConfig::from_file(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CpuOp {
    Sub,
    AddMulAdd,
    Gemm,
    FullyConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OpDType {
    F32,
    Qasymm8,
}

impl OpDType {
    fn info(self, shape: &[usize]) -> TensorInfo {
        match self {
            OpDType::F32 => TensorInfo::new(shape.to_vec(), DType::F32),
            OpDType::Qasymm8 => TensorInfo::new(shape.to_vec(), DType::QAsymm8)
                .with_quantization(QuantizationInfo::new(0.05, 128)),
        }
    }
}

/// One tensor the operator expects in its pack.
pub struct Binding {
    pub slot: SlotId,
    pub info: TensorInfo,
    pub is_const: bool,
}

/// A configured operator with the tensors it was configured for.
pub struct ConfiguredOp {
    pub op: Box<dyn Operator>,
    pub bindings: Vec<Binding>,
}

fn input(slot: SlotId, info: TensorInfo) -> Binding {
    Binding {
        slot,
        info,
        is_const: true,
    }
}

fn output(slot: SlotId, info: TensorInfo) -> Binding {
    Binding {
        slot,
        info,
        is_const: false,
    }
}

/// Configures `op` on fixed demonstration shapes.
pub fn configure(op: CpuOp, dtype: OpDType, config: &RuntimeConfig) -> anyhow::Result<ConfiguredOp> {
    let caps = HardwareCapabilities::detect();
    let scheduler = config.scheduler()?;

    let configured = match op {
        CpuOp::Sub => {
            let info = dtype.info(&[4, 4]);
            let mut sub = CpuSub::new(scheduler);
            sub.configure(&info, &info, &info, ConvertPolicy::Saturate, &caps)?;
            ConfiguredOp {
                op: Box::new(sub),
                bindings: vec![
                    input(SlotId::SRC_0, info.clone()),
                    input(SlotId::SRC_1, info.clone()),
                    output(SlotId::DST_0, info),
                ],
            }
        }
        CpuOp::AddMulAdd => {
            let data = dtype.info(&[4, 8]);
            let bn = dtype.info(&[8]);
            let mut amad = CpuAddMulAdd::new(scheduler);
            let args = AddMulAddArgs {
                input1: &data,
                input2: &data,
                bn_mul: &bn,
                bn_add: &bn,
                add_output: None,
                final_output: &data,
            };
            amad.configure(args, ActivationInfo::relu(), &caps)?;
            ConfiguredOp {
                op: Box::new(amad),
                bindings: vec![
                    input(SlotId::SRC_0, data.clone()),
                    input(SlotId::SRC_1, data.clone()),
                    input(SlotId::SRC_2, bn.clone()),
                    input(SlotId::SRC_3, bn),
                    output(SlotId::DST_1, data),
                ],
            }
        }
        CpuOp::Gemm => {
            let a = dtype.info(&[4, 8]);
            let b = dtype.info(&[8, 16]);
            let dst = dtype.info(&[4, 16]);
            let mut gemm = CpuGemm::new(scheduler);
            let gemm_info = GemmInfo {
                reshape_b_only_on_first_run: true,
                ..GemmInfo::default()
            };
            gemm.configure(&a, &b, None, &dst, gemm_info, &caps)?;
            ConfiguredOp {
                op: Box::new(gemm),
                bindings: vec![
                    input(SlotId::SRC_0, a),
                    input(SlotId::SRC_1, b),
                    output(SlotId::DST_0, dst),
                ],
            }
        }
        CpuOp::FullyConnected => {
            let x = dtype.info(&[1, 8]);
            let weights = dtype.info(&[16, 8]);
            let dst = dtype.info(&[1, 16]);
            let mut fc = CpuFullyConnected::new(scheduler);
            fc.configure(&x, &weights, None, &dst, &caps)?;
            ConfiguredOp {
                op: Box::new(fc),
                bindings: vec![
                    input(SlotId::SRC_0, x),
                    input(SlotId::SRC_1, weights),
                    output(SlotId::DST_0, dst),
                ],
            }
        }
    };
    Ok(configured)
}
