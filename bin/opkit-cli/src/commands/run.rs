// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `opkit run` command: drive an operator through a [`runtime::Function`].
//!
//! Input slot `i` is filled with the constant `FILL[i]`, so `run --op sub`
//! computes `2.0 - 0.5` everywhere.

use runtime::{Function, RuntimeConfig};
use tensor_core::{Tensor, TensorPack};

use super::{CpuOp, OpDType};

const FILL: [f32; 4] = [2.0, 0.5, 1.5, 0.25];

pub fn execute(op: CpuOp, dtype: OpDType, iterations: usize, config: &RuntimeConfig) -> anyhow::Result<()> {
    let pool = config.memory_pool()?;
    let configured = super::configure(op, dtype, config)?;

    let mut bindings = TensorPack::new();
    let mut outputs = Vec::new();
    for (i, binding) in configured.bindings.iter().enumerate() {
        let tensor = Tensor::shared(binding.info.clone());
        tensor.allocate_in(&pool)?;
        if binding.is_const {
            let value = FILL[i % FILL.len()];
            tensor.write_from_f32(&vec![value; binding.info.num_elements()])?;
            bindings.add_const_tensor(binding.slot, tensor);
        } else {
            bindings.add_tensor(binding.slot, tensor.clone());
            outputs.push((binding.slot, tensor));
        }
    }

    let mut function = Function::new(configured.op, &bindings, &pool, config)?.prepare()?;
    for _ in 0..iterations.max(1) {
        function.run()?;
    }

    for (slot, tensor) in &outputs {
        let values = tensor.to_f32_vec()?;
        let preview: Vec<String> = values.iter().take(8).map(|v| format!("{v:.3}")).collect();
        let more = if values.len() > 8 { ", ..." } else { "" };
        println!("{slot} {}: [{}{more}]", tensor.info(), preview.join(", "));
    }
    println!("{}", function.metrics().summary());
    println!("pool: {} bytes allocated", pool.allocated_bytes());
    Ok(())
}
