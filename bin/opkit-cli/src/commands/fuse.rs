// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `opkit fuse` command: record a chain of GPU operators into workload
//! sketches and print the kernels generated for each.
//!
//! Operators are appended to the current sketch for as long as the fusion
//! test accepts them. When it rejects one, the running value is written to
//! a user tensor and a new sketch picks up from there.

use std::fmt;

use anyhow::{bail, Context};
use dynamic_fusion::ops::{
    ClampAttributes, GpuAdd, GpuClamp, GpuMatMul, GpuMul, GpuOutput, GpuSoftmax, GpuSub, SoftmaxAttributes,
};
use dynamic_fusion::{
    ClCompileContext, ClWorkloadRuntime, FusionError, GpuCapabilities, GpuTarget, GpuWorkloadContext,
    GpuWorkloadSketch, MemoryType,
};
use runtime::RuntimeConfig;
use tensor_core::{DType, Shape, Tensor, TensorHandle, TensorInfo};
use tracing::info;

#[derive(Debug, Clone, Copy)]
enum Step {
    Add,
    Sub,
    Mul,
    Clamp,
    MatMul,
    Softmax,
}

impl Step {
    fn parse(s: &str) -> anyhow::Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "add" => Step::Add,
            "sub" => Step::Sub,
            "mul" => Step::Mul,
            "clamp" | "relu6" => Step::Clamp,
            "matmul" => Step::MatMul,
            "softmax" => Step::Softmax,
            other => bail!("unknown operator '{other}'; expected add, sub, mul, clamp, matmul or softmax"),
        })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A user tensor of the workload and whether the command fills it.
struct UserTensor {
    info: TensorInfo,
    is_input: bool,
}

struct Builder<'c> {
    context: &'c GpuWorkloadContext,
    sketches: Vec<GpuWorkloadSketch<'c>>,
    current: GpuWorkloadSketch<'c>,
    users: Vec<UserTensor>,
}

impl<'c> Builder<'c> {
    fn new(context: &'c GpuWorkloadContext) -> Self {
        Self {
            context,
            sketches: Vec::new(),
            current: GpuWorkloadSketch::new(context),
            users: Vec::new(),
        }
    }

    fn user(&mut self, info: TensorInfo, is_input: bool) -> TensorInfo {
        let info = self.context.create_tensor_info(info);
        self.users.push(UserTensor {
            info: info.clone(),
            is_input,
        });
        info
    }

    /// The extra user tensor `step` needs: an operand or a destination.
    fn operand(&mut self, step: Step, value: &TensorInfo) -> Option<TensorInfo> {
        let cols = value.shape().innermost();
        match step {
            Step::Add | Step::Sub | Step::Mul => Some(self.user(TensorInfo::new(Shape::vector(cols), value.dtype()), true)),
            Step::MatMul => Some(self.user(TensorInfo::new(Shape::matrix(cols, cols), value.dtype()), true)),
            Step::Softmax => Some(self.user(TensorInfo::new(value.shape().clone(), value.dtype()), false)),
            Step::Clamp => None,
        }
    }

    fn apply(&mut self, step: Step, src: &TensorInfo, operand: Option<&TensorInfo>) -> Result<TensorInfo, FusionError> {
        let sketch = &mut self.current;
        let other = || operand.cloned().unwrap_or_else(|| src.clone());
        match step {
            Step::Add => GpuAdd::create_op(sketch, src, &other()),
            Step::Sub => GpuSub::create_op(sketch, src, &other()),
            Step::Mul => GpuMul::create_op(sketch, src, &other()),
            Step::MatMul => GpuMatMul::create_op(sketch, src, &other()),
            Step::Clamp => GpuClamp::create_op(sketch, src, &ClampAttributes::new(0.0, 6.0)),
            Step::Softmax => {
                let dst = other();
                GpuSoftmax::create_op(sketch, src, &dst, &SoftmaxAttributes::default())?;
                Ok(dst)
            }
        }
    }

    /// Writes a virtual `value` to a fresh user tensor and starts a new
    /// sketch. Returns the tensor the next sketch reads.
    fn close(&mut self, value: TensorInfo) -> anyhow::Result<TensorInfo> {
        let is_virtual = self
            .context
            .memory_descriptor(value.id())
            .is_some_and(|m| m.memory_type == MemoryType::Virtual);
        let value = if is_virtual {
            let dst = self.user(TensorInfo::new(value.shape().clone(), value.dtype()), false);
            GpuOutput::create_op(&mut self.current, &value, &dst)?;
            dst
        } else {
            value
        };
        let done = std::mem::replace(&mut self.current, GpuWorkloadSketch::new(self.context));
        self.sketches.push(done);
        Ok(value)
    }
}

fn parse_target(s: &str) -> anyhow::Result<GpuTarget> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "midgard" => GpuTarget::Midgard,
        "bifrost" => GpuTarget::Bifrost,
        "valhall" => GpuTarget::Valhall,
        other => bail!("unknown GPU target '{other}'"),
    })
}

pub fn execute(
    ops: &[String],
    rows: usize,
    cols: usize,
    target: &str,
    run: bool,
    config: &RuntimeConfig,
) -> anyhow::Result<()> {
    let steps = ops.iter().map(|s| Step::parse(s)).collect::<anyhow::Result<Vec<_>>>()?;
    if steps.is_empty() {
        bail!("no operators given");
    }

    let target = parse_target(target)?;
    let context = GpuWorkloadContext::new(target, GpuCapabilities::default())
        .with_compile_context(ClCompileContext::new(format!("{target}-host")));

    let mut builder = Builder::new(&context);
    let mut value = builder.user(TensorInfo::new(Shape::matrix(rows, cols), DType::F32), true);
    for &step in &steps {
        let operand = builder.operand(step, &value);
        match builder.apply(step, &value, operand.as_ref()) {
            Ok(out) => value = out,
            Err(FusionError::FusionTestFailed(reason)) if !builder.current.is_empty() => {
                info!("{step} starts a new workload: {reason}");
                value = builder.close(value)?;
                value = builder
                    .apply(step, &value, operand.as_ref())
                    .with_context(|| format!("adding {step} to a fresh sketch"))?;
            }
            Err(e) => return Err(e).with_context(|| format!("adding {step}")),
        }
    }
    let result = builder.close(value)?;
    let Builder { sketches, users, .. } = builder;

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                opkit · Fused Workloads               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!("  Chain: {} on {target}", ops.join(" -> "));
    println!("  Sketches: {}", sketches.len());

    for (i, sketch) in sketches.iter().enumerate() {
        let source = sketch.generate_source_code()?;
        println!();
        println!("── sketch {i}: {} operators, {} unit workloads", sketch.operator_group().len(), source.len());
        for id in source.unit_workloads() {
            let Some(unit) = source.query_unit_workload(id) else {
                continue;
            };
            let code = unit.code();
            println!();
            println!("  {id} [{}] {} ({})", unit.stage(), code.name, code.config_id);
            println!("  build options: {}", code.build_options.join(" "));
            for line in code.code.lines() {
                println!("    {line}");
            }
        }
    }

    if !run {
        return Ok(());
    }

    let pool = config.memory_pool()?;
    let mut handles: Vec<TensorHandle> = Vec::with_capacity(users.len());
    for (k, user) in users.iter().enumerate() {
        let tensor = Tensor::shared(user.info.clone());
        tensor.allocate_in(&pool)?;
        if user.is_input {
            let n = user.info.num_elements();
            let values: Vec<f32> = (0..n)
                .map(|j| ((j % 7) as f32 - 3.0) * 0.5 / (k + 1) as f32)
                .collect();
            tensor.write_f32(&values)?;
        }
        handles.push(tensor);
    }

    for (i, sketch) in sketches.iter().enumerate() {
        let mut runtime = ClWorkloadRuntime::new(&pool).with_flush_queue(config.flush_gpu_queue);
        runtime.configure(sketch)?;
        runtime.run(&handles)?;
        runtime.finish()?;
        info!("sketch {i} executed ({} kernels)", runtime.queue().executed());
    }

    let out = handles
        .iter()
        .find(|t| t.info().id() == result.id())
        .context("result tensor was not materialised")?;
    let values = out.read_f32()?;
    println!();
    println!("  Result {}:", out.info());
    for row in values.chunks(cols.max(1)).take(4) {
        let row: Vec<String> = row.iter().map(|v| format!("{v:>8.4}")).collect();
        println!("    {}", row.join(" "));
    }
    Ok(())
}
