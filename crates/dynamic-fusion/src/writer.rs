// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! OpenCL source generation for fused component groups.
//!
//! Each component kind has a tera template producing its statements; the
//! `kernel` template wraps them with the argument list. Virtual tensors
//! become private variables, everything else a `__global` pointer.

use serde_json::{json, Value};
use tensor_core::{DType, TensorId, TensorInfo};
use tera::{Context, Tera};
use tracing::debug;

use crate::component_graph::GpuKernelComponentGroup;
use crate::components::{ComponentKind, KernelComponent};
use crate::context::GpuWorkloadContext;
use crate::error::FusionError;

const TEMPLATES: &[(&str, &str)] = &[
    ("kernel", include_str!("../templates/kernel.cl.tera")),
    ("elementwise", include_str!("../templates/elementwise.cl.tera")),
    ("clamp", include_str!("../templates/clamp.cl.tera")),
    ("store", include_str!("../templates/store.cl.tera")),
    ("reshape_rhs", include_str!("../templates/reshape_rhs.cl.tera")),
    ("matmul", include_str!("../templates/matmul.cl.tera")),
    ("softmax_exp_sum", include_str!("../templates/softmax_exp_sum.cl.tera")),
    ("softmax_norm", include_str!("../templates/softmax_norm.cl.tera")),
];

/// How a kernel touches an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentAccess {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct GpuKernelArgument {
    pub tensor: TensorId,
    pub access: ArgumentAccess,
}

/// One-dimensional execution window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Window {
    pub work_items: usize,
}

impl Window {
    pub fn new(work_items: usize) -> Self {
        Self { work_items }
    }
}

/// A generated kernel.
///
/// `program` keeps the components the kernel was written from; the
/// emulated command queue executes them in place of the device binary.
#[derive(Debug, Clone)]
pub struct GpuKernelSourceCode {
    pub name: String,
    pub code: String,
    pub build_options: Vec<String>,
    pub config_id: String,
    pub window: Window,
    pub arguments: Vec<GpuKernelArgument>,
    pub program: Vec<KernelComponent>,
}

pub struct GpuKernelWriter<'a> {
    tera: Tera,
    context: &'a GpuWorkloadContext,
}

impl<'a> GpuKernelWriter<'a> {
    pub fn new(context: &'a GpuWorkloadContext) -> Result<Self, FusionError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self { tera, context })
    }

    pub fn write(&self, group: &GpuKernelComponentGroup) -> Result<GpuKernelSourceCode, FusionError> {
        let name = group.name();
        let dtype = group
            .root_component()
            .and_then(|c| c.outputs().first())
            .map(TensorInfo::dtype)
            .unwrap_or(DType::F32);
        let window = Window::new(group.root_component().map_or(0, work_items));

        let mut arguments = Vec::new();
        let mut decls = Vec::new();
        for t in group.src_tensors() {
            arguments.push(GpuKernelArgument {
                tensor: t.id(),
                access: ArgumentAccess::Read,
            });
            decls.push(format!("__global const DATA_TYPE *t{}_ptr", t.id().0));
            decls.push(format!("const uint t{}_len", t.id().0));
        }
        for t in group.dst_tensors() {
            arguments.push(GpuKernelArgument {
                tensor: t.id(),
                access: ArgumentAccess::Write,
            });
            decls.push(format!("__global DATA_TYPE *t{}_ptr", t.id().0));
        }

        let mut body = Vec::with_capacity(group.components().len());
        for component in group.components() {
            let ctx = Context::from_value(self.component_context(component))?;
            let block = self.tera.render(component.kind().template(), &ctx)?;
            body.push(block.trim_end().to_string());
        }

        let components: Vec<_> = group.components().iter().map(|c| c.to_string()).collect();
        let mut ctx = Context::new();
        ctx.insert("name", &name);
        ctx.insert("components", &components);
        ctx.insert("work_items", &window.work_items);
        ctx.insert("arguments", &decls);
        ctx.insert("body", &body);
        let code = self.tera.render("kernel", &ctx)?;

        let build_options = vec![
            format!("-DDATA_TYPE={}", cl_type(dtype)),
            format!("-DWORK_ITEMS={}", window.work_items),
        ];
        let config_id = format!("{}_{}_{}", name, dtype, window.work_items);
        debug!("Wrote kernel {} ({} arguments)", config_id, arguments.len());

        Ok(GpuKernelSourceCode {
            name,
            code,
            build_options,
            config_id,
            window,
            arguments,
            program: group.components().to_vec(),
        })
    }

    fn tensor_view(&self, t: &TensorInfo) -> Value {
        let id = t.id().0;
        let materialised = self
            .context
            .memory_descriptor(t.id())
            .is_some_and(|m| m.is_materialised());
        let (read, write) = if materialised {
            (format!("t{id}_ptr[gid % t{id}_len]"), format!("t{id}_ptr[gid]"))
        } else {
            (format!("t{id}"), format!("DATA_TYPE t{id}"))
        };
        json!({ "name": format!("t{id}"), "read": read, "write": write })
    }

    fn component_context(&self, c: &KernelComponent) -> Value {
        let input = |i: usize| c.inputs().get(i).map(|t| self.tensor_view(t)).unwrap_or(Value::Null);
        let output = |i: usize| c.outputs().get(i).map(|t| self.tensor_view(t)).unwrap_or(Value::Null);
        let row_len = c.inputs().first().map_or(0, |t| t.shape().innermost());
        match c.kind() {
            ComponentKind::ElementwiseBinary { op } => json!({
                "lhs": input(0), "rhs": input(1), "dst": output(0), "symbol": op.symbol()
            }),
            ComponentKind::Clamp { min, max } => json!({
                "src": input(0), "dst": output(0),
                "min": float_literal(min), "max": float_literal(max)
            }),
            ComponentKind::Store => json!({ "src": input(0), "dst": output(0) }),
            ComponentKind::ReshapeRhs => {
                let dims = c.inputs().first().map(|t| t.shape().dims().to_vec()).unwrap_or_default();
                json!({
                    "src": input(0), "dst": output(0),
                    "k": dims.first().copied().unwrap_or(0), "n": dims.get(1).copied().unwrap_or(0)
                })
            }
            ComponentKind::MatMul => {
                let k = c.inputs().first().map_or(0, |t| t.shape().innermost());
                let n = c.outputs().first().map_or(0, |t| t.shape().innermost());
                json!({
                    "id": c.id().0, "lhs": input(0), "rhs": input(1), "dst": output(0), "k": k, "n": n
                })
            }
            ComponentKind::SoftmaxExpSum { beta } => json!({
                "src": input(0), "exp": output(0), "sum": output(1),
                "row_len": row_len, "beta": float_literal(beta)
            }),
            ComponentKind::SoftmaxNorm => json!({
                "exp": input(0), "sum": input(1), "dst": output(0), "row_len": row_len
            }),
        }
    }
}

/// Work items a kernel rooted at `root` needs.
fn work_items(root: &KernelComponent) -> usize {
    match root.kind() {
        ComponentKind::ReshapeRhs => root.inputs().first().map_or(0, TensorInfo::num_elements),
        ComponentKind::SoftmaxExpSum { .. } | ComponentKind::SoftmaxNorm => {
            root.inputs().first().map_or(0, |t| {
                let row_len = t.shape().innermost();
                if row_len == 0 {
                    0
                } else {
                    t.num_elements() / row_len
                }
            })
        }
        _ => root.outputs().first().map_or(0, TensorInfo::num_elements),
    }
}

fn cl_type(dtype: DType) -> &'static str {
    match dtype {
        DType::F16 => "half",
        _ => "float",
    }
}

fn float_literal(v: f32) -> String {
    if v == f32::INFINITY {
        "INFINITY".to_string()
    } else if v == f32::NEG_INFINITY {
        "-INFINITY".to_string()
    } else {
        format!("{v:?}f")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component_graph::GpuKernelComponentGraph;
    use crate::components::GpuComponentType;
    use crate::context::{GpuCapabilities, GpuTarget};
    use crate::source_code::UnitWorkloadStage;
    use tensor_core::ops::ArithmeticOp;

    #[test]
    fn test_fused_kernel_source() {
        let ctx = GpuWorkloadContext::new(GpuTarget::Valhall, GpuCapabilities::default());
        let a = ctx.create_tensor_info(TensorInfo::new([2, 4], DType::F32));
        let b = ctx.create_tensor_info(TensorInfo::new([4], DType::F32));
        let sum = ctx.create_virtual_tensor(TensorInfo::new([2, 4], DType::F32));
        let out = ctx.create_tensor_info(TensorInfo::new([2, 4], DType::F32));

        let mut graph = GpuKernelComponentGraph::new();
        let run = UnitWorkloadStage::Run;
        graph.add_component(
            ComponentKind::ElementwiseBinary { op: ArithmeticOp::Mul },
            GpuComponentType::Simple,
            run,
            &[a.clone(), b.clone()],
            &[sum.clone()],
        );
        graph.add_component(ComponentKind::Store, GpuComponentType::Output, run, &[sum.clone()], &[out.clone()]);
        let groups = graph.fuse(&ctx).unwrap();

        let writer = GpuKernelWriter::new(&ctx).unwrap();
        let src = writer.write(&groups[0]).unwrap();
        assert_eq!(src.name, "mul_store");
        assert_eq!(src.window.work_items, 8);
        assert_eq!(src.config_id, "mul_store_f32_8");
        assert!(src.build_options.contains(&"-DDATA_TYPE=float".to_string()));
        assert!(src.code.contains("__kernel void mul_store("));
        let local = format!("DATA_TYPE t{} = ", sum.id().0);
        assert!(src.code.contains(&local), "{}", src.code);
        assert!(src.code.contains(&format!("t{}_ptr[gid] = t{};", out.id().0, sum.id().0)));
        assert_eq!(src.arguments.len(), 3);
        assert_eq!(src.arguments[2].access, ArgumentAccess::Write);
        assert_eq!(src.program.len(), 2);
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(float_literal(6.0), "6.0f");
        assert_eq!(float_literal(f32::INFINITY), "INFINITY");
        assert_eq!(float_literal(-0.5), "-0.5f");
    }
}
