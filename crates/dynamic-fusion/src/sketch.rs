// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The workload sketch: operators recorded for one fused workload.

use tracing::info;

use crate::component_graph::GpuKernelComponentGraph;
use crate::context::GpuWorkloadContext;
use crate::error::FusionError;
use crate::operator_group::GpuOperatorGroup;
use crate::source_code::GpuWorkloadSourceCode;
use crate::writer::GpuKernelWriter;

/// Records operators into one workload.
///
/// Operators are added through the `create_op` functions of the sketch
/// operators (`GpuAdd`, `GpuMatMul`, ...). A failed `create_op` leaves the
/// sketch as it was.
#[derive(Debug)]
pub struct GpuWorkloadSketch<'ctx> {
    context: &'ctx GpuWorkloadContext,
    operator_group: GpuOperatorGroup,
    component_graph: GpuKernelComponentGraph,
}

impl<'ctx> GpuWorkloadSketch<'ctx> {
    pub fn new(context: &'ctx GpuWorkloadContext) -> Self {
        Self {
            context,
            operator_group: GpuOperatorGroup::new(),
            component_graph: GpuKernelComponentGraph::new(),
        }
    }

    pub fn gpu_context(&self) -> &'ctx GpuWorkloadContext {
        self.context
    }

    pub fn operator_group(&self) -> &GpuOperatorGroup {
        &self.operator_group
    }

    pub fn component_graph(&self) -> &GpuKernelComponentGraph {
        &self.component_graph
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut GpuOperatorGroup, &mut GpuKernelComponentGraph) {
        (&mut self.operator_group, &mut self.component_graph)
    }

    pub fn is_empty(&self) -> bool {
        self.operator_group.is_empty()
    }

    /// Fuses the component graph and writes one unit workload per kernel.
    pub fn generate_source_code(&self) -> Result<GpuWorkloadSourceCode, FusionError> {
        let groups = self.component_graph.fuse(self.context)?;
        let writer = GpuKernelWriter::new(self.context)?;
        let mut source_code = GpuWorkloadSourceCode::new();
        for group in &groups {
            let code = writer.write(group)?;
            source_code.add_unit_workload(code, group.stage(), self.context)?;
        }
        info!(
            "Generated {} unit workloads from {} operators",
            source_code.len(),
            self.operator_group.len()
        );
        Ok(source_code)
    }
}
