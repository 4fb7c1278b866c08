// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Component graph and the fusion pass that groups components into kernels.

use std::collections::{BTreeMap, BTreeSet};

use tensor_core::{TensorId, TensorInfo};
use tracing::debug;

use crate::components::{ComponentId, ComponentKind, GpuComponentType, KernelComponent};
use crate::context::GpuWorkloadContext;
use crate::error::FusionError;
use crate::graph::{DependencyGraph, OperatorId};
use crate::source_code::UnitWorkloadStage;

/// Components that end up in one kernel, in execution order.
#[derive(Debug, Clone, Default)]
pub struct GpuKernelComponentGroup {
    components: Vec<KernelComponent>,
}

impl GpuKernelComponentGroup {
    pub const MAX_COMPONENTS: usize = 32;

    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `component` if it may share a kernel with the group so far.
    pub fn add_component(&mut self, component: &KernelComponent) -> bool {
        if !self.can_add(component) {
            return false;
        }
        self.components.push(component.clone());
        true
    }

    fn can_add(&self, component: &KernelComponent) -> bool {
        let (Some(root), Some(tail)) = (self.components.first(), self.components.last()) else {
            return true;
        };
        if self.components.len() >= Self::MAX_COMPONENTS {
            return false;
        }
        if component.stage() != root.stage() {
            return false;
        }
        if tail.component_type() == GpuComponentType::Output {
            return false;
        }
        let allowed = match root.component_type() {
            GpuComponentType::Unfusable => component.component_type() == GpuComponentType::Output,
            _ => matches!(
                component.component_type(),
                GpuComponentType::Simple | GpuComponentType::Output
            ),
        };
        if !allowed {
            return false;
        }
        let linked = component
            .inputs()
            .iter()
            .any(|t| tail.outputs().iter().any(|o| o.id() == t.id()));
        if !linked {
            return false;
        }
        let Some(reference) = root.outputs().first().map(TensorInfo::shape) else {
            return false;
        };
        component.outputs().iter().all(|t| t.shape() == reference)
    }

    pub fn components(&self) -> &[KernelComponent] {
        &self.components
    }

    pub fn root_component(&self) -> Option<&KernelComponent> {
        self.components.first()
    }

    pub fn stage(&self) -> UnitWorkloadStage {
        self.root_component()
            .map(KernelComponent::stage)
            .unwrap_or(UnitWorkloadStage::Run)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Kernel name built from the component names.
    pub fn name(&self) -> String {
        let names: Vec<_> = self.components.iter().map(|c| c.kind().name()).collect();
        names.join("_")
    }

    /// Tensors read by the group but produced outside it.
    pub fn src_tensors(&self) -> Vec<TensorInfo> {
        let produced = self.produced_ids();
        let mut seen = BTreeSet::new();
        self.components
            .iter()
            .flat_map(|c| c.inputs())
            .filter(|t| !produced.contains(&t.id()) && seen.insert(t.id()))
            .cloned()
            .collect()
    }

    /// Tensors written by the group and not consumed inside it.
    pub fn dst_tensors(&self) -> Vec<TensorInfo> {
        let consumed = self.consumed_ids();
        self.components
            .iter()
            .flat_map(|c| c.outputs())
            .filter(|t| !consumed.contains(&t.id()))
            .cloned()
            .collect()
    }

    /// Tensors produced and consumed inside the group.
    pub fn interm_tensors(&self) -> Vec<TensorInfo> {
        let consumed = self.consumed_ids();
        self.components
            .iter()
            .flat_map(|c| c.outputs())
            .filter(|t| consumed.contains(&t.id()))
            .cloned()
            .collect()
    }

    fn produced_ids(&self) -> BTreeSet<TensorId> {
        self.components
            .iter()
            .flat_map(|c| c.outputs())
            .map(TensorInfo::id)
            .collect()
    }

    fn consumed_ids(&self) -> BTreeSet<TensorId> {
        self.components
            .iter()
            .flat_map(|c| c.inputs())
            .map(TensorInfo::id)
            .collect()
    }
}

/// A component not yet added to a graph.
#[derive(Debug, Clone)]
pub(crate) struct ComponentSpec {
    pub kind: ComponentKind,
    pub component_type: GpuComponentType,
    pub stage: UnitWorkloadStage,
    pub inputs: Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
}

/// Components checked against a copy of the dependency graph.
#[derive(Debug)]
pub(crate) struct StagedComponents {
    graph: DependencyGraph,
    components: Vec<KernelComponent>,
}

/// Every component a sketch has lowered to, with their dependencies.
#[derive(Debug, Clone, Default)]
pub struct GpuKernelComponentGraph {
    graph: DependencyGraph,
    components: BTreeMap<ComponentId, KernelComponent>,
}

impl GpuKernelComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component. Returns `None` if the dependency graph rejects it.
    pub fn add_component(
        &mut self,
        kind: ComponentKind,
        component_type: GpuComponentType,
        stage: UnitWorkloadStage,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> Option<ComponentId> {
        let spec = ComponentSpec {
            kind,
            component_type,
            stage,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        };
        let staged = self.stage_components(vec![spec])?;
        self.commit_components(staged).first().copied()
    }

    /// Checks a batch of components without touching `self`. `None` if the
    /// dependency graph rejects any of them.
    pub(crate) fn stage_components(&self, specs: Vec<ComponentSpec>) -> Option<StagedComponents> {
        let mut graph = self.graph.clone();
        let mut components = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = OperatorId((self.components.len() + components.len()) as u32);
            let input_ids: Vec<_> = spec.inputs.iter().map(TensorInfo::id).collect();
            let output_ids: Vec<_> = spec.outputs.iter().map(TensorInfo::id).collect();
            if !graph.add_operator(id, &input_ids, &output_ids) {
                return None;
            }
            components.push(KernelComponent::new(
                id,
                spec.kind,
                spec.component_type,
                spec.stage,
                spec.inputs,
                spec.outputs,
            ));
        }
        Some(StagedComponents { graph, components })
    }

    /// Adds a staged batch. The graph must not have changed since staging.
    pub(crate) fn commit_components(&mut self, staged: StagedComponents) -> Vec<ComponentId> {
        self.graph = staged.graph;
        staged
            .components
            .into_iter()
            .map(|component| {
                let id = component.id();
                self.components.insert(id, component);
                id
            })
            .collect()
    }

    pub fn component(&self, id: ComponentId) -> Option<&KernelComponent> {
        self.components.get(&id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Groups components into kernels, greedily and in dependency order.
    ///
    /// Fails if a virtual tensor would have to cross a kernel boundary or a
    /// kernel leaves its result in a virtual tensor.
    pub fn fuse(&self, context: &GpuWorkloadContext) -> Result<Vec<GpuKernelComponentGroup>, FusionError> {
        let mut groups = Vec::new();
        let mut current = GpuKernelComponentGroup::new();
        for pack in self.graph.topological_sort() {
            let Some(component) = self.components.get(&pack.op) else {
                continue;
            };
            if !current.add_component(component) {
                groups.push(std::mem::take(&mut current));
                current.add_component(component);
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }

        for group in &groups {
            for t in group.src_tensors().iter().chain(group.dst_tensors().iter()) {
                let memory = context
                    .memory_descriptor(t.id())
                    .ok_or(FusionError::UnknownTensor(t.id()))?;
                if memory.is_materialised() {
                    continue;
                }
                return Err(if self.graph.producer(t.id()).is_some()
                    && !self.graph.consumers(t.id()).is_empty()
                {
                    FusionError::VirtualTensorCrossesKernels(t.id())
                } else {
                    FusionError::UnboundResult(t.id())
                });
            }
        }
        debug!(
            "Fused {} components into {} kernels",
            self.components.len(),
            groups.len()
        );
        Ok(groups)
    }
}
