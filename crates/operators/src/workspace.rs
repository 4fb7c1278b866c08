// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Materialisation of an operator's declared workspace.
//!
//! Auxiliary memory moves through
//! `Declared → Allocated → (Prepared →) InUse → (Released)`. Temporary
//! buffers are placed in a [`MemoryGroup`] segment so that temporaries of
//! different operators share one arena; persistent and prepare buffers get
//! memory of their own and are visible in both the run and prepare packs.

use memory_manager::{MemoryGroup, MemoryPool};
use tensor_core::{SlotId, Tensor, TensorHandle, TensorInfo, TensorPack};
use tracing::{debug, info};

use crate::memory::{MemoryInfo, MemoryLifetime};
use crate::OperatorError;

/// Lifecycle of one auxiliary buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxMemoryState {
    Declared,
    Allocated,
    Prepared,
    InUse,
    Released,
}

/// One materialised requirement.
#[derive(Debug, Clone)]
pub struct WorkspaceEntry {
    pub slot: SlotId,
    pub lifetime: MemoryLifetime,
    pub tensor: TensorHandle,
    pub state: AuxMemoryState,
}

/// The auxiliary tensors of one operator, in requirement order.
#[derive(Debug, Default)]
pub struct Workspace {
    entries: Vec<WorkspaceEntry>,
}

impl Workspace {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[WorkspaceEntry] {
        &self.entries
    }

    pub fn get(&self, slot: SlotId) -> Option<&WorkspaceEntry> {
        self.entries.iter().find(|e| e.slot == slot)
    }

    /// Bytes held outside the memory group.
    pub fn owned_bytes(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.lifetime != MemoryLifetime::Temporary && e.tensor.is_allocated())
            .map(|e| e.tensor.info().total_size())
            .sum()
    }
}

/// Creates a flat byte tensor for every non-empty requirement and wires it
/// into the packs.
///
/// Temporary tensors are managed by `group` in a fresh segment and added to
/// `run_pack` only. Persistent and prepare tensors are added to both packs
/// and allocated from the group's pool right away when `allocate_now` is
/// set; otherwise they stay declared until [`allocate_tensors`].
pub fn manage_workspace(
    requirements: &[MemoryInfo],
    group: &mut MemoryGroup,
    run_pack: &mut TensorPack,
    prepare_pack: &mut TensorPack,
    allocate_now: bool,
) -> Result<Workspace, OperatorError> {
    group.begin_segment();
    let mut entries = Vec::with_capacity(requirements.len());

    for req in requirements.iter().filter(|r| r.size > 0) {
        let tensor = Tensor::shared(TensorInfo::flat_bytes(req.size));
        let state = match req.lifetime {
            MemoryLifetime::Temporary => {
                tensor.bind_region(group.manage(req.size, req.alignment)?);
                run_pack.add_tensor(req.slot, tensor.clone());
                AuxMemoryState::Allocated
            }
            MemoryLifetime::Persistent | MemoryLifetime::Prepare => {
                prepare_pack.add_tensor(req.slot, tensor.clone());
                run_pack.add_tensor(req.slot, tensor.clone());
                if allocate_now {
                    tensor.allocate_in(group.pool())?;
                    AuxMemoryState::Allocated
                } else {
                    AuxMemoryState::Declared
                }
            }
        };
        debug!(slot = %req.slot, lifetime = %req.lifetime, bytes = req.size, ?state, "workspace entry");
        entries.push(WorkspaceEntry {
            slot: req.slot,
            lifetime: req.lifetime,
            tensor,
            state,
        });
    }

    let temporaries = entries
        .iter()
        .filter(|e| e.lifetime == MemoryLifetime::Temporary)
        .count();
    info!(
        "Workspace materialised: {} entries ({} temporary), group arena {} bytes",
        entries.len(),
        temporaries,
        group.arena_bytes()
    );
    Ok(Workspace { entries })
}

/// Allocates every persistent or prepare tensor that is still declared.
pub fn allocate_tensors(workspace: &mut Workspace, pool: &MemoryPool) -> Result<(), OperatorError> {
    for entry in workspace
        .entries
        .iter_mut()
        .filter(|e| e.state == AuxMemoryState::Declared)
    {
        entry.tensor.allocate_in(pool)?;
        entry.state = AuxMemoryState::Allocated;
    }
    Ok(())
}

/// Drops every prepare-lifetime entry, freeing its memory and removing its
/// slot from `prepare_pack`.
pub fn release_prepare_tensors(workspace: &mut Workspace, prepare_pack: &mut TensorPack) {
    workspace.entries.retain(|entry| {
        if entry.lifetime != MemoryLifetime::Prepare {
            return true;
        }
        prepare_pack.remove_tensor(entry.slot);
        entry.tensor.free();
        debug!(slot = %entry.slot, "prepare tensor released");
        false
    });
}

/// Frees the memory of prepare-lifetime entries but keeps them listed.
pub fn free_prepare_tensors(workspace: &mut Workspace) {
    for entry in workspace
        .entries
        .iter_mut()
        .filter(|e| e.lifetime == MemoryLifetime::Prepare && e.state != AuxMemoryState::Released)
    {
        entry.tensor.free();
        entry.state = AuxMemoryState::Released;
    }
}

/// Marks allocated persistent and prepare entries as prepared.
pub fn mark_prepared(workspace: &mut Workspace) {
    for entry in workspace.entries.iter_mut() {
        if entry.lifetime != MemoryLifetime::Temporary && entry.state == AuxMemoryState::Allocated {
            entry.state = AuxMemoryState::Prepared;
        }
    }
}

/// Marks every live entry as in use by `run`.
pub fn mark_in_use(workspace: &mut Workspace) {
    for entry in workspace.entries.iter_mut() {
        if matches!(entry.state, AuxMemoryState::Allocated | AuxMemoryState::Prepared) {
            entry.state = AuxMemoryState::InUse;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::MemoryBudget;

    fn one_of_each() -> Vec<MemoryInfo> {
        vec![
            MemoryInfo::new(SlotId::offset_int_vec(0), MemoryLifetime::Temporary, 256),
            MemoryInfo::new(SlotId::offset_int_vec(1), MemoryLifetime::Persistent, 128),
            MemoryInfo::new(SlotId::offset_int_vec(2), MemoryLifetime::Prepare, 64),
        ]
    }

    #[test]
    fn test_lifetime_partition() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mut group = MemoryGroup::new(&pool);
        let mut run_pack = TensorPack::new();
        let mut prepare_pack = TensorPack::new();

        let mut ws = manage_workspace(&one_of_each(), &mut group, &mut run_pack, &mut prepare_pack, true)
            .unwrap();
        assert_eq!(ws.len(), 3);

        let tmp = SlotId::offset_int_vec(0);
        let persistent = SlotId::offset_int_vec(1);
        let prepare = SlotId::offset_int_vec(2);

        assert_eq!(group.num_managed(), 1);
        assert!(ws.get(tmp).unwrap().tensor.is_allocated());
        assert!(run_pack.get_tensor(tmp).is_some());
        assert!(prepare_pack.get_tensor(tmp).is_none());

        for slot in [persistent, prepare] {
            assert!(run_pack.get_tensor(slot).is_some());
            assert!(prepare_pack.get_tensor(slot).is_some());
            assert!(ws.get(slot).unwrap().tensor.is_backed());
        }
        assert_eq!(pool.allocated_bytes(), 192);

        let prepare_tensor = ws.get(prepare).unwrap().tensor.clone();
        release_prepare_tensors(&mut ws, &mut prepare_pack);
        assert_eq!(ws.len(), 2);
        assert!(ws.get(prepare).is_none());
        assert!(prepare_pack.get_tensor(prepare).is_none());
        assert!(prepare_pack.get_tensor(persistent).is_some());
        assert!(!prepare_tensor.is_allocated());
        assert_eq!(pool.allocated_bytes(), 128);
    }

    #[test]
    fn test_temporaries_are_backed_inside_group_scope() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mut group = MemoryGroup::new(&pool);
        let mut run_pack = TensorPack::new();
        let mut prepare_pack = TensorPack::new();
        let ws = manage_workspace(&one_of_each()[..1], &mut group, &mut run_pack, &mut prepare_pack, true)
            .unwrap();
        let tmp = &ws.entries()[0].tensor;
        assert!(!tmp.is_backed());
        {
            let _scope = group.scope().unwrap();
            assert!(tmp.is_backed());
            tmp.write_bytes(&[1u8; 256]).unwrap();
        }
        assert!(!tmp.is_backed());
    }

    #[test]
    fn test_lazy_allocation() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mut group = MemoryGroup::new(&pool);
        let mut run_pack = TensorPack::new();
        let mut prepare_pack = TensorPack::new();
        let mut ws = manage_workspace(&one_of_each(), &mut group, &mut run_pack, &mut prepare_pack, false)
            .unwrap();

        let states: Vec<_> = ws.entries().iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![AuxMemoryState::Allocated, AuxMemoryState::Declared, AuxMemoryState::Declared]
        );
        assert_eq!(pool.allocated_bytes(), 0);

        allocate_tensors(&mut ws, &pool).unwrap();
        allocate_tensors(&mut ws, &pool).unwrap();
        assert_eq!(pool.allocated_bytes(), 192);
        assert_eq!(ws.owned_bytes(), 192);
    }

    #[test]
    fn test_state_machine() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mut group = MemoryGroup::new(&pool);
        let mut run_pack = TensorPack::new();
        let mut prepare_pack = TensorPack::new();
        let mut ws = manage_workspace(&one_of_each(), &mut group, &mut run_pack, &mut prepare_pack, true)
            .unwrap();

        mark_prepared(&mut ws);
        free_prepare_tensors(&mut ws);
        free_prepare_tensors(&mut ws);
        mark_in_use(&mut ws);

        let states: Vec<_> = ws.entries().iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![AuxMemoryState::InUse, AuxMemoryState::InUse, AuxMemoryState::Released]
        );
        assert_eq!(pool.allocated_bytes(), 128);
    }

    #[test]
    fn test_zero_sized_requirements_are_skipped() {
        let pool = MemoryPool::unbounded();
        let mut group = MemoryGroup::new(&pool);
        let mut run_pack = TensorPack::new();
        let mut prepare_pack = TensorPack::new();
        let reqs = vec![MemoryInfo::new(SlotId::INT_0, MemoryLifetime::Temporary, 0)];
        let ws = manage_workspace(&reqs, &mut group, &mut run_pack, &mut prepare_pack, true).unwrap();
        assert!(ws.is_empty());
        assert!(run_pack.empty());
        assert_eq!(group.num_managed(), 0);
    }

    #[test]
    fn test_two_operators_alias_temporaries() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mut group = MemoryGroup::new(&pool);
        let reqs_a = vec![MemoryInfo::new(SlotId::INT_0, MemoryLifetime::Temporary, 512)];
        let reqs_b = vec![
            MemoryInfo::new(SlotId::INT_0, MemoryLifetime::Temporary, 128),
            MemoryInfo::new(SlotId::INT_1, MemoryLifetime::Temporary, 128),
        ];
        let (mut run_a, mut prep_a) = (TensorPack::new(), TensorPack::new());
        let (mut run_b, mut prep_b) = (TensorPack::new(), TensorPack::new());
        let ws_a = manage_workspace(&reqs_a, &mut group, &mut run_a, &mut prep_a, true).unwrap();
        let ws_b = manage_workspace(&reqs_b, &mut group, &mut run_b, &mut prep_b, true).unwrap();

        assert_eq!(group.num_segments(), 2);
        assert_eq!(group.arena_bytes(), 512);
        assert!(ws_a.entries()[0].tensor.shares_memory_with(&ws_b.entries()[1].tensor));
    }
}
