// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scoped auxiliary tensors.
//!
//! An [`AuxTensorHandler`] gives an operator a tensor with a specific
//! [`TensorInfo`] for one slot of a pack. If the pack already holds a large
//! enough tensor at that slot the handler aliases its memory; otherwise it
//! allocates, optionally injecting the new tensor into the pack for the
//! duration of the handler's scope.

use tensor_core::{SlotId, Tensor, TensorHandle, TensorInfo, TensorPack};
use tracing::debug;

use crate::OperatorError;

/// Controls which side effects a handler may perform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerFlags {
    /// Register a freshly allocated tensor in the pack until drop.
    pub pack_inject: bool,
    /// Never allocate, even when the pack has no usable tensor.
    pub bypass_alloc: bool,
    /// Never alias an existing pack tensor.
    pub bypass_import: bool,
}

impl HandlerFlags {
    pub fn inject() -> Self {
        Self {
            pack_inject: true,
            ..Self::default()
        }
    }
}

/// The pack a handler was built against.
#[derive(Debug)]
pub enum PackBinding<'a> {
    Shared(&'a TensorPack),
    Exclusive(&'a mut TensorPack),
    Detached,
}

impl<'a> From<&'a TensorPack> for PackBinding<'a> {
    fn from(pack: &'a TensorPack) -> Self {
        PackBinding::Shared(pack)
    }
}

impl<'a> From<&'a mut TensorPack> for PackBinding<'a> {
    fn from(pack: &'a mut TensorPack) -> Self {
        PackBinding::Exclusive(pack)
    }
}

impl PackBinding<'_> {
    fn view(&self) -> Option<&TensorPack> {
        match self {
            PackBinding::Shared(pack) => Some(pack),
            PackBinding::Exclusive(pack) => Some(pack),
            PackBinding::Detached => None,
        }
    }
}

/// What a handler did to obtain its memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Zero-sized request; the tensor has no memory.
    Empty,
    /// Fresh memory was allocated.
    Allocated,
    /// The existing pack tensor's memory is aliased.
    Imported,
    /// A flag suppressed both allocation and import.
    Bypassed,
}

pub struct AuxTensorHandler<'a> {
    slot: SlotId,
    tensor: TensorHandle,
    pack: PackBinding<'a>,
    injected: bool,
    action: HandlerAction,
}

impl<'a> AuxTensorHandler<'a> {
    /// Resolves `slot` in `pack` to a tensor described by `info`.
    ///
    /// # Panics
    /// Panics if `flags.pack_inject` is set on a shared pack, or if the
    /// tensor to import has no memory assigned.
    pub fn new(
        slot: SlotId,
        info: &TensorInfo,
        pack: impl Into<PackBinding<'a>>,
        flags: HandlerFlags,
    ) -> Result<Self, OperatorError> {
        let mut pack = pack.into();
        let tensor = Tensor::shared(info.clone());
        let mut action = HandlerAction::Bypassed;
        let mut injected = false;

        let requested = info.total_size();
        if requested == 0 {
            action = HandlerAction::Empty;
        } else {
            let existing = pack.view().and_then(|p| p.get_tensor(slot)).cloned();
            match existing {
                Some(packed) if requested <= packed.info().total_size() => {
                    if !flags.bypass_import {
                        tensor.import_memory(&packed);
                        action = HandlerAction::Imported;
                    }
                }
                _ => {
                    if !flags.bypass_alloc {
                        tensor.allocate()?;
                        action = HandlerAction::Allocated;
                    }
                    if flags.pack_inject {
                        match &mut pack {
                            PackBinding::Exclusive(p) => {
                                p.add_tensor(slot, tensor.clone());
                                injected = true;
                            }
                            _ => panic!("pack_inject on {slot} needs an exclusively borrowed pack"),
                        }
                    }
                }
            }
        }

        debug!(%slot, bytes = requested, action = ?action, injected, "aux tensor resolved");
        Ok(Self {
            slot,
            tensor,
            pack,
            injected,
            action,
        })
    }

    /// Views `tensor`'s memory under a different `info`.
    ///
    /// Memory is only aliased when `info` fits inside `tensor`; nothing is
    /// ever allocated and no pack is touched.
    pub fn reinterpret(info: &TensorInfo, tensor: &Tensor) -> AuxTensorHandler<'static> {
        let view = Tensor::shared(info.clone());
        let action = if info.total_size() <= tensor.info().total_size() {
            view.import_memory(tensor);
            HandlerAction::Imported
        } else {
            HandlerAction::Bypassed
        };
        AuxTensorHandler {
            slot: SlotId::INT_0,
            tensor: view,
            pack: PackBinding::Detached,
            injected: false,
            action,
        }
    }

    pub fn get(&self) -> &TensorHandle {
        &self.tensor
    }

    pub fn action(&self) -> HandlerAction {
        self.action
    }

    pub fn is_injected(&self) -> bool {
        self.injected
    }

    /// The pack this handler resolved against, if any.
    pub fn pack(&self) -> Option<&TensorPack> {
        self.pack.view()
    }
}

impl Drop for AuxTensorHandler<'_> {
    fn drop(&mut self) {
        if !self.injected {
            return;
        }
        if let PackBinding::Exclusive(pack) = &mut self.pack {
            pack.remove_tensor(self.slot);
            debug!(slot = %self.slot, "aux tensor withdrawn from pack");
        }
    }
}

impl std::fmt::Debug for AuxTensorHandler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxTensorHandler")
            .field("slot", &self.slot)
            .field("tensor", &self.tensor)
            .field("injected", &self.injected)
            .field("action", &self.action)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tensor_core::DType;

    fn allocated(bytes: usize) -> TensorHandle {
        let t = Tensor::shared(TensorInfo::flat_bytes(bytes));
        t.allocate().unwrap();
        t
    }

    #[test]
    fn test_zero_size_is_empty() {
        let pack = TensorPack::new();
        let h = AuxTensorHandler::new(
            SlotId::INT_0,
            &TensorInfo::flat_bytes(0),
            &pack,
            HandlerFlags::default(),
        )
        .unwrap();
        assert_eq!(h.action(), HandlerAction::Empty);
        assert!(!h.get().is_allocated());
    }

    #[test]
    fn test_imports_when_existing_is_large_enough() {
        let backing = allocated(64);
        let mut pack = TensorPack::new();
        pack.add_tensor(SlotId::INT_0, backing.clone());

        let info = TensorInfo::new([16], DType::F32);
        let h = AuxTensorHandler::new(SlotId::INT_0, &info, &pack, HandlerFlags::default()).unwrap();
        assert_eq!(h.action(), HandlerAction::Imported);
        assert!(h.get().shares_memory_with(&backing));

        h.get().fill_f32(2.0).unwrap();
        assert_eq!(backing.read_bytes().unwrap()[..4], 2.0f32.to_ne_bytes());
    }

    #[test]
    fn test_allocates_and_injects_when_existing_is_too_small() {
        let small = allocated(8);
        let mut pack = TensorPack::new();
        pack.add_tensor(SlotId::INT_1, small.clone());

        let info = TensorInfo::new([4], DType::F32);
        {
            let h = AuxTensorHandler::new(SlotId::INT_1, &info, &mut pack, HandlerFlags::inject())
                .unwrap();
            assert_eq!(h.action(), HandlerAction::Allocated);
            assert!(h.is_injected());
            assert!(!h.get().shares_memory_with(&small));
            let in_pack = h.pack().unwrap().get_tensor(SlotId::INT_1).unwrap();
            assert!(Arc::ptr_eq(in_pack, h.get()));
        }
        // The injected entry is withdrawn, not restored.
        assert!(pack.get_const_tensor(SlotId::INT_1).is_none());
    }

    #[test]
    fn test_absent_slot_without_inject_leaves_pack_alone() {
        let pack = TensorPack::new();
        let info = TensorInfo::flat_bytes(32);
        let h = AuxTensorHandler::new(SlotId::INT_2, &info, &pack, HandlerFlags::default()).unwrap();
        assert_eq!(h.action(), HandlerAction::Allocated);
        assert!(h.get().is_allocated());
        assert!(h.pack().unwrap().empty());
    }

    #[test]
    fn test_const_registration_counts_as_absent() {
        let backing = allocated(64);
        let mut pack = TensorPack::new();
        pack.add_const_tensor(SlotId::INT_0, backing.clone());

        let h = AuxTensorHandler::new(SlotId::INT_0, &TensorInfo::flat_bytes(16), &pack, HandlerFlags::default())
            .unwrap();
        assert_eq!(h.action(), HandlerAction::Allocated);
        assert!(!h.get().shares_memory_with(&backing));
    }

    #[test]
    fn test_bypass_alloc_still_injects() {
        let mut pack = TensorPack::new();
        let flags = HandlerFlags {
            pack_inject: true,
            bypass_alloc: true,
            ..HandlerFlags::default()
        };
        {
            let h = AuxTensorHandler::new(SlotId::INT_3, &TensorInfo::flat_bytes(16), &mut pack, flags)
                .unwrap();
            assert_eq!(h.action(), HandlerAction::Bypassed);
            assert!(!h.get().is_allocated());
            assert!(h.pack().unwrap().get_tensor(SlotId::INT_3).is_some());
        }
        assert!(pack.empty());
    }

    #[test]
    fn test_bypass_import() {
        let backing = allocated(64);
        let mut pack = TensorPack::new();
        pack.add_tensor(SlotId::INT_0, backing);
        let flags = HandlerFlags {
            bypass_import: true,
            ..HandlerFlags::default()
        };
        let h = AuxTensorHandler::new(SlotId::INT_0, &TensorInfo::flat_bytes(16), &pack, flags).unwrap();
        assert_eq!(h.action(), HandlerAction::Bypassed);
        assert!(!h.get().is_allocated());
    }

    #[test]
    #[should_panic(expected = "exclusively borrowed")]
    fn test_inject_into_shared_pack_panics() {
        let pack = TensorPack::new();
        let _ = AuxTensorHandler::new(SlotId::INT_0, &TensorInfo::flat_bytes(4), &pack, HandlerFlags::inject());
    }

    #[test]
    #[should_panic(expected = "unallocated")]
    fn test_import_from_unbacked_tensor_panics() {
        let mut pack = TensorPack::new();
        pack.add_tensor(SlotId::INT_0, Tensor::shared(TensorInfo::flat_bytes(64)));
        let _ = AuxTensorHandler::new(SlotId::INT_0, &TensorInfo::flat_bytes(8), &pack, HandlerFlags::default());
    }

    #[test]
    fn test_reinterpret() {
        let bytes = allocated(16);
        let view = AuxTensorHandler::reinterpret(&TensorInfo::new([2, 2], DType::F32), &bytes);
        assert_eq!(view.action(), HandlerAction::Imported);
        assert!(view.pack().is_none());
        view.get().write_f32(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(bytes.read_bytes().unwrap().len(), 16);

        let too_big = AuxTensorHandler::reinterpret(&TensorInfo::new([8], DType::F32), &bytes);
        assert_eq!(too_big.action(), HandlerAction::Bypassed);
    }
}
