// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The slot-keyed argument pack passed to every operator call.
//!
//! A pack is built by the caller for one invocation and only borrows the
//! tensors it names: it holds [`TensorHandle`] clones, never the memory
//! itself. Registering a tensor as const hides it from
//! [`TensorPack::get_tensor`]; [`TensorPack::get_const_tensor`] sees both
//! kinds.
//!
//! A pack is not synchronised. Build it, hand it to one call, drop it.

use crate::{SlotId, TensorHandle};
use std::collections::BTreeMap;

/// One registration: either mutable or const, never both.
#[derive(Debug, Clone)]
pub enum PackElement {
    Mutable(TensorHandle),
    Const(TensorHandle),
}

impl PackElement {
    pub fn tensor(&self) -> &TensorHandle {
        match self {
            PackElement::Mutable(t) | PackElement::Const(t) => t,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, PackElement::Const(_))
    }
}

/// Result of [`TensorPack::lookup`]: tells "absent" and "const-only" apart,
/// which [`TensorPack::get_tensor`] does not.
#[derive(Debug, Clone, Copy)]
pub enum PackEntry<'a> {
    Absent,
    Const(&'a TensorHandle),
    Mutable(&'a TensorHandle),
}

impl PackEntry<'_> {
    pub fn is_absent(&self) -> bool {
        matches!(self, PackEntry::Absent)
    }
}

/// `slot → tensor` map for one operator invocation.
#[derive(Debug, Clone, Default)]
pub struct TensorPack {
    pack: BTreeMap<SlotId, PackElement>,
}

impl TensorPack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mutable tensor, replacing anything at `id`.
    pub fn add_tensor(&mut self, id: SlotId, tensor: TensorHandle) {
        self.pack.insert(id, PackElement::Mutable(tensor));
    }

    /// Registers a read-only tensor, replacing anything at `id`.
    pub fn add_const_tensor(&mut self, id: SlotId, tensor: TensorHandle) {
        self.pack.insert(id, PackElement::Const(tensor));
    }

    /// The tensor at `id` if it was registered as mutable.
    ///
    /// `None` covers both an empty slot and a const registration; use
    /// [`TensorPack::lookup`] to distinguish them.
    pub fn get_tensor(&self, id: SlotId) -> Option<&TensorHandle> {
        match self.pack.get(&id) {
            Some(PackElement::Mutable(t)) => Some(t),
            _ => None,
        }
    }

    /// The tensor at `id`, whichever way it was registered.
    pub fn get_const_tensor(&self, id: SlotId) -> Option<&TensorHandle> {
        self.pack.get(&id).map(PackElement::tensor)
    }

    pub fn lookup(&self, id: SlotId) -> PackEntry<'_> {
        match self.pack.get(&id) {
            None => PackEntry::Absent,
            Some(PackElement::Const(t)) => PackEntry::Const(t),
            Some(PackElement::Mutable(t)) => PackEntry::Mutable(t),
        }
    }

    /// Removes the registration at `id`, returning it.
    pub fn remove_tensor(&mut self, id: SlotId) -> Option<PackElement> {
        self.pack.remove(&id)
    }

    pub fn size(&self) -> usize {
        self.pack.len()
    }

    pub fn empty(&self) -> bool {
        self.pack.is_empty()
    }

    /// Occupied slots in ascending order.
    pub fn slots(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.pack.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &PackElement)> + '_ {
        self.pack.iter().map(|(&id, e)| (id, e))
    }
}
