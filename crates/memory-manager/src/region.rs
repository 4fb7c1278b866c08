// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shared views onto pool-backed memory.
//!
//! A [`Block`] is a slot that may or may not currently hold a
//! [`BufferGuard`]. A [`Region`] is an `(offset, len)` window onto a block.
//! Regions are cheap to clone: every clone sees the same bytes, which is
//! how tensors share memory without copying.
//!
//! Memory groups create regions before their block is backed. Accessing
//! such a region yields [`MemoryError::Unbacked`] until the group is
//! acquired.

use crate::{BufferGuard, MemoryError, MemoryPool};
use std::sync::{Arc, RwLock};

/// A possibly-empty slot for one pool buffer.
#[derive(Debug, Default)]
pub(crate) struct Block {
    memory: RwLock<Option<BufferGuard>>,
}

impl Block {
    pub(crate) fn backed(guard: BufferGuard) -> Self {
        Self {
            memory: RwLock::new(Some(guard)),
        }
    }

    /// Installs `guard`, returning whatever was there before.
    pub(crate) fn bind(&self, guard: BufferGuard) -> Result<Option<BufferGuard>, MemoryError> {
        let mut slot = self.memory.write().map_err(poisoned)?;
        Ok(slot.replace(guard))
    }

    /// Takes the buffer out so that dropping it returns it to the pool.
    pub(crate) fn clear(&self) -> Result<Option<BufferGuard>, MemoryError> {
        let mut slot = self.memory.write().map_err(poisoned)?;
        Ok(slot.take())
    }

    pub(crate) fn is_backed(&self) -> bool {
        self.memory.read().map(|m| m.is_some()).unwrap_or(false)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> MemoryError {
    MemoryError::Poisoned
}

/// A window of `len` bytes at `offset` within a shared block.
#[derive(Debug, Clone)]
pub struct Region {
    block: Arc<Block>,
    offset: usize,
    len: usize,
}

impl Region {
    /// Allocates a fresh, backed region of `len` bytes from `pool`.
    pub fn allocate(pool: &MemoryPool, len: usize) -> Result<Self, MemoryError> {
        let guard = pool.allocate(len)?;
        Ok(Self::from_guard(guard))
    }

    /// Wraps an existing buffer as a region covering all of it.
    pub fn from_guard(guard: BufferGuard) -> Self {
        let len = guard.size_bytes();
        Self {
            block: Arc::new(Block::backed(guard)),
            offset: 0,
            len,
        }
    }

    pub(crate) fn within(block: Arc<Block>, offset: usize, len: usize) -> Self {
        Self { block, offset, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset of this region inside its block.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` while the underlying block holds memory.
    pub fn is_backed(&self) -> bool {
        self.block.is_backed()
    }

    /// Returns `true` if both regions live in the same block.
    pub fn shares_block(&self, other: &Region) -> bool {
        Arc::ptr_eq(&self.block, &other.block)
    }

    /// Returns `true` if the two regions overlap in the same block.
    pub fn aliases(&self, other: &Region) -> bool {
        self.shares_block(other)
            && self.offset < other.offset + other.len
            && other.offset < self.offset + self.len
    }

    /// Runs `f` over the bytes of this region.
    ///
    /// Nested reads of regions in the same block are fine; a write nested
    /// inside a read of the same block blocks forever.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, MemoryError> {
        let memory = self.block.memory.read().map_err(poisoned)?;
        let guard = memory.as_ref().ok_or(MemoryError::Unbacked {
            offset: self.offset,
            len: self.len,
        })?;
        let bytes = guard.as_slice();
        let window = bytes
            .get(self.offset..self.offset + self.len)
            .ok_or_else(|| self.out_of_bounds(bytes.len()))?;
        Ok(f(window))
    }

    /// Runs `f` over the bytes of this region, mutably.
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R, MemoryError> {
        let mut memory = self.block.memory.write().map_err(poisoned)?;
        let guard = memory.as_mut().ok_or(MemoryError::Unbacked {
            offset: self.offset,
            len: self.len,
        })?;
        let bytes = guard.as_mut_slice();
        let available = bytes.len();
        let range = self.offset..self.offset + self.len;
        match bytes.get_mut(range) {
            Some(window) => Ok(f(window)),
            None => Err(self.out_of_bounds(available)),
        }
    }

    /// Copies the region out into an owned buffer.
    pub fn to_vec(&self) -> Result<Vec<u8>, MemoryError> {
        self.read(|bytes| bytes.to_vec())
    }

    fn out_of_bounds(&self, block_len: usize) -> MemoryError {
        MemoryError::RegionOutOfBounds {
            offset: self.offset,
            len: self.len,
            block_len,
        }
    }
}
