// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Owning handle on one pool buffer.

use std::sync::Arc;

use crate::pool::PoolInner;

/// A buffer charged to a [`MemoryPool`](crate::MemoryPool) budget.
///
/// Dropping the guard credits the budget and parks the buffer in the
/// pool's free list. A recycled buffer can be longer than the request;
/// only the first [`BufferGuard::size_bytes`] bytes are ever exposed.
pub struct BufferGuard {
    bytes: Vec<u8>,
    requested: usize,
    origin: Arc<PoolInner>,
}

impl BufferGuard {
    pub(crate) fn new(bytes: Vec<u8>, origin: Arc<PoolInner>, requested: usize) -> Self {
        debug_assert!(bytes.len() >= requested);
        Self {
            bytes,
            requested,
            origin,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.requested]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.requested]
    }

    /// Size of the request this guard was created for.
    pub fn size_bytes(&self) -> usize {
        self.requested
    }
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        self.origin
            .return_buffer(std::mem::take(&mut self.bytes), self.requested);
    }
}

impl std::fmt::Debug for BufferGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufferGuard({} bytes)", self.requested)
    }
}
