// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Arena-backed memory groups.
//!
//! A [`MemoryGroup`] hands out [`Region`]s for short-lived buffers before
//! any memory exists. Each call to [`MemoryGroup::begin_segment`] starts a
//! new lifetime segment laid out from offset zero again, so buffers from
//! different segments alias. When the group is acquired, a single arena
//! sized for the largest segment is taken from the pool and every managed
//! region becomes backed.
//!
//! Buffers inside one segment never overlap, so everything a single
//! operator needs at once can live in the same segment.

use crate::region::Block;
use crate::{MemoryError, MemoryPool, Region};
use std::sync::Arc;
use tracing::{debug, trace};

/// A set of regions that share one arena, acquired and released together.
#[derive(Debug)]
pub struct MemoryGroup {
    pool: MemoryPool,
    block: Arc<Block>,
    /// End offset of each lifetime segment.
    segments: Vec<usize>,
    managed: usize,
}

impl MemoryGroup {
    /// Creates an empty group that will draw its arena from `pool`.
    pub fn new(pool: &MemoryPool) -> Self {
        Self {
            pool: pool.clone(),
            block: Arc::new(Block::default()),
            segments: vec![0],
            managed: 0,
        }
    }

    /// The pool this group allocates from.
    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    /// Starts a new lifetime segment. A no-op while the current segment is
    /// still empty.
    pub fn begin_segment(&mut self) {
        if self.segments.last().copied().unwrap_or(0) != 0 {
            self.segments.push(0);
        }
    }

    /// Registers a buffer of `size` bytes in the current segment.
    ///
    /// The returned region is unbacked until [`MemoryGroup::acquire`].
    pub fn manage(&mut self, size: usize, alignment: usize) -> Result<Region, MemoryError> {
        if self.is_acquired() {
            return Err(MemoryError::GroupAcquired);
        }
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(alignment));
        }
        if size == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }

        if self.segments.is_empty() {
            self.segments.push(0);
        }
        let last = self.segments.len() - 1;
        let end = self.segments[last];
        let offset = end
            .checked_add(alignment - 1)
            .map(|v| v & !(alignment - 1))
            .ok_or(MemoryError::InvalidAlignment(alignment))?;
        let new_end = offset
            .checked_add(size)
            .ok_or_else(|| MemoryError::OutOfMemory {
                requested_bytes: size,
                available_bytes: 0,
                budget_bytes: self.pool.budget().as_bytes(),
            })?;
        self.segments[last] = new_end;
        self.managed += 1;

        trace!(size, alignment, offset, segment = last, "managed buffer");
        Ok(Region::within(Arc::clone(&self.block), offset, size))
    }

    /// Bytes needed to back every segment: the largest segment end.
    pub fn arena_bytes(&self) -> usize {
        self.segments.iter().copied().max().unwrap_or(0)
    }

    pub fn num_managed(&self) -> usize {
        self.managed
    }

    /// Number of non-empty lifetime segments.
    pub fn num_segments(&self) -> usize {
        self.segments.iter().filter(|&&end| end > 0).count()
    }

    pub fn is_acquired(&self) -> bool {
        self.block.is_backed()
    }

    /// Backs every managed region with one arena from the pool.
    ///
    /// Idempotent. A group with nothing managed acquires nothing.
    pub fn acquire(&self) -> Result<(), MemoryError> {
        if self.is_acquired() {
            return Ok(());
        }
        let bytes = self.arena_bytes();
        if bytes == 0 {
            return Ok(());
        }
        let guard = self.pool.allocate(bytes)?;
        drop(self.block.bind(guard)?);
        self.pool.inner().record_arena(bytes);
        debug!(
            arena_bytes = bytes,
            buffers = self.managed,
            segments = self.num_segments(),
            "memory group acquired"
        );
        Ok(())
    }

    /// Returns the arena to the pool. Managed regions become unbacked.
    pub fn release(&self) {
        match self.block.clear() {
            Ok(Some(guard)) => {
                trace!(arena_bytes = guard.size_bytes(), "memory group released");
                drop(guard);
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "failed to release memory group"),
        }
    }

    /// Acquires the group for the lifetime of the returned scope.
    pub fn scope(&self) -> Result<MemoryGroupScope<'_>, MemoryError> {
        self.acquire()?;
        Ok(MemoryGroupScope { group: self })
    }

    /// Forgets all managed buffers. Regions handed out earlier keep pointing
    /// at the old arena, which is never backed again.
    pub fn reset(&mut self) {
        self.release();
        self.block = Arc::new(Block::default());
        self.segments = vec![0];
        self.managed = 0;
    }
}

impl Drop for MemoryGroup {
    fn drop(&mut self) {
        self.release();
    }
}

/// Keeps a [`MemoryGroup`] acquired; releases it on drop.
#[derive(Debug)]
pub struct MemoryGroupScope<'a> {
    group: &'a MemoryGroup,
}

impl Drop for MemoryGroupScope<'_> {
    fn drop(&mut self) {
        self.group.release();
    }
}
