// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Budget-enforced buffer pool.
//!
//! The [`MemoryPool`] backs every tensor buffer, persistent workspace
//! buffer and memory-group arena. It refuses any request that would take
//! the live byte count past the budget, recycles returned buffers through
//! a free list binned by power-of-two size class (minimum 4 KiB), and keeps
//! [`AllocationStats`].
//!
//! The budget also bounds the resident footprint: the real length of every
//! live buffer (a recycled one can be longer than its request) plus every
//! parked buffer. Parked buffers are evicted when a fresh allocation would
//! otherwise break that bound.
//!
//! `MemoryPool` is a handle around `Arc`-shared state. Clones draw from the
//! same budget, which is how tensors and memory groups allocate lazily long
//! after the pool was handed to them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::{AllocationStats, BufferGuard, MemoryBudget, MemoryError};

/// Minimum size class: 4 KiB.
const MIN_SIZE_CLASS: usize = 4096;

/// Recycled buffers, keyed by size class, and the resident byte count.
#[derive(Default)]
struct FreeList {
    classes: BTreeMap<usize, Vec<Vec<u8>>>,
    /// Bytes parked in `classes`.
    bytes: usize,
    /// Real length of live buffers plus `bytes`.
    resident: usize,
}

impl FreeList {
    fn push(&mut self, buffer: Vec<u8>) {
        self.bytes += buffer.len();
        self.classes
            .entry(size_class_for(buffer.len()))
            .or_default()
            .push(buffer);
    }

    /// Drops parked buffers, largest class first, until `needed` more bytes
    /// fit under `limit`.
    fn evict_for(&mut self, needed: usize, limit: usize) -> bool {
        while self.resident.saturating_add(needed) > limit {
            let Some(mut entry) = self.classes.last_entry() else {
                return false;
            };
            let buffer = entry.get_mut().pop();
            if entry.get().is_empty() {
                entry.remove();
            }
            if let Some(buffer) = buffer {
                self.bytes -= buffer.len();
                self.resident -= buffer.len();
            }
        }
        true
    }

    /// A zeroed buffer of at least `size` bytes, recycled from `size`'s
    /// class when possible. `None` when the resident footprint cannot make
    /// room for it.
    fn take(&mut self, size: usize, limit: usize) -> Option<(Vec<u8>, bool)> {
        let class = size_class_for(size);
        if let Some(mut buffer) = self.classes.get_mut(&class).and_then(Vec::pop) {
            self.bytes -= buffer.len();
            let growth = size.saturating_sub(buffer.len());
            if self.evict_for(growth, limit) {
                if growth > 0 {
                    buffer.resize(size, 0);
                    self.resident += growth;
                }
                buffer[..size].fill(0);
                return Some((buffer, true));
            }
            self.push(buffer);
        }
        if !self.evict_for(size, limit) {
            return None;
        }
        self.resident += size;
        Some((vec![0u8; size], false))
    }

    fn clear(&mut self) {
        self.resident -= self.bytes;
        self.classes.clear();
        self.bytes = 0;
    }
}

/// Pool state shared by every [`MemoryPool`] handle and [`BufferGuard`].
pub struct PoolInner {
    budget: MemoryBudget,
    live_bytes: AtomicUsize,
    free: Mutex<FreeList>,
    stats: Mutex<AllocationStats>,
}

impl PoolInner {
    /// Takes back a buffer whose guard is being dropped.
    pub(crate) fn return_buffer(&self, buffer: Vec<u8>, size_bytes: usize) {
        self.live_bytes.fetch_sub(size_bytes, Ordering::AcqRel);
        self.with_stats(|s| s.on_returned());
        if let Ok(mut free) = self.free.lock() {
            free.push(buffer);
        }
    }

    pub(crate) fn record_arena(&self, arena_bytes: usize) {
        self.with_stats(|s| s.on_arena_acquired(arena_bytes));
    }

    fn with_stats(&self, f: impl FnOnce(&mut AllocationStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    /// Charges `size_bytes` to the budget and returns the new live count.
    fn reserve(&self, size_bytes: usize) -> Result<usize, MemoryError> {
        let budget = self.budget.as_bytes();
        self.live_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                live.checked_add(size_bytes).filter(|&total| total <= budget)
            })
            .map(|previous| previous + size_bytes)
            .map_err(|live| MemoryError::OutOfMemory {
                requested_bytes: size_bytes,
                available_bytes: budget.saturating_sub(live),
                budget_bytes: budget,
            })
    }
}

/// The allocator for tensor and workspace buffers.
///
/// # Example
/// ```
/// use memory_manager::{MemoryPool, MemoryBudget};
///
/// let pool = MemoryPool::new(MemoryBudget::from_mb(64));
///
/// let guard = pool.allocate(1024 * 1024).unwrap();
/// assert_eq!(pool.allocated_bytes(), 1024 * 1024);
///
/// drop(guard);
/// assert_eq!(pool.allocated_bytes(), 0);
/// ```
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    pub fn new(budget: MemoryBudget) -> Self {
        debug!(%budget, "creating memory pool");
        Self {
            inner: Arc::new(PoolInner {
                budget,
                live_bytes: AtomicUsize::new(0),
                free: Mutex::new(FreeList::default()),
                stats: Mutex::new(AllocationStats::default()),
            }),
        }
    }

    /// A pool with no ceiling.
    pub fn unbounded() -> Self {
        Self::new(MemoryBudget::unlimited())
    }

    /// Allocates a zeroed buffer of `size_bytes`.
    ///
    /// Fails with [`MemoryError::OutOfMemory`] when the request does not fit
    /// the remaining budget. The guard hands the buffer back on drop.
    pub fn allocate(&self, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        if size_bytes == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }

        let live = match self.inner.reserve(size_bytes) {
            Ok(live) => live,
            Err(e) => {
                self.inner.with_stats(|s| s.on_rejected());
                debug!(size_bytes, error = %e, "allocation rejected");
                return Err(e);
            }
        };

        let budget = self.inner.budget.as_bytes();
        let taken = match self.inner.free.lock() {
            Ok(mut free) => free.take(size_bytes, budget),
            Err(_) => Some((vec![0u8; size_bytes], false)),
        };
        let Some((data, reused)) = taken else {
            self.inner.live_bytes.fetch_sub(size_bytes, Ordering::AcqRel);
            self.inner.with_stats(|s| s.on_rejected());
            let resident = self.resident_bytes();
            debug!(size_bytes, resident, "allocation rejected: resident footprint at budget");
            return Err(MemoryError::OutOfMemory {
                requested_bytes: size_bytes,
                available_bytes: budget.saturating_sub(resident),
                budget_bytes: budget,
            });
        };
        self.inner.with_stats(|s| s.on_served(size_bytes, reused, live));
        trace!(size_bytes, reused, live, "allocated buffer");

        Ok(BufferGuard::new(data, Arc::clone(&self.inner), size_bytes))
    }

    /// Bytes currently handed out.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.live_bytes.load(Ordering::Acquire)
    }

    /// Bytes that can still be allocated before the budget is hit.
    pub fn available_bytes(&self) -> usize {
        self.inner
            .budget
            .as_bytes()
            .saturating_sub(self.allocated_bytes())
    }

    pub fn budget(&self) -> MemoryBudget {
        self.inner.budget
    }

    /// A snapshot of the allocator counters.
    pub fn stats(&self) -> AllocationStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Drops every recycled buffer. Live buffers are untouched.
    pub fn shrink(&self) {
        if let Ok(mut free) = self.inner.free.lock() {
            free.clear();
        }
    }

    /// Real bytes held by the pool: live buffers at their full length plus
    /// the free list. Never exceeds the budget.
    pub fn resident_bytes(&self) -> usize {
        self.inner.free.lock().map(|f| f.resident).unwrap_or(0)
    }

    /// Bytes parked in the free list.
    pub fn free_list_bytes(&self) -> usize {
        self.inner.free.lock().map(|f| f.bytes).unwrap_or(0)
    }

    /// Whether both handles draw from the same budget.
    pub fn same_pool(&self, other: &MemoryPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn inner(&self) -> &PoolInner {
        &self.inner
    }
}

/// Smallest power of two that is >= `size` and >= `MIN_SIZE_CLASS`.
fn size_class_for(size: usize) -> usize {
    size.max(MIN_SIZE_CLASS).next_power_of_two()
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("budget", &self.inner.budget)
            .field("allocated_bytes", &self.allocated_bytes())
            .field("free_list_bytes", &self.free_list_bytes())
            .field("resident_bytes", &self.resident_bytes())
            .finish()
    }
}
