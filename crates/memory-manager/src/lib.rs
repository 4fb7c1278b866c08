// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Byte-level backing store for tensors and operator workspaces.
//!
//! # Key Components
//!
//! - [`MemoryBudget`] — a hard memory ceiling with human-readable parsing
//!   (`"512M"`, `"1G"`, etc.).
//! - [`MemoryPool`] — the allocator: enforces the budget, maintains a free
//!   list binned by size class, and tracks statistics.
//! - [`BufferGuard`] — an RAII wrapper around an allocated buffer. Dropping
//!   the guard returns the buffer to the pool.
//! - [`Region`] — a cloneable view onto a block of memory. Tensors hold
//!   regions; cloning one is how a tensor imports another tensor's memory
//!   without copying.
//! - [`MemoryGroup`] — an arena for temporary workspace buffers. Buffers
//!   managed in different lifetime segments share the same bytes, so the
//!   arena only ever needs the largest segment.
//! - [`AllocationStats`] — cumulative allocator metrics.
//!
//! # Ownership Model
//!
//! ```text
//! MemoryPool::allocate(size)          MemoryGroup::manage(size, align)
//!       │                                   │
//!       ▼                                   ▼
//!   BufferGuard ──► Region::from_guard   Region (unbacked)
//!                         │                 │  MemoryGroup::acquire()
//!                         │                 ▼
//!                         └──────► Region (backed, shared via Arc<Block>)
//!                                           │  last Region dropped / release()
//!                                           ▼
//!                                   BufferGuard dropped ──► free list
//! ```
//!
//! # Example
//! ```
//! use memory_manager::{MemoryBudget, MemoryGroup, MemoryPool};
//!
//! let pool = MemoryPool::new(MemoryBudget::from_mb(1));
//! let mut group = MemoryGroup::new(&pool);
//!
//! let a = group.manage(256, 64).unwrap();
//! group.begin_segment();
//! let b = group.manage(128, 64).unwrap();
//!
//! // Segments alias: the arena holds only the larger segment.
//! assert_eq!(group.arena_bytes(), 256);
//!
//! let scope = group.scope().unwrap();
//! a.write(|bytes| bytes[0] = 7).unwrap();
//! assert_eq!(b.read(|bytes| bytes[0]).unwrap(), 7);
//! drop(scope);
//! assert!(!a.is_backed());
//! ```

mod budget;
mod error;
mod group;
mod guard;
pub mod pool;
mod region;
mod stats;

pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use group::{MemoryGroup, MemoryGroupScope};
pub use guard::BufferGuard;
pub use pool::MemoryPool;
pub use region::Region;
pub use stats::AllocationStats;
