// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

/// Failures of the pool, its regions and memory groups.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("allocation of {requested_bytes} bytes exceeds the budget ({available_bytes} of {budget_bytes} bytes free)")]
    OutOfMemory {
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    #[error("zero-byte allocation requested")]
    ZeroSizedAllocation,

    /// The region's block has not been acquired, or was released.
    #[error("region of {len} bytes at offset {offset} has no backing memory")]
    Unbacked { offset: usize, len: usize },

    #[error("memory group is acquired; release it before managing new buffers")]
    GroupAcquired,

    #[error("alignment {0} is not a non-zero power of two")]
    InvalidAlignment(usize),

    #[error("cannot parse memory budget '{0}' (use a byte count with an optional K, M or G suffix)")]
    InvalidBudget(String),

    #[error("region [{offset}, {offset}+{len}) lies outside its {block_len}-byte block")]
    RegionOutOfBounds {
        offset: usize,
        len: usize,
        block_len: usize,
    },

    /// A thread panicked while holding a block lock.
    #[error("memory block lock poisoned")]
    Poisoned,
}
