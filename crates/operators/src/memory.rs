// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Auxiliary memory requirements declared by operators.

use serde::{Deserialize, Serialize};
use std::fmt;
use tensor_core::SlotId;

/// How long an auxiliary buffer must stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLifetime {
    /// Valid for a single `run`; may alias other temporaries in a memory group.
    Temporary,
    /// Valid for the lifetime of the operator.
    Persistent,
    /// Valid until `prepare` completes, then released.
    Prepare,
}

impl fmt::Display for MemoryLifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemoryLifetime::Temporary => "temporary",
            MemoryLifetime::Persistent => "persistent",
            MemoryLifetime::Prepare => "prepare",
        })
    }
}

/// One auxiliary buffer: the slot it binds to, its lifetime and its
/// byte size and alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub slot: SlotId,
    pub lifetime: MemoryLifetime,
    pub size: usize,
    pub alignment: usize,
}

impl MemoryInfo {
    pub const DEFAULT_ALIGNMENT: usize = 64;

    pub fn new(slot: SlotId, lifetime: MemoryLifetime, size: usize) -> Self {
        Self {
            slot,
            lifetime,
            size,
            alignment: Self::DEFAULT_ALIGNMENT,
        }
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Widens this requirement to cover another estimate for the same slot.
    ///
    /// Size and alignment become the maximum of the two. Returns `false`
    /// and leaves `self` untouched if `slot` differs.
    pub fn merge(&mut self, slot: SlotId, size: usize, alignment: usize) -> bool {
        if slot != self.slot {
            return false;
        }
        self.size = self.size.max(size);
        self.alignment = self.alignment.max(alignment);
        true
    }
}

impl fmt::Display for MemoryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} bytes, align {}, {}",
            self.slot, self.size, self.alignment, self.lifetime
        )
    }
}

/// Ordered requirements of one operator. The position of an entry is an
/// operator-local index, not a global identifier.
pub type MemoryRequirements = Vec<MemoryInfo>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_takes_max() {
        let mut info = MemoryInfo::new(SlotId::INT_0, MemoryLifetime::Temporary, 128);
        assert!(info.merge(SlotId::INT_0, 64, 128));
        assert_eq!((info.size, info.alignment), (128, 128));
        assert!(info.merge(SlotId::INT_0, 512, 16));
        assert_eq!((info.size, info.alignment), (512, 128));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut once = MemoryInfo::new(SlotId::INT_1, MemoryLifetime::Persistent, 10);
        once.merge(SlotId::INT_1, 300, 256);
        let mut twice = once;
        twice.merge(SlotId::INT_1, 300, 256);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_rejects_other_slot() {
        let mut info = MemoryInfo::new(SlotId::INT_0, MemoryLifetime::Prepare, 32);
        let before = info;
        assert!(!info.merge(SlotId::INT_1, 4096, 4096));
        assert_eq!(info, before);
    }

    #[test]
    fn test_display_and_serde() {
        let info = MemoryInfo::new(SlotId::offset_int_vec(1), MemoryLifetime::Temporary, 64);
        assert_eq!(info.to_string(), "INT_VEC+1: 64 bytes, align 64, temporary");

        let json = serde_json::to_string(&info).unwrap();
        let back: MemoryInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
