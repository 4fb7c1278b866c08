// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor-pack slot identifiers.
//!
//! Callers and operators agree on these numbers; changing a value breaks
//! every pack built against the old one.
//!
//! | Band | Values |
//! |---|---|
//! | sources | `SRC_0..SRC_6` = 0..6 |
//! | destinations | `DST_0..DST_2` = 30..32 |
//! | internal | `INT_0..INT_4` = 50..54 |
//! | indexed sources | `SRC_VEC + i` (256) |
//! | indexed destinations | `DST_VEC + i` (512) |
//! | indexed internal / workspace | `INT_VEC + i` (1024) |
//! | fused post-op arguments | `POST_OP_ARG + i`, `i < 1024` (2048) |

use std::fmt;

/// The logical role of a tensor inside a [`crate::TensorPack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SlotId(pub i32);

impl SlotId {
    pub const SRC_0: SlotId = SlotId(0);
    pub const SRC_1: SlotId = SlotId(1);
    pub const SRC_2: SlotId = SlotId(2);
    pub const SRC_3: SlotId = SlotId(3);
    pub const SRC_4: SlotId = SlotId(4);
    pub const SRC_5: SlotId = SlotId(5);
    pub const SRC_6: SlotId = SlotId(6);

    pub const DST_0: SlotId = SlotId(30);
    pub const DST_1: SlotId = SlotId(31);
    pub const DST_2: SlotId = SlotId(32);

    pub const INT_0: SlotId = SlotId(50);
    pub const INT_1: SlotId = SlotId(51);
    pub const INT_2: SlotId = SlotId(52);
    pub const INT_3: SlotId = SlotId(53);
    pub const INT_4: SlotId = SlotId(54);

    pub const SRC_VEC: SlotId = SlotId(256);
    pub const DST_VEC: SlotId = SlotId(512);
    pub const INT_VEC: SlotId = SlotId(1024);
    pub const POST_OP_ARG: SlotId = SlotId(2048);

    /// Number of slots reserved for fused post-op arguments.
    pub const POST_OP_ARG_CAPACITY: i32 = 1024;

    pub fn offset_src_vec(index: i32) -> SlotId {
        SlotId(Self::SRC_VEC.0 + index)
    }

    pub fn offset_dst_vec(index: i32) -> SlotId {
        SlotId(Self::DST_VEC.0 + index)
    }

    /// Indexed internal slot; workspace buffers of an operator live here.
    pub fn offset_int_vec(index: i32) -> SlotId {
        SlotId(Self::INT_VEC.0 + index)
    }

    /// Slot of the `index`-th extra argument of a fused post-op.
    ///
    /// # Panics
    /// Panics if `index` is outside `0..POST_OP_ARG_CAPACITY`.
    pub fn post_op_arg(index: i32) -> SlotId {
        assert!(
            (0..Self::POST_OP_ARG_CAPACITY).contains(&index),
            "post-op argument index {index} out of range"
        );
        SlotId(Self::POST_OP_ARG.0 + index)
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.0;
        match id {
            0..=6 => write!(f, "SRC_{id}"),
            30..=32 => write!(f, "DST_{}", id - 30),
            50..=54 => write!(f, "INT_{}", id - 50),
            256..=511 => write!(f, "SRC_VEC+{}", id - 256),
            512..=1023 => write!(f, "DST_VEC+{}", id - 512),
            1024..=2047 => write!(f, "INT_VEC+{}", id - 1024),
            2048..=3071 => write!(f, "POST_OP_ARG+{}", id - 2048),
            _ => write!(f, "SLOT_{id}"),
        }
    }
}
