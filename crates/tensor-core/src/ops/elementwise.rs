// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Broadcasting elementwise arithmetic.

use crate::Shape;

/// Binary arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
}

/// Overflow behaviour for integer outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertPolicy {
    #[default]
    Wrap,
    Saturate,
}

impl ArithmeticOp {
    pub fn name(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Mul => "mul",
        }
    }

    /// The operator symbol, as it appears in generated source.
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
        }
    }

    #[inline]
    pub fn apply_f32(self, a: f32, b: f32) -> f32 {
        match self {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Sub => a - b,
            ArithmeticOp::Mul => a * b,
        }
    }

    #[inline]
    pub fn apply_i32(self, a: i32, b: i32, policy: ConvertPolicy) -> i32 {
        match (self, policy) {
            (ArithmeticOp::Add, ConvertPolicy::Wrap) => a.wrapping_add(b),
            (ArithmeticOp::Add, ConvertPolicy::Saturate) => a.saturating_add(b),
            (ArithmeticOp::Sub, ConvertPolicy::Wrap) => a.wrapping_sub(b),
            (ArithmeticOp::Sub, ConvertPolicy::Saturate) => a.saturating_sub(b),
            (ArithmeticOp::Mul, ConvertPolicy::Wrap) => a.wrapping_mul(b),
            (ArithmeticOp::Mul, ConvertPolicy::Saturate) => a.saturating_mul(b),
        }
    }

    #[inline]
    pub fn apply_u8(self, a: u8, b: u8, policy: ConvertPolicy) -> u8 {
        match (self, policy) {
            (ArithmeticOp::Add, ConvertPolicy::Wrap) => a.wrapping_add(b),
            (ArithmeticOp::Add, ConvertPolicy::Saturate) => a.saturating_add(b),
            (ArithmeticOp::Sub, ConvertPolicy::Wrap) => a.wrapping_sub(b),
            (ArithmeticOp::Sub, ConvertPolicy::Saturate) => a.saturating_sub(b),
            (ArithmeticOp::Mul, ConvertPolicy::Wrap) => a.wrapping_mul(b),
            (ArithmeticOp::Mul, ConvertPolicy::Saturate) => a.saturating_mul(b),
        }
    }
}

/// Fills `out` with `f(lhs[i'], rhs[i''])` for the output elements
/// `start .. start + out.len()` of `out_shape`, where `i'` and `i''` are the
/// broadcast source indices.
#[allow(clippy::too_many_arguments)]
pub fn broadcast_binary<T: Copy>(
    lhs: &[T],
    lhs_shape: &Shape,
    rhs: &[T],
    rhs_shape: &Shape,
    out_shape: &Shape,
    start: usize,
    out: &mut [T],
    f: impl Fn(T, T) -> T,
) {
    let same = lhs_shape == out_shape && rhs_shape == out_shape;
    for (i, o) in out.iter_mut().enumerate() {
        let idx = start + i;
        let (a, b) = if same {
            (lhs[idx], rhs[idx])
        } else {
            (
                lhs[lhs_shape.broadcast_source_index(out_shape, idx)],
                rhs[rhs_shape.broadcast_source_index(out_shape, idx)],
            )
        };
        *o = f(a, b);
    }
}
