// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and broadcasting rules.
//!
//! Dimensions are stored outermost first; the last dimension is the
//! innermost (contiguous) one. Broadcasting aligns shapes from the
//! innermost dimension outwards.

use std::fmt;

/// The dimensions of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements; `1` for a scalar.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Size of the innermost dimension, or `1` for a scalar.
    pub fn innermost(&self) -> usize {
        self.dims.last().copied().unwrap_or(1)
    }

    pub fn size_bytes(&self, dtype: crate::DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Returns `true` if two shapes are broadcast-compatible: aligned from
    /// the innermost dimension, each pair is equal or one of them is 1.
    pub fn is_broadcast_compatible(&self, other: &Shape) -> bool {
        self.dims
            .iter()
            .rev()
            .zip(other.dims.iter().rev())
            .all(|(&a, &b)| a == b || a == 1 || b == 1)
    }

    /// The shape both operands broadcast to, or `None` if incompatible.
    ///
    /// ```
    /// use tensor_core::Shape;
    /// let out = Shape::new(vec![4, 1]).broadcast_with(&Shape::vector(3)).unwrap();
    /// assert_eq!(out, Shape::matrix(4, 3));
    /// ```
    pub fn broadcast_with(&self, other: &Shape) -> Option<Shape> {
        if !self.is_broadcast_compatible(other) {
            return None;
        }
        let rank = self.rank().max(other.rank());
        let pad = |s: &Shape, i: usize| {
            let lead = rank - s.rank();
            if i < lead {
                1
            } else {
                s.dims[i - lead]
            }
        };
        let dims = (0..rank)
            .map(|i| {
                let (a, b) = (pad(self, i), pad(other, i));
                if a == 1 {
                    b
                } else {
                    a
                }
            })
            .collect();
        Some(Shape::new(dims))
    }

    /// Maps a flat index of `out` to the flat index of `self`, where `self`
    /// broadcasts to `out`.
    pub fn broadcast_source_index(&self, out: &Shape, out_index: usize) -> usize {
        if self == out {
            return out_index;
        }
        let lead = out.rank() - self.rank();
        let mut remaining = out_index;
        let mut src_index = 0;
        let mut src_stride = 1;
        for axis in (0..out.rank()).rev() {
            let extent = out.dims[axis];
            let coord = remaining % extent;
            remaining /= extent;
            if axis >= lead {
                let src_extent = self.dims[axis - lead];
                if src_extent != 1 {
                    src_index += coord * src_stride;
                }
                src_stride *= src_extent;
            }
        }
        src_index
    }

    /// Returns `true` if `self` is `[..., M, K]` and `other` is `[..., K, N]`.
    pub fn is_matmul_compatible(&self, other: &Shape) -> bool {
        if self.rank() < 2 || other.rank() < 2 {
            return false;
        }
        self.dims[self.rank() - 1] == other.dims[other.rank() - 2]
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(dims.to_vec())
    }
}
