// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor metadata.

use crate::{DType, QuantizationInfo, Shape};
use std::fmt;

/// Identifier of a tensor registered in a GPU workload sketch.
///
/// Tensors created outside a sketch carry [`TensorId::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TensorId(pub i32);

impl TensorId {
    pub const INVALID: TensorId = TensorId(0);

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Everything needed to size and interpret a tensor buffer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TensorInfo {
    id: TensorId,
    shape: Shape,
    dtype: DType,
    quantization: QuantizationInfo,
}

impl TensorInfo {
    pub fn new(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self {
            id: TensorId::INVALID,
            shape: shape.into(),
            dtype,
            quantization: QuantizationInfo::default(),
        }
    }

    /// A 1-D `U8` buffer of `bytes` elements.
    ///
    /// Workspace buffers use this layout so that the allocator never has
    /// to know what an operator stores in them.
    pub fn flat_bytes(bytes: usize) -> Self {
        Self::new(Shape::vector(bytes), DType::U8)
    }

    pub fn with_quantization(mut self, quantization: QuantizationInfo) -> Self {
        self.quantization = quantization;
        self
    }

    pub fn with_id(mut self, id: TensorId) -> Self {
        self.id = id;
        self
    }

    /// Same info with a different element type; quantization is kept.
    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn quantization(&self) -> QuantizationInfo {
        self.quantization
    }

    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    /// Total size in bytes.
    pub fn total_size(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }

    /// Returns `true` if the two infos describe the same buffer layout,
    /// ignoring ids.
    pub fn same_layout(&self, other: &TensorInfo) -> bool {
        self.shape == other.shape && self.dtype == other.dtype
    }
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)?;
        if self.id.is_valid() {
            write!(f, " ({})", self.id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_size() {
        let info = TensorInfo::new(Shape::matrix(4, 4), DType::F32);
        assert_eq!(info.total_size(), 64);
        assert_eq!(TensorInfo::flat_bytes(100).total_size(), 100);
        assert_eq!(TensorInfo::new(Shape::vector(0), DType::F32).total_size(), 0);
    }

    #[test]
    fn test_ids() {
        let info = TensorInfo::new([2], DType::F16);
        assert!(!info.id().is_valid());
        let info = info.with_id(TensorId(3));
        assert_eq!(info.id(), TensorId(3));
        assert_eq!(info.to_string(), "f16[2] (t3)");
    }

    #[test]
    fn test_with_dtype_keeps_shape() {
        let q = QuantizationInfo::new(0.5, 3);
        let info = TensorInfo::new([8], DType::QAsymm8).with_quantization(q);
        let f = info.clone().with_dtype(DType::F32);
        assert_eq!(f.total_size(), 32);
        assert!(!f.same_layout(&info));
        assert_eq!(f.quantization(), q);
    }

    #[test]
    fn test_serde_roundtrip() {
        let info = TensorInfo::new([3, 5], DType::QAsymm8Signed)
            .with_quantization(QuantizationInfo::new(0.1, -2));
        let json = serde_json::to_string(&info).unwrap();
        let back: TensorInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }
}
