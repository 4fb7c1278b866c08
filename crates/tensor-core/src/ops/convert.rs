// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Data type conversion.

use crate::{DType, Tensor, TensorError};

/// Dequantizes `src` into the F32 tensor `dst` of the same shape.
pub fn dequantize(src: &Tensor, dst: &Tensor) -> Result<(), TensorError> {
    let src_info = src.info();
    let dst_info = dst.info();
    if !src_info.dtype().is_quantized() {
        return Err(TensorError::UnsupportedDType {
            op: "dequantize",
            dtype: src_info.dtype(),
        });
    }
    if dst_info.dtype() != DType::F32 {
        return Err(TensorError::UnsupportedDType {
            op: "dequantize (output)",
            dtype: dst_info.dtype(),
        });
    }
    if src_info.shape() != dst_info.shape() {
        return Err(TensorError::ShapeMismatch {
            op: "dequantize",
            lhs: src_info.shape().clone(),
            rhs: dst_info.shape().clone(),
        });
    }
    let values = src.to_f32_vec()?;
    dst.write_f32(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QuantizationInfo, TensorInfo};

    #[test]
    fn test_dequantize_signed() {
        let q = QuantizationInfo::new(0.5, -1);
        let src = Tensor::new(TensorInfo::new([3], DType::QAsymm8Signed).with_quantization(q));
        src.allocate().unwrap();
        src.write_elements(&[-1i8, 1, 3]).unwrap();

        let dst = Tensor::new(TensorInfo::new([3], DType::F32));
        dst.allocate().unwrap();
        dequantize(&src, &dst).unwrap();
        assert_eq!(dst.read_f32().unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_dequantize_rejects_float_source() {
        let src = Tensor::new(TensorInfo::new([3], DType::F32));
        let dst = Tensor::new(TensorInfo::new([3], DType::F32));
        assert!(matches!(
            dequantize(&src, &dst),
            Err(TensorError::UnsupportedDType { .. })
        ));
    }
}
