// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element data types.

use std::fmt;
use std::str::FromStr;

/// Enumerates the element types a [`crate::Tensor`] can hold.
///
/// Operators use `DType` to pick a kernel from their dispatch table and
/// to size auxiliary buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    /// Unsigned 8-bit integer. Also the element type of flat workspace
    /// buffers.
    U8,
    /// Signed 32-bit integer.
    S32,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 32-bit IEEE 754 floating point.
    F32,
    /// Asymmetric quantized unsigned 8-bit.
    QAsymm8,
    /// Asymmetric quantized signed 8-bit.
    QAsymm8Signed,
}

impl DType {
    /// Size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::U8 | DType::QAsymm8 | DType::QAsymm8Signed => 1,
            DType::F16 => 2,
            DType::S32 | DType::F32 => 4,
        }
    }

    pub fn is_quantized(self) -> bool {
        matches!(self, DType::QAsymm8 | DType::QAsymm8Signed)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::F32)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::S32 => "s32",
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::QAsymm8 => "qasymm8",
            DType::QAsymm8Signed => "qasymm8_signed",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" => Ok(DType::U8),
            "s32" | "i32" => Ok(DType::S32),
            "f16" => Ok(DType::F16),
            "f32" => Ok(DType::F32),
            "qasymm8" => Ok(DType::QAsymm8),
            "qasymm8_signed" | "qasymm8signed" => Ok(DType::QAsymm8Signed),
            other => Err(format!("unknown data type '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(DType::U8.size_bytes(), 1);
        assert_eq!(DType::F16.size_bytes(), 2);
        assert_eq!(DType::F32.size_bytes(), 4);
        assert_eq!(DType::QAsymm8Signed.size_bytes(), 1);
    }

    #[test]
    fn test_parse_roundtrip() {
        for dt in [
            DType::U8,
            DType::S32,
            DType::F16,
            DType::F32,
            DType::QAsymm8,
            DType::QAsymm8Signed,
        ] {
            assert_eq!(dt.as_str().parse::<DType>().unwrap(), dt);
        }
        assert!("bf16".parse::<DType>().is_err());
    }

    #[test]
    fn test_classification() {
        assert!(DType::QAsymm8.is_quantized());
        assert!(!DType::QAsymm8.is_float());
        assert!(DType::F16.is_float());
        assert!(!DType::S32.is_quantized());
    }
}
