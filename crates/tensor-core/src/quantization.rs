// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Asymmetric 8-bit quantization parameters.

/// Uniform quantization: `real = (q - offset) * scale`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuantizationInfo {
    pub scale: f32,
    pub offset: i32,
}

impl Default for QuantizationInfo {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0,
        }
    }
}

impl QuantizationInfo {
    pub fn new(scale: f32, offset: i32) -> Self {
        Self { scale, offset }
    }

    /// Quantizes to `QASYMM8`, rounding to nearest and saturating.
    pub fn quantize_u8(&self, value: f32) -> u8 {
        self.quantize_clamped(value, u8::MIN as i32, u8::MAX as i32) as u8
    }

    /// Quantizes to `QASYMM8_SIGNED`, rounding to nearest and saturating.
    pub fn quantize_i8(&self, value: f32) -> i8 {
        self.quantize_clamped(value, i8::MIN as i32, i8::MAX as i32) as i8
    }

    pub fn dequantize_u8(&self, value: u8) -> f32 {
        (value as i32 - self.offset) as f32 * self.scale
    }

    pub fn dequantize_i8(&self, value: i8) -> f32 {
        (value as i32 - self.offset) as f32 * self.scale
    }

    fn quantize_clamped(&self, value: f32, lo: i32, hi: i32) -> i32 {
        let q = (value / self.scale).round() as i32;
        q.saturating_add(self.offset).clamp(lo, hi)
    }
}
