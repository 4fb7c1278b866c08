// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fused add + batch-norm multiply/add.

use super::ActivationInfo;

/// Computes `act((in1 + in2) * bn_mul[c] + bn_add[c])` for output elements
/// `start .. start + out.len()`, where `c` is the position along the
/// innermost dimension (`bn_mul.len()` elements).
pub fn add_mul_add_f32(
    in1: &[f32],
    in2: &[f32],
    bn_mul: &[f32],
    bn_add: &[f32],
    act: ActivationInfo,
    start: usize,
    out: &mut [f32],
) {
    let channels = bn_mul.len().max(1);
    for (i, o) in out.iter_mut().enumerate() {
        let idx = start + i;
        let c = idx % channels;
        let sum = in1[idx] + in2[idx];
        *o = act.apply(sum * bn_mul[c] + bn_add[c]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_channel() {
        let in1 = [1.0, 2.0, 3.0, 4.0];
        let in2 = [1.0, 1.0, 1.0, 1.0];
        let mul = [2.0, 0.5];
        let add = [0.0, -10.0];
        let mut out = [0.0; 4];
        add_mul_add_f32(&in1, &in2, &mul, &add, ActivationInfo::identity(), 0, &mut out);
        assert_eq!(out, [4.0, -8.5, 8.0, -7.5]);

        add_mul_add_f32(&in1, &in2, &mul, &add, ActivationInfo::relu(), 0, &mut out);
        assert_eq!(out, [4.0, 0.0, 8.0, 0.0]);
    }

    #[test]
    fn test_window_offset() {
        let in1 = [1.0; 6];
        let in2 = [0.0; 6];
        let mul = [1.0, 2.0, 3.0];
        let add = [0.0; 3];
        let mut tail = [0.0; 2];
        add_mul_add_f32(&in1, &in2, &mul, &add, ActivationInfo::bounded_relu(2.5), 4, &mut tail);
        assert_eq!(tail, [2.0, 2.5]);
    }
}
