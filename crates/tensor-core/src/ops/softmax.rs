// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Softmax along the innermost dimension.
//!
//! Uses the max-subtracted form so large inputs do not overflow. The
//! two-pass split ([`exp_sum_rows`] then [`normalize_rows`]) is what a
//! two-kernel GPU implementation runs; [`softmax_rows`] fuses both.

/// Writes `exp(x - row_max)` to `exp_out` and each row's sum to `sums`.
pub fn exp_sum_rows(src: &[f32], row_len: usize, exp_out: &mut [f32], sums: &mut [f32]) {
    if row_len == 0 {
        return;
    }
    for ((row_src, row_exp), sum) in src
        .chunks_exact(row_len)
        .zip(exp_out.chunks_exact_mut(row_len))
        .zip(sums.iter_mut())
    {
        let max_val = row_src.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut acc = 0.0f32;
        for (e, &s) in row_exp.iter_mut().zip(row_src) {
            *e = (s - max_val).exp();
            acc += *e;
        }
        *sum = acc;
    }
}

/// Divides every row of `exp` by its sum.
pub fn normalize_rows(exp: &[f32], sums: &[f32], row_len: usize, dst: &mut [f32]) {
    if row_len == 0 {
        return;
    }
    for ((row_exp, row_dst), &sum) in exp
        .chunks_exact(row_len)
        .zip(dst.chunks_exact_mut(row_len))
        .zip(sums)
    {
        let inv = if sum > 0.0 { 1.0 / sum } else { 0.0 };
        for (d, &e) in row_dst.iter_mut().zip(row_exp) {
            *d = e * inv;
        }
    }
}

/// Row-wise softmax of `src` into `dst`.
pub fn softmax_rows(src: &[f32], row_len: usize, dst: &mut [f32]) {
    if row_len == 0 {
        return;
    }
    let mut sums = vec![0.0f32; src.len() / row_len];
    exp_sum_rows(src, row_len, dst, &mut sums);
    for (row, &sum) in dst.chunks_exact_mut(row_len).zip(&sums) {
        if sum > 0.0 {
            let inv = 1.0 / sum;
            row.iter_mut().for_each(|d| *d *= inv);
        }
    }
}
