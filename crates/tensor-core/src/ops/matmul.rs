// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication kernels.

use crate::{Shape, TensorError};

/// Validates `lhs` `[M, K]` against `rhs` `[K, N]` and returns `[M, N]`.
pub fn matmul_output_shape(lhs: &Shape, rhs: &Shape) -> Result<Shape, TensorError> {
    if lhs.rank() != 2 || rhs.rank() != 2 || !lhs.is_matmul_compatible(rhs) {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        });
    }
    Ok(Shape::matrix(lhs.dims()[0], rhs.dims()[1]))
}

/// `c = a @ b` with `a` `[M, K]`, `b` `[K, N]`.
///
/// ikj loop order so the inner loop walks a row of `b` and a row of `c`.
pub fn matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    c.iter_mut().for_each(|x| *x = 0.0);
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (cj, &bj) in c_row.iter_mut().zip(b_row) {
                *cj += a_ip * bj;
            }
        }
    }
}

/// Rows of `alpha * (a @ b)` against a pre-transposed `bt` (`[N, K]`).
///
/// `c_rows` holds whole output rows starting at row `row_start`; every
/// dot product reads two contiguous rows.
pub fn gemm_bt_rows(
    a: &[f32],
    bt: &[f32],
    k: usize,
    n: usize,
    alpha: f32,
    row_start: usize,
    c_rows: &mut [f32],
) {
    for (r, c_row) in c_rows.chunks_exact_mut(n).enumerate() {
        let i = row_start + r;
        let a_row = &a[i * k..(i + 1) * k];
        for (j, cj) in c_row.iter_mut().enumerate() {
            let bt_row = &bt[j * k..(j + 1) * k];
            let dot: f32 = a_row.iter().zip(bt_row).map(|(x, y)| x * y).sum();
            *cj = alpha * dot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::transpose_2d;

    const A: [f32; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    const B: [f32; 6] = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];

    #[test]
    fn test_matmul_2x3_times_3x2() {
        let mut c = [0.0f32; 4];
        matmul_f32(&A, &B, &mut c, 2, 3, 2);
        assert_eq!(c, [58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_gemm_bt_matches_matmul() {
        let bt = transpose_2d(&B, 3, 2);
        let mut c = [0.0f32; 4];
        gemm_bt_rows(&A, &bt, 3, 2, 1.0, 0, &mut c[..2]);
        gemm_bt_rows(&A, &bt, 3, 2, 1.0, 1, &mut c[2..]);
        assert_eq!(c, [58.0, 64.0, 139.0, 154.0]);

        gemm_bt_rows(&A, &bt, 3, 2, 0.5, 0, &mut c);
        assert_eq!(c, [29.0, 32.0, 69.5, 77.0]);
    }

    #[test]
    fn test_output_shape() {
        let s = matmul_output_shape(&Shape::matrix(2, 3), &Shape::matrix(3, 5)).unwrap();
        assert_eq!(s, Shape::matrix(2, 5));
        assert!(matmul_output_shape(&Shape::matrix(2, 3), &Shape::matrix(4, 2)).is_err());
        assert!(matmul_output_shape(&Shape::vector(3), &Shape::matrix(3, 2)).is_err());
    }
}
