// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! 2-D transpose.

/// Transposes a row-major `[rows, cols]` matrix into `[cols, rows]`.
pub fn transpose_2d<T: Copy>(src: &[T], rows: usize, cols: usize) -> Vec<T> {
    debug_assert_eq!(src.len(), rows * cols);
    let mut dst = Vec::with_capacity(src.len());
    for c in 0..cols {
        dst.extend((0..rows).map(|r| src[r * cols + c]));
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose() {
        let m = [1, 2, 3, 4, 5, 6];
        assert_eq!(transpose_2d(&m, 2, 3), vec![1, 4, 2, 5, 3, 6]);
        assert_eq!(transpose_2d(&transpose_2d(&m, 2, 3), 3, 2), m.to_vec());
    }
}
