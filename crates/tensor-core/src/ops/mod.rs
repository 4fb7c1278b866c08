// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Portable reference kernels.
//!
//! Kernels work on plain slices. The ones that can be split take a `start`
//! index and fill an output chunk, so a scheduler can hand disjoint windows
//! of the output to different workers.

mod activation;
mod add_mul_add;
mod convert;
mod elementwise;
mod matmul;
mod softmax;
mod transpose;

pub use activation::{ActivationFunction, ActivationInfo};
pub use add_mul_add::add_mul_add_f32;
pub use convert::dequantize;
pub use elementwise::{broadcast_binary, ArithmeticOp, ConvertPolicy};
pub use matmul::{gemm_bt_rows, matmul_f32, matmul_output_shape};
pub use softmax::{exp_sum_rows, normalize_rows, softmax_rows};
pub use transpose::transpose_2d;
