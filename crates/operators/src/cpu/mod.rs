// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CPU operators.

mod add_mul_add;
mod elementwise;
mod fully_connected;
mod gemm;

pub use add_mul_add::{AddMulAddArgs, CpuAddMulAdd};
pub use elementwise::{CpuElementwiseBinary, CpuSub};
pub use fully_connected::CpuFullyConnected;
pub use gemm::{CpuGemm, GemmInfo};
