// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for sketching, code generation and workload execution.

use memory_manager::MemoryError;
use tensor_core::{TensorError, TensorId};

/// Errors raised anywhere in the dynamic-fusion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    /// The operator cannot join the sketch's in-flight kernel. The sketch is
    /// unchanged and the caller may fall back to a separate workload.
    #[error("Operator fusion test failed: {0}")]
    FusionTestFailed(String),

    /// The operator does not accept this argument combination.
    #[error("{op} is not supported: {reason}")]
    UnsupportedOperator { op: &'static str, reason: String },

    /// A tensor id is unknown to the sketch or the source code.
    #[error("tensor {0} is not registered in this workload")]
    UnknownTensor(TensorId),

    /// A virtual tensor would have to cross a kernel boundary.
    #[error("virtual tensor {0} cannot be shared between kernels")]
    VirtualTensorCrossesKernels(TensorId),

    /// A kernel result lives in a virtual tensor nothing stores.
    #[error("result tensor {0} is virtual; bind it to user memory with GpuOutput")]
    UnboundResult(TensorId),

    /// Kernel source could not be rendered.
    #[error("kernel template error: {0}")]
    Template(#[from] tera::Error),

    /// `configure` was called on a sketch whose context has no compile
    /// context.
    #[error("workload context has no compile context")]
    MissingCompileContext,

    /// Kernel source failed to build.
    #[error("failed to build kernel {kernel}: {reason}")]
    KernelBuild { kernel: String, reason: String },

    /// Two tensors bound for the same run claim the same id.
    #[error("clashing tensor ids: {0} is bound twice")]
    ClashingTensorIds(TensorId),

    /// A user tensor has no backing memory at binding time.
    #[error("tensor {0} is not allocated")]
    UnallocatedTensor(TensorId),

    /// A kernel argument has no tensor in the lookup table.
    #[error("no tensor bound for kernel argument {0}")]
    MissingTensor(TensorId),

    /// An auxiliary tensor could not be created.
    #[error("failed to create auxiliary tensor {id}: {source}")]
    AuxiliaryTensorCreation {
        id: TensorId,
        #[source]
        source: TensorError,
    },

    /// The runtime was used before `configure`.
    #[error("workload runtime has not been configured")]
    NotConfigured,

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Outcome of a side-effect-free sketch check.
pub type Status = Result<(), FusionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fusion_test_message() {
        let err = FusionError::FusionTestFailed("GpuSoftmax follows GpuAdd".into());
        assert!(err.to_string().starts_with("Operator fusion test failed"));
    }

    #[test]
    fn test_aux_creation_keeps_source() {
        let err = FusionError::AuxiliaryTensorCreation {
            id: TensorId(4),
            source: TensorError::NotAllocated("aux".into()),
        };
        assert!(err.to_string().contains("t4"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
