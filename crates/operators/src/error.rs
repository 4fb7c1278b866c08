// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for operator configuration and execution.

use memory_manager::MemoryError;
use tensor_core::{DType, Shape, TensorError};

use crate::dispatch::DataLayout;

/// Errors raised while validating, configuring or running an operator.
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    /// The tensor-info combination is not supported by this operator.
    #[error("invalid configuration for {op}: {reason}")]
    InvalidConfiguration { op: &'static str, reason: String },

    /// A data type is not accepted for the given role.
    #[error("{op}: unsupported data type {dtype}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// Two shapes that must agree do not.
    #[error("{op}: shape mismatch between {lhs} and {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// No registered kernel satisfies the key on this hardware.
    #[error("no {kind} kernel for {dtype}/{layout:?} on this hardware")]
    NoKernel {
        kind: &'static str,
        dtype: DType,
        layout: DataLayout,
    },

    /// `run` or `prepare` was called before `configure`.
    #[error("{0} has not been configured")]
    NotConfigured(&'static str),

    /// `run` was called before `prepare` on an operator holding
    /// persistent or prepare-lifetime memory.
    #[error("{0} must be prepared before it can run")]
    NotPrepared(&'static str),

    /// The scheduler's thread pool could not be built.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Outcome of a side-effect-free `validate` call.
pub type Status = Result<(), OperatorError>;

/// Fail-fast conversion for call sites that treat a configuration error
/// as a programming error.
///
/// ```should_panic
/// use operators::{OperatorError, OrAbort};
///
/// let status: Result<(), OperatorError> = Err(OperatorError::NotConfigured("CpuSub"));
/// status.or_abort();
/// ```
pub trait OrAbort<T> {
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T, OperatorError> {
    #[track_caller]
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }
}
