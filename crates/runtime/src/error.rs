// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the function runtime.

/// Errors that can occur while setting up or driving a [`crate::Function`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The wrapped operator rejected a call.
    #[error("operator error: {0}")]
    Operator(#[from] operators::OperatorError),

    /// Workspace memory could not be obtained.
    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    /// The operator was handed over before `configure` succeeded.
    #[error("operator '{0}' is not configured")]
    Unconfigured(&'static str),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
