// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Drives configured operators through their full lifecycle.
//!
//! A [`Function`] takes:
//! - A configured operator from `operators`.
//! - The user tensors, as a `TensorPack` of bindings.
//! - A `MemoryPool` from `memory-manager`.
//!
//! And owns the run/prepare packs, the operator's workspace and the memory
//! group holding its temporaries, recording [`RunMetrics`] as it runs.
//!
//! # Type-State Pipeline
//! ```text
//! Function<Configured> → Function<Ready>
//! ```
//! Transitions are compile-time checked.
//!
//! Settings come from a TOML-backed [`RuntimeConfig`].

mod config;
mod error;
mod function;
mod metrics;

pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use function::{Configured, Function, FunctionState, Ready};
pub use metrics::RunMetrics;
