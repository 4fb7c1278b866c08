// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! In-order command queue emulated on the host.
//!
//! `enqueue` only records the kernel and its bindings. Commands execute in
//! submission order on `flush` or `finish`, so a caller reading results
//! must synchronise first, exactly as with a device queue.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use super::kernel::{ClKernel, TensorLookupTable};
use crate::error::FusionError;

struct Command {
    kernel: Arc<ClKernel>,
    lut: TensorLookupTable,
}

#[derive(Default)]
pub struct ClCommandQueue {
    pending: VecDeque<Command>,
    executed: usize,
}

impl ClCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `kernel` with the tensors in `lut`. Every kernel argument
    /// must be bound. With `flush` set, the queue is drained immediately.
    pub fn enqueue(&mut self, kernel: Arc<ClKernel>, lut: &TensorLookupTable, flush: bool) -> Result<(), FusionError> {
        kernel.check_arguments(lut)?;
        let lut = kernel
            .arguments()
            .iter()
            .filter_map(|a| lut.get_key_value(&a.tensor))
            .map(|(id, t)| (*id, t.clone()))
            .collect();
        debug!("Enqueued {}", kernel.config_id());
        self.pending.push_back(Command { kernel, lut });
        if flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Executes every pending command in submission order.
    ///
    /// Stops at the first failing command; later commands stay queued.
    pub fn flush(&mut self) -> Result<(), FusionError> {
        while let Some(command) = self.pending.front() {
            command.kernel.execute(&command.lut)?;
            self.pending.pop_front();
            self.executed += 1;
        }
        Ok(())
    }

    /// Blocks until all submitted work is complete.
    pub fn finish(&mut self) -> Result<(), FusionError> {
        self.flush()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of commands executed since the queue was created.
    pub fn executed(&self) -> usize {
        self.executed
    }
}

impl std::fmt::Debug for ClCommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClCommandQueue")
            .field("pending", &self.pending.len())
            .field("executed", &self.executed)
            .finish()
    }
}
