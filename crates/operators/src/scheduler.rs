// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Window-splitting CPU scheduler.
//!
//! A kernel's output buffer is its iteration window. The scheduler cuts it
//! into contiguous chunks and runs the kernel on each chunk from a rayon
//! pool; the call returns once every chunk is done.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::OperatorError;

pub struct CpuScheduler {
    pool: ThreadPool,
    num_threads: usize,
}

impl CpuScheduler {
    /// Builds a scheduler with `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Result<Self, OperatorError> {
        let num_threads = num_threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("opkit-worker-{i}"))
            .build()
            .map_err(|e| OperatorError::Scheduler(e.to_string()))?;
        tracing::debug!(num_threads, "cpu scheduler started");
        Ok(Self { pool, num_threads })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Runs `kernel(start, chunk)` over disjoint chunks of `out`, where
    /// `start` is the index of the chunk's first element. Chunks are never
    /// shorter than `min_chunk` except for the last.
    pub fn parallel_for<T, F>(&self, out: &mut [T], min_chunk: usize, kernel: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        if out.is_empty() {
            return;
        }
        let chunk = out.len().div_ceil(self.num_threads).max(min_chunk).max(1);
        if chunk >= out.len() {
            kernel(0, out);
            return;
        }
        self.pool.install(|| {
            out.par_chunks_mut(chunk)
                .enumerate()
                .for_each(|(i, window)| kernel(i * chunk, window));
        });
    }

    /// Like [`CpuScheduler::parallel_for`] but chunks hold whole rows of
    /// `row_len` elements; `kernel` receives the first row index.
    pub fn parallel_rows<T, F>(&self, out: &mut [T], row_len: usize, kernel: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        if out.is_empty() || row_len == 0 {
            return;
        }
        let rows = out.len() / row_len;
        let rows_per_chunk = rows.div_ceil(self.num_threads).max(1);
        self.parallel_for(out, rows_per_chunk * row_len, |start, window| {
            kernel(start / row_len, window)
        });
    }
}

impl std::fmt::Debug for CpuScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuScheduler")
            .field("num_threads", &self.num_threads)
            .finish()
    }
}
