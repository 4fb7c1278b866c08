// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Settings shared by every [`crate::Function`] and the GPU runtime.
//!
//! Every key is optional; an empty file yields [`RuntimeConfig::default`].
//!
//! ```toml
//! memory_budget = "64M"            # ceiling of the shared pool
//! num_threads = 4                  # omit to use every online core
//! allocate_workspace_eagerly = true
//! enable_profiling = true
//! flush_gpu_queue = false
//! ```

use std::path::Path;
use std::sync::Arc;

use memory_manager::{MemoryBudget, MemoryPool};
use operators::CpuScheduler;

use crate::RuntimeError;

const DEFAULT_BUDGET: &str = "64M";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pool ceiling in [`MemoryBudget::parse`] notation.
    pub memory_budget: String,
    /// Scheduler width. `None` means one worker per online core.
    pub num_threads: Option<usize>,
    /// Back persistent and prepare buffers as soon as a function is
    /// built, instead of right before `prepare`.
    pub allocate_workspace_eagerly: bool,
    /// Record [`crate::RunMetrics`] for every run.
    pub enable_profiling: bool,
    /// Drain the GPU command queue after every enqueue.
    pub flush_gpu_queue: bool,
}

impl RuntimeConfig {
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, RuntimeError> {
        toml::from_str(text).map_err(|e| RuntimeError::ConfigError(format!("malformed config: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("cannot encode config: {e}")))
    }

    pub fn parse_budget(&self) -> Result<MemoryBudget, RuntimeError> {
        self.memory_budget
            .parse::<MemoryBudget>()
            .map_err(|e| RuntimeError::ConfigError(format!("memory_budget: {e}")))
    }

    /// A fresh pool with the configured ceiling.
    pub fn memory_pool(&self) -> Result<MemoryPool, RuntimeError> {
        self.parse_budget().map(MemoryPool::new)
    }

    pub fn resolve_threads(&self) -> usize {
        match self.num_threads {
            Some(n) => n,
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }

    pub fn scheduler(&self) -> Result<Arc<CpuScheduler>, RuntimeError> {
        let workers = self.resolve_threads();
        Ok(Arc::new(CpuScheduler::new(workers)?))
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_BUDGET.to_string(),
            num_threads: None,
            allocate_workspace_eagerly: true,
            enable_profiling: true,
            flush_gpu_queue: false,
        }
    }
}
