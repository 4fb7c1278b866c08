// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Function profiling metrics.
//!
//! [`RunMetrics`] collects prepare and per-run timing together with the
//! workspace footprint of one [`crate::Function`].

use std::time::Duration;

/// Aggregate metrics for the runs of one function.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunMetrics {
    /// Operator name.
    pub operator: String,
    /// Time spent in `prepare`, including releasing prepare buffers.
    pub prepare_duration: Duration,
    /// Number of completed runs.
    pub runs: usize,
    /// Total time spent in `run`.
    pub total_run_duration: Duration,
    /// Duration of the most recent run.
    pub last_run_duration: Duration,
    /// Bytes of the memory-group arena holding temporaries.
    pub group_arena_bytes: usize,
    /// Bytes held by persistent (and not yet released prepare) buffers.
    pub owned_bytes: usize,
}

impl RunMetrics {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            ..Default::default()
        }
    }

    pub fn record_prepare(&mut self, duration: Duration, owned_bytes: usize) {
        self.prepare_duration = duration;
        self.owned_bytes = owned_bytes;
    }

    pub fn record_run(&mut self, duration: Duration) {
        self.runs += 1;
        self.total_run_duration += duration;
        self.last_run_duration = duration;
    }

    /// Mean run duration, zero before the first run.
    pub fn average_run_duration(&self) -> Duration {
        match u32::try_from(self.runs) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.total_run_duration / n,
        }
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{}: prepare {:.3}ms, {} runs averaging {:.3}ms, arena {} bytes, owned {} bytes",
            self.operator,
            self.prepare_duration.as_secs_f64() * 1000.0,
            self.runs,
            self.average_run_duration().as_secs_f64() * 1000.0,
            self.group_arena_bytes,
            self.owned_bytes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let m = RunMetrics::new("CpuSub");
        assert_eq!(m.runs, 0);
        assert_eq!(m.average_run_duration(), Duration::ZERO);
    }

    #[test]
    fn test_record_runs() {
        let mut m = RunMetrics::new("CpuGemm");
        m.record_prepare(Duration::from_millis(4), 96);
        m.record_run(Duration::from_millis(10));
        m.record_run(Duration::from_millis(20));

        assert_eq!(m.runs, 2);
        assert_eq!(m.owned_bytes, 96);
        assert_eq!(m.last_run_duration, Duration::from_millis(20));
        assert_eq!(m.average_run_duration(), Duration::from_millis(15));
    }

    #[test]
    fn test_summary_format() {
        let mut m = RunMetrics::new("CpuSub");
        m.group_arena_bytes = 128;
        m.record_run(Duration::from_millis(1));
        let s = m.summary();
        assert!(s.starts_with("CpuSub:"));
        assert!(s.contains("1 runs"));
        assert!(s.contains("arena 128 bytes"));
    }
}
