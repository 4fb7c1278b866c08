// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocator counters, split between plain buffers and group arenas.

/// Cumulative statistics of one [`MemoryPool`](crate::MemoryPool).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AllocationStats {
    /// Allocation requests, rejected ones included.
    pub requests: u64,
    /// Requests served by recycling a buffer from the free list.
    pub reused: u64,
    /// Requests that needed a fresh heap buffer.
    pub fresh: u64,
    /// Requests refused because the budget was exhausted.
    pub rejected: u64,
    /// Buffers handed back to the pool.
    pub returned: u64,
    pub bytes_requested: u64,
    /// High-water mark of live bytes.
    pub peak_live_bytes: usize,
    /// Number of times a memory group backed its arena from the pool.
    pub arena_acquisitions: u64,
    /// Largest arena a memory group has acquired.
    pub largest_arena_bytes: usize,
}

impl AllocationStats {
    /// Fraction of successful requests served from the free list.
    pub fn reuse_ratio(&self) -> f64 {
        match self.reused + self.fresh {
            0 => 0.0,
            served => self.reused as f64 / served as f64,
        }
    }

    pub(crate) fn on_served(&mut self, size: usize, reused: bool, live_bytes: usize) {
        self.requests += 1;
        self.bytes_requested += size as u64;
        if reused {
            self.reused += 1;
        } else {
            self.fresh += 1;
        }
        self.peak_live_bytes = self.peak_live_bytes.max(live_bytes);
    }

    pub(crate) fn on_rejected(&mut self) {
        self.requests += 1;
        self.rejected += 1;
    }

    pub(crate) fn on_returned(&mut self) {
        self.returned += 1;
    }

    pub(crate) fn on_arena_acquired(&mut self, arena_bytes: usize) {
        self.arena_acquisitions += 1;
        self.largest_arena_bytes = self.largest_arena_bytes.max(arena_bytes);
    }

    /// Returns a one-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} requests ({} reused, {} fresh, {} rejected, {:.0}% reuse), peak {} bytes live, \
             {} arena acquisitions (largest {} bytes)",
            self.requests,
            self.reused,
            self.fresh,
            self.rejected,
            self.reuse_ratio() * 100.0,
            self.peak_live_bytes,
            self.arena_acquisitions,
            self.largest_arena_bytes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_ratio_ignores_rejections() {
        let mut s = AllocationStats::default();
        assert_eq!(s.reuse_ratio(), 0.0);
        s.on_served(100, true, 100);
        s.on_served(100, false, 200);
        s.on_rejected();
        assert_eq!(s.requests, 3);
        assert!((s.reuse_ratio() - 0.5).abs() < 1e-9);
        assert_eq!(s.bytes_requested, 200);
    }

    #[test]
    fn test_high_water_marks() {
        let mut s = AllocationStats::default();
        s.on_served(64, false, 300);
        s.on_served(64, false, 120);
        s.on_arena_acquired(512);
        s.on_arena_acquired(256);
        assert_eq!(s.peak_live_bytes, 300);
        assert_eq!(s.largest_arena_bytes, 512);
        assert_eq!(s.arena_acquisitions, 2);
    }

    #[test]
    fn test_summary() {
        let mut s = AllocationStats::default();
        s.on_served(2048, false, 2048);
        s.on_arena_acquired(1024);
        let summary = s.summary();
        assert!(summary.starts_with("1 requests"));
        assert!(summary.contains("peak 2048 bytes live"));
        assert!(summary.contains("largest 1024 bytes"));
    }
}
