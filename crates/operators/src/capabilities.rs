// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Hardware capabilities used for kernel selection.
//!
//! Detection happens once, at the caller's request, and the result is
//! passed to every `configure` call that selects a kernel. On aarch64 the
//! standard library's runtime feature detection is used; elsewhere the
//! `Features` line of `/proc/cpuinfo` is parsed, which degrades to a
//! portable (no SIMD) profile on hosts that report none of the flags.

use serde::Serialize;

#[cfg(not(target_arch = "aarch64"))]
const CPUINFO_PATH: &str = "/proc/cpuinfo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HardwareCapabilities {
    pub neon: bool,
    pub sve: bool,
    pub sve2: bool,
    /// Half-precision vector arithmetic.
    pub fp16: bool,
    pub dot_product: bool,
    pub num_cores: usize,
}

impl HardwareCapabilities {
    /// No optional ISA features.
    pub fn portable() -> Self {
        Self {
            neon: false,
            sve: false,
            sve2: false,
            fp16: false,
            dot_product: false,
            num_cores: 1,
        }
    }

    pub fn with_fp16(mut self) -> Self {
        self.fp16 = true;
        self
    }

    pub fn with_cores(mut self, num_cores: usize) -> Self {
        self.num_cores = num_cores.max(1);
        self
    }

    /// Detects the capabilities of the running host.
    pub fn detect() -> Self {
        let num_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let caps = Self::detect_features().with_cores(num_cores);
        tracing::debug!(?caps, "hardware capabilities detected");
        caps
    }

    #[cfg(target_arch = "aarch64")]
    fn detect_features() -> Self {
        use std::arch::is_aarch64_feature_detected;
        Self {
            neon: is_aarch64_feature_detected!("neon"),
            sve: is_aarch64_feature_detected!("sve"),
            sve2: is_aarch64_feature_detected!("sve2"),
            fp16: is_aarch64_feature_detected!("fp16"),
            dot_product: is_aarch64_feature_detected!("dotprod"),
            num_cores: 1,
        }
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn detect_features() -> Self {
        match std::fs::read_to_string(CPUINFO_PATH) {
            Ok(text) => Self::from_cpuinfo(&text, 1),
            Err(e) => {
                tracing::debug!(error = %e, "cannot read {CPUINFO_PATH}, assuming portable profile");
                Self::portable()
            }
        }
    }

    /// Parses the arm64 `Features` flags of a `/proc/cpuinfo` dump.
    pub fn from_cpuinfo(text: &str, num_cores: usize) -> Self {
        let flags: Vec<&str> = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .filter(|(key, _)| key.trim() == "Features")
            .flat_map(|(_, value)| value.split_whitespace())
            .collect();
        let has = |flag: &str| flags.contains(&flag);

        Self {
            neon: has("asimd"),
            sve: has("sve"),
            sve2: has("sve2"),
            fp16: has("fphp") && has("asimdhp"),
            dot_product: has("asimddp"),
            num_cores: num_cores.max(1),
        }
    }
}

impl Default for HardwareCapabilities {
    fn default() -> Self {
        Self::portable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORTEX_A76: &str = "\
processor\t: 0
BogoMIPS\t: 108.00
Features\t: fp asimd evtstrm aes pmull sha1 sha2 crc32 atomics fphp asimdhp cpuid asimdrdm lrcpc dcpop asimddp
CPU implementer\t: 0x41
";

    #[test]
    fn test_from_cpuinfo_arm() {
        let caps = HardwareCapabilities::from_cpuinfo(CORTEX_A76, 4);
        assert!(caps.neon);
        assert!(caps.fp16);
        assert!(caps.dot_product);
        assert!(!caps.sve);
        assert!(!caps.sve2);
        assert_eq!(caps.num_cores, 4);
    }

    #[test]
    fn test_from_cpuinfo_x86_is_portable() {
        let text = "processor\t: 0\nflags\t\t: fpu vme sse sse2 avx2\n";
        let caps = HardwareCapabilities::from_cpuinfo(text, 0);
        assert_eq!(caps, HardwareCapabilities::portable());
    }

    #[test]
    fn test_detect_reports_cores() {
        assert!(HardwareCapabilities::detect().num_cores >= 1);
    }

    #[test]
    fn test_serializes() {
        let json = serde_json::to_string(&HardwareCapabilities::portable().with_fp16()).unwrap();
        assert!(json.contains("\"fp16\":true"));
        assert!(json.contains("\"num_cores\":1"));
    }
}
