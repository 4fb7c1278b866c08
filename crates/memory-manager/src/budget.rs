// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Byte ceilings for a [`crate::MemoryPool`].
//!
//! Operator workspaces, memory-group arenas and user tensors allocated from
//! one pool are all charged against the same [`MemoryBudget`].

use std::fmt;

use crate::MemoryError;

const KIB: usize = 1 << 10;
const MIB: usize = 1 << 20;
const GIB: usize = 1 << 30;

/// Unit suffixes, two-letter forms first so `"MB"` does not end on `"B"`.
const UNITS: &[(&str, usize)] = &[
    ("GB", GIB),
    ("MB", MIB),
    ("KB", KIB),
    ("G", GIB),
    ("M", MIB),
    ("K", KIB),
    ("B", 1),
];

/// Upper bound on the bytes a pool keeps live.
///
/// ```
/// use memory_manager::MemoryBudget;
///
/// assert_eq!(MemoryBudget::parse("2k").unwrap().as_bytes(), 2048);
/// assert_eq!(MemoryBudget::from_mb(3).to_string(), "3 MB");
/// assert!(MemoryBudget::unlimited().is_unlimited());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn from_mb(mb: usize) -> Self {
        Self::from_bytes(mb.saturating_mul(MIB))
    }

    pub fn from_gb(gb: usize) -> Self {
        Self::from_bytes(gb.saturating_mul(GIB))
    }

    /// A ceiling no request can reach. Tensors allocated without a pool
    /// draw from one of these.
    pub fn unlimited() -> Self {
        Self::from_bytes(usize::MAX)
    }

    pub fn is_unlimited(&self) -> bool {
        self.bytes == usize::MAX
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Whole mebibytes, rounded down.
    pub fn as_mb(&self) -> usize {
        self.bytes / MIB
    }

    /// Reads `"64M"`, `"512kb"`, `"1G"`, `"100B"` or a bare byte count.
    ///
    /// Whitespace around the number and the unit is ignored; the unit is
    /// case-insensitive. A zero budget is rejected.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let text = s.trim();
        let invalid = || MemoryError::InvalidBudget(text.to_string());
        let upper = text.to_ascii_uppercase();

        let (number, scale) = UNITS
            .iter()
            .find_map(|&(unit, scale)| upper.strip_suffix(unit).map(|n| (n.trim_end(), scale)))
            .unwrap_or((upper.as_str(), 1));

        let bytes = number
            .parse::<usize>()
            .map_err(|_| invalid())?
            .checked_mul(scale)
            .ok_or_else(invalid)?;
        match bytes {
            0 => Err(MemoryError::ZeroSizedAllocation),
            bytes => Ok(Self::from_bytes(bytes)),
        }
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            return f.write_str("unlimited");
        }
        let (value, unit) = [(GIB, "GB"), (MIB, "MB"), (KIB, "KB")]
            .into_iter()
            .find(|&(scale, _)| self.bytes >= scale && self.bytes % scale == 0)
            .map(|(scale, unit)| (self.bytes / scale, unit))
            .unwrap_or((self.bytes, "B"));
        write!(f, "{value} {unit}")
    }
}

impl std::str::FromStr for MemoryBudget {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        let cases = [
            ("64M", 64 * MIB),
            ("64mb", 64 * MIB),
            ("2G", 2 * GIB),
            ("2048KB", 2 * MIB),
            ("7b", 7),
            ("4096", 4096),
            (" 8 K ", 8 * KIB),
        ];
        for (text, bytes) in cases {
            assert_eq!(MemoryBudget::parse(text).unwrap().as_bytes(), bytes, "{text}");
        }
    }

    #[test]
    fn test_rejects_garbage_and_zero() {
        for text in ["", "M", "ten", "1.5G", "-3K"] {
            assert!(
                matches!(MemoryBudget::parse(text), Err(MemoryError::InvalidBudget(_))),
                "{text}"
            );
        }
        assert!(matches!(
            MemoryBudget::parse("0K"),
            Err(MemoryError::ZeroSizedAllocation)
        ));
        assert!(MemoryBudget::parse("99999999999999999999G").is_err());
    }

    #[test]
    fn test_from_str() {
        let b: MemoryBudget = "16M".parse().unwrap();
        assert_eq!(b, MemoryBudget::from_mb(16));
        assert_eq!(MemoryBudget::from_gb(1).as_mb(), 1024);
    }

    #[test]
    fn test_display_picks_largest_exact_unit() {
        assert_eq!(MemoryBudget::from_gb(2).to_string(), "2 GB");
        assert_eq!(MemoryBudget::from_bytes(3 * MIB).to_string(), "3 MB");
        assert_eq!(MemoryBudget::from_bytes(MIB + KIB).to_string(), "1025 KB");
        assert_eq!(MemoryBudget::from_bytes(1000).to_string(), "1000 B");
        assert_eq!(MemoryBudget::unlimited().to_string(), "unlimited");
    }

    #[test]
    fn test_serializes_as_byte_count() {
        let json = serde_json::to_string(&MemoryBudget::from_bytes(4096)).unwrap();
        assert_eq!(json, "4096");
        let back: MemoryBudget = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_bytes(), 4096);
    }
}
