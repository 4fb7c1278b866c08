// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory classes of sketch tensors.

use std::fmt;

/// Who owns the memory behind a sketch tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Supplied by the caller on every run.
    User,
    /// Created and owned by the workload runtime.
    Auxiliary,
    /// Never materialised; lives in registers inside one kernel.
    Virtual,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryType::User => "user",
            MemoryType::Auxiliary => "auxiliary",
            MemoryType::Virtual => "virtual",
        };
        f.write_str(s)
    }
}

/// Size and alignment of an auxiliary tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AuxMemoryInfo {
    pub size: usize,
    pub alignment: usize,
}

impl AuxMemoryInfo {
    pub const DEFAULT_ALIGNMENT: usize = 64;

    pub fn new(size: usize) -> Self {
        Self {
            size,
            alignment: Self::DEFAULT_ALIGNMENT,
        }
    }
}

/// Memory class of a tensor plus, for auxiliary tensors, its sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemoryDescriptor {
    pub memory_type: MemoryType,
    pub aux_info: Option<AuxMemoryInfo>,
}

impl MemoryDescriptor {
    pub fn user() -> Self {
        Self {
            memory_type: MemoryType::User,
            aux_info: None,
        }
    }

    pub fn virtual_tensor() -> Self {
        Self {
            memory_type: MemoryType::Virtual,
            aux_info: None,
        }
    }

    pub fn auxiliary(info: AuxMemoryInfo) -> Self {
        Self {
            memory_type: MemoryType::Auxiliary,
            aux_info: Some(info),
        }
    }

    /// Whether the tensor is backed by real memory and may therefore be
    /// passed between kernels.
    pub fn is_materialised(&self) -> bool {
        self.memory_type != MemoryType::Virtual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert!(MemoryDescriptor::user().is_materialised());
        assert!(!MemoryDescriptor::virtual_tensor().is_materialised());
        let aux = MemoryDescriptor::auxiliary(AuxMemoryInfo::new(256));
        assert_eq!(aux.memory_type, MemoryType::Auxiliary);
        assert_eq!(aux.aux_info.map(|a| a.alignment), Some(64));
    }

    #[test]
    fn test_memory_type_serde() {
        let json = serde_json::to_string(&MemoryType::Auxiliary).unwrap();
        assert_eq!(json, "\"auxiliary\"");
        assert_eq!(MemoryType::Virtual.to_string(), "virtual");
    }
}
