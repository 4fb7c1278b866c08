// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Capability-matched kernel selection.
//!
//! Each operator family registers its kernel variants under a
//! [`KernelKey`]. Candidates for one key are tried in registration order
//! and the first whose [`IsaRequirement`] the hardware satisfies wins, so
//! specialised variants are registered before portable fallbacks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tensor_core::DType;
use tracing::debug;

use crate::{HardwareCapabilities, OperatorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataLayout {
    #[default]
    Nhwc,
    Nchw,
}

impl DataLayout {
    pub const ALL: [DataLayout; 2] = [DataLayout::Nhwc, DataLayout::Nchw];
}

/// ISA feature a kernel variant needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsaRequirement {
    None,
    Neon,
    Fp16,
    Sve,
    DotProduct,
}

impl IsaRequirement {
    pub fn satisfied_by(self, caps: &HardwareCapabilities) -> bool {
        match self {
            IsaRequirement::None => true,
            IsaRequirement::Neon => caps.neon,
            IsaRequirement::Fp16 => caps.fp16,
            IsaRequirement::Sve => caps.sve,
            IsaRequirement::DotProduct => caps.dot_product,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub kind: &'static str,
    pub dtype: DType,
    pub layout: DataLayout,
}

impl KernelKey {
    pub fn new(kind: &'static str, dtype: DType, layout: DataLayout) -> Self {
        Self { kind, dtype, layout }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KernelEntry<K> {
    pub name: &'static str,
    pub requires: IsaRequirement,
    pub kernel: K,
}

/// `(kind, dtype, layout)` → ordered kernel candidates.
#[derive(Debug, Clone)]
pub struct DispatchTable<K> {
    entries: HashMap<KernelKey, Vec<KernelEntry<K>>>,
}

impl<K> Default for DispatchTable<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Copy> DispatchTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a candidate for `key`.
    pub fn register(
        &mut self,
        key: KernelKey,
        name: &'static str,
        requires: IsaRequirement,
        kernel: K,
    ) -> &mut Self {
        self.entries.entry(key).or_default().push(KernelEntry {
            name,
            requires,
            kernel,
        });
        self
    }

    /// Registers the same candidate for every layout.
    pub fn register_all_layouts(
        &mut self,
        kind: &'static str,
        dtype: DType,
        name: &'static str,
        requires: IsaRequirement,
        kernel: K,
    ) -> &mut Self {
        for layout in DataLayout::ALL {
            self.register(KernelKey::new(kind, dtype, layout), name, requires, kernel);
        }
        self
    }

    /// Picks the first candidate for `key` that `caps` can run.
    pub fn select(
        &self,
        key: KernelKey,
        caps: &HardwareCapabilities,
    ) -> Result<KernelEntry<K>, OperatorError> {
        let entry = self
            .entries
            .get(&key)
            .and_then(|candidates| candidates.iter().find(|e| e.requires.satisfied_by(caps)))
            .copied()
            .ok_or(OperatorError::NoKernel {
                kind: key.kind,
                dtype: key.dtype,
                layout: key.layout,
            })?;
        debug!(kind = key.kind, dtype = %key.dtype, kernel = entry.name, "kernel selected");
        Ok(entry)
    }

    pub fn num_keys(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Variant {
        Sve,
        Neon,
        Scalar,
    }

    fn table() -> DispatchTable<Variant> {
        let key = KernelKey::new("relu", DType::F32, DataLayout::Nhwc);
        let mut t = DispatchTable::new();
        t.register(key, "sve_relu", IsaRequirement::Sve, Variant::Sve)
            .register(key, "neon_relu", IsaRequirement::Neon, Variant::Neon)
            .register(key, "scalar_relu", IsaRequirement::None, Variant::Scalar);
        t
    }

    #[test]
    fn test_first_satisfied_candidate_wins() {
        let key = KernelKey::new("relu", DType::F32, DataLayout::Nhwc);
        let mut caps = HardwareCapabilities::portable();
        assert_eq!(table().select(key, &caps).unwrap().kernel, Variant::Scalar);

        caps.neon = true;
        assert_eq!(table().select(key, &caps).unwrap().kernel, Variant::Neon);

        caps.sve = true;
        let entry = table().select(key, &caps).unwrap();
        assert_eq!(entry.kernel, Variant::Sve);
        assert_eq!(entry.name, "sve_relu");
    }

    #[test]
    fn test_missing_key() {
        let caps = HardwareCapabilities::portable();
        let err = table()
            .select(KernelKey::new("relu", DType::F32, DataLayout::Nchw), &caps)
            .unwrap_err();
        assert!(matches!(err, OperatorError::NoKernel { layout: DataLayout::Nchw, .. }));
    }

    #[test]
    fn test_unsatisfiable_requirement() {
        let mut t = DispatchTable::new();
        t.register_all_layouts("add", DType::F16, "fp16_add", IsaRequirement::Fp16, ());
        assert_eq!(t.num_keys(), 2);

        let key = KernelKey::new("add", DType::F16, DataLayout::Nchw);
        assert!(t.select(key, &HardwareCapabilities::portable()).is_err());
        assert!(t.select(key, &HardwareCapabilities::portable().with_fp16()).is_ok());
    }
}
