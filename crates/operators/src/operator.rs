// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The uniform operator contract.
//!
//! Concrete operators add an inherent `configure(...)` and an associated,
//! side-effect-free `validate(...)` that performs the same checks. After
//! configuration every operator is driven through this trait only:
//!
//! ```text
//! configure → workspace() → manage_workspace → prepare(pack) → run(pack)*
//! ```

use tensor_core::{SlotId, TensorHandle, TensorPack};

use crate::memory::{MemoryLifetime, MemoryRequirements};
use crate::OperatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Unconfigured,
    Configured,
    Prepared,
}

pub trait Operator: Send {
    /// A short, stable name used in logs and errors.
    fn name(&self) -> &'static str;

    fn state(&self) -> OperatorState;

    /// Executes the configured kernels against the tensors in `pack`.
    fn run(&mut self, pack: &TensorPack) -> Result<(), OperatorError>;

    /// One-off transforms. Calling it again after it succeeded is a no-op.
    fn prepare(&mut self, _pack: &TensorPack) -> Result<(), OperatorError> {
        Ok(())
    }

    /// The auxiliary memory this operator needs, in operator-local order.
    fn workspace(&self) -> MemoryRequirements;

    /// Whether `prepare` must run before the first `run`.
    fn requires_prepare(&self) -> bool {
        self.workspace()
            .iter()
            .any(|m| m.lifetime != MemoryLifetime::Temporary)
    }
}

/// Checks that an operator may run in its current state.
pub(crate) fn ensure_runnable(
    name: &'static str,
    state: OperatorState,
    requires_prepare: bool,
) -> Result<(), OperatorError> {
    match state {
        OperatorState::Unconfigured => Err(OperatorError::NotConfigured(name)),
        OperatorState::Configured if requires_prepare => Err(OperatorError::NotPrepared(name)),
        _ => Ok(()),
    }
}

/// The tensor bound to `slot`, const or mutable.
///
/// # Panics
/// Panics if nothing is bound to `slot`.
pub fn require_src<'p>(pack: &'p TensorPack, slot: SlotId, op: &str) -> &'p TensorHandle {
    pack.get_const_tensor(slot)
        .unwrap_or_else(|| panic!("{op}: no tensor bound to {slot}"))
}

/// The tensor registered as mutable at `slot`.
///
/// # Panics
/// Panics if `slot` is absent or only holds a const registration.
pub fn require_dst<'p>(pack: &'p TensorPack, slot: SlotId, op: &str) -> &'p TensorHandle {
    pack.get_tensor(slot)
        .unwrap_or_else(|| panic!("{op}: no writable tensor bound to {slot}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryInfo;
    use tensor_core::{DType, Tensor, TensorInfo};

    struct Probe(MemoryRequirements);

    impl Operator for Probe {
        fn name(&self) -> &'static str {
            "Probe"
        }
        fn state(&self) -> OperatorState {
            OperatorState::Configured
        }
        fn run(&mut self, _pack: &TensorPack) -> Result<(), OperatorError> {
            Ok(())
        }
        fn workspace(&self) -> MemoryRequirements {
            self.0.clone()
        }
    }

    #[test]
    fn test_requires_prepare_follows_lifetimes() {
        let tmp = MemoryInfo::new(SlotId::INT_0, MemoryLifetime::Temporary, 8);
        let keep = MemoryInfo::new(SlotId::INT_1, MemoryLifetime::Persistent, 8);
        assert!(!Probe(vec![]).requires_prepare());
        assert!(!Probe(vec![tmp]).requires_prepare());
        assert!(Probe(vec![tmp, keep]).requires_prepare());
    }

    #[test]
    fn test_ensure_runnable() {
        assert!(matches!(
            ensure_runnable("x", OperatorState::Unconfigured, false),
            Err(OperatorError::NotConfigured("x"))
        ));
        assert!(matches!(
            ensure_runnable("x", OperatorState::Configured, true),
            Err(OperatorError::NotPrepared("x"))
        ));
        assert!(ensure_runnable("x", OperatorState::Configured, false).is_ok());
        assert!(ensure_runnable("x", OperatorState::Prepared, true).is_ok());
    }

    #[test]
    fn test_require_helpers() {
        let t = Tensor::shared(TensorInfo::new([1], DType::F32));
        let mut pack = TensorPack::new();
        pack.add_const_tensor(SlotId::SRC_0, t.clone());
        pack.add_tensor(SlotId::DST_0, t);
        require_src(&pack, SlotId::SRC_0, "test");
        require_src(&pack, SlotId::DST_0, "test");
        require_dst(&pack, SlotId::DST_0, "test");
    }

    #[test]
    #[should_panic(expected = "no writable tensor bound to SRC_0")]
    fn test_require_dst_rejects_const() {
        let mut pack = TensorPack::new();
        pack.add_const_tensor(SlotId::SRC_0, Tensor::shared(TensorInfo::new([1], DType::F32)));
        require_dst(&pack, SlotId::SRC_0, "test");
    }
}
