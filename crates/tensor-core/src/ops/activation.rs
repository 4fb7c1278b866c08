// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fused activation functions.

/// Activations that can be fused into an operator's output.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    #[default]
    Identity,
    /// `max(0, x)`
    Relu,
    /// `min(a, max(0, x))`
    BoundedRelu,
    /// `min(a, max(b, x))`
    LuBoundedRelu,
}

/// An activation and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ActivationInfo {
    pub function: ActivationFunction,
    pub a: f32,
    pub b: f32,
}

impl ActivationInfo {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn relu() -> Self {
        Self {
            function: ActivationFunction::Relu,
            ..Self::default()
        }
    }

    pub fn bounded_relu(a: f32) -> Self {
        Self {
            function: ActivationFunction::BoundedRelu,
            a,
            b: 0.0,
        }
    }

    pub fn lu_bounded_relu(a: f32, b: f32) -> Self {
        Self {
            function: ActivationFunction::LuBoundedRelu,
            a,
            b,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.function == ActivationFunction::Identity
    }

    /// The `[lo, hi]` range the activation clamps to.
    pub fn bounds(&self) -> (f32, f32) {
        match self.function {
            ActivationFunction::Identity => (f32::NEG_INFINITY, f32::INFINITY),
            ActivationFunction::Relu => (0.0, f32::INFINITY),
            ActivationFunction::BoundedRelu => (0.0, self.a),
            ActivationFunction::LuBoundedRelu => (self.b, self.a),
        }
    }

    #[inline]
    pub fn apply(&self, x: f32) -> f32 {
        let (lo, hi) = self.bounds();
        x.max(lo).min(hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply() {
        assert_eq!(ActivationInfo::identity().apply(-3.0), -3.0);
        assert_eq!(ActivationInfo::relu().apply(-3.0), 0.0);
        assert_eq!(ActivationInfo::relu().apply(3.0), 3.0);
        assert_eq!(ActivationInfo::bounded_relu(6.0).apply(7.5), 6.0);
        assert_eq!(ActivationInfo::bounded_relu(6.0).apply(-1.0), 0.0);
        let lu = ActivationInfo::lu_bounded_relu(1.0, -1.0);
        assert_eq!(lu.apply(-2.0), -1.0);
        assert_eq!(lu.apply(0.5), 0.5);
        assert_eq!(lu.apply(2.0), 1.0);
    }
}
