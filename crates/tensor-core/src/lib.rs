// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor metadata, shared tensor handles and the slot-keyed [`TensorPack`]
//! through which every operator receives its arguments.
//!
//! This crate provides:
//! - [`TensorInfo`] — shape, element type, quantization and sketch id.
//! - [`Tensor`] — a shareable handle whose backing memory is a
//!   [`memory_manager::Region`]. Several tensors may alias the same bytes.
//! - [`SlotId`] — the integer namespace binding tensors to operator roles.
//! - [`TensorPack`] — the per-call `slot → tensor` map, with const and
//!   mutable registrations kept apart.
//! - [`ops`] — portable reference kernels over plain slices.
//!
//! # Example
//! ```
//! use tensor_core::{DType, Shape, SlotId, Tensor, TensorInfo, TensorPack};
//!
//! let src = Tensor::shared(TensorInfo::new(Shape::matrix(2, 2), DType::F32));
//! src.allocate().unwrap();
//! src.fill_f32(1.5).unwrap();
//!
//! let mut pack = TensorPack::new();
//! pack.add_const_tensor(SlotId::SRC_0, src.clone());
//!
//! assert!(pack.get_tensor(SlotId::SRC_0).is_none());
//! let view = pack.get_const_tensor(SlotId::SRC_0).unwrap();
//! assert_eq!(view.read_f32().unwrap(), vec![1.5; 4]);
//! ```

mod dtype;
mod error;
mod info;
pub mod ops;
mod pack;
mod quantization;
mod shape;
mod slot;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use info::{TensorId, TensorInfo};
pub use pack::{PackElement, PackEntry, TensorPack};
pub use quantization::QuantizationInfo;
pub use shape::Shape;
pub use slot::SlotId;
pub use tensor::{Tensor, TensorHandle};
