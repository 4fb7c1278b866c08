// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shared tensor handles.
//!
//! A [`Tensor`] pairs a [`TensorInfo`] with an optional [`Region`]. Both
//! live behind locks so that a tensor can be referenced from several packs
//! at once (through [`TensorHandle`]) and still be re-initialised,
//! allocated or aliased in place.
//!
//! # Memory states
//! - *unassigned*: no region. Reads fail with [`TensorError::NotAllocated`].
//! - *assigned*: a region is bound. If it belongs to a memory group the
//!   bytes only exist while the group is acquired.

use crate::{DType, TensorError, TensorInfo};
use bytemuck::Pod;
use half::f16;
use memory_manager::{MemoryPool, Region};
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Shared ownership of a tensor.
pub type TensorHandle = Arc<Tensor>;

pub struct Tensor {
    info: RwLock<TensorInfo>,
    memory: RwLock<Option<Region>>,
}

impl Tensor {
    /// Creates an unallocated tensor.
    pub fn new(info: TensorInfo) -> Self {
        Self {
            info: RwLock::new(info),
            memory: RwLock::new(None),
        }
    }

    /// Creates an unallocated tensor behind a [`TensorHandle`].
    pub fn shared(info: TensorInfo) -> TensorHandle {
        Arc::new(Self::new(info))
    }

    /// Creates an allocated F32 tensor holding `values`.
    ///
    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.read_f32().unwrap(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: crate::Shape, values: &[f32]) -> Result<TensorHandle, TensorError> {
        let tensor = Self::shared(TensorInfo::new(shape, DType::F32));
        tensor.allocate()?;
        tensor.write_elements(values)?;
        Ok(tensor)
    }

    pub fn info(&self) -> TensorInfo {
        match self.info.read() {
            Ok(info) => info.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the metadata without touching the memory binding.
    pub fn soft_init(&self, info: TensorInfo) {
        match self.info.write() {
            Ok(mut slot) => *slot = info,
            Err(poisoned) => *poisoned.into_inner() = info,
        }
    }

    /// Allocates from an unbounded pool. See [`Tensor::allocate_in`].
    pub fn allocate(&self) -> Result<(), TensorError> {
        self.allocate_in(&MemoryPool::unbounded())
    }

    /// Binds a fresh buffer of `total_size()` bytes from `pool`.
    ///
    /// A zero-sized tensor stays unassigned.
    pub fn allocate_in(&self, pool: &MemoryPool) -> Result<(), TensorError> {
        let size = self.info().total_size();
        if size == 0 {
            return Ok(());
        }
        let region = Region::allocate(pool, size)?;
        trace!(size, "tensor allocated");
        self.bind_region(region);
        Ok(())
    }

    /// Binds an existing region, replacing any previous one.
    pub fn bind_region(&self, region: Region) {
        match self.memory.write() {
            Ok(mut slot) => *slot = Some(region),
            Err(poisoned) => *poisoned.into_inner() = Some(region),
        }
    }

    /// Aliases `other`'s memory without copying.
    ///
    /// # Panics
    /// Panics if `other` has no memory assigned.
    pub fn import_memory(&self, other: &Tensor) {
        let region = other
            .region()
            .unwrap_or_else(|| panic!("import_memory from unallocated tensor {}", other.info()));
        self.bind_region(region);
    }

    /// Drops this tensor's reference to its memory.
    pub fn free(&self) {
        match self.memory.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// The bound region, if any.
    pub fn region(&self) -> Option<Region> {
        match self.memory.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns `true` once memory has been assigned.
    pub fn is_allocated(&self) -> bool {
        self.region().is_some()
    }

    /// Returns `true` if the assigned memory currently holds bytes.
    pub fn is_backed(&self) -> bool {
        self.region().is_some_and(|r| r.is_backed())
    }

    /// Returns `true` if both tensors read and write the same bytes.
    pub fn shares_memory_with(&self, other: &Tensor) -> bool {
        match (self.region(), other.region()) {
            (Some(a), Some(b)) => a.aliases(&b),
            _ => false,
        }
    }

    /// Copies out the `total_size()` bytes of this tensor.
    pub fn read_bytes(&self) -> Result<Vec<u8>, TensorError> {
        let (region, size) = self.checked_region()?;
        Ok(region.read(|bytes| bytes[..size].to_vec())?)
    }

    pub fn write_bytes(&self, data: &[u8]) -> Result<(), TensorError> {
        let (region, size) = self.checked_region()?;
        if data.len() != size {
            return Err(TensorError::BufferSizeMismatch {
                expected: size,
                actual: data.len(),
            });
        }
        region.write(|bytes| bytes[..size].copy_from_slice(data))?;
        Ok(())
    }

    /// Reads the buffer as elements of `T`, which must match the element
    /// size of the tensor's dtype.
    pub fn read_elements<T: Pod>(&self) -> Result<Vec<T>, TensorError> {
        self.check_element_size::<T>("read_elements")?;
        let (region, size) = self.checked_region()?;
        Ok(region.read(|bytes| {
            bytes[..size]
                .chunks_exact(std::mem::size_of::<T>())
                .map(bytemuck::pod_read_unaligned)
                .collect()
        })?)
    }

    pub fn write_elements<T: Pod>(&self, values: &[T]) -> Result<(), TensorError> {
        self.check_element_size::<T>("write_elements")?;
        let expected = self.info().num_elements();
        if values.len() != expected {
            return Err(TensorError::ElementCountMismatch {
                expected,
                actual: values.len(),
            });
        }
        self.write_bytes(bytemuck::cast_slice(values))
    }

    /// Reads an F32 tensor.
    pub fn read_f32(&self) -> Result<Vec<f32>, TensorError> {
        self.expect_dtype(DType::F32, "read_f32")?;
        self.read_elements()
    }

    pub fn write_f32(&self, values: &[f32]) -> Result<(), TensorError> {
        self.expect_dtype(DType::F32, "write_f32")?;
        self.write_elements(values)
    }

    pub fn fill_f32(&self, value: f32) -> Result<(), TensorError> {
        let n = self.info().num_elements();
        self.write_f32(&vec![value; n])
    }

    /// Reads any dtype as `f32`, dequantizing quantized types.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        let info = self.info();
        let q = info.quantization();
        Ok(match info.dtype() {
            DType::F32 => self.read_elements::<f32>()?,
            DType::F16 => self
                .read_elements::<u16>()?
                .into_iter()
                .map(|bits| f16::from_bits(bits).to_f32())
                .collect(),
            DType::S32 => self
                .read_elements::<i32>()?
                .into_iter()
                .map(|v| v as f32)
                .collect(),
            DType::U8 => self
                .read_elements::<u8>()?
                .into_iter()
                .map(f32::from)
                .collect(),
            DType::QAsymm8 => self
                .read_elements::<u8>()?
                .into_iter()
                .map(|v| q.dequantize_u8(v))
                .collect(),
            DType::QAsymm8Signed => self
                .read_elements::<i8>()?
                .into_iter()
                .map(|v| q.dequantize_i8(v))
                .collect(),
        })
    }

    /// Writes `f32` values converted to the tensor's dtype. Integer and
    /// quantized targets round to nearest and saturate.
    pub fn write_from_f32(&self, values: &[f32]) -> Result<(), TensorError> {
        let info = self.info();
        let q = info.quantization();
        match info.dtype() {
            DType::F32 => self.write_elements(values),
            DType::F16 => {
                let bits: Vec<u16> = values.iter().map(|&v| f16::from_f32(v).to_bits()).collect();
                self.write_elements(&bits)
            }
            DType::S32 => {
                let ints: Vec<i32> = values.iter().map(|&v| v.round() as i32).collect();
                self.write_elements(&ints)
            }
            DType::U8 => {
                let bytes: Vec<u8> = values.iter().map(|&v| v.round() as u8).collect();
                self.write_elements(&bytes)
            }
            DType::QAsymm8 => {
                let bytes: Vec<u8> = values.iter().map(|&v| q.quantize_u8(v)).collect();
                self.write_elements(&bytes)
            }
            DType::QAsymm8Signed => {
                let bytes: Vec<i8> = values.iter().map(|&v| q.quantize_i8(v)).collect();
                self.write_elements(&bytes)
            }
        }
    }

    fn checked_region(&self) -> Result<(Region, usize), TensorError> {
        let info = self.info();
        let region = self
            .region()
            .ok_or_else(|| TensorError::NotAllocated(info.to_string()))?;
        let size = info.total_size();
        if region.len() < size {
            return Err(TensorError::BufferSizeMismatch {
                expected: size,
                actual: region.len(),
            });
        }
        Ok((region, size))
    }

    fn check_element_size<T>(&self, op: &'static str) -> Result<(), TensorError> {
        let dtype = self.info().dtype();
        if dtype.size_bytes() != std::mem::size_of::<T>() {
            return Err(TensorError::UnsupportedDType { op, dtype });
        }
        Ok(())
    }

    fn expect_dtype(&self, expected: DType, op: &'static str) -> Result<(), TensorError> {
        let dtype = self.info().dtype();
        if dtype != expected {
            return Err(TensorError::UnsupportedDType { op, dtype });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("info", &self.info())
            .field("allocated", &self.is_allocated())
            .finish()
    }
}
