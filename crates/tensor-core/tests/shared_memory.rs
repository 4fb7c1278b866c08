// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensors in different packs sharing memory-group arenas.

use memory_manager::{MemoryBudget, MemoryGroup, MemoryPool};
use std::sync::Arc;
use tensor_core::{DType, SlotId, Tensor, TensorInfo, TensorPack};

#[test]
fn test_packs_see_writes_through_shared_handles() {
    let pool = MemoryPool::new(MemoryBudget::from_mb(1));
    let t = Tensor::shared(TensorInfo::new([2, 2], DType::F32));
    t.allocate_in(&pool).unwrap();

    let mut producer = TensorPack::new();
    producer.add_tensor(SlotId::DST_0, t.clone());
    let mut consumer = TensorPack::new();
    consumer.add_const_tensor(SlotId::SRC_0, t.clone());

    producer
        .get_tensor(SlotId::DST_0)
        .unwrap()
        .write_f32(&[1.0, 2.0, 3.0, 4.0])
        .unwrap();
    let seen = consumer.get_const_tensor(SlotId::SRC_0).unwrap().read_f32().unwrap();
    assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0]);

    drop(producer);
    drop(consumer);
    assert_eq!(Arc::strong_count(&t), 1);
    assert_eq!(pool.allocated_bytes(), 16);
}

#[test]
fn test_segment_aliasing_between_operators() {
    let pool = MemoryPool::new(MemoryBudget::from_mb(1));
    let mut group = MemoryGroup::new(&pool);

    let first = Tensor::shared(TensorInfo::new([8], DType::F32));
    first.bind_region(group.manage(first.info().total_size(), 64).unwrap());
    group.begin_segment();
    let second = Tensor::shared(TensorInfo::new([4], DType::S32));
    second.bind_region(group.manage(second.info().total_size(), 64).unwrap());

    assert!(first.shares_memory_with(&second));
    assert_eq!(group.arena_bytes(), 32);

    let _scope = group.scope().unwrap();
    second.write_elements(&[0i32; 4]).unwrap();
    first.fill_f32(1.0).unwrap();
    let ints = second.read_elements::<i32>().unwrap();
    assert_eq!(ints[0], 1.0f32.to_bits() as i32);
    assert_eq!(pool.allocated_bytes(), 32);
}
