// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for workspace materialisation and aux-tensor resolution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use memory_manager::{MemoryGroup, MemoryPool};
use operators::{
    manage_workspace, AuxTensorHandler, HandlerFlags, MemoryInfo, MemoryLifetime,
};
use tensor_core::{DType, SlotId, Tensor, TensorInfo, TensorPack};

fn requirements() -> Vec<MemoryInfo> {
    (0..8)
        .map(|i| {
            let lifetime = match i % 3 {
                0 => MemoryLifetime::Temporary,
                1 => MemoryLifetime::Persistent,
                _ => MemoryLifetime::Prepare,
            };
            MemoryInfo::new(SlotId::offset_int_vec(i), lifetime, 4096 * (i as usize + 1))
        })
        .collect()
}

fn bench_manage_workspace(c: &mut Criterion) {
    let pool = MemoryPool::unbounded();
    let reqs = requirements();

    c.bench_function("manage_workspace_8", |b| {
        b.iter(|| {
            let mut group = MemoryGroup::new(&pool);
            let mut run_pack = TensorPack::new();
            let mut prepare_pack = TensorPack::new();
            let ws = manage_workspace(&reqs, &mut group, &mut run_pack, &mut prepare_pack, true).unwrap();
            black_box((ws, group.arena_bytes()))
        })
    });
}

fn bench_aux_import(c: &mut Criterion) {
    let backing = Tensor::shared(TensorInfo::flat_bytes(1 << 16));
    backing.allocate().unwrap();
    let mut pack = TensorPack::new();
    pack.add_tensor(SlotId::INT_0, backing);
    let info = TensorInfo::new([1024], DType::F32);

    c.bench_function("aux_handler_import", |b| {
        b.iter(|| {
            let h = AuxTensorHandler::new(SlotId::INT_0, &info, &pack, HandlerFlags::default()).unwrap();
            black_box(h.action())
        })
    });
}

criterion_group!(benches, bench_manage_workspace, bench_aux_import);
criterion_main!(benches);
