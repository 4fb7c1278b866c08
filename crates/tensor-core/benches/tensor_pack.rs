// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for tensor-pack construction and lookup.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tensor_core::{DType, SlotId, Tensor, TensorInfo, TensorPack};

fn bench_pack_build(c: &mut Criterion) {
    let tensors: Vec<_> = (0..8)
        .map(|_| Tensor::shared(TensorInfo::new([16, 16], DType::F32)))
        .collect();

    c.bench_function("pack_build_8", |b| {
        b.iter(|| {
            let mut pack = TensorPack::new();
            for (i, t) in tensors.iter().enumerate() {
                if i % 2 == 0 {
                    pack.add_const_tensor(SlotId::offset_src_vec(i as i32), t.clone());
                } else {
                    pack.add_tensor(SlotId::offset_dst_vec(i as i32), t.clone());
                }
            }
            black_box(pack)
        })
    });
}

fn bench_pack_lookup(c: &mut Criterion) {
    let mut pack = TensorPack::new();
    for i in 0..32 {
        pack.add_tensor(
            SlotId::offset_int_vec(i),
            Tensor::shared(TensorInfo::flat_bytes(64)),
        );
    }

    c.bench_function("pack_lookup_32", |b| {
        b.iter(|| {
            let mut hits = 0;
            for i in 0..32 {
                if pack.get_const_tensor(SlotId::offset_int_vec(black_box(i))).is_some() {
                    hits += 1;
                }
            }
            hits
        })
    });
}

criterion_group!(benches, bench_pack_build, bench_pack_lookup);
criterion_main!(benches);
