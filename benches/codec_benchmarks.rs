// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use signal_transport_engine::codec::{pad, unpad};

fn bench_pad(c: &mut Criterion) {
    let mut group = c.benchmark_group("pad");
    for len in [0usize, 32, 160, 1024, 8192] {
        let plaintext = vec![0x42u8; len];
        group.bench_with_input(BenchmarkId::from_parameter(len), &plaintext, |b, plaintext| {
            b.iter(|| pad(black_box(plaintext)));
        });
    }
    group.finish();
}

fn bench_unpad(c: &mut Criterion) {
    let mut group = c.benchmark_group("unpad");
    for len in [0usize, 32, 160, 1024, 8192] {
        let padded = pad(&vec![0x42u8; len]);
        group.bench_with_input(BenchmarkId::from_parameter(len), &padded, |b, padded| {
            b.iter(|| unpad(black_box(padded)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pad, bench_unpad);
criterion_main!(benches);
