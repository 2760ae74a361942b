//! Compression and random-access benchmarks.
//!
//! Measures full compression, full decompression and small-region
//! decompression on smooth and noisy volumes, serial and parallel.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use szra_codecs::ZstdCodec;
use szra_core::{BackendKind, Reader, SzConfig, Writer};

/// Smooth field with a little LCG noise on top.
fn generate_volume(n: usize, noise: f32) -> Vec<f32> {
    let mut rng = 0x9E37_79B9_7F4A_7C15u64;
    let mut data = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                rng = rng
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let r = (rng >> 40) as f32 / (1u64 << 24) as f32;
                let (x, y, z) = (i as f32, j as f32, k as f32);
                data.push((x * 0.05).sin() * (y * 0.07).cos() + 0.01 * z + noise * r);
            }
        }
    }
    data
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    group.sample_size(10);

    for n in [32usize, 96] {
        group.throughput(Throughput::Bytes((n * n * n * 4) as u64));
        for (label, noise) in [("smooth", 0.0f32), ("noisy", 0.5)] {
            let data = generate_volume(n, noise);
            for (backend_label, backend) in [
                ("serial", BackendKind::Serial),
                ("parallel", BackendKind::Parallel { threads: 0 }),
            ] {
                let writer = Writer::new(SzConfig { backend, ..SzConfig::default() }).unwrap();
                group.bench_with_input(
                    BenchmarkId::new(format!("{label}_{backend_label}"), n),
                    &data,
                    |b, data| b.iter(|| writer.compress(black_box(data), [n, n, n], 1e-3).unwrap()),
                );
            }
        }
    }

    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");
    group.sample_size(10);

    let n = 96;
    let data = generate_volume(n, 0.05);
    let bytes = Writer::new(SzConfig::default())
        .unwrap()
        .with_codec(Arc::new(ZstdCodec::default()))
        .compress(&data, [n, n, n], 1e-3)
        .unwrap();

    group.throughput(Throughput::Bytes((n * n * n * 4) as u64));
    group.bench_function("full_96", |b| {
        b.iter(|| {
            Reader::open(black_box(&bytes), Some(Arc::new(ZstdCodec::default())))
                .unwrap()
                .decompress(&[n, n, n])
                .unwrap()
        })
    });

    // The container is opened once; only block reconstruction is timed.
    for edge in [4usize, 16, 48] {
        let mut reader = Reader::open(&bytes, Some(Arc::new(ZstdCodec::default()))).unwrap();
        reader.decompress_region(&[n, n, n], &[0, 0, 0], &[1, 1, 1]).unwrap();
        let start = [30, 41, 17];
        let end = [30 + edge, 41 + edge, 17 + edge];
        group.throughput(Throughput::Bytes((edge * edge * edge * 4) as u64));
        group.bench_with_input(BenchmarkId::new("region", edge), &edge, |b, _| {
            b.iter(|| reader.decompress_region(&[n, n, n], black_box(&start), &end).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress);
criterion_main!(benches);
