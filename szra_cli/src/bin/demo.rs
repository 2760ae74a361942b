//! SZRA demo
//!
//! Synthesises smooth, noisy and constant 3D fields, compresses each across
//! a sweep of error bounds, verifies every reconstructed sample against the
//! bound, and contrasts full decompression with a small region read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use szra_codecs::GzipCodec;
use szra_core::{BackendKind, LosslessCodec, Reader, SzConfig, Writer};

// ── constants ──────────────────────────────────────────────────────────────

const N: usize = 96;
const PRECISIONS: &[f64] = &[1e-2, 1e-3, 1e-4, 1e-5];
const REGION_EDGE: usize = 8;

// ── data generators ─────────────────────────────────────────────────────────

/// Smooth, slowly varying field (think temperature or pressure).
fn smooth_field(n: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let (x, y, z) = (i as f32 / n as f32, j as f32 / n as f32, k as f32 / n as f32);
                out.push(
                    280.0 + 15.0 * (x * 6.3).sin() * (y * 3.1).cos() + 4.0 * z * z
                        - 2.0 * ((x + z) * 9.0).cos(),
                );
            }
        }
    }
    out
}

/// The smooth field plus uniform LCG noise of amplitude 0.5.
fn noisy_field(n: usize) -> Vec<f32> {
    let mut rng = 0x5EED_u64;
    smooth_field(n)
        .into_iter()
        .map(|v| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            v + ((rng >> 40) as f32 / (1u64 << 24) as f32 - 0.5)
        })
        .collect()
}

fn constant_field(n: usize) -> Vec<f32> {
    vec![1013.25; n * n * n]
}

// ── formatting ──────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const U: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut u = 0;
    while v >= 1024.0 && u < U.len() - 1 { v /= 1024.0; u += 1; }
    if u == 0 { format!("{n} B") } else { format!("{v:.2} {}", U[u]) }
}

fn fmt_duration(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1.0 {
        format!("{:.1} µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{ms:.1} ms")
    } else {
        format!("{:.2} s", d.as_secs_f64())
    }
}

fn mb_per_s(bytes: usize, d: Duration) -> f64 {
    bytes as f64 / (1024.0 * 1024.0) / d.as_secs_f64().max(1e-9)
}

// ── one sweep row ───────────────────────────────────────────────────────────

struct Row {
    stored: usize,
    max_err: f64,
    compress: Duration,
    full: Duration,
    region: Duration,
}

fn measure(writer: &Writer, data: &[f32], precision: f64) -> Result<Row> {
    let dims = [N, N, N];
    let t0 = Instant::now();
    let bytes = writer.compress(data, dims, precision)?;
    let compress = t0.elapsed();

    let codec: Arc<dyn LosslessCodec> = Arc::new(GzipCodec::default());
    let t0 = Instant::now();
    let decoded = Reader::open(&bytes, Some(codec.clone()))?.decompress(&dims)?;
    let full = t0.elapsed();

    let max_err = data
        .iter()
        .zip(&decoded)
        .map(|(&o, &d)| (o as f64 - d as f64).abs())
        .fold(0.0, f64::max);
    if max_err > precision {
        anyhow::bail!("error bound violated: {max_err:e} > {precision:e}");
    }

    // Region read includes opening the container, as a cold reader would.
    let start = [N * 4 / 5, N / 3, N / 2];
    let end = [start[0] + REGION_EDGE, start[1] + REGION_EDGE, start[2] + REGION_EDGE];
    let t0 = Instant::now();
    let sub = Reader::open(&bytes, Some(codec))?.decompress_region(&dims, &start, &end)?;
    let region = t0.elapsed();
    debug_assert_eq!(sub.len(), REGION_EDGE.pow(3));

    Ok(Row { stored: bytes.len(), max_err, compress, full, region })
}

fn run() -> Result<()> {
    let raw_bytes = N * N * N * 4;
    let writer = Writer::new(SzConfig {
        backend: BackendKind::Parallel { threads: 0 },
        ..SzConfig::default()
    })?
    .with_codec(Arc::new(GzipCodec::default()));

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║     SZRA · error-bounded volumes with random access  ·  Demo     ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("  volume   : {N} x {N} x {N} f32 ({})", human_bytes(raw_bytes as u64));
    println!("  backend  : {}", writer.backend_name());
    println!("  region   : {REGION_EDGE}^3 cells");
    println!();

    let fields: [(&str, Vec<f32>); 3] = [
        ("smooth", smooth_field(N)),
        ("noisy", noisy_field(N)),
        ("constant", constant_field(N)),
    ];

    for (name, data) in &fields {
        println!("  ── {name} field ──");
        println!(
            "  {:>9}  {:>11}  {:>8}  {:>10}  {:>11}  {:>11}  {:>10}  {:>10}",
            "precision", "stored", "ratio", "max err", "compress", "decompress", "full", "region"
        );
        println!("  {}", "─".repeat(94));
        for &precision in PRECISIONS {
            let row = measure(&writer, data, precision)?;
            println!(
                "  {:>9.0e}  {:>11}  {:>7.1}x  {:>10.2e}  {:>6.1} MB/s  {:>6.1} MB/s  {:>10}  {:>10}",
                precision,
                human_bytes(row.stored as u64),
                raw_bytes as f64 / row.stored as f64,
                row.max_err,
                mb_per_s(raw_bytes, row.compress),
                mb_per_s(raw_bytes, row.full),
                fmt_duration(row.full),
                fmt_duration(row.region),
            );
        }
        println!();
    }

    println!("  Every sample of every run was checked against its error bound.");
    println!();
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
