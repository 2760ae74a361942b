//! Property tests: the error bound and region consistency over arbitrary
//! shapes, precisions and data.

use proptest::prelude::*;
use szra_core::{compress, Reader, SzConfig, Writer};

fn field(dims: [usize; 3], seed: u64, noise: f32) -> Vec<f32> {
    let mut rng = seed | 1;
    let mut out = Vec::with_capacity(dims.iter().product());
    for i in 0..dims[0] {
        for j in 0..dims[1] {
            for k in 0..dims[2] {
                rng = rng
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let n = (rng >> 40) as f32 / (1u64 << 24) as f32 - 0.5;
                let (x, y, z) = (i as f32, j as f32, k as f32);
                out.push((x * 0.3 + y * 0.17).sin() * 4.0 + z * 0.25 + noise * n);
            }
        }
    }
    out
}

fn shape() -> impl Strategy<Value = [usize; 3]> {
    (1usize..=15, 1usize..=15, 1usize..=15).prop_map(|(a, b, c)| [a, b, c])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_sample_within_precision(
        dims in shape(),
        exponent in 1i32..=6,
        seed in any::<u64>(),
        noise in prop_oneof![Just(0.0f32), Just(0.01), Just(1.0), Just(50.0)],
    ) {
        let precision = 10f64.powi(-exponent);
        let data = field(dims, seed, noise);
        let bytes = compress(&data, dims[0], dims[1], dims[2], precision).unwrap();
        let decoded = Reader::open(&bytes, None).unwrap().decompress(&dims).unwrap();
        prop_assert_eq!(decoded.len(), data.len());
        for (o, d) in data.iter().zip(&decoded) {
            prop_assert!((*o as f64 - *d as f64).abs() <= precision, "{} vs {}", o, d);
        }
    }

    #[test]
    fn region_equals_slice_of_full(
        dims in shape(),
        corner in (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0),
        extent in (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0),
        block_size in 2usize..=8,
        seed in any::<u64>(),
    ) {
        let data = field(dims, seed, 0.5);
        let cfg = SzConfig { block_size, ..SzConfig::default() };
        let bytes = Writer::new(cfg).unwrap().compress(&data, dims, 1e-3).unwrap();

        let pick = |axis: usize, c: f64, e: f64| {
            let s = ((dims[axis] as f64 * c) as usize).min(dims[axis] - 1);
            let len = 1 + ((dims[axis] - s) as f64 * e) as usize;
            (s, (s + len).min(dims[axis]))
        };
        let (x0, x1) = pick(0, corner.0, extent.0);
        let (y0, y1) = pick(1, corner.1, extent.1);
        let (z0, z1) = pick(2, corner.2, extent.2);

        let mut reader = Reader::open(&bytes, None).unwrap();
        let full = reader.decompress(&dims).unwrap();
        let sub = reader.decompress_region(&dims, &[x0, y0, z0], &[x1, y1, z1]).unwrap();

        let mut expected = Vec::with_capacity(sub.len());
        for x in x0..x1 {
            for y in y0..y1 {
                for z in z0..z1 {
                    expected.push(full[(x * dims[1] + y) * dims[2] + z]);
                }
            }
        }
        prop_assert_eq!(sub, expected);
    }
}
