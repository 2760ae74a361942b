//! Sampling pass that sizes the quantization alphabet and detects a dense
//! value worth snapping to.

use std::collections::BTreeMap;

use crate::geometry::Geometry;
use crate::predictor::lorenzo;

/// Smallest interval count the optimiser will choose.
pub const MIN_INTERVALS: u32 = 32;

/// Result of [`estimate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalEstimate {
    pub intervals: u32,
    /// Dense-value mean, present when the mean shortcut pays off.
    pub mean: Option<f32>,
    pub samples: usize,
    /// Fraction of samples inside the most populated `2·p` bucket.
    pub mean_flush_freq: f64,
    /// Fraction of samples Lorenzo predicts within precision.
    pub correct_freq: f64,
}

impl IntervalEstimate {
    /// No sampling: the full alphabet and no mean.
    pub fn fixed(intervals: u32) -> Self {
        Self {
            intervals,
            mean: None,
            samples: 0,
            mean_flush_freq: 0.0,
            correct_freq: 0.0,
        }
    }
}

/// Sample every `sample_distance`-th interior cell (by `i + j + k`), predict
/// it with Lorenzo from its original neighbours, and pick the interval count
/// covering more than `threshold` of the residuals.
pub fn estimate(
    data: &[f32],
    geometry: &Geometry,
    precision: f64,
    max_intervals: u32,
    threshold: f64,
    sample_distance: usize,
) -> IntervalEstimate {
    let [r1, r2, r3] = geometry.dims();
    let (dim0, dim1) = (geometry.dim0_offset, geometry.dim1_offset);
    let max_radius = (max_intervals / 2) as usize;

    let strided_mean = {
        let (sum, n) = data
            .iter()
            .step_by(sample_distance)
            .filter(|v| v.is_finite())
            .fold((0.0f64, 0usize), |(s, n), &v| (s + v as f64, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    };

    let bucket_width = 2.0 * precision;
    let mut radius_hist = vec![0u64; max_radius];
    let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
    let mut samples = 0usize;
    let mut correct = 0usize;

    for i in 1..r1 {
        for j in 1..r2 {
            for k in 1..r3 {
                if (i + j + k) % sample_distance != 0 {
                    continue;
                }
                let pos = i * dim0 + j * dim1 + k;
                let cur = data[pos];
                let err = (lorenzo(data, pos, dim0, dim1) as f64 - cur as f64).abs();
                samples += 1;
                if err < precision {
                    correct += 1;
                }
                let radius = if err.is_finite() {
                    (((err / precision + 1.0) / 2.0) as usize).min(max_radius - 1)
                } else {
                    max_radius - 1
                };
                radius_hist[radius] += 1;

                let offset = (cur as f64 - strided_mean) / bucket_width;
                if offset.is_finite() && offset.abs() < i64::MAX as f64 / 2.0 {
                    *buckets.entry(offset.round() as i64).or_insert(0) += 1;
                }
            }
        }
    }

    if samples == 0 {
        return IntervalEstimate::fixed(max_intervals);
    }

    let target = threshold * samples as f64;
    let mut covered = 0u64;
    let mut radius = max_radius - 1;
    for (r, &count) in radius_hist.iter().enumerate() {
        covered += count;
        if covered as f64 > target {
            radius = r;
            break;
        }
    }
    let intervals = (2 * (radius as u32 + 1))
        .next_power_of_two()
        .clamp(MIN_INTERVALS, max_intervals);

    // Highest bucket count; ties keep the lowest bucket.
    let (dense_bucket, dense_count) = buckets
        .iter()
        .fold((0i64, 0u64), |best, (&b, &c)| if c > best.1 { (b, c) } else { best });
    let mean_flush_freq = dense_count as f64 / samples as f64;
    let correct_freq = correct as f64 / samples as f64;

    let mean = if mean_flush_freq > 0.5 || mean_flush_freq > correct_freq {
        let dense_pos = strided_mean + dense_bucket as f64 * bucket_width;
        dense_mean(data, dense_pos, precision)
    } else {
        None
    };

    IntervalEstimate {
        intervals,
        mean,
        samples,
        mean_flush_freq,
        correct_freq,
    }
}

/// Average of every sample strictly within `precision` of `dense_pos`.
pub fn dense_mean(data: &[f32], dense_pos: f64, precision: f64) -> Option<f32> {
    let (sum, count) = data
        .iter()
        .filter(|&&v| (v as f64 - dense_pos).abs() < precision)
        .fold((0.0f64, 0usize), |(s, n), &v| (s + v as f64, n + 1));
    (count > 0).then(|| (sum / count as f64) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_field(n: usize, seed: u64) -> Vec<f32> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 40) as f32 / (1u64 << 24) as f32
            })
            .collect()
    }

    #[test]
    fn tiny_volume_has_no_samples() {
        let g = Geometry::new(6, 3, 3, 3).unwrap();
        let data = vec![1.0f32; 27];
        let est = estimate(&data, &g, 1e-3, 65536, 0.99, 100);
        assert_eq!(est, IntervalEstimate::fixed(65536));
    }

    #[test]
    fn constant_volume_uses_mean_and_few_intervals() {
        let g = Geometry::new(6, 20, 20, 20).unwrap();
        let data = vec![3.25f32; 8000];
        let est = estimate(&data, &g, 1e-3, 65536, 0.99, 10);
        assert!(est.samples > 0);
        assert_eq!(est.intervals, MIN_INTERVALS);
        assert_eq!(est.mean, Some(3.25));
        assert_eq!(est.mean_flush_freq, 1.0);
    }

    #[test]
    fn noisy_volume_needs_wide_alphabet() {
        let g = Geometry::new(6, 24, 24, 24).unwrap();
        let data = lcg_field(24 * 24 * 24, 7);
        let est = estimate(&data, &g, 1e-4, 65536, 0.99, 5);
        assert!(est.intervals >= 4096, "intervals = {}", est.intervals);
        assert!(est.intervals.is_power_of_two());
        assert!(est.correct_freq < 0.05);
    }

    #[test]
    fn dense_mean_ignores_far_values() {
        let data = [1.0f32, 1.0005, 0.9995, 7.0, -3.0];
        let m = dense_mean(&data, 1.0, 1e-3).unwrap();
        assert!((m - 1.0).abs() < 1e-6);
        assert_eq!(dense_mean(&data, 100.0, 1e-3), None);
    }
}
