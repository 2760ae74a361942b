//! Residual quantization with an escape path for unpredictable samples.
//!
//! A residual `r = x - pred` maps to the code `floor((|r|/p + 1) / 2)·sign(r) + radius`
//! when that index fits the interval capacity. The candidate reconstruction
//! is then recomputed from the code exactly as the decompressor will compute
//! it, and if floating-point rounding pushed it outside the bound the sample
//! is escaped: code 0, raw value appended to the outlier stream.

use crate::geometry::Geometry;
use crate::predictor::{lorenzo, Coefficients};

/// Code meaning "the value is stored verbatim in the outlier stream".
pub const ESCAPE_CODE: i32 = 0;

/// Code reserved for samples snapped to the dense-value mean (Lorenzo blocks only).
pub const MEAN_CODE: i32 = 1;

/// Per-call quantizer parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub precision: f64,
    /// Interval capacity; codes of regression blocks lie in `[1, capacity)`.
    pub capacity: i32,
    pub radius: i32,
    /// Mean shortcut for Lorenzo blocks.
    pub mean: Option<f32>,
}

impl QuantParams {
    pub fn new(precision: f64, intervals: u32, mean: Option<f32>) -> Self {
        Self {
            precision,
            capacity: intervals as i32,
            radius: (intervals / 2) as i32,
            mean,
        }
    }
}

/// Value the decompressor reconstructs for `code` given prediction `pred`.
#[inline]
pub fn reconstruct(pred: f32, code: i32, radius: i32, precision: f64) -> f32 {
    (pred as f64 + (2 * (code - radius)) as f64 * precision) as f32
}

/// Quantize `value` against `pred`. Returns the code and the value the
/// decoder will see, or `None` when the sample must be escaped.
#[inline]
pub fn quantize(value: f32, pred: f32, capacity: i32, radius: i32, precision: f64) -> Option<(i32, f32)> {
    let diff = value as f64 - pred as f64;
    let mut itv = diff.abs() / precision + 1.0;
    if !(itv < capacity as f64) {
        return None;
    }
    if diff < 0.0 {
        itv = -itv;
    }
    let code = (itv / 2.0) as i32 + radius;
    let decoded = reconstruct(pred, code, radius, precision);
    if (value as f64 - decoded as f64).abs() > precision {
        return None;
    }
    Some((code, decoded))
}

/// Quantize a regression block. `block` holds the `B³` original cells in
/// traversal order; `codes` receives one code per cell.
///
/// Returns the number of outliers appended.
pub fn quantize_regression_block(
    block: &[f32],
    coefficients: &Coefficients,
    block_size: usize,
    params: &QuantParams,
    codes: &mut [i32],
    outliers: &mut Vec<f32>,
) -> u32 {
    let mut unpredictable = 0;
    let mut n = 0;
    for ii in 0..block_size {
        for jj in 0..block_size {
            for kk in 0..block_size {
                let cur = block[n];
                let pred = coefficients.predict(ii, jj, kk);
                codes[n] = match quantize(cur, pred, params.capacity, params.radius, params.precision) {
                    Some((code, _)) => code,
                    None => {
                        outliers.push(cur);
                        unpredictable += 1;
                        ESCAPE_CODE
                    }
                };
                n += 1;
            }
        }
    }
    unpredictable
}

/// Quantize a Lorenzo block in place. `padded` holds the original cells in
/// its interior and zeros in the margin; on return every interior cell holds
/// its reconstructed value, which is what later neighbours were predicted from.
///
/// Returns the number of outliers appended.
pub fn quantize_lorenzo_block(
    padded: &mut [f32],
    geometry: &Geometry,
    params: &QuantParams,
    codes: &mut [i32],
    outliers: &mut Vec<f32>,
) -> u32 {
    let b = geometry.block_size;
    let (dim0, dim1) = (geometry.pad_dim0_offset, geometry.pad_dim1_offset);
    // Two intervals of headroom keep MEAN_CODE out of the regular code range.
    let capacity = params.capacity - 2;
    let mut unpredictable = 0;
    let mut n = 0;
    for ii in 0..b {
        for jj in 0..b {
            let row = geometry.padded_index(ii, jj, 0);
            for pos in row..row + b {
                let cur = padded[pos];
                if let Some(mean) = params.mean {
                    if (cur as f64 - mean as f64).abs() <= params.precision {
                        codes[n] = MEAN_CODE;
                        padded[pos] = mean;
                        n += 1;
                        continue;
                    }
                }
                let pred = lorenzo(padded, pos, dim0, dim1);
                match quantize(cur, pred, capacity, params.radius, params.precision) {
                    Some((code, decoded)) => {
                        codes[n] = code;
                        padded[pos] = decoded;
                    }
                    None => {
                        codes[n] = ESCAPE_CODE;
                        outliers.push(cur);
                        unpredictable += 1;
                    }
                }
                n += 1;
            }
        }
    }
    unpredictable
}
