//! Delta quantization of the per-block regression coefficients.
//!
//! Only regression blocks contribute. Each of the four coefficient
//! dimensions is an independent flat stream with its own running value,
//! precision, prefix tree and escape list.

use crate::error::{Result, SzError};
use crate::format::{ByteCursor, ByteWriter};
use crate::huffman::HuffmanTree;
use crate::predictor::Coefficients;
use crate::quantizer::ESCAPE_CODE;

/// Per-dimension precisions: slopes get `rel·p/B`, the intercept `rel·p`.
///
/// Fails when either value leaves the positive finite range, which the
/// decoder would reject (tiny `p` underflows to zero after scaling).
pub fn coefficient_precisions(precision: f64, rel_err: f64, block_size: usize) -> Result<[f64; 4]> {
    let slope = rel_err * precision / block_size as f64;
    let intercept = rel_err * precision;
    for p in [slope, intercept] {
        if !(p.is_finite() && p > 0.0) {
            return Err(SzError::InvalidConfig(format!(
                "precision {precision} gives coefficient precision {p}; choose a larger error bound"
            )));
        }
    }
    Ok([slope, slope, slope, intercept])
}

/// Quantized coefficient streams of all regression blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientStreams {
    pub precisions: [f64; 4],
    pub radius: i32,
    pub codes: [Vec<i32>; 4],
    pub outliers: [Vec<f32>; 4],
}

/// Quantize `coefficients` in place: on return every entry holds the value
/// the decompressor will reconstruct, so the sample quantizer predicts from
/// exactly what the decoder will see.
pub fn quantize_coefficients(
    coefficients: &mut [Coefficients],
    precisions: [f64; 4],
    intervals: u32,
) -> CoefficientStreams {
    let capacity = intervals as f64;
    let radius = (intervals / 2) as i32;
    let mut codes: [Vec<i32>; 4] = Default::default();
    let mut outliers: [Vec<f32>; 4] = Default::default();
    for c in codes.iter_mut() {
        c.reserve(coefficients.len());
    }
    let mut last = [0.0f32; 4];

    for block in coefficients.iter_mut() {
        for e in 0..4 {
            let cur = block.0[e];
            let p = precisions[e];
            let diff = cur as f64 - last[e] as f64;
            let mut itv = diff.abs() / p + 1.0;
            let mut code = ESCAPE_CODE;
            if itv < capacity {
                if diff < 0.0 {
                    itv = -itv;
                }
                let candidate = (itv / 2.0) as i32 + radius;
                let decoded = (last[e] as f64 + (2 * (candidate - radius)) as f64 * p) as f32;
                if (cur as f64 - decoded as f64).abs() <= p {
                    code = candidate;
                    last[e] = decoded;
                }
            }
            if code == ESCAPE_CODE {
                outliers[e].push(cur);
                last[e] = cur;
            }
            codes[e].push(code);
            block.0[e] = last[e];
        }
    }

    CoefficientStreams {
        precisions,
        radius,
        codes,
        outliers,
    }
}

/// Serialize all four streams in dimension order.
pub fn write_coefficient_streams(streams: &CoefficientStreams, out: &mut ByteWriter) -> Result<()> {
    let state_num = 2 * (2 * streams.radius) as usize;
    for e in 0..4 {
        let tree = HuffmanTree::from_symbols(&streams.codes[e], state_num)?;
        let tree_bytes = tree.to_bytes();
        let encoded = tree.encode(&streams.codes[e])?;
        out.put_f64(streams.precisions[e]);
        out.put_i32(streams.radius);
        out.put_u32(tree_bytes.len() as u32);
        out.put_u32(tree.node_count() as u32);
        out.put_bytes(&tree_bytes);
        out.put_size(encoded.len());
        out.put_bytes(&encoded);
        out.put_u32(streams.outliers[e].len() as u32);
        out.put_f32_slice(&streams.outliers[e]);
    }
    Ok(())
}

/// Parse the four streams and replay the delta reconstruction for
/// `reg_count` regression blocks.
pub fn read_coefficients(cursor: &mut ByteCursor<'_>, reg_count: usize) -> Result<Vec<Coefficients>> {
    let mut out = vec![Coefficients::default(); reg_count];
    for e in 0..4 {
        let precision = cursor.f64()?;
        if !(precision.is_finite() && precision > 0.0) {
            return Err(SzError::Corrupt(format!(
                "coefficient stream {e} has invalid precision {precision}"
            )));
        }
        let radius = cursor.i32()?;
        if !(1..=1 << 24).contains(&radius) {
            return Err(SzError::Corrupt(format!(
                "coefficient stream {e} has invalid radius {radius}"
            )));
        }
        let tree_size = cursor.u32()? as usize;
        let node_count = cursor.u32()? as usize;
        let tree = HuffmanTree::from_bytes(cursor.take(tree_size)?, node_count, 4 * radius as usize)?;
        let encoded_size = cursor.size()?;
        let codes = tree.decode(cursor.take(encoded_size)?, reg_count)?;
        let outlier_count = cursor.u32()? as usize;
        if outlier_count > reg_count {
            return Err(SzError::Corrupt(format!(
                "coefficient stream {e} claims {outlier_count} outliers for {reg_count} blocks"
            )));
        }
        let outliers = cursor.f32_vec(outlier_count)?;

        let mut outliers = outliers.into_iter();
        let mut last = 0.0f32;
        for (slot, code) in out.iter_mut().zip(codes) {
            last = if code == ESCAPE_CODE {
                outliers.next().ok_or_else(|| {
                    SzError::Corrupt(format!("coefficient stream {e} ran out of outliers"))
                })?
            } else {
                (last as f64 + (2 * (code - radius)) as f64 * precision) as f32
            };
            slot.0[e] = last;
        }
        if outliers.next().is_some() {
            return Err(SzError::Corrupt(format!(
                "coefficient stream {e} has unused outliers"
            )));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slopes_are_tighter_than_intercept() {
        let p = coefficient_precisions(1e-3, 0.025, 6).unwrap();
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert!((p[3] - 2.5e-5).abs() < 1e-12);
        assert!((p[0] * 6.0 - p[3]).abs() < 1e-15);
    }

    #[test]
    fn underflowing_precisions_are_rejected() {
        assert!(matches!(
            coefficient_precisions(1e-322, 0.025, 6),
            Err(SzError::InvalidConfig(_))
        ));
        assert!(coefficient_precisions(1e-3, f64::MAX, 6).is_err());
        let p = coefficient_precisions(1e-300, 0.025, 6).unwrap();
        assert!(p.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn quantized_values_stay_within_precision() {
        let original: Vec<Coefficients> = (0..50)
            .map(|i| {
                let t = i as f32;
                Coefficients([0.01 * t, -0.02 * t, (t * 0.3).sin(), 100.0 + t])
            })
            .collect();
        let mut coeffs = original.clone();
        let precisions = coefficient_precisions(1e-2, 0.025, 6).unwrap();
        let streams = quantize_coefficients(&mut coeffs, precisions, 65536);
        for (q, o) in coeffs.iter().zip(&original) {
            for e in 0..4 {
                assert!((q.0[e] as f64 - o.0[e] as f64).abs() <= precisions[e]);
            }
        }
        assert_eq!(streams.codes[0].len(), 50);
    }

    #[test]
    fn decoder_replays_quantized_values() {
        let mut coeffs: Vec<Coefficients> = (0..40)
            .map(|i| {
                let t = i as f32;
                // the jump at i == 20 overflows the interval range and escapes
                let d = if i == 20 { 1.0e6 } else { t * 0.5 };
                Coefficients([t * 1e-3, 0.0, -t * 2e-3, d])
            })
            .collect();
        let precisions = coefficient_precisions(1e-3, 0.025, 6).unwrap();
        let streams = quantize_coefficients(&mut coeffs, precisions, 65536);
        assert!(!streams.outliers[3].is_empty());

        let mut w = ByteWriter::default();
        write_coefficient_streams(&streams, &mut w).unwrap();
        let bytes = w.into_inner();
        let mut c = ByteCursor::new(&bytes);
        let decoded = read_coefficients(&mut c, coeffs.len()).unwrap();
        assert_eq!(decoded, coeffs);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn missing_outliers_are_corrupt() {
        let mut coeffs = vec![Coefficients([1.0e9, 0.0, 0.0, 0.0])];
        let streams = quantize_coefficients(&mut coeffs, [1e-6; 4], 65536);
        let mut broken = streams.clone();
        broken.outliers[0].clear();
        let mut w = ByteWriter::default();
        write_coefficient_streams(&broken, &mut w).unwrap();
        let bytes = w.into_inner();
        assert!(read_coefficients(&mut ByteCursor::new(&bytes), 1).is_err());
    }
}
