//! Per-block predictors and the corner-sampling selection heuristic.
//!
//! Two predictors compete for every block: a trilinear regression surface
//! fitted in closed form, and the 3D Lorenzo predictor that extrapolates a
//! cell from its seven already-visited neighbours. The choice is made once,
//! from a fixed subset of sample points, and stored as a mode bit; the
//! decompressor replays the bit instead of recomputing the choice.

use crate::geometry::Geometry;

/// `f(x, y, z) = a·x + b·y + c·z + d` over local block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coefficients(pub [f32; 4]);

impl Coefficients {
    #[inline]
    pub fn predict(&self, ii: usize, jj: usize, kk: usize) -> f32 {
        let [a, b, c, d] = self.0;
        a * ii as f32 + b * jj as f32 + c * kk as f32 + d
    }
}

/// Which predictor reconstructs a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorMode {
    Regression,
    Lorenzo,
}

impl PredictorMode {
    /// Mode bit as stored in the container: set means Lorenzo.
    #[inline]
    pub fn bit(self) -> bool {
        matches!(self, PredictorMode::Lorenzo)
    }

    #[inline]
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            PredictorMode::Lorenzo
        } else {
            PredictorMode::Regression
        }
    }
}

/// Outcome of fitting and sampling one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockFit {
    pub coefficients: Coefficients,
    pub mode: PredictorMode,
}

/// Read-only inputs of the selection heuristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Added to every sampled Lorenzo error (precision × noise factor).
    pub noise: f32,
    /// Dense-value mean when the mean shortcut is active.
    pub mean: Option<f32>,
}

/// Closed-form least-squares fit over the `B³` cells of `block`
/// (traversal order, no padding).
pub fn fit_regression(block: &[f32], block_size: usize) -> Coefficients {
    let b = block_size;
    let mut fx = 0.0f32;
    let mut fy = 0.0f32;
    let mut fz = 0.0f32;
    let mut f = 0.0f32;
    let mut cells = block.iter();
    for i in 0..b {
        let mut sum_x = 0.0f32;
        for j in 0..b {
            let mut sum_y = 0.0f32;
            for k in 0..b {
                let cur = cells.next().copied().unwrap_or(0.0);
                sum_y += cur;
                fz += cur * k as f32;
            }
            fy += sum_y * j as f32;
            sum_x += sum_y;
        }
        fx += sum_x * i as f32;
        f += sum_x;
    }

    let bf = b as f32;
    let coeff = (1.0f64 / (b * b * b) as f64) as f32;
    let slope = |moment: f32| (2.0 * moment / (bf - 1.0) - f) * 6.0 * coeff / (bf + 1.0);
    let a = slope(fx);
    let bb = slope(fy);
    let c = slope(fz);
    let d = f * coeff - ((bf - 1.0) * a / 2.0 + (bf - 1.0) * bb / 2.0 + (bf - 1.0) * c / 2.0);
    Coefficients([a, bb, c, d])
}

/// 3D Lorenzo prediction for the cell at `pos` of a padded buffer, by
/// inclusion–exclusion over its seven lower neighbours.
#[inline]
pub fn lorenzo(buf: &[f32], pos: usize, dim0: usize, dim1: usize) -> f32 {
    buf[pos - 1] + buf[pos - dim1] + buf[pos - dim0]
        - buf[pos - dim1 - 1]
        - buf[pos - dim0 - 1]
        - buf[pos - dim0 - dim1]
        + buf[pos - dim0 - dim1 - 1]
}

/// Choose a predictor for one block from its padded buffer (original values)
/// and its unquantized regression fit.
///
/// Errors are accumulated over `4·(B-1)` points along the main diagonal and
/// its three mirrored diagonals. Ties go to regression.
pub fn select_predictor(
    padded: &[f32],
    coefficients: &Coefficients,
    geometry: &Geometry,
    params: &SamplingParams,
) -> PredictorMode {
    let b = geometry.block_size;
    let mut err_lorenzo = 0.0f32;
    let mut err_reg = 0.0f32;

    let mut sample = |ii: usize, jj: usize, kk: usize| {
        let pos = geometry.padded_index(ii, jj, kk);
        let cur = padded[pos];
        let pred_lorenzo = lorenzo(padded, pos, geometry.pad_dim0_offset, geometry.pad_dim1_offset);
        let pred_reg = coefficients.predict(ii, jj, kk);
        let lorenzo_err = (pred_lorenzo - cur).abs() + params.noise;
        err_lorenzo += match params.mean {
            Some(mean) => lorenzo_err.min((mean - cur).abs()),
            None => lorenzo_err,
        };
        err_reg += (pred_reg - cur).abs();
    };

    for t in 1..b {
        let u = b - 1 - t;
        sample(t, t, t);
        sample(t, t, u);
        sample(t, u, t);
        sample(t, u, u);
    }

    if err_lorenzo < err_reg {
        PredictorMode::Lorenzo
    } else {
        PredictorMode::Regression
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planar_block(b: usize, a: f32, bb: f32, c: f32, d: f32) -> Vec<f32> {
        let mut out = Vec::with_capacity(b * b * b);
        for i in 0..b {
            for j in 0..b {
                for k in 0..b {
                    out.push(a * i as f32 + bb * j as f32 + c * k as f32 + d);
                }
            }
        }
        out
    }

    #[test]
    fn regression_recovers_plane() {
        let block = planar_block(6, 0.5, -1.25, 2.0, 3.0);
        let fit = fit_regression(&block, 6);
        let [a, b, c, d] = fit.0;
        assert!((a - 0.5).abs() < 1e-4, "a = {a}");
        assert!((b + 1.25).abs() < 1e-4, "b = {b}");
        assert!((c - 2.0).abs() < 1e-4, "c = {c}");
        assert!((d - 3.0).abs() < 1e-3, "d = {d}");
    }

    #[test]
    fn constant_block_has_flat_fit() {
        let block = vec![4.5f32; 216];
        let fit = fit_regression(&block, 6);
        assert!(fit.0[0].abs() < 1e-5);
        assert!(fit.0[1].abs() < 1e-5);
        assert!(fit.0[2].abs() < 1e-5);
        assert!((fit.0[3] - 4.5).abs() < 1e-4);
    }

    #[test]
    fn lorenzo_is_exact_on_trilinear_interior() {
        let g = Geometry::new(6, 6, 6, 6).unwrap();
        let data = planar_block(6, 1.0, 2.0, 3.0, 0.0);
        let mut padded = vec![0.0; g.padded_len()];
        g.gather_padded(&data, (0, 0, 0), &mut padded);
        let pos = g.padded_index(3, 2, 4);
        let pred = lorenzo(&padded, pos, g.pad_dim0_offset, g.pad_dim1_offset);
        assert!((pred - padded[pos]).abs() < 1e-5);
    }

    #[test]
    fn plane_prefers_regression_and_ties_go_to_regression() {
        let g = Geometry::new(6, 6, 6, 6).unwrap();
        let data = planar_block(6, 0.1, 0.2, 0.3, 1.0);
        let mut padded = vec![0.0; g.padded_len()];
        g.gather_padded(&data, (0, 0, 0), &mut padded);
        let fit = fit_regression(&data, 6);
        let params = SamplingParams { noise: 1e-3, mean: None };
        assert_eq!(select_predictor(&padded, &fit, &g, &params), PredictorMode::Regression);

        // All-zero block: both accumulated errors are exactly zero.
        let zeros = vec![0.0f32; 216];
        g.gather_padded(&zeros, (0, 0, 0), &mut padded);
        let fit = fit_regression(&zeros, 6);
        let params = SamplingParams { noise: 0.0, mean: None };
        assert_eq!(select_predictor(&padded, &fit, &g, &params), PredictorMode::Regression);
    }

    #[test]
    fn rough_block_prefers_lorenzo() {
        // Smooth but strongly curved field: regression misses the curvature,
        // Lorenzo tracks it from neighbours.
        let g = Geometry::new(6, 6, 6, 6).unwrap();
        let mut data = Vec::with_capacity(216);
        for i in 0..6 {
            for j in 0..6 {
                for k in 0..6 {
                    let (x, y, z) = (i as f32, j as f32, k as f32);
                    data.push(x * x * 10.0 + y * y * 10.0 + z * z * 10.0);
                }
            }
        }
        let mut padded = vec![0.0; g.padded_len()];
        g.gather_padded(&data, (0, 0, 0), &mut padded);
        let fit = fit_regression(&data, 6);
        let params = SamplingParams { noise: 1e-4, mean: None };
        assert_eq!(select_predictor(&padded, &fit, &g, &params), PredictorMode::Lorenzo);
    }

    #[test]
    fn mode_bit_round_trips() {
        for mode in [PredictorMode::Regression, PredictorMode::Lorenzo] {
            assert_eq!(PredictorMode::from_bit(mode.bit()), mode);
        }
    }
}
