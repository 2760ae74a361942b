use serde::{Deserialize, Serialize};

use crate::error::{Result, SzError};

/// Block edge length used when nothing else is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 6;

/// Upper bound on the number of quantization intervals.
pub const DEFAULT_MAX_QUANT_INTERVALS: u32 = 65536;

/// Interval count used for the regression coefficient streams.
pub const DEFAULT_COEFF_INTERVALS: u32 = 65536;

/// How the per-block regression fit and predictor sampling are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendKind {
    /// Reference single-threaded host path.
    Serial,
    /// Block-parallel path on a dedicated thread pool (`threads = 0` lets
    /// the pool pick one thread per core).
    Parallel { threads: usize },
}

/// Immutable run parameters shared by every stage of one compression call.
///
/// The error bound itself is a per-call argument, not part of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SzConfig {
    /// Edge length B of the cubic blocks.
    pub block_size: usize,
    /// Interval count used when optimisation is off, and its upper bound when on.
    pub max_quant_intervals: u32,
    /// Pick the interval count (and the mean shortcut) from a sampling pass.
    pub optimize_intervals: bool,
    /// Fraction of sampled residuals the chosen interval count must cover.
    pub pred_threshold: f64,
    /// Stride, in elements, of the interval-optimisation sampling pass.
    pub sample_distance: usize,
    /// Coefficient error as a fraction of the sample precision.
    pub coeff_rel_err: f64,
    pub coeff_intervals: u32,
    /// Penalty, in units of precision, added to every sampled Lorenzo error.
    pub noise_factor: f64,
    /// Store an xxh3-64 checksum of the payload in the preamble.
    pub checksum: bool,
    pub backend: BackendKind,
}

impl Default for SzConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_quant_intervals: DEFAULT_MAX_QUANT_INTERVALS,
            optimize_intervals: true,
            pred_threshold: 0.99,
            sample_distance: 100,
            coeff_rel_err: 0.025,
            coeff_intervals: DEFAULT_COEFF_INTERVALS,
            noise_factor: 1.22,
            checksum: true,
            backend: BackendKind::Serial,
        }
    }
}

impl SzConfig {
    pub fn validate(&self) -> Result<()> {
        if !(2..=64).contains(&self.block_size) {
            return Err(SzError::InvalidConfig(format!(
                "block_size {} out of range [2, 64]",
                self.block_size
            )));
        }
        for (name, n) in [
            ("max_quant_intervals", self.max_quant_intervals),
            ("coeff_intervals", self.coeff_intervals),
        ] {
            if n < 32 || !n.is_power_of_two() || n > 1 << 24 {
                return Err(SzError::InvalidConfig(format!(
                    "{name} must be a power of two in [32, 2^24], got {n}"
                )));
            }
        }
        if !(self.pred_threshold > 0.0 && self.pred_threshold <= 1.0) {
            return Err(SzError::InvalidConfig(format!(
                "pred_threshold {} out of range (0, 1]",
                self.pred_threshold
            )));
        }
        if self.sample_distance == 0 {
            return Err(SzError::InvalidConfig("sample_distance must be non-zero".into()));
        }
        if !(self.coeff_rel_err.is_finite() && self.coeff_rel_err > 0.0) {
            return Err(SzError::InvalidConfig(format!(
                "coeff_rel_err must be positive, got {}",
                self.coeff_rel_err
            )));
        }
        if !(self.noise_factor.is_finite() && self.noise_factor >= 0.0) {
            return Err(SzError::InvalidConfig(format!(
                "noise_factor must be non-negative, got {}",
                self.noise_factor
            )));
        }
        Ok(())
    }
}

/// Reject error bounds the quantizer cannot honour.
pub fn validate_precision(precision: f64) -> Result<()> {
    if precision.is_finite() && precision > 0.0 {
        Ok(())
    } else {
        Err(SzError::InvalidConfig(format!(
            "precision must be a positive finite number, got {precision}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SzConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_block_size_and_intervals() {
        let cfg = SzConfig { block_size: 1, ..SzConfig::default() };
        assert!(cfg.validate().is_err());

        let cfg = SzConfig { max_quant_intervals: 1000, ..SzConfig::default() };
        assert!(cfg.validate().is_err());

        let cfg = SzConfig { sample_distance: 0, ..SzConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_precision() {
        assert!(validate_precision(0.0).is_err());
        assert!(validate_precision(-1e-3).is_err());
        assert!(validate_precision(f64::NAN).is_err());
        assert!(validate_precision(1e-4).is_ok());
    }
}
