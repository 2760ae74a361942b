use std::sync::Arc;

use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::backend::{backend_for, PredictorBackend};
use crate::bits::pack_flags;
use crate::codec::{LosslessCodec, PassThroughCodec};
use crate::coefficients::{coefficient_precisions, quantize_coefficients, write_coefficient_streams};
use crate::config::{validate_precision, SzConfig};
use crate::error::{try_filled, Result, SzError};
use crate::format::{
    ByteWriter, PayloadHeader, Preamble, FLAG_HAS_CHECKSUM, FLAG_RANDOM_ACCESS, FORMAT_VERSION,
    PREAMBLE_SIZE,
};
use crate::geometry::Geometry;
use crate::huffman::HuffmanTree;
use crate::intervals::{estimate, IntervalEstimate};
use crate::intstream::encode_u32s;
use crate::predictor::{PredictorMode, SamplingParams};
use crate::quantizer::{quantize_lorenzo_block, quantize_regression_block, QuantParams};

/// One-shot compressor for 3D volumes.
///
/// # Pipeline
/// ```text
/// interval optimisation ─► fit + sample (backend) ─► coefficient quantization
///   ─► per-block residual quantization ─► prefix coding ─► payload
///   ─► lossless post-pass ─► [PREAMBLE: 16 bytes][STORED PAYLOAD]
/// ```
///
/// A `Writer` holds only immutable run parameters, so one instance can
/// compress any number of volumes, each call independent of the others.
pub struct Writer {
    config: SzConfig,
    codec: Arc<dyn LosslessCodec>,
    backend: Box<dyn PredictorBackend>,
}

impl Writer {
    /// Validate `config` and resolve its backend. Output is not post-processed
    /// until a codec is attached with [`with_codec`](Self::with_codec).
    pub fn new(config: SzConfig) -> Result<Self> {
        config.validate()?;
        let backend = backend_for(config.backend);
        Ok(Self {
            config,
            codec: Arc::new(PassThroughCodec),
            backend,
        })
    }

    pub fn with_codec(mut self, codec: Arc<dyn LosslessCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the backend resolved from the config.
    pub fn with_backend(mut self, backend: Box<dyn PredictorBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &SzConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Compress `data`, a row-major `dims[0] × dims[1] × dims[2]` volume with
    /// the last axis fastest, so that every sample reconstructs to within
    /// `precision` of its original value.
    pub fn compress(&self, data: &[f32], dims: [usize; 3], precision: f64) -> Result<Vec<u8>> {
        validate_precision(precision)?;
        let coeff_precisions =
            coefficient_precisions(precision, self.config.coeff_rel_err, self.config.block_size)?;
        let [r1, r2, r3] = dims;
        let geometry = Geometry::new(self.config.block_size, r1, r2, r3)?;
        if data.len() != geometry.num_elements {
            return Err(SzError::ShapeMismatch {
                stored: data.len() as u64,
                requested: geometry.num_elements as u64,
            });
        }
        debug!(
            r1,
            r2,
            r3,
            blocks = geometry.num_blocks,
            block_size = geometry.block_size,
            backend = self.backend.name(),
            "compressing volume"
        );

        let estimate = if self.config.optimize_intervals {
            estimate(
                data,
                &geometry,
                precision,
                self.config.max_quant_intervals,
                self.config.pred_threshold,
                self.config.sample_distance,
            )
        } else {
            IntervalEstimate::fixed(self.config.max_quant_intervals)
        };
        debug!(
            intervals = estimate.intervals,
            samples = estimate.samples,
            mean = ?estimate.mean,
            mean_flush_freq = estimate.mean_flush_freq,
            correct_freq = estimate.correct_freq,
            "quantization intervals chosen"
        );

        let sampling = SamplingParams {
            noise: (precision * self.config.noise_factor) as f32,
            mean: estimate.mean,
        };
        let fits = self
            .backend
            .fit_regression_and_sample(data, &geometry, &sampling)?;

        let modes: Vec<bool> = fits.iter().map(|f| f.mode.bit()).collect();
        let mut reg_coefficients: Vec<_> = fits
            .iter()
            .filter(|f| f.mode == PredictorMode::Regression)
            .map(|f| f.coefficients)
            .collect();
        let reg_count = reg_coefficients.len();
        let coeff_streams = quantize_coefficients(
            &mut reg_coefficients,
            coeff_precisions,
            self.config.coeff_intervals,
        );

        // ── Residual quantization, block by block in canonical order ───────
        let params = QuantParams::new(precision, estimate.intervals, estimate.mean);
        let block_elements = geometry.block_elements;
        let mut codes = try_filled(geometry.num_blocks * block_elements, 0i32)?;
        let mut outliers = Vec::new();
        let mut block_outliers = Vec::with_capacity(geometry.num_blocks);
        let mut block = vec![0.0f32; block_elements];
        let mut padded = vec![0.0f32; geometry.padded_len()];
        let mut reg_iter = reg_coefficients.iter();

        for (idx, fit) in fits.iter().enumerate() {
            let coords = geometry.block_coords(idx);
            let block_codes = &mut codes[idx * block_elements..(idx + 1) * block_elements];
            let count = match fit.mode {
                PredictorMode::Regression => {
                    let coefficients = reg_iter
                        .next()
                        .ok_or_else(|| SzError::Corrupt("regression coefficients exhausted".into()))?;
                    geometry.gather_block(data, coords, &mut block);
                    quantize_regression_block(
                        &block,
                        coefficients,
                        geometry.block_size,
                        &params,
                        block_codes,
                        &mut outliers,
                    )
                }
                PredictorMode::Lorenzo => {
                    geometry.gather_padded(data, coords, &mut padded);
                    quantize_lorenzo_block(&mut padded, &geometry, &params, block_codes, &mut outliers)
                }
            };
            block_outliers.push(count);
        }
        debug!(
            regression_blocks = reg_count,
            lorenzo_blocks = geometry.num_blocks - reg_count,
            outliers = outliers.len(),
            "quantization finished"
        );

        // ── Prefix coding ───────────────────────────────────────────────────
        let tree = HuffmanTree::from_symbols(&codes, 2 * estimate.intervals as usize)?;
        let mut streams = Vec::with_capacity(codes.len() / 4);
        let mut stream_lengths = Vec::with_capacity(geometry.num_blocks);
        for block_codes in codes.chunks_exact(block_elements) {
            let encoded = tree.encode(block_codes)?;
            stream_lengths.push(u32::try_from(encoded.len()).map_err(|_| {
                SzError::InvalidConfig(format!("block stream of {} bytes is too long", encoded.len()))
            })?);
            streams.extend_from_slice(&encoded);
        }

        // ── Payload ─────────────────────────────────────────────────────────
        let mut out = ByteWriter::with_capacity(streams.len() + outliers.len() * 4 + 1024);
        PayloadHeader {
            num_elements: geometry.num_elements,
            block_size: geometry.block_size,
            precision,
            intervals: estimate.intervals,
            node_count: tree.node_count(),
            tree: tree.to_bytes(),
            mean: estimate.mean,
        }
        .write_to(&mut out);
        out.put_bytes(&pack_flags(&modes));
        let coeff_start = out.len();
        if reg_count > 0 {
            write_coefficient_streams(&coeff_streams, &mut out)?;
        }
        let coeff_bytes = out.len() - coeff_start;

        out.put_size(outliers.len());
        let mut counts = ByteWriter::default();
        encode_u32s(&block_outliers, &mut counts)?;
        out.put_size(counts.len());
        out.put_bytes(&counts.into_inner());
        out.put_f32_slice(&outliers);

        let mut lengths = ByteWriter::default();
        encode_u32s(&stream_lengths, &mut lengths)?;
        out.put_size(lengths.len());
        out.put_bytes(&lengths.into_inner());
        out.put_bytes(&streams);
        let payload = out.into_inner();

        // ── Post-pass + preamble ────────────────────────────────────────────
        let stored = self
            .codec
            .compress(&payload)
            .map_err(|source| SzError::Codec {
                codec: self.codec.name(),
                source,
            })?;
        let mut flags = FLAG_RANDOM_ACCESS;
        let mut checksum = 0;
        if self.config.checksum {
            flags |= FLAG_HAS_CHECKSUM;
            checksum = xxh3_64(&stored);
        }
        let preamble = Preamble {
            version: FORMAT_VERSION,
            codec_id: self.codec.id(),
            flags,
            checksum,
        };
        debug!(
            payload = payload.len(),
            stored = stored.len(),
            coefficients = coeff_bytes,
            streams = streams.len(),
            codec = self.codec.name(),
            "container assembled"
        );

        let mut container = Vec::with_capacity(PREAMBLE_SIZE + stored.len());
        container.extend_from_slice(&preamble.to_bytes());
        container.extend_from_slice(&stored);
        Ok(container)
    }
}

/// Compress with the default configuration and no post-pass.
pub fn compress(data: &[f32], r1: usize, r2: usize, r3: usize, precision: f64) -> Result<Vec<u8>> {
    Writer::new(SzConfig::default())?.compress(data, [r1, r2, r3], precision)
}
