/// Lossless post-pass applied to the whole container payload.
///
/// The payload produced by the predictor/quantizer/entropy pipeline is handed
/// to a `LosslessCodec` as one opaque byte stream; its output is what lands
/// after the preamble. Each implementation:
/// - Is identified by a stable numeric `id()` stored in the preamble, so a
///   reader can resolve the matching codec without being told.
/// - Must round-trip bytes exactly. The error bound is already spent by the
///   quantizer; nothing downstream may perturb the payload.
pub trait LosslessCodec: Send + Sync {
    /// Stable codec ID stored in the container preamble.
    fn id(&self) -> u8;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    fn compress(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>>;

    fn decompress(&self, stored: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// No-op post-pass: the payload is stored verbatim.
///
/// It is the default of [`Writer`](crate::Writer) and the codec a reader
/// falls back to for id 0, so it lives here rather than with the bundled
/// compressors (which re-export it).
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughCodec;

impl LosslessCodec for PassThroughCodec {
    fn id(&self) -> u8 {
        crate::format::CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(payload.to_vec())
    }

    fn decompress(&self, stored: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(stored.to_vec())
    }
}
