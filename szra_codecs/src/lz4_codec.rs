use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use szra_core::codec::LosslessCodec;
use szra_core::format::CODEC_LZ4;

/// LZ4 post-pass.
///
/// Cheapest to undo, so it suits containers that are opened for many small
/// region reads. Gains little on prefix-coded data beyond the outlier floats.
pub struct Lz4Codec;

impl LosslessCodec for Lz4Codec {
    fn id(&self) -> u8 {
        CODEC_LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compress_prepend_size(payload))
    }

    fn decompress(&self, stored: &[u8]) -> anyhow::Result<Vec<u8>> {
        decompress_size_prepended(stored).map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))
    }
}
