use szra_core::codec::LosslessCodec;
use szra_core::format::CODEC_ZSTD;

/// Zstandard post-pass at a configurable level (default: 3).
///
/// Tree descriptions and the raw outlier floats are where zstd earns its
/// keep; the prefix-coded streams themselves are already close to entropy.
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl LosslessCodec for ZstdCodec {
    fn id(&self) -> u8 {
        CODEC_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(zstd::bulk::compress(payload, self.level)?)
    }

    fn decompress(&self, stored: &[u8]) -> anyhow::Result<Vec<u8>> {
        // The frame carries its own content size.
        Ok(zstd::decode_all(stored)?)
    }
}
