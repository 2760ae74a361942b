use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use szra_core::codec::LosslessCodec;
use szra_core::format::CODEC_GZIP;

/// Gzip (DEFLATE) post-pass, the CLI default.
pub struct GzipCodec {
    /// 0 = store, 9 = best.
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl LosslessCodec for GzipCodec {
    fn id(&self) -> u8 {
        CODEC_GZIP
    }

    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::new(self.level));
        encoder.write_all(payload)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, stored: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(stored.len() * 2);
        GzDecoder::new(stored).read_to_end(&mut out)?;
        Ok(out)
    }
}
