mod gzip_codec;
mod lz4_codec;
mod zstd_codec;

pub use gzip_codec::GzipCodec;
pub use lz4_codec::Lz4Codec;
pub use zstd_codec::ZstdCodec;

/// Re-exported from the core, where it is the writer's default.
pub use szra_core::PassThroughCodec;

use std::sync::Arc;
use szra_core::format::{CODEC_GZIP, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD};
use szra_core::LosslessCodec;

/// Resolve a post-pass codec from the preamble's `codec_id`.
///
/// Called by the CLI when opening an existing container, so the reader is
/// initialized with the right codec automatically.
pub fn codec_by_id(id: u8) -> anyhow::Result<Arc<dyn LosslessCodec>> {
    match id {
        CODEC_PASSTHROUGH => Ok(Arc::new(PassThroughCodec)),
        CODEC_ZSTD => Ok(Arc::new(ZstdCodec::default())),
        CODEC_LZ4 => Ok(Arc::new(Lz4Codec)),
        CODEC_GZIP => Ok(Arc::new(GzipCodec::default())),
        _ => anyhow::bail!(
            "unknown codec id {}; supported: 0 (passthrough), 1 (zstd), 2 (lz4), 3 (gzip)",
            id
        ),
    }
}

/// Resolve a post-pass codec from its CLI name.
pub fn codec_by_name(name: &str, zstd_level: i32) -> anyhow::Result<Arc<dyn LosslessCodec>> {
    match name {
        "passthrough" | "none" => Ok(Arc::new(PassThroughCodec)),
        "zstd" => Ok(Arc::new(ZstdCodec::new(zstd_level))),
        "lz4" => Ok(Arc::new(Lz4Codec)),
        "gzip" => Ok(Arc::new(GzipCodec::default())),
        other => anyhow::bail!("unknown codec '{}'; choose gzip, zstd, lz4 or passthrough", other),
    }
}
