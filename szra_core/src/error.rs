//! Error taxonomy for compression and decompression calls.

use thiserror::Error;

/// Status returned for configuration errors (bad shape, region, or parameters).
pub const STATUS_CONFIG: i32 = -1;
/// Status returned for resource errors (allocation, accelerator setup).
pub const STATUS_RESOURCE: i32 = -2;
/// Status returned for malformed or corrupted containers.
pub const STATUS_CORRUPT: i32 = -3;

/// Broad category of an [`SzError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Resource,
    Corruption,
}

/// Errors surfaced by `szra_core`.
///
/// Precision violations never appear here: the quantizer resolves them by
/// escaping the sample to the outlier stream.
#[derive(Debug, Error)]
pub enum SzError {
    #[error("unsupported dimensionality: {0}D (only 3D volumes are supported)")]
    UnsupportedDimension(usize),

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("a sub-region was requested but the container was not written with the random-access layout")]
    RegionWithoutRandomAccess,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch: container holds {stored} elements but the caller described {requested}")]
    ShapeMismatch { stored: u64, requested: u64 },

    #[error("allocation failed: could not reserve {requested_bytes} bytes")]
    AllocationFailed { requested_bytes: usize },

    #[error("accelerator error {code}: {message}")]
    Accelerator { code: i32, message: String },

    #[error("corrupt container: {0}")]
    Corrupt(String),

    #[error("truncated container: needed {needed} bytes at offset {offset}, only {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("invalid magic bytes, not an SZRA container")]
    BadMagic,

    #[error("unsupported SZRA format version {0}")]
    UnsupportedVersion(u8),

    #[error("payload checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("codec mismatch: container uses post-pass codec {stored} but {provided}")]
    CodecMismatch { stored: u8, provided: String },

    #[error("{codec} post-pass failed: {source}")]
    Codec {
        codec: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl SzError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SzError::UnsupportedDimension(_)
            | SzError::InvalidRegion(_)
            | SzError::RegionWithoutRandomAccess
            | SzError::InvalidConfig(_)
            | SzError::ShapeMismatch { .. }
            | SzError::CodecMismatch { .. } => ErrorKind::Configuration,
            SzError::AllocationFailed { .. } | SzError::Accelerator { .. } => ErrorKind::Resource,
            SzError::Corrupt(_)
            | SzError::Truncated { .. }
            | SzError::BadMagic
            | SzError::UnsupportedVersion(_)
            | SzError::ChecksumMismatch { .. }
            | SzError::Codec { .. } => ErrorKind::Corruption,
        }
    }

    /// Distinct numeric status for callers that report failures as codes.
    pub fn status(&self) -> i32 {
        match self.kind() {
            ErrorKind::Configuration => STATUS_CONFIG,
            ErrorKind::Resource => STATUS_RESOURCE,
            ErrorKind::Corruption => STATUS_CORRUPT,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SzError>;

/// Allocate a vector of `len` copies of `value`, reporting failure instead of aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| SzError::AllocationFailed {
            requested_bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    v.resize(len, value);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_kind() {
        assert_eq!(SzError::UnsupportedDimension(2).status(), STATUS_CONFIG);
        assert_eq!(
            SzError::Accelerator { code: -1, message: "no pool".into() }.status(),
            STATUS_RESOURCE
        );
        assert_eq!(SzError::Corrupt("short".into()).status(), STATUS_CORRUPT);
        assert_eq!(SzError::BadMagic.kind(), ErrorKind::Corruption);
    }

    #[test]
    fn try_filled_allocates() {
        let v = try_filled(10, 0.5f32).unwrap();
        assert_eq!(v.len(), 10);
        assert!(v.iter().all(|&x| x == 0.5));
    }
}
