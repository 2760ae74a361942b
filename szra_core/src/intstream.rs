//! Lossless coder for short auxiliary integer arrays.
//!
//! Per-block outlier counts and per-block stream lengths change slowly from
//! one block to the next, so each value is stored as a delta against its
//! predecessor. Deltas inside `(-radius, radius)` become prefix-coded
//! symbols; anything wider escapes to a raw list.

use crate::error::{Result, SzError};
use crate::format::{ByteCursor, ByteWriter};
use crate::huffman::HuffmanTree;

/// Delta radius of the auxiliary streams.
pub const AUX_RADIUS: u32 = 1024;

const ESCAPE: i32 = 0;

/// Append the encoded form of `values` to `out`.
pub fn encode_u32s(values: &[u32], out: &mut ByteWriter) -> Result<()> {
    let radius = AUX_RADIUS as i64;
    let mut codes = Vec::with_capacity(values.len());
    let mut escaped = Vec::new();
    let mut last = 0i64;
    for &v in values {
        let delta = v as i64 - last;
        if delta.abs() < radius {
            codes.push((delta + radius) as i32);
        } else {
            codes.push(ESCAPE);
            escaped.push(v);
        }
        last = v as i64;
    }

    let tree = HuffmanTree::from_symbols(&codes, 2 * AUX_RADIUS as usize)?;
    let tree_bytes = tree.to_bytes();
    let encoded = tree.encode(&codes)?;

    out.put_u32(len_u32(values.len())?);
    out.put_u32(AUX_RADIUS);
    out.put_u32(len_u32(tree_bytes.len())?);
    out.put_u32(len_u32(tree.node_count())?);
    out.put_bytes(&tree_bytes);
    out.put_u32(len_u32(encoded.len())?);
    out.put_bytes(&encoded);
    out.put_u32(len_u32(escaped.len())?);
    for v in escaped {
        out.put_u32(v);
    }
    Ok(())
}

/// Decode one stream written by [`encode_u32s`], expecting `expected` values.
pub fn decode_u32s(cursor: &mut ByteCursor<'_>, expected: usize) -> Result<Vec<u32>> {
    let count = cursor.u32()? as usize;
    if count != expected {
        return Err(SzError::Corrupt(format!(
            "auxiliary stream holds {count} values, expected {expected}"
        )));
    }
    let radius = cursor.u32()?;
    if radius == 0 || radius > 1 << 24 {
        return Err(SzError::Corrupt(format!("auxiliary stream radius {radius} out of range")));
    }
    let tree_size = cursor.u32()? as usize;
    let node_count = cursor.u32()? as usize;
    let tree = HuffmanTree::from_bytes(cursor.take(tree_size)?, node_count, 2 * radius as usize)?;
    let encoded_size = cursor.u32()? as usize;
    let codes = tree.decode(cursor.take(encoded_size)?, count)?;
    let escaped_count = cursor.u32()? as usize;
    if escaped_count > count {
        return Err(SzError::Corrupt(format!(
            "auxiliary stream claims {escaped_count} escapes for {count} values"
        )));
    }
    let mut escaped = Vec::with_capacity(escaped_count);
    for _ in 0..escaped_count {
        escaped.push(cursor.u32()?);
    }

    let mut escaped = escaped.into_iter();
    let mut out = Vec::with_capacity(count);
    let mut last = 0i64;
    for code in codes {
        let v = if code == ESCAPE {
            escaped
                .next()
                .ok_or_else(|| SzError::Corrupt("auxiliary stream ran out of escaped values".into()))?
                as i64
        } else {
            last + code as i64 - radius as i64
        };
        let v = u32::try_from(v)
            .map_err(|_| SzError::Corrupt(format!("auxiliary value {v} outside u32 range")))?;
        out.push(v);
        last = v as i64;
    }
    if escaped.next().is_some() {
        return Err(SzError::Corrupt("auxiliary stream has unused escaped values".into()));
    }
    Ok(out)
}

fn len_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| SzError::InvalidConfig(format!("length {n} does not fit a u32 field")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[u32]) -> Vec<u32> {
        let mut w = ByteWriter::default();
        encode_u32s(values, &mut w).unwrap();
        let bytes = w.into_inner();
        let mut c = ByteCursor::new(&bytes);
        let out = decode_u32s(&mut c, values.len()).unwrap();
        assert_eq!(c.remaining(), 0);
        out
    }

    #[test]
    fn slowly_varying_lengths() {
        let values: Vec<u32> = (0..500).map(|i| 140 + (i % 7) * 3).collect();
        assert_eq!(round_trip(&values), values);
    }

    #[test]
    fn large_jumps_escape() {
        let values = vec![0, 5, 100_000, 100_001, 3, u32::MAX, 0];
        assert_eq!(round_trip(&values), values);
    }

    #[test]
    fn empty_stream() {
        assert!(round_trip(&[]).is_empty());
    }

    #[test]
    fn count_mismatch_is_corrupt() {
        let mut w = ByteWriter::default();
        encode_u32s(&[1, 2, 3], &mut w).unwrap();
        let bytes = w.into_inner();
        let mut c = ByteCursor::new(&bytes);
        assert!(matches!(decode_u32s(&mut c, 4), Err(SzError::Corrupt(_))));
    }

    #[test]
    fn truncation_is_detected() {
        let mut w = ByteWriter::default();
        encode_u32s(&[7, 7, 7, 9000], &mut w).unwrap();
        let bytes = w.into_inner();
        let mut c = ByteCursor::new(&bytes[..bytes.len() - 2]);
        assert!(decode_u32s(&mut c, 4).is_err());
    }
}
