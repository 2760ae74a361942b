//! MSB-first bit packing used by the prefix coder.

use crate::error::{Result, SzError};

pub struct BitWriter {
    data: Vec<u8>,
    /// Pending bits, left-aligned at bit `offset` from the top.
    current: u64,
    offset: u32,
}

impl BitWriter {
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            current: 0,
            offset: 0,
        }
    }

    /// Append the low `len` bits of `code`, most significant first. `len <= 64`.
    #[inline]
    pub fn write(&mut self, code: u64, len: u32) {
        if len == 0 {
            return;
        }
        if len > 32 {
            self.write(code >> 32, len - 32);
            self.write(code & 0xFFFF_FFFF, 32);
            return;
        }
        let bits = code & ((1u64 << len) - 1);
        self.current |= bits << (64 - self.offset - len);
        self.offset += len;
        while self.offset >= 8 {
            self.data.push((self.current >> 56) as u8);
            self.current <<= 8;
            self.offset -= 8;
        }
    }

    /// Flush the partial byte (zero padded) and return the buffer.
    pub fn finish(mut self) -> Vec<u8> {
        if self.offset > 0 {
            self.data.push((self.current >> 56) as u8);
        }
        self.data
    }
}

pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = self.data.get(self.pos / 8).ok_or_else(|| {
            SzError::Corrupt(format!(
                "prefix-coded stream exhausted after {} bits",
                self.pos
            ))
        })?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;
        Ok(bit == 1)
    }
}

/// Pack one flag per entry into bytes, MSB first.
pub fn pack_flags(flags: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; flags.len().div_ceil(8)];
    for (i, &f) in flags.iter().enumerate() {
        if f {
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
    out
}

pub fn unpack_flags(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes.get(i / 8).is_some_and(|b| b & (0x80 >> (i % 8)) != 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_msb_first() {
        let mut w = BitWriter::with_capacity(4);
        w.write(0b1, 1);
        w.write(0b01, 2);
        w.write(0b11111, 5);
        w.write(0b101, 3);
        let bytes = w.finish();
        assert_eq!(bytes, vec![0b1011_1111, 0b1010_0000]);
    }

    #[test]
    fn long_codes_split_cleanly() {
        let mut w = BitWriter::with_capacity(16);
        w.write(0xDEAD_BEEF_0123_4567, 64);
        w.write(0b1, 1);
        let bytes = w.finish();
        assert_eq!(&bytes[..8], &0xDEAD_BEEF_0123_4567u64.to_be_bytes());
        assert_eq!(bytes[8], 0x80);

        let mut r = BitReader::new(&bytes);
        let mut v = 0u64;
        for _ in 0..64 {
            v = (v << 1) | r.read_bit().unwrap() as u64;
        }
        assert_eq!(v, 0xDEAD_BEEF_0123_4567);
        assert!(r.read_bit().unwrap());
    }

    #[test]
    fn reader_reports_exhaustion() {
        let mut r = BitReader::new(&[0xFF]);
        for _ in 0..8 {
            r.read_bit().unwrap();
        }
        assert!(r.read_bit().is_err());
    }

    #[test]
    fn flags_pack() {
        let flags = [true, false, false, true, true, false, false, false, true];
        let bytes = pack_flags(&flags);
        assert_eq!(bytes, vec![0b1001_1000, 0b1000_0000]);
        assert_eq!(unpack_flags(&bytes, flags.len()), flags.to_vec());
    }
}
