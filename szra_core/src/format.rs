use crate::error::{Result, SzError};

/// Magic bytes opening every SZRA container.
pub const MAGIC: &[u8; 4] = b"SZRA";

pub const FORMAT_VERSION: u8 = 1;

/// Fixed size of the container preamble in bytes.
///   magic[4] + version:u8 + codec_id:u8 + flags:u8 + reserved:u8 + checksum:u64
///   = 4 + 1 + 1 + 1 + 1 + 8 = 16
pub const PREAMBLE_SIZE: usize = 16;

// ── Flags ──────────────────────────────────────────────────────────────────

/// Per-block streams are independently addressable (sub-region decoding).
pub const FLAG_RANDOM_ACCESS: u8 = 1 << 0;

/// The preamble carries an xxhash3-64 checksum of the stored payload.
pub const FLAG_HAS_CHECKSUM: u8 = 1 << 1;

// ── Post-pass codec IDs ────────────────────────────────────────────────────

pub const CODEC_PASSTHROUGH: u8 = 0;
pub const CODEC_ZSTD: u8 = 1;
pub const CODEC_LZ4: u8 = 2;
pub const CODEC_GZIP: u8 = 3;

// ── Preamble ───────────────────────────────────────────────────────────────

/// Decoded representation of the 16-byte container preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    pub version: u8,
    pub codec_id: u8,
    pub flags: u8,
    /// xxh3-64 of the stored (post-pass) payload; zero without the flag.
    pub checksum: u64,
}

impl Preamble {
    pub fn to_bytes(&self) -> [u8; PREAMBLE_SIZE] {
        let mut buf = [0u8; PREAMBLE_SIZE];
        buf[..4].copy_from_slice(MAGIC);
        buf[4] = self.version;
        buf[5] = self.codec_id;
        buf[6] = self.flags;
        // buf[7] reserved, stays zero
        buf[8..16].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }

    /// Parse the preamble at the start of `bytes`, checking the magic.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREAMBLE_SIZE {
            return Err(SzError::Truncated {
                offset: 0,
                needed: PREAMBLE_SIZE,
                available: bytes.len(),
            });
        }
        if &bytes[..4] != MAGIC {
            return Err(SzError::BadMagic);
        }
        let mut checksum = [0u8; 8];
        checksum.copy_from_slice(&bytes[8..16]);
        Ok(Self {
            version: bytes[4],
            codec_id: bytes[5],
            flags: bytes[6],
            checksum: u64::from_be_bytes(checksum),
        })
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

// ── Payload primitives ─────────────────────────────────────────────────────

/// Append-only big-endian writer for the container payload.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Size fields are written at full 64-bit width.
    pub fn put_size(&mut self, v: usize) {
        self.buf.extend_from_slice(&(v as u64).to_be_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_f32_slice(&mut self, values: &[f32]) {
        self.buf.reserve(values.len() * 4);
        for v in values {
            self.put_f32(*v);
        }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked big-endian reader over a payload.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(SzError::Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    /// A 64-bit size field.
    pub fn size(&mut self) -> Result<usize> {
        let v = u64::from_be_bytes(self.array()?);
        usize::try_from(v).map_err(|_| SzError::Corrupt(format!("size field {v} overflows usize")))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.array()?))
    }

    /// Read `count` big-endian f32 values, checking the length up front.
    pub fn f32_vec(&mut self, count: usize) -> Result<Vec<f32>> {
        let bytes = self.take(count.checked_mul(4).ok_or_else(|| {
            SzError::Corrupt(format!("value count {count} overflows"))
        })?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

// ── Payload header ─────────────────────────────────────────────────────────

/// Scalar fields and the main prefix tree at the start of the payload
/// (items 2 to 7 of the layout, in order).
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadHeader {
    pub num_elements: usize,
    pub block_size: usize,
    pub precision: f64,
    pub intervals: u32,
    pub node_count: usize,
    /// Serialized main prefix tree.
    pub tree: Vec<u8>,
    /// Dense-value mean used by Lorenzo blocks, when enabled.
    pub mean: Option<f32>,
}

impl PayloadHeader {
    pub fn write_to(&self, out: &mut ByteWriter) {
        out.put_size(self.num_elements);
        out.put_u32(self.block_size as u32);
        out.put_f64(self.precision);
        out.put_u32(self.intervals);
        out.put_u32(self.tree.len() as u32);
        out.put_u32(self.node_count as u32);
        out.put_bytes(&self.tree);
        out.put_u8(self.mean.is_some() as u8);
        out.put_f32(self.mean.unwrap_or(0.0));
    }

    /// Parse and sanity-check the header fields.
    pub fn read_from(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let num_elements = cursor.size()?;
        if num_elements == 0 {
            return Err(SzError::Corrupt("container holds zero elements".into()));
        }
        let block_size = cursor.u32()? as usize;
        if !(2..=64).contains(&block_size) {
            return Err(SzError::Corrupt(format!("block size {block_size} out of range")));
        }
        let precision = cursor.f64()?;
        if !(precision.is_finite() && precision > 0.0) {
            return Err(SzError::Corrupt(format!("invalid precision {precision}")));
        }
        let intervals = cursor.u32()?;
        if !intervals.is_power_of_two() || !(4..=1 << 24).contains(&intervals) {
            return Err(SzError::Corrupt(format!("invalid interval count {intervals}")));
        }
        let tree_size = cursor.u32()? as usize;
        let node_count = cursor.u32()? as usize;
        let tree = cursor.take(tree_size)?.to_vec();
        let use_mean = cursor.u8()?;
        let mean = cursor.f32()?;
        let mean = match use_mean {
            0 => None,
            1 => Some(mean),
            other => return Err(SzError::Corrupt(format!("invalid use-mean flag {other}"))),
        };
        Ok(Self {
            num_elements,
            block_size,
            precision,
            intervals,
            node_count,
            tree,
            mean,
        })
    }
}
