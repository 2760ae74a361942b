use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::bits::unpack_flags;
use crate::codec::{LosslessCodec, PassThroughCodec};
use crate::coefficients::read_coefficients;
use crate::error::{try_filled, Result, SzError};
use crate::format::{
    ByteCursor, PayloadHeader, Preamble, CODEC_PASSTHROUGH, FLAG_HAS_CHECKSUM, FLAG_RANDOM_ACCESS,
    FORMAT_VERSION, PREAMBLE_SIZE,
};
use crate::geometry::{shape_from_extents, Geometry};
use crate::huffman::HuffmanTree;
use crate::intstream::decode_u32s;
use crate::predictor::{lorenzo, Coefficients, PredictorMode};
use crate::quantizer::{reconstruct, ESCAPE_CODE, MEAN_CODE};

/// Block-level sections of a payload, resolved against a volume shape.
///
/// Everything here is derived from the payload alone except the geometry:
/// the container stores the element count, not the extents.
struct Layout {
    geometry: Geometry,
    modes: Vec<bool>,
    /// Reconstructed coefficients of the regression blocks, in block order.
    coefficients: Vec<Coefficients>,
    /// Per block: index into `coefficients` (meaningful for regression blocks).
    coeff_index: Vec<usize>,
    block_outliers: Vec<u32>,
    /// Per block: offset of its first outlier in `outliers`.
    outlier_offsets: Vec<usize>,
    outliers: Vec<f32>,
    /// Per block: `(start, len)` of its prefix-coded stream within the payload.
    streams: Vec<(usize, usize)>,
    coefficient_bytes: usize,
    outlier_bytes: usize,
    stream_bytes: usize,
}

/// Random-access decompressor for SZRA containers.
///
/// # Open sequence
/// 1. Parse the 16-byte preamble (magic, version, codec id, flags).
/// 2. Verify the payload checksum when the flag is set.
/// 3. Undo the lossless post-pass and parse the header and main prefix tree.
///
/// The block-level sections (mode bitmap, coefficients, outlier table,
/// stream lengths) need the volume extents, which the caller supplies on
/// the first decompression call; they are parsed once and cached.
///
/// # Access pattern
/// [`decompress_region`](Self::decompress_region) resolves the requested box
/// to the minimal span of blocks, reconstructs each of those blocks in full
/// (Lorenzo blocks depend on their own earlier cells), and copies only the
/// requested cells out.
pub struct Reader {
    preamble: Preamble,
    codec_name: &'static str,
    stored_len: usize,
    payload: Vec<u8>,
    pub header: PayloadHeader,
    tree: HuffmanTree,
    /// Offset of the mode bitmap within the payload.
    body_offset: usize,
    layout: Option<Layout>,
}

impl Reader {
    /// Open a container held in memory.
    ///
    /// `codec` must match the codec id stored in the preamble; `None` is only
    /// accepted for containers written without a post-pass.
    pub fn open(bytes: &[u8], codec: Option<Arc<dyn LosslessCodec>>) -> Result<Self> {
        let preamble = Preamble::from_bytes(bytes)?;
        if preamble.version != FORMAT_VERSION {
            return Err(SzError::UnsupportedVersion(preamble.version));
        }
        let stored = &bytes[PREAMBLE_SIZE..];
        if preamble.has_flag(FLAG_HAS_CHECKSUM) {
            let actual = xxh3_64(stored);
            if actual != preamble.checksum {
                return Err(SzError::ChecksumMismatch {
                    expected: preamble.checksum,
                    actual,
                });
            }
        }

        let codec: Arc<dyn LosslessCodec> = match codec {
            Some(c) if c.id() == preamble.codec_id => c,
            Some(c) => {
                return Err(SzError::CodecMismatch {
                    stored: preamble.codec_id,
                    provided: format!("{} (id {}) was provided", c.name(), c.id()),
                })
            }
            None if preamble.codec_id == CODEC_PASSTHROUGH => Arc::new(PassThroughCodec),
            None => {
                return Err(SzError::CodecMismatch {
                    stored: preamble.codec_id,
                    provided: "no codec was provided".into(),
                })
            }
        };
        let payload = codec.decompress(stored).map_err(|source| SzError::Codec {
            codec: codec.name(),
            source,
        })?;

        let mut cursor = ByteCursor::new(&payload);
        let header = PayloadHeader::read_from(&mut cursor)?;
        let tree = HuffmanTree::from_bytes(&header.tree, header.node_count, 2 * header.intervals as usize)?;
        let body_offset = cursor.position();
        debug!(
            elements = header.num_elements,
            block_size = header.block_size,
            precision = header.precision,
            intervals = header.intervals,
            use_mean = header.mean.is_some(),
            payload = payload.len(),
            "container opened"
        );

        Ok(Self {
            preamble,
            codec_name: codec.name(),
            stored_len: stored.len(),
            payload,
            header,
            tree,
            body_offset,
            layout: None,
        })
    }

    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    pub fn num_elements(&self) -> usize {
        self.header.num_elements
    }

    /// Reconstruct the whole volume.
    pub fn decompress(&mut self, dims: &[usize]) -> Result<Vec<f32>> {
        let [r1, r2, r3] = shape_from_extents(dims)?;
        self.decompress_box([r1, r2, r3], [0, 0, 0], [r1, r2, r3])
    }

    /// Reconstruct the box `[start, end)` (end exclusive on every axis) of a
    /// volume with extents `dims`. The result is row-major over the box.
    pub fn decompress_region(&mut self, dims: &[usize], start: &[usize], end: &[usize]) -> Result<Vec<f32>> {
        let dims = shape_from_extents(dims)?;
        if start.len() != 3 || end.len() != 3 {
            return Err(SzError::InvalidRegion(format!(
                "region corners must have 3 coordinates, got {} and {}",
                start.len(),
                end.len()
            )));
        }
        self.decompress_box(dims, [start[0], start[1], start[2]], [end[0], end[1], end[2]])
    }

    fn decompress_box(&mut self, dims: [usize; 3], start: [usize; 3], end: [usize; 3]) -> Result<Vec<f32>> {
        for axis in 0..3 {
            if start[axis] >= end[axis] || end[axis] > dims[axis] {
                return Err(SzError::InvalidRegion(format!(
                    "axis {axis}: [{}, {}) is empty or outside extent {}",
                    start[axis], end[axis], dims[axis]
                )));
            }
        }
        let full = start == [0, 0, 0] && end == dims;
        if !full && !self.preamble.has_flag(FLAG_RANDOM_ACCESS) {
            return Err(SzError::RegionWithoutRandomAccess);
        }
        self.bind(dims)?;
        let Some(layout) = self.layout.as_ref() else {
            return Err(SzError::Corrupt("block layout unavailable".into()));
        };
        let g = &layout.geometry;

        let ext = [end[0] - start[0], end[1] - start[1], end[2] - start[2]];
        let mut out = try_filled(ext[0] * ext[1] * ext[2], 0.0f32)?;
        let (bx0, bx1) = g.block_span(start[0], end[0]);
        let (by0, by1) = g.block_span(start[1], end[1]);
        let (bz0, bz1) = g.block_span(start[2], end[2]);
        debug!(
            ?start,
            ?end,
            blocks = (bx1 - bx0 + 1) * (by1 - by0 + 1) * (bz1 - bz0 + 1),
            "reconstructing region"
        );

        let b = g.block_size;
        let mut decoder = BlockDecoder::new(self, layout);
        for bi in bx0..=bx1 {
            for bj in by0..=by1 {
                for bk in bz0..=bz1 {
                    let cells = decoder.decode(g.block_index(bi, bj, bk))?;
                    for ii in 0..b {
                        let x = bi * b + ii;
                        if x < start[0] || x >= end[0] {
                            continue;
                        }
                        for jj in 0..b {
                            let y = bj * b + jj;
                            if y < start[1] || y >= end[1] {
                                continue;
                            }
                            let row = ((x - start[0]) * ext[1] + (y - start[1])) * ext[2];
                            for kk in 0..b {
                                let z = bk * b + kk;
                                if z < start[2] || z >= end[2] {
                                    continue;
                                }
                                out[row + z - start[2]] = cells[(ii * b + jj) * b + kk];
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Parse the block-level sections for extents `dims`, once.
    fn bind(&mut self, dims: [usize; 3]) -> Result<()> {
        if let Some(layout) = &self.layout {
            if layout.geometry.dims() == dims {
                return Ok(());
            }
        }
        let geometry = Geometry::new(self.header.block_size, dims[0], dims[1], dims[2])?;
        if geometry.num_elements != self.header.num_elements {
            return Err(SzError::ShapeMismatch {
                stored: self.header.num_elements as u64,
                requested: geometry.num_elements as u64,
            });
        }
        self.layout = Some(parse_layout(&self.payload[self.body_offset..], self.body_offset, geometry)?);
        Ok(())
    }

    /// Summarise the container. Block-level fields need the extents.
    pub fn info(&mut self, dims: Option<&[usize]>) -> Result<ContainerInfo> {
        let blocks = match dims {
            Some(dims) => {
                let dims = shape_from_extents(dims)?;
                self.bind(dims)?;
                self.layout.as_ref().map(|l| {
                    let regression = l.coefficients.len();
                    BlockStats {
                        dims,
                        num_blocks: l.geometry.num_blocks,
                        regression_blocks: regression,
                        lorenzo_blocks: l.geometry.num_blocks - regression,
                        total_outliers: l.outliers.len(),
                        coefficient_bytes: l.coefficient_bytes,
                        outlier_bytes: l.outlier_bytes,
                        stream_bytes: l.stream_bytes,
                    }
                })
            }
            None => None,
        };
        Ok(ContainerInfo {
            version: self.preamble.version,
            codec_id: self.preamble.codec_id,
            codec: self.codec_name.to_string(),
            random_access: self.preamble.has_flag(FLAG_RANDOM_ACCESS),
            checksum: self.preamble.has_flag(FLAG_HAS_CHECKSUM),
            stored_bytes: PREAMBLE_SIZE + self.stored_len,
            payload_bytes: self.payload.len(),
            num_elements: self.header.num_elements,
            block_size: self.header.block_size,
            precision: self.header.precision,
            intervals: self.header.intervals,
            use_mean: self.header.mean.is_some(),
            mean: self.header.mean,
            tree_bytes: self.header.tree.len(),
            tree_nodes: self.header.node_count,
            blocks,
        })
    }
}

/// Parse items 8 to 11 of the payload. `body` starts at the mode bitmap,
/// which sits `base` bytes into the payload.
fn parse_layout(body: &[u8], base: usize, geometry: Geometry) -> Result<Layout> {
    let num_blocks = geometry.num_blocks;
    let mut cursor = ByteCursor::new(body);

    let modes = unpack_flags(cursor.take(num_blocks.div_ceil(8))?, num_blocks);
    let mut coeff_index = Vec::with_capacity(num_blocks);
    let mut reg_count = 0usize;
    for &lorenzo_block in &modes {
        coeff_index.push(reg_count);
        if !lorenzo_block {
            reg_count += 1;
        }
    }

    let coeff_start = cursor.position();
    let coefficients = if reg_count > 0 {
        read_coefficients(&mut cursor, reg_count)?
    } else {
        Vec::new()
    };
    let coefficient_bytes = cursor.position() - coeff_start;

    let total_outliers = cursor.size()?;
    let counts_len = cursor.size()?;
    let mut counts_cursor = ByteCursor::new(cursor.take(counts_len)?);
    let block_outliers = decode_u32s(&mut counts_cursor, num_blocks)?;
    let mut outlier_offsets = Vec::with_capacity(num_blocks);
    let mut acc = 0usize;
    for &n in &block_outliers {
        outlier_offsets.push(acc);
        acc = acc
            .checked_add(n as usize)
            .ok_or_else(|| SzError::Corrupt("outlier counts overflow".into()))?;
    }
    if acc != total_outliers {
        return Err(SzError::Corrupt(format!(
            "per-block outlier counts sum to {acc}, header records {total_outliers}"
        )));
    }
    let outlier_start = cursor.position();
    let outliers = cursor.f32_vec(total_outliers)?;
    let outlier_bytes = cursor.position() - outlier_start;

    let lengths_len = cursor.size()?;
    let mut lengths_cursor = ByteCursor::new(cursor.take(lengths_len)?);
    let lengths = decode_u32s(&mut lengths_cursor, num_blocks)?;
    let streams_start = base + cursor.position();
    let mut streams = Vec::with_capacity(num_blocks);
    let mut offset = streams_start;
    for &len in &lengths {
        streams.push((offset, len as usize));
        offset += len as usize;
    }
    let stream_bytes = offset - streams_start;
    if stream_bytes != cursor.remaining() {
        return Err(SzError::Corrupt(format!(
            "block streams total {stream_bytes} bytes but {} remain in the payload",
            cursor.remaining()
        )));
    }
    debug!(
        blocks = num_blocks,
        regression_blocks = reg_count,
        outliers = total_outliers,
        stream_bytes,
        "block layout parsed"
    );

    Ok(Layout {
        geometry,
        modes,
        coefficients,
        coeff_index,
        block_outliers,
        outlier_offsets,
        outliers,
        streams,
        coefficient_bytes,
        outlier_bytes,
        stream_bytes,
    })
}

/// Per-block reconstruction with reusable scratch buffers.
struct BlockDecoder<'a> {
    payload: &'a [u8],
    tree: &'a HuffmanTree,
    precision: f64,
    radius: i32,
    mean: Option<f32>,
    layout: &'a Layout,
    codes: Vec<i32>,
    cells: Vec<f32>,
    padded: Vec<f32>,
}

impl<'a> BlockDecoder<'a> {
    fn new(reader: &'a Reader, layout: &'a Layout) -> Self {
        let g = &layout.geometry;
        Self {
            payload: &reader.payload,
            tree: &reader.tree,
            precision: reader.header.precision,
            radius: (reader.header.intervals / 2) as i32,
            mean: reader.header.mean,
            layout,
            codes: vec![0; g.block_elements],
            cells: vec![0.0; g.block_elements],
            padded: vec![0.0; g.padded_len()],
        }
    }

    /// Reconstruct all `B³` cells of block `idx` in traversal order.
    fn decode(&mut self, idx: usize) -> Result<&[f32]> {
        let layout = self.layout;
        let g = &layout.geometry;
        let b = g.block_size;
        let (start, len) = layout.streams[idx];
        self.tree.decode_into(&self.payload[start..start + len], &mut self.codes)?;

        let first = layout.outlier_offsets[idx];
        let expected = layout.block_outliers[idx] as usize;
        let mut outliers = layout.outliers[first..first + expected].iter().copied();
        let mut next_outlier = || {
            outliers
                .next()
                .ok_or_else(|| SzError::Corrupt(format!("block {idx} has more escapes than recorded outliers")))
        };

        match PredictorMode::from_bit(layout.modes[idx]) {
            PredictorMode::Regression => {
                let coefficients = layout.coefficients[layout.coeff_index[idx]];
                let mut n = 0;
                for ii in 0..b {
                    for jj in 0..b {
                        for kk in 0..b {
                            let code = self.codes[n];
                            self.cells[n] = if code == ESCAPE_CODE {
                                next_outlier()?
                            } else {
                                reconstruct(coefficients.predict(ii, jj, kk), code, self.radius, self.precision)
                            };
                            n += 1;
                        }
                    }
                }
            }
            PredictorMode::Lorenzo => {
                self.padded.fill(0.0);
                let (dim0, dim1) = (g.pad_dim0_offset, g.pad_dim1_offset);
                let mut n = 0;
                for ii in 0..b {
                    for jj in 0..b {
                        let row = g.padded_index(ii, jj, 0);
                        for pos in row..row + b {
                            let code = self.codes[n];
                            let value = match (code, self.mean) {
                                (ESCAPE_CODE, _) => next_outlier()?,
                                (MEAN_CODE, Some(mean)) => mean,
                                _ => reconstruct(lorenzo(&self.padded, pos, dim0, dim1), code, self.radius, self.precision),
                            };
                            self.padded[pos] = value;
                            self.cells[n] = value;
                            n += 1;
                        }
                    }
                }
            }
        }
        if outliers.next().is_some() {
            return Err(SzError::Corrupt(format!(
                "block {idx} recorded {expected} outliers but used fewer"
            )));
        }
        Ok(&self.cells)
    }
}

/// Per-block statistics, available once the extents are known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStats {
    pub dims: [usize; 3],
    pub num_blocks: usize,
    pub regression_blocks: usize,
    pub lorenzo_blocks: usize,
    pub total_outliers: usize,
    pub coefficient_bytes: usize,
    pub outlier_bytes: usize,
    pub stream_bytes: usize,
}

/// Summary of a container, produced without reconstructing any sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerInfo {
    pub version: u8,
    pub codec_id: u8,
    pub codec: String,
    pub random_access: bool,
    pub checksum: bool,
    pub stored_bytes: usize,
    pub payload_bytes: usize,
    pub num_elements: usize,
    pub block_size: usize,
    pub precision: f64,
    pub intervals: u32,
    pub use_mean: bool,
    pub mean: Option<f32>,
    pub tree_bytes: usize,
    pub tree_nodes: usize,
    pub blocks: Option<BlockStats>,
}

/// Reconstruct a full volume. `dims` must describe exactly three non-zero
/// extents; anything else is reported as an unsupported dimensionality.
pub fn decompress(bytes: &[u8], codec: Option<Arc<dyn LosslessCodec>>, dims: &[usize]) -> Result<Vec<f32>> {
    Reader::open(bytes, codec)?.decompress(dims)
}

/// Reconstruct the sub-box `[start, end)` of a volume.
pub fn decompress_region(
    bytes: &[u8],
    codec: Option<Arc<dyn LosslessCodec>>,
    dims: &[usize],
    start: &[usize],
    end: &[usize],
) -> Result<Vec<f32>> {
    Reader::open(bytes, codec)?.decompress_region(dims, start, end)
}

/// Summarise a container without reconstructing it.
pub fn inspect(bytes: &[u8], codec: Option<Arc<dyn LosslessCodec>>, dims: Option<&[usize]>) -> Result<ContainerInfo> {
    Reader::open(bytes, codec)?.info(dims)
}
