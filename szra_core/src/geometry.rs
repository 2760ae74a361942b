use crate::error::{Result, SzError};

/// Block partition of an `r1 × r2 × r3` row-major volume (r3 fastest).
///
/// Compressor and decompressor both derive this from the same
/// `(block_size, dims)` pair, so they always agree on block boundaries.
/// The last block on each axis may be under-full; its out-of-range cells
/// are clamped to the last valid index on that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub r1: usize,
    pub r2: usize,
    pub r3: usize,
    pub block_size: usize,
    pub num_x: usize,
    pub num_y: usize,
    pub num_z: usize,
    /// Logical cells per block, `B³`.
    pub block_elements: usize,
    pub num_blocks: usize,
    pub num_elements: usize,
    /// Linear stride of the slowest axis, `r2 * r3`.
    pub dim0_offset: usize,
    /// Linear stride of the middle axis, `r3`.
    pub dim1_offset: usize,
    /// Edge length of the padded prediction buffer, `B + 1`.
    pub pad_edge: usize,
    pub pad_dim0_offset: usize,
    pub pad_dim1_offset: usize,
}

impl Geometry {
    pub fn new(block_size: usize, r1: usize, r2: usize, r3: usize) -> Result<Self> {
        if block_size < 2 {
            return Err(SzError::InvalidConfig(format!(
                "block size must be at least 2, got {block_size}"
            )));
        }
        if r1 == 0 || r2 == 0 || r3 == 0 {
            let rank = [r1, r2, r3].iter().take_while(|&&e| e > 0).count();
            return Err(SzError::UnsupportedDimension(rank));
        }
        let num_elements = r1
            .checked_mul(r2)
            .and_then(|n| n.checked_mul(r3))
            .ok_or_else(|| SzError::InvalidRegion(format!("volume {r1}x{r2}x{r3} overflows usize")))?;
        let num_x = r1.div_ceil(block_size);
        let num_y = r2.div_ceil(block_size);
        let num_z = r3.div_ceil(block_size);
        let pad_edge = block_size + 1;
        Ok(Self {
            r1,
            r2,
            r3,
            block_size,
            num_x,
            num_y,
            num_z,
            block_elements: block_size * block_size * block_size,
            num_blocks: num_x * num_y * num_z,
            num_elements,
            dim0_offset: r2 * r3,
            dim1_offset: r3,
            pad_edge,
            pad_dim0_offset: pad_edge * pad_edge,
            pad_dim1_offset: pad_edge,
        })
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        [self.r1, self.r2, self.r3]
    }

    /// Linear index of block `(i, j, k)` in canonical (x-major) order.
    #[inline]
    pub fn block_index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.num_y + j) * self.num_z + k
    }

    #[inline]
    pub fn block_coords(&self, index: usize) -> (usize, usize, usize) {
        let k = index % self.num_z;
        let j = (index / self.num_z) % self.num_y;
        let i = index / (self.num_z * self.num_y);
        (i, j, k)
    }

    /// Element count of the padded per-block prediction buffer, `(B + 1)³`.
    #[inline]
    pub fn padded_len(&self) -> usize {
        self.pad_edge * self.pad_dim0_offset
    }

    /// Position of logical cell `(ii, jj, kk)` inside the padded buffer; the
    /// one-cell margin sits on the low face of every axis.
    #[inline]
    pub fn padded_index(&self, ii: usize, jj: usize, kk: usize) -> usize {
        (ii + 1) * self.pad_dim0_offset + (jj + 1) * self.pad_dim1_offset + kk + 1
    }

    /// Volume index of local cell `(ii, jj, kk)` of block `(i, j, k)`,
    /// clamped to the last valid plane/row/column on every axis.
    #[inline]
    pub fn source_index(&self, block: (usize, usize, usize), ii: usize, jj: usize, kk: usize) -> usize {
        let x = clamp_axis(block.0 * self.block_size + ii, self.r1);
        let y = clamp_axis(block.1 * self.block_size + jj, self.r2);
        let z = clamp_axis(block.2 * self.block_size + kk, self.r3);
        x * self.dim0_offset + y * self.dim1_offset + z
    }

    /// Copy the `B³` logical cells of a block into `out` in traversal order.
    pub fn gather_block(&self, data: &[f32], block: (usize, usize, usize), out: &mut [f32]) {
        let b = self.block_size;
        let mut n = 0;
        for ii in 0..b {
            for jj in 0..b {
                for kk in 0..b {
                    out[n] = data[self.source_index(block, ii, jj, kk)];
                    n += 1;
                }
            }
        }
    }

    /// Fill the interior of a padded buffer with the block's cells. The margin
    /// cells are zeroed so every block starts from the same neighbourhood.
    pub fn gather_padded(&self, data: &[f32], block: (usize, usize, usize), padded: &mut [f32]) {
        padded.fill(0.0);
        let b = self.block_size;
        for ii in 0..b {
            for jj in 0..b {
                let row = self.padded_index(ii, jj, 0);
                for kk in 0..b {
                    padded[row + kk] = data[self.source_index(block, ii, jj, kk)];
                }
            }
        }
    }

    /// Inclusive block range along one axis covering `[start, end)`.
    #[inline]
    pub fn block_span(&self, start: usize, end: usize) -> (usize, usize) {
        (start / self.block_size, (end - 1) / self.block_size)
    }
}

#[inline]
fn clamp_axis(pos: usize, extent: usize) -> usize {
    pos.min(extent - 1)
}

/// Decompression shapes arrive as a list of extents; only rank 3 is supported.
pub fn shape_from_extents(extents: &[usize]) -> Result<[usize; 3]> {
    let rank = extents.iter().take_while(|&&e| e > 0).count();
    if rank != 3 || extents.len() != 3 {
        return Err(SzError::UnsupportedDimension(rank));
    }
    Ok([extents[0], extents[1], extents[2]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_strides() {
        let g = Geometry::new(6, 13, 12, 7).unwrap();
        assert_eq!((g.num_x, g.num_y, g.num_z), (3, 2, 2));
        assert_eq!(g.num_blocks, 12);
        assert_eq!(g.block_elements, 216);
        assert_eq!(g.num_elements, 13 * 12 * 7);
        assert_eq!(g.dim0_offset, 84);
        assert_eq!(g.dim1_offset, 7);
        assert_eq!(g.padded_len(), 343);
    }

    #[test]
    fn block_index_round_trips() {
        let g = Geometry::new(6, 20, 9, 31).unwrap();
        for idx in 0..g.num_blocks {
            let (i, j, k) = g.block_coords(idx);
            assert_eq!(g.block_index(i, j, k), idx);
        }
    }

    #[test]
    fn edge_block_clamps_to_last_valid_cell() {
        let g = Geometry::new(6, 3, 3, 3).unwrap();
        assert_eq!(g.num_blocks, 1);
        // (5,5,5) clamps to (2,2,2)
        assert_eq!(g.source_index((0, 0, 0), 5, 5, 5), 2 * 9 + 2 * 3 + 2);
        assert_eq!(g.source_index((0, 0, 0), 1, 4, 0), 9 + 2 * 3);

        let data: Vec<f32> = (0..27).map(|v| v as f32).collect();
        let mut block = vec![0.0; g.block_elements];
        g.gather_block(&data, (0, 0, 0), &mut block);
        assert_eq!(block[g.block_elements - 1], 26.0);
    }

    #[test]
    fn padded_margin_is_zero() {
        let g = Geometry::new(4, 4, 4, 4).unwrap();
        let data = vec![1.0f32; 64];
        let mut padded = vec![7.0; g.padded_len()];
        g.gather_padded(&data, (0, 0, 0), &mut padded);
        assert_eq!(padded[0], 0.0);
        assert_eq!(padded[g.padded_index(0, 0, 0)], 1.0);
        assert_eq!(padded.iter().filter(|&&v| v == 1.0).count(), 64);
    }

    #[test]
    fn rejects_non_3d_shapes() {
        assert!(matches!(
            shape_from_extents(&[10, 10]),
            Err(SzError::UnsupportedDimension(2))
        ));
        assert!(matches!(
            shape_from_extents(&[10, 10, 10, 10]),
            Err(SzError::UnsupportedDimension(4))
        ));
        assert_eq!(shape_from_extents(&[4, 5, 6]).unwrap(), [4, 5, 6]);
    }

    #[test]
    fn zero_extent_is_a_lower_rank() {
        assert!(matches!(
            Geometry::new(6, 8, 0, 8),
            Err(SzError::UnsupportedDimension(1))
        ));
        assert!(matches!(
            shape_from_extents(&[8, 0, 8]),
            Err(SzError::UnsupportedDimension(1))
        ));
    }
}
