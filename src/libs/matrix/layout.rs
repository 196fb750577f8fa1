use std::collections::BTreeSet;

/// Tiling of one matrix into square blocks of `block_bin_count` bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub block_bin_count: i32,
    pub block_column_count: i32,
}

impl BlockLayout {
    pub fn new(block_bin_count: i32, block_column_count: i32) -> Self {
        BlockLayout {
            block_bin_count: block_bin_count.max(1),
            block_column_count: block_column_count.max(1),
        }
    }

    /// Layout covering `max_bins` bins on either axis
    pub fn for_bins(block_bin_count: i32, max_bins: u64) -> Self {
        let bbc = block_bin_count.max(1) as u64;
        let columns = (max_bins / bbc + 1).min(i32::MAX as u64) as i32;
        Self::new(block_bin_count, columns)
    }

    pub fn block_number(&self, bin_x: i32, bin_y: i32) -> i64 {
        let col = (bin_x / self.block_bin_count) as i64;
        let row = (bin_y / self.block_bin_count) as i64;
        row * self.block_column_count as i64 + col
    }

    fn tile(&self, bin: i64) -> i64 {
        (bin.max(0) / self.block_bin_count as i64).min(self.block_column_count as i64 - 1)
    }

    /// Minimal set of block numbers covering the inclusive bin rectangle
    /// `[x1, x2] x [y1, y2]`, sorted.
    ///
    /// Intra-chromosome matrices only store the upper triangle, so the
    /// transposed rectangle is covered too.
    pub fn block_numbers(&self, bins: [i64; 4], intra: bool) -> Vec<i64> {
        let [x1, x2, y1, y2] = bins;
        let (col1, col2) = (self.tile(x1.min(x2)), self.tile(x1.max(x2)));
        let (row1, row2) = (self.tile(y1.min(y2)), self.tile(y1.max(y2)));
        let columns = self.block_column_count as i64;

        let mut set = BTreeSet::new();
        for r in row1..=row2 {
            for c in col1..=col2 {
                set.insert(r * columns + c);
            }
        }
        if intra {
            for r in col1..=col2 {
                for c in row1..=row2 {
                    set.insert(r * columns + c);
                }
            }
        }
        set.into_iter().collect()
    }
}
