use std::cmp::Ordering;

/// A contiguous interval `[start, end)` on chromosome `chr`.
///
/// Used in base pairs when custom chromosomes are declared and in bins once a
/// zoom is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotifAnchor {
    pub chr: usize,
    pub start: i64,
    pub end: i64,
}

impl MotifAnchor {
    pub fn new(chr: usize, start: i64, end: i64) -> Self {
        MotifAnchor { chr, start, end }
    }

    pub fn width(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, pos: i64) -> bool {
        pos >= self.start && pos < self.end
    }

    /// Overlap with the inclusive query `[lo, hi]`
    pub fn intersects(&self, lo: i64, hi: i64) -> bool {
        self.start <= hi && self.end > lo
    }

    /// Converts a base-pair anchor to the bins it touches.
    pub fn to_bins(&self, bin_size: u32) -> MotifAnchor {
        let bs = bin_size as i64;
        let end = if self.end > self.start {
            (self.end - 1) / bs + 1
        } else {
            self.start / bs
        };
        MotifAnchor::new(self.chr, self.start / bs, end)
    }
}

impl PartialOrd for MotifAnchor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MotifAnchor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chr
            .cmp(&other.chr)
            .then(self.start.cmp(&other.start))
            .then(self.end.cmp(&other.end))
    }
}

/// A source region and the place it occupies in a custom chromosome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionMapping {
    pub source: MotifAnchor,
    pub translated: MotifAnchor,
}

impl RegionMapping {
    pub fn new(source: MotifAnchor, translated: MotifAnchor) -> Self {
        RegionMapping { source, translated }
    }

    /// `translatedOffset + (bin - sourceOffset)` for bins inside the source region
    pub fn to_translated(&self, bin: i64) -> Option<i64> {
        if self.source.contains(bin) {
            Some(self.translated.start + (bin - self.source.start))
        } else {
            None
        }
    }

    pub fn to_source(&self, bin: i64) -> Option<i64> {
        if self.translated.contains(bin) {
            Some(self.source.start + (bin - self.translated.start))
        } else {
            None
        }
    }

    /// Source bins covered by the part of `[lo, hi]` (translated, inclusive)
    /// that falls inside this mapping.
    pub fn source_span(&self, lo: i64, hi: i64) -> Option<(i64, i64)> {
        let t_lo = lo.max(self.translated.start);
        let t_hi = hi.min(self.translated.end - 1);
        if t_lo > t_hi {
            return None;
        }
        Some((
            self.source.start + (t_lo - self.translated.start),
            self.source.start + (t_hi - self.translated.start),
        ))
    }
}

/// X and Y mappings used to remap the contacts of one source block.
///
/// `x` and `y` are in source-matrix order (ascending chromosome index).
/// `transposed` records that the custom X axis maps to the source Y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionPair {
    pub x: RegionMapping,
    pub y: RegionMapping,
    pub transposed: bool,
}

impl RegionPair {
    /// Orders a custom (X, Y) region combination the way source matrices are keyed.
    ///
    /// Swaps when X's source chromosome index is greater than Y's, or, on the
    /// same chromosome, when X starts after Y.
    pub fn canonical(x: RegionMapping, y: RegionMapping) -> Self {
        let swap = match x.source.chr.cmp(&y.source.chr) {
            Ordering::Less => false,
            Ordering::Greater => true,
            Ordering::Equal => x.source.start > y.source.start,
        };
        if swap {
            RegionPair {
                x: y,
                y: x,
                transposed: true,
            }
        } else {
            RegionPair {
                x,
                y,
                transposed: false,
            }
        }
    }

    pub fn source_chromosomes(&self) -> (usize, usize) {
        (self.x.source.chr, self.y.source.chr)
    }
}
