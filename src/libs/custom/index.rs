use crate::libs::custom::{MotifAnchor, RegionMapping};
use crate::libs::error::{HicError, Result};

/// Ordered, gap-free mappings of one chromosome's bin axis.
///
/// Translated regions are disjoint and sorted, so a query is two binary
/// searches over the region ends and starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialRegionIndex {
    chr: usize,
    mappings: Vec<RegionMapping>,
}

impl SpatialRegionIndex {
    /// A real chromosome: one region mapping every bin onto itself
    pub fn identity(chr: usize, bin_count: i64) -> Self {
        let region = MotifAnchor::new(chr, 0, bin_count.max(1));
        SpatialRegionIndex {
            chr,
            mappings: vec![RegionMapping::new(region, region)],
        }
    }

    /// A custom chromosome `chr` from base-pair `regions`.
    ///
    /// Regions are sorted (stable, so equal regions keep their input order)
    /// and laid end to end starting at bin 0.
    pub fn from_regions(chr: usize, regions: &[MotifAnchor], bin_size: u32) -> Result<Self> {
        if regions.is_empty() {
            return Err(HicError::invalid(format!(
                "Custom chromosome {} has no regions",
                chr
            )));
        }

        let mut sources: Vec<MotifAnchor> = regions.iter().map(|r| r.to_bins(bin_size)).collect();
        sources.sort();

        let mut offset = 0;
        let mut mappings = Vec::with_capacity(sources.len());
        for source in sources {
            let translated = MotifAnchor::new(chr, offset, offset + source.width());
            offset = translated.end;
            mappings.push(RegionMapping::new(source, translated));
        }

        Ok(SpatialRegionIndex { chr, mappings })
    }

    pub fn chr(&self) -> usize {
        self.chr
    }

    pub fn mappings(&self) -> &[RegionMapping] {
        &self.mappings
    }

    /// Bins of the translated axis
    pub fn bin_count(&self) -> i64 {
        self.mappings.last().map(|m| m.translated.end).unwrap_or(0)
    }

    /// Mappings whose translated region overlaps the inclusive range `[lo, hi]`
    pub fn intersecting(&self, lo: i64, hi: i64) -> &[RegionMapping] {
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        let first = self.mappings.partition_point(|m| m.translated.end <= lo);
        let last = self.mappings.partition_point(|m| m.translated.start <= hi);
        if first >= last {
            &[]
        } else {
            &self.mappings[first..last]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> SpatialRegionIndex {
        // bin size 10: widths 10, 20 and 5 bins
        SpatialRegionIndex::from_regions(
            9,
            &[
                MotifAnchor::new(2, 0, 200),
                MotifAnchor::new(1, 500, 600),
                MotifAnchor::new(2, 300, 350),
            ],
            10,
        )
        .unwrap()
    }

    #[test]
    fn test_prefix_sum_layout() {
        let idx = index();
        let translated: Vec<(i64, i64)> = idx
            .mappings()
            .iter()
            .map(|m| (m.translated.start, m.translated.end))
            .collect();
        assert_eq!(translated, vec![(0, 10), (10, 30), (30, 35)]);
        assert_eq!(idx.mappings()[0].source, MotifAnchor::new(1, 50, 60));
        assert_eq!(idx.bin_count(), 35);
    }

    #[test]
    fn test_intersecting() {
        let idx = index();
        assert_eq!(idx.intersecting(0, 9).len(), 1);
        // boundary bins are inclusive
        assert_eq!(idx.intersecting(9, 10).len(), 2);
        assert_eq!(idx.intersecting(12, 31).len(), 2);
        assert_eq!(idx.intersecting(31, 12).len(), 2);
        assert_eq!(idx.intersecting(0, 100).len(), 3);
        assert!(idx.intersecting(35, 40).is_empty());
    }

    #[test]
    fn test_identity() {
        let idx = SpatialRegionIndex::identity(3, 11);
        let m = idx.intersecting(4, 4)[0];
        assert_eq!(m.to_translated(4), Some(4));
        assert_eq!(idx.bin_count(), 11);
        assert!(SpatialRegionIndex::from_regions(3, &[], 10).is_err());
    }
}
