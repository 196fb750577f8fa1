use indexmap::IndexMap;
use std::collections::BTreeMap;

use crate::libs::config::BalanceConfig;
use crate::libs::dataset::Dataset;
use crate::libs::error::{HicError, Result};
use crate::libs::matrix::{ChromosomeHandler, ContactRecord, Zoom};
use crate::libs::norm::{
    DistanceBinning, ExpectedValueCalculation, NormalizationCalculations, NormalizationType,
    NormalizationVector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayoutEntry {
    chr_idx: usize,
    offset: u64,
    bins: u64,
}

/// Contiguous bin offsets of the real chromosomes in index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeWideLayout {
    zoom: Zoom,
    entries: Vec<LayoutEntry>,
    total_bins: u64,
}

impl GenomeWideLayout {
    /// Fails with `GenomeTooLarge` when the genome does not fit `i32` bins
    pub fn new(handler: &ChromosomeHandler, zoom: Zoom) -> Result<Self> {
        let mut entries = vec![];
        let mut offset = 0u64;
        for chr in handler.real_chromosomes() {
            let bins = chr.bin_count(zoom.bin_size());
            entries.push(LayoutEntry {
                chr_idx: chr.index,
                offset,
                bins,
            });
            offset += bins;
        }
        if offset > i32::MAX as u64 {
            return Err(HicError::GenomeTooLarge { zoom, bins: offset });
        }
        Ok(GenomeWideLayout {
            zoom,
            entries,
            total_bins: offset,
        })
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn total_bins(&self) -> u64 {
        self.total_bins
    }

    pub fn offset(&self, chr_idx: usize) -> Option<u64> {
        self.entry(chr_idx).map(|e| e.offset)
    }

    pub fn bins(&self, chr_idx: usize) -> Option<u64> {
        self.entry(chr_idx).map(|e| e.bins)
    }

    pub fn chromosomes(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|e| e.chr_idx)
    }

    fn entry(&self, chr_idx: usize) -> Option<&LayoutEntry> {
        self.entries.iter().find(|e| e.chr_idx == chr_idx)
    }

    /// Cuts a genome-wide vector back into per-chromosome vectors
    pub fn split(&self, vector: &[f64], norm: NormalizationType) -> IndexMap<usize, NormalizationVector> {
        self.entries
            .iter()
            .map(|e| {
                let start = (e.offset as usize).min(vector.len());
                let end = ((e.offset + e.bins) as usize).min(vector.len());
                (
                    e.chr_idx,
                    NormalizationVector::new(norm, e.chr_idx, self.zoom, vector[start..end].to_vec()),
                )
            })
            .collect()
    }
}

/// Vectors of one normalization at one zoom and the matching expected values
pub struct NormalizationResult {
    pub norm: NormalizationType,
    pub zoom: Zoom,
    pub vectors: IndexMap<usize, NormalizationVector>,
    pub expected: ExpectedValueCalculation,
    /// Chromosomes whose matrix could not be normalized
    pub failed: Vec<usize>,
}

/// Moves a record by the pair's genome-wide offsets; `None` past `i32` bins
fn shift_record(r: &ContactRecord, off1: u64, off2: u64) -> Option<ContactRecord> {
    let bin_x = r.bin_x.checked_add(i32::try_from(off1).ok()?)?;
    let bin_y = r.bin_y.checked_add(i32::try_from(off2).ok()?)?;
    Some(ContactRecord::new(bin_x, bin_y, r.counts))
}

fn collect_records(dataset: &Dataset, layout: &GenomeWideLayout, include_intra: bool) -> Vec<Vec<ContactRecord>> {
    let chromosomes: Vec<usize> = layout.chromosomes().collect();
    let mut lists = vec![];
    for (i, &chr1) in chromosomes.iter().enumerate() {
        for &chr2 in &chromosomes[i..] {
            if chr1 == chr2 && !include_intra {
                continue;
            }
            let zd = match dataset.matrix_zoom_data(chr1, chr2, layout.zoom()) {
                Some(zd) => zd,
                None => continue,
            };
            let (Some(off1), Some(off2)) = (layout.offset(chr1), layout.offset(chr2)) else {
                continue;
            };
            let list = zd.contact_record_list();
            let records: Vec<ContactRecord> = list
                .iter()
                .filter_map(|r| shift_record(r, off1, off2))
                .collect();
            if records.len() < list.len() {
                log::warn!(
                    "Dropped {} records of {}-{} beyond the genome-wide bin range",
                    list.len() - records.len(),
                    chr1,
                    chr2
                );
            }
            if !records.is_empty() {
                lists.push(records);
            }
        }
    }
    lists
}

/// Contact lists of every chromosome pair shifted into genome-wide bins.
///
/// Intra-chromosome pairs are included only with `include_intra`.
pub fn build_genome_wide_records(
    dataset: &Dataset,
    zoom: Zoom,
    include_intra: bool,
) -> Result<Vec<Vec<ContactRecord>>> {
    let layout = GenomeWideLayout::new(dataset.handler(), zoom)?;
    Ok(collect_records(dataset, &layout, include_intra))
}

fn add_intra_distances(
    dataset: &Dataset,
    zoom: Zoom,
    chr_idx: usize,
    vector: &NormalizationVector,
    expected: &mut ExpectedValueCalculation,
) {
    let Some(zd) = dataset.matrix_zoom_data(chr_idx, chr_idx, zoom) else {
        return;
    };
    for r in zd.contact_record_list() {
        if let (Some(vx), Some(vy)) = (vector.value(r.bin_x as i64), vector.value(r.bin_y as i64)) {
            expected.add_distance(chr_idx, r.bin_x, r.bin_y, r.counts as f64 / (vx * vy));
        }
    }
}

/// Balances the whole genome at once and splits the result per chromosome.
///
/// `Ok(None)` when the genome-wide matrix cannot be normalized.
pub fn compute_genome_wide_vectors(
    dataset: &Dataset,
    zoom: Zoom,
    norm: NormalizationType,
    balance: &BalanceConfig,
    binning: DistanceBinning,
) -> Result<Option<NormalizationResult>> {
    if !norm.is_genome_wide() {
        return Err(HicError::invalid(format!("{} is not a genome-wide normalization", norm)));
    }

    let layout = GenomeWideLayout::new(dataset.handler(), zoom)?;
    let lists = collect_records(dataset, &layout, norm.includes_intra());
    let calc = NormalizationCalculations::new(&lists, layout.total_bins() as usize);
    let Some(vector) = calc.compute_vector(norm, balance) else {
        log::warn!("{} failed at {}: matrix cannot be balanced", norm, zoom);
        return Ok(None);
    };

    let vectors = layout.split(&vector, norm);
    let mut expected = ExpectedValueCalculation::new(dataset.handler(), zoom, norm, binning);
    for (chr_idx, nv) in &vectors {
        add_intra_distances(dataset, zoom, *chr_idx, nv, &mut expected);
    }

    Ok(Some(NormalizationResult {
        norm,
        zoom,
        vectors,
        expected,
        failed: vec![],
    }))
}

/// Normalizes each intra-chromosome matrix on its own.
///
/// A chromosome that cannot be normalized is listed in `failed`; the others
/// are unaffected.
pub fn compute_chromosome_vectors(
    dataset: &Dataset,
    zoom: Zoom,
    norm: NormalizationType,
    balance: &BalanceConfig,
    binning: DistanceBinning,
) -> Result<NormalizationResult> {
    if norm.is_genome_wide() {
        return Err(HicError::invalid(format!("{} is a genome-wide normalization", norm)));
    }

    let mut vectors = IndexMap::new();
    let mut failed = vec![];
    let mut bins_per_chr = BTreeMap::new();
    let mut accepted = vec![];
    for chr in dataset.handler().real_chromosomes() {
        let Some(zd) = dataset.matrix_zoom_data(chr.index, chr.index, zoom) else {
            log::debug!("No matrix for {} at {}", chr.name, zoom);
            continue;
        };
        let records = zd.contact_record_list();
        // fragment zooms are not derived from the length
        let max_record_bin = records
            .iter()
            .map(|r| r.bin_x.max(r.bin_y).max(0) as u64 + 1)
            .max()
            .unwrap_or(0);
        let bins = chr.bin_count(zoom.bin_size()).max(max_record_bin);
        bins_per_chr.insert(chr.index, bins);

        let lists = vec![records];
        let calc = NormalizationCalculations::new(&lists, bins as usize);
        match calc.compute_vector(norm, balance) {
            Some(v) => {
                let nv = NormalizationVector::new(norm, chr.index, zoom, v);
                accepted.push((chr.index, lists));
                vectors.insert(chr.index, nv);
            }
            None => {
                log::warn!("{} failed for {} at {}", norm, chr.name, zoom);
                failed.push(chr.index);
            }
        }
    }

    let mut expected = ExpectedValueCalculation::with_bins(bins_per_chr, zoom, norm, binning);
    for (chr_idx, lists) in accepted {
        let nv = &vectors[&chr_idx];
        for r in lists.iter().flatten() {
            if let (Some(vx), Some(vy)) = (nv.value(r.bin_x as i64), nv.value(r.bin_y as i64)) {
                expected.add_distance(chr_idx, r.bin_x, r.bin_y, r.counts as f64 / (vx * vy));
            }
        }
    }

    Ok(NormalizationResult {
        norm,
        zoom,
        vectors,
        expected,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::matrix::Chromosome;

    #[test]
    fn test_prefix_sum_offsets() {
        let handler = ChromosomeHandler::new(vec![
            Chromosome::new(0, "All", 250),
            Chromosome::new(1, "chr1", 100),
            Chromosome::new(2, "chr2", 150),
        ])
        .unwrap();
        let layout = GenomeWideLayout::new(&handler, Zoom::bp(50).unwrap()).unwrap();
        assert_eq!(layout.bins(1), Some(3));
        assert_eq!(layout.bins(2), Some(4));
        assert_eq!(layout.offset(1), Some(0));
        assert_eq!(layout.offset(2), Some(3));
        assert_eq!(layout.total_bins(), 7);
        assert!(layout.offset(0).is_none());

        let split = layout.split(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], NormalizationType::GwKr);
        assert_eq!(split[&1].data(), &[1.0, 2.0, 3.0]);
        assert_eq!(split[&2].data(), &[4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_shift_record_drops_overflow() {
        let r = ContactRecord::new(2, 5, 1.5);
        assert_eq!(shift_record(&r, 10, 20), Some(ContactRecord::new(12, 25, 1.5)));

        let edge = ContactRecord::new(i32::MAX, 0, 1.0);
        assert_eq!(shift_record(&edge, 0, 3), Some(ContactRecord::new(i32::MAX, 3, 1.0)));
        assert!(shift_record(&edge, 1, 0).is_none());
        assert!(shift_record(&r, 0, i32::MAX as u64 + 1).is_none());
    }

    #[test]
    fn test_genome_too_large() {
        let handler = ChromosomeHandler::new(vec![
            Chromosome::new(0, "chr1", 3_000_000_000),
            Chromosome::new(1, "chr2", 3_000_000_000),
        ])
        .unwrap();
        let err = GenomeWideLayout::new(&handler, Zoom::bp(1).unwrap()).unwrap_err();
        assert!(matches!(err, HicError::GenomeTooLarge { bins: 6_000_000_002, .. }));
    }
}
