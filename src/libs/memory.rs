//! In-memory [`DatasetReader`].

use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::libs::dataset::DatasetReader;
use crate::libs::error::{HicError, Result};
use crate::libs::matrix::codec::encode_block;
use crate::libs::matrix::{BlockLayout, Chromosome, ContactRecord, MatrixKey, Zoom};
use crate::libs::norm::{ExpectedValueFunction, NormalizationType, NormalizationVector};

/// Latest block layout revision
pub const DEFAULT_VERSION: i32 = 9;

/// Bins per block side unless the builder says otherwise
pub const DEFAULT_BLOCK_BIN_COUNT: i32 = 1000;

#[derive(Debug, Clone)]
struct MemoryMatrix {
    layout: BlockLayout,
    blocks: BTreeMap<i64, Vec<u8>>,
}

type VectorKey = (NormalizationType, usize, Zoom);

#[derive(Debug, Clone)]
pub struct MemoryReader {
    version: i32,
    chromosomes: Vec<Chromosome>,
    zooms: Vec<Zoom>,
    matrices: HashMap<MatrixKey, MemoryMatrix>,
    vectors: IndexMap<VectorKey, Arc<NormalizationVector>>,
    expected: IndexMap<String, ExpectedValueFunction>,
    norm_file_position: u64,
}

impl MemoryReader {
    pub fn builder(chromosomes: Vec<Chromosome>) -> MemoryReaderBuilder {
        MemoryReaderBuilder {
            version: DEFAULT_VERSION,
            chromosomes,
            zooms: vec![],
            block_bin_count: DEFAULT_BLOCK_BIN_COUNT,
            records: vec![],
            raw_blocks: vec![],
            vectors: vec![],
            expected: vec![],
            norm_file_position: 0,
        }
    }
}

impl DatasetReader for MemoryReader {
    fn version(&self) -> i32 {
        self.version
    }

    fn chromosomes(&self) -> Vec<Chromosome> {
        self.chromosomes.clone()
    }

    fn zooms(&self) -> Vec<Zoom> {
        self.zooms.clone()
    }

    fn matrix_layout(&self, key: &MatrixKey) -> Option<BlockLayout> {
        self.matrices.get(key).map(|m| m.layout)
    }

    fn block_numbers(&self, key: &MatrixKey) -> Vec<i64> {
        self.matrices
            .get(key)
            .map(|m| m.blocks.keys().copied().collect())
            .unwrap_or_default()
    }

    fn read_raw_block(&self, key: &MatrixKey, block_number: i64) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self
            .matrices
            .get(key)
            .and_then(|m| m.blocks.get(&block_number))
            .cloned())
    }

    fn normalization_vector(
        &self,
        chr_idx: usize,
        zoom: Zoom,
        norm: NormalizationType,
    ) -> Option<Arc<NormalizationVector>> {
        self.vectors.get(&(norm, chr_idx, zoom)).cloned()
    }

    fn stored_normalization_vectors(&self) -> Vec<Arc<NormalizationVector>> {
        self.vectors.values().cloned().collect()
    }

    fn expected_value_functions(&self) -> IndexMap<String, ExpectedValueFunction> {
        self.expected.clone()
    }

    fn norm_file_position(&self) -> u64 {
        self.norm_file_position
    }
}

pub struct MemoryReaderBuilder {
    version: i32,
    chromosomes: Vec<Chromosome>,
    zooms: Vec<Zoom>,
    block_bin_count: i32,
    records: Vec<(usize, usize, Zoom, Vec<ContactRecord>)>,
    raw_blocks: Vec<(MatrixKey, i64, Vec<u8>)>,
    vectors: Vec<NormalizationVector>,
    expected: Vec<ExpectedValueFunction>,
    norm_file_position: u64,
}

impl MemoryReaderBuilder {
    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn block_bin_count(mut self, block_bin_count: i32) -> Self {
        self.block_bin_count = block_bin_count;
        self
    }

    pub fn zoom(mut self, zoom: Zoom) -> Self {
        self.zooms.push(zoom);
        self
    }

    /// Contacts of one chromosome pair; pairs given in descending order are flipped
    pub fn records(mut self, chr1: usize, chr2: usize, zoom: Zoom, records: Vec<ContactRecord>) -> Self {
        self.records.push((chr1, chr2, zoom, records));
        self
    }

    /// Stores `bytes` verbatim as a block, replacing what the records produced
    pub fn raw_block(mut self, key: MatrixKey, block_number: i64, bytes: Vec<u8>) -> Self {
        self.raw_blocks.push((key, block_number, bytes));
        self
    }

    pub fn normalization_vector(mut self, vector: NormalizationVector) -> Self {
        self.vectors.push(vector);
        self
    }

    pub fn expected_value_function(mut self, function: ExpectedValueFunction) -> Self {
        self.expected.push(function);
        self
    }

    pub fn norm_file_position(mut self, position: u64) -> Self {
        self.norm_file_position = position;
        self
    }

    pub fn build(self) -> Result<MemoryReader> {
        if self.block_bin_count <= 0 {
            return Err(HicError::config("block_bin_count must be positive"));
        }

        let mut pending: HashMap<MatrixKey, Vec<ContactRecord>> = HashMap::new();
        for (chr1, chr2, zoom, records) in self.records {
            for chr in [chr1, chr2] {
                if chr >= self.chromosomes.len() {
                    return Err(HicError::invalid(format!("Unknown chromosome index {}", chr)));
                }
            }
            let key = MatrixKey::new(chr1, chr2, zoom);
            let entry = pending.entry(key).or_default();
            for r in records {
                let r = if chr1 > chr2 {
                    ContactRecord::new(r.bin_y, r.bin_x, r.counts)
                } else {
                    r
                };
                entry.push(if key.is_intra() { r.upper_triangular() } else { r });
            }
        }

        let mut matrices = HashMap::new();
        for (key, records) in pending {
            let bins = |chr: usize| self.chromosomes[chr].bin_count(key.zoom.bin_size());
            let max_record_bin = records
                .iter()
                .map(|r| r.bin_x.max(r.bin_y).max(0) as u64 + 1)
                .max()
                .unwrap_or(0);
            let max_bins = bins(key.chr1).max(bins(key.chr2)).max(max_record_bin);
            let layout = BlockLayout::for_bins(self.block_bin_count, max_bins);

            let mut blocks = BTreeMap::new();
            let grouped = records
                .into_iter()
                .into_group_map_by(|r| layout.block_number(r.bin_x, r.bin_y));
            for (number, mut block_records) in grouped {
                block_records.sort_by_key(|r| (r.bin_y, r.bin_x));
                blocks.insert(number, encode_block(&block_records, self.version)?);
            }
            matrices.insert(key, MemoryMatrix { layout, blocks });
        }

        for (key, number, bytes) in self.raw_blocks {
            let max_bins = [key.chr1, key.chr2]
                .iter()
                .filter_map(|chr| self.chromosomes.get(*chr))
                .map(|c| c.bin_count(key.zoom.bin_size()))
                .max()
                .unwrap_or(1);
            let layout = BlockLayout::for_bins(self.block_bin_count, max_bins);
            matrices
                .entry(key)
                .or_insert_with(|| MemoryMatrix {
                    layout,
                    blocks: BTreeMap::new(),
                })
                .blocks
                .insert(number, bytes);
        }

        let vectors = self
            .vectors
            .into_iter()
            .map(|v| ((v.norm(), v.chr_idx(), v.zoom()), Arc::new(v)))
            .collect();
        let expected = self.expected.into_iter().map(|f| (f.key(), f)).collect();

        Ok(MemoryReader {
            version: self.version,
            chromosomes: self.chromosomes,
            zooms: self.zooms,
            matrices,
            vectors,
            expected,
            norm_file_position: self.norm_file_position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_tiles_records() {
        let zoom = Zoom::bp(10).unwrap();
        let reader = MemoryReader::builder(vec![
            Chromosome::new(0, "All", 20),
            Chromosome::new(1, "chr1", 100),
            Chromosome::new(2, "chr2", 50),
        ])
        .block_bin_count(4)
        .records(
            2,
            1,
            zoom,
            vec![ContactRecord::new(0, 9, 1.0), ContactRecord::new(4, 0, 2.0)],
        )
        .build()
        .unwrap();

        let key = MatrixKey::new(1, 2, zoom);
        let layout = reader.matrix_layout(&key).unwrap();
        assert_eq!(layout.block_column_count, 3);
        // flipped to (chr1, chr2) order: (9, 0) and (0, 4)
        assert_eq!(reader.block_numbers(&key), vec![2, 3]);
        assert!(reader.read_raw_block(&key, 0).unwrap().is_none());
    }

    #[test]
    fn test_builder_rejects_unknown_chromosome() {
        let zoom = Zoom::bp(10).unwrap();
        let res = MemoryReader::builder(vec![Chromosome::new(0, "chr1", 100)])
            .records(0, 5, zoom, vec![])
            .build();
        assert!(res.is_err());
    }
}
