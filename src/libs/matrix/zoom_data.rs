use std::fmt;
use std::sync::Arc;

use crate::libs::cache::{BlockCache, BlockKey};
use crate::libs::dataset::DatasetReader;
use crate::libs::error::{HicError, Result};
use crate::libs::matrix::codec::decode_block;
use crate::libs::matrix::{Block, BlockLayout, BlockLoader, ContactRecord, LoadTask, Zoom};
use crate::libs::norm::{normalized_count, NormalizationType, NormalizationVector};

/// A stored matrix: chromosome pair in ascending index order plus zoom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatrixKey {
    pub chr1: usize,
    pub chr2: usize,
    pub zoom: Zoom,
}

impl MatrixKey {
    /// Orders the pair so that `chr1 <= chr2`
    pub fn new(chr1: usize, chr2: usize, zoom: Zoom) -> Self {
        MatrixKey {
            chr1: chr1.min(chr2),
            chr2: chr1.max(chr2),
            zoom,
        }
    }

    pub fn is_intra(&self) -> bool {
        self.chr1 == self.chr2
    }
}

impl fmt::Display for MatrixKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}:{}", self.chr1, self.chr2, self.zoom)
    }
}

/// Block store of one chromosome pair at one zoom.
///
/// Decoded blocks go through the injected cache; decoding is fanned out on
/// the shared [`BlockLoader`].
pub struct MatrixZoomData {
    key: MatrixKey,
    identity: Arc<str>,
    layout: BlockLayout,
    version: i32,
    reader: Arc<dyn DatasetReader>,
    cache: Arc<dyn BlockCache>,
    loader: Arc<BlockLoader>,
}

impl fmt::Debug for MatrixZoomData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixZoomData")
            .field("identity", &self.identity)
            .field("layout", &self.layout)
            .finish()
    }
}

impl MatrixZoomData {
    pub fn new(
        dataset_id: &str,
        key: MatrixKey,
        layout: BlockLayout,
        reader: Arc<dyn DatasetReader>,
        cache: Arc<dyn BlockCache>,
        loader: Arc<BlockLoader>,
    ) -> Self {
        MatrixZoomData {
            key,
            identity: Arc::from(format!("{}:{}", dataset_id, key)),
            layout,
            version: reader.version(),
            reader,
            cache,
            loader,
        }
    }

    pub fn key(&self) -> MatrixKey {
        self.key
    }

    pub fn chr1_idx(&self) -> usize {
        self.key.chr1
    }

    pub fn chr2_idx(&self) -> usize {
        self.key.chr2
    }

    pub fn zoom(&self) -> Zoom {
        self.key.zoom
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    /// Cache namespace of this store
    pub fn identity(&self) -> &Arc<str> {
        &self.identity
    }

    pub fn is_intra(&self) -> bool {
        self.key.is_intra()
    }

    /// Block numbers covering the inclusive bin rectangle
    pub fn block_numbers_for_bin_region(&self, bin_x1: i64, bin_x2: i64, bin_y1: i64, bin_y2: i64) -> Vec<i64> {
        self.layout
            .block_numbers([bin_x1, bin_x2, bin_y1, bin_y2], self.is_intra())
    }

    /// Block numbers covering `[x1, x2, y1, y2]` given in base pairs
    pub fn block_numbers_for_region(&self, bounds_bp: [i64; 4]) -> Vec<i64> {
        let bs = self.key.zoom.bin_size() as i64;
        let [x1, x2, y1, y2] = bounds_bp;
        self.block_numbers_for_bin_region(x1 / bs, x2 / bs, y1 / bs, y2 / bs)
    }

    fn vectors(
        &self,
        norm: NormalizationType,
    ) -> Result<Option<(Arc<NormalizationVector>, Arc<NormalizationVector>)>> {
        if norm == NormalizationType::None {
            return Ok(None);
        }
        let fetch = |chr: usize| {
            self.reader
                .normalization_vector(chr, self.key.zoom, norm)
                .ok_or(HicError::NormalizationUnavailable { norm, chr })
        };
        let nv1 = fetch(self.key.chr1)?;
        let nv2 = fetch(self.key.chr2)?;
        Ok(Some((nv1, nv2)))
    }

    /// Blocks covering the bin rectangle, with counts normalized by `norm`.
    ///
    /// Fails with `NormalizationUnavailable` before touching any block when a
    /// vector is missing. Blocks absent from storage come back empty.
    pub fn get_blocks(
        &self,
        bin_x1: i64,
        bin_y1: i64,
        bin_x2: i64,
        bin_y2: i64,
        norm: NormalizationType,
    ) -> Result<Vec<Arc<Block>>> {
        let vectors = self.vectors(norm)?;

        let mut blocks = vec![];
        let mut tasks = vec![];
        for number in self.block_numbers_for_bin_region(bin_x1, bin_x2, bin_y1, bin_y2) {
            let key = BlockKey::new(self.identity.clone(), number, norm);
            if let Some(block) = self.cache.get(&key) {
                blocks.push(block);
                continue;
            }

            let reader = self.reader.clone();
            let cache = self.cache.clone();
            let vectors = vectors.clone();
            let matrix = self.key;
            let version = self.version;
            tasks.push(LoadTask::new(number, move || {
                let mut records = read_records(reader.as_ref(), &matrix, number, version)?;
                if let Some((nv1, nv2)) = &vectors {
                    records = normalize_records(records, nv1, nv2);
                }
                let block = Arc::new(Block::new(number, records));
                cache.put(key, block.clone());
                Ok(block)
            }));
        }

        if !tasks.is_empty() {
            blocks.extend(self.loader.load_all(tasks).blocks);
        }
        Ok(blocks)
    }

    /// Like [`get_blocks`](Self::get_blocks), but serves raw counts when the
    /// vector is missing. Returns the normalization actually applied.
    pub fn get_blocks_with_fallback(
        &self,
        bin_x1: i64,
        bin_y1: i64,
        bin_x2: i64,
        bin_y2: i64,
        norm: NormalizationType,
    ) -> Result<(Vec<Arc<Block>>, NormalizationType)> {
        match self.get_blocks(bin_x1, bin_y1, bin_x2, bin_y2, norm) {
            Ok(blocks) => Ok((blocks, norm)),
            Err(HicError::NormalizationUnavailable { norm, chr }) => {
                log::debug!(
                    "{} missing for chromosome {}, serving raw counts of {}",
                    norm,
                    chr,
                    self.identity
                );
                let blocks = self.get_blocks(
                    bin_x1,
                    bin_y1,
                    bin_x2,
                    bin_y2,
                    NormalizationType::None,
                )?;
                Ok((blocks, NormalizationType::None))
            }
            Err(e) => Err(e),
        }
    }

    /// One block of raw counts, decoded on the calling thread
    pub fn raw_block(&self, number: i64) -> Result<Arc<Block>> {
        let key = BlockKey::new(self.identity.clone(), number, NormalizationType::None);
        if let Some(block) = self.cache.get(&key) {
            return Ok(block);
        }
        let records = read_records(self.reader.as_ref(), &self.key, number, self.version)?;
        let block = Arc::new(Block::new(number, records));
        self.cache.put(key, block.clone());
        Ok(block)
    }

    /// Every raw record of the matrix. Undecodable blocks are logged and skipped.
    pub fn contact_record_list(&self) -> Vec<ContactRecord> {
        let mut records = vec![];
        for number in self.reader.block_numbers(&self.key) {
            match self.raw_block(number) {
                Ok(block) => records.extend_from_slice(block.records()),
                Err(e) => log::warn!("Skipping block {} of {}: {}", number, self.identity, e),
            }
        }
        records
    }

    /// Count of a single cell; zero when no record exists
    pub fn observed_value(&self, bin_x: i32, bin_y: i32, norm: NormalizationType) -> Result<f32> {
        let (x, y) = if self.is_intra() && bin_y < bin_x {
            (bin_y, bin_x)
        } else {
            (bin_x, bin_y)
        };
        let number = self.layout.block_number(x, y);
        let blocks = self.get_blocks(x as i64, y as i64, x as i64, y as i64, norm)?;
        let value = blocks
            .iter()
            .filter(|b| b.number() == number)
            .flat_map(|b| b.records())
            .find(|r| r.bin_x == x && r.bin_y == y)
            .map(|r| r.counts)
            .unwrap_or(0.0);
        Ok(value)
    }
}

fn read_records(
    reader: &dyn DatasetReader,
    matrix: &MatrixKey,
    number: i64,
    version: i32,
) -> Result<Vec<ContactRecord>> {
    match reader.read_raw_block(matrix, number)? {
        Some(bytes) => decode_block(number, &bytes, version),
        None => Ok(vec![]),
    }
}

/// Normalized copies of `records`; cells that cannot be normalized are dropped
fn normalize_records(
    records: Vec<ContactRecord>,
    nv1: &NormalizationVector,
    nv2: &NormalizationVector,
) -> Vec<ContactRecord> {
    records
        .into_iter()
        .filter_map(|r| {
            let counts = normalized_count(r.counts, nv1, nv2, r.bin_x, r.bin_y);
            if counts.is_nan() {
                None
            } else {
                Some(ContactRecord::new(r.bin_x, r.bin_y, counts))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::cache::LruBlockCache;
    use crate::libs::config::StoreConfig;
    use crate::libs::matrix::Chromosome;
    use crate::libs::memory::MemoryReader;

    fn store(with_vector: bool) -> MatrixZoomData {
        let zoom = Zoom::bp(10).unwrap();
        let mut builder = MemoryReader::builder(vec![
            Chromosome::new(0, "All", 200),
            Chromosome::new(1, "chr1", 200),
        ])
        .block_bin_count(5)
        .zoom(zoom)
        .records(
            1,
            1,
            zoom,
            vec![
                ContactRecord::new(0, 0, 4.0),
                ContactRecord::new(1, 3, 2.0),
                ContactRecord::new(12, 2, 6.0),
            ],
        );
        if with_vector {
            builder = builder.normalization_vector(NormalizationVector::new(
                NormalizationType::Vc,
                1,
                zoom,
                vec![2.0; 21],
            ));
        }
        let reader: Arc<dyn DatasetReader> = Arc::new(builder.build().unwrap());
        let layout = reader.matrix_layout(&MatrixKey::new(1, 1, zoom)).unwrap();
        MatrixZoomData::new(
            "test",
            MatrixKey::new(1, 1, zoom),
            layout,
            reader,
            Arc::new(LruBlockCache::new(16)),
            Arc::new(BlockLoader::new(&StoreConfig::default()).unwrap()),
        )
    }

    #[test]
    fn test_matrix_key_orders_pair() {
        let zoom = Zoom::bp(10).unwrap();
        let key = MatrixKey::new(3, 1, zoom);
        assert_eq!((key.chr1, key.chr2), (1, 3));
        assert!(!key.is_intra());
        assert_eq!(key.to_string(), "1_3:BP_10");
    }

    #[test]
    fn test_observed_value() {
        let zd = store(false);
        assert_eq!(zd.observed_value(3, 1, NormalizationType::None).unwrap(), 2.0);
        assert_eq!(zd.observed_value(2, 12, NormalizationType::None).unwrap(), 6.0);
        assert_eq!(zd.observed_value(5, 5, NormalizationType::None).unwrap(), 0.0);
    }

    #[test]
    fn test_missing_vector() {
        let zd = store(false);
        let err = zd.get_blocks(0, 0, 4, 4, NormalizationType::Kr).unwrap_err();
        assert!(matches!(
            err,
            HicError::NormalizationUnavailable {
                norm: NormalizationType::Kr,
                chr: 1
            }
        ));

        let (blocks, applied) = zd
            .get_blocks_with_fallback(0, 0, 4, 4, NormalizationType::Kr)
            .unwrap();
        assert_eq!(applied, NormalizationType::None);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_normalized_counts() {
        let zd = store(true);
        assert_eq!(zd.observed_value(0, 0, NormalizationType::Vc).unwrap(), 1.0);
        assert_eq!(zd.observed_value(1, 3, NormalizationType::Vc).unwrap(), 0.5);
    }

    #[test]
    fn test_record_list() {
        let zd = store(false);
        let mut records = zd.contact_record_list();
        records.sort_by_key(|r| (r.bin_y, r.bin_x));
        assert_eq!(records.len(), 3);
        // stored upper-triangular
        assert_eq!(records[2], ContactRecord::new(2, 12, 6.0));
    }
}
