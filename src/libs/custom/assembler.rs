//! Stitched matrices over custom chromosomes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::libs::cache::{BlockCache, BlockKey};
use crate::libs::custom::{RegionPair, SpatialRegionIndex};
use crate::libs::error::Result;
use crate::libs::matrix::{Block, BlockLoader, ContactRecord, LoadTask, MatrixKey, MatrixZoomData, Zoom};
use crate::libs::norm::NormalizationType;

const CHR_BITS: u32 = 15;
const BLOCK_BITS: u32 = 32;

/// Maps a source block number into the negative id space of stitched blocks.
///
/// `-(1 + (chr1 << 47 | chr2 << 32 | block))` is a bijection for chromosome
/// indices below 2^15 and block numbers in `[0, 2^32)`; results are always
/// negative, so they never alias a stored block. Inputs outside that range
/// give `None`.
///
/// ```
/// use hicmx::libs::custom::resign_block_number;
/// assert_eq!(resign_block_number(0, 0, 0), Some(-1));
/// assert_eq!(resign_block_number(5, 1, 2), Some(-(1 + (1 << 47) + (2 << 32) + 5)));
/// assert_eq!(resign_block_number(-1, 1, 2), None);
/// ```
pub fn resign_block_number(block: i64, chr1: usize, chr2: usize) -> Option<i64> {
    let chr_limit = 1usize << CHR_BITS;
    if chr1 >= chr_limit || chr2 >= chr_limit || !(0..1i64 << BLOCK_BITS).contains(&block) {
        return None;
    }
    let packed = ((chr1 as i64) << (CHR_BITS + BLOCK_BITS)) | ((chr2 as i64) << BLOCK_BITS) | block;
    Some(-(packed + 1))
}

/// Translates the records of a raw source block into custom coordinates.
///
/// Records outside the region pair are dropped. For a source matrix on a
/// single chromosome the stored upper triangle also stands for its mirror,
/// so one record may land in two cells. `custom_intra` folds the output onto
/// `bin_x <= bin_y`.
pub fn remap_block(block: &Block, number: i64, pair: &RegionPair, custom_intra: bool) -> Block {
    let source_intra = pair.x.source.chr == pair.y.source.chr;
    let place = |(tx, ty): (i64, i64)| {
        let (x, y) = if pair.transposed { (ty, tx) } else { (tx, ty) };
        if custom_intra {
            (x.min(y), x.max(y))
        } else {
            (x, y)
        }
    };

    let mut records = vec![];
    for r in block.records() {
        let (sx, sy) = (r.bin_x as i64, r.bin_y as i64);
        let direct = pair
            .x
            .to_translated(sx)
            .zip(pair.y.to_translated(sy))
            .map(place);
        let mirror = if source_intra && sx != sy {
            pair.x
                .to_translated(sy)
                .zip(pair.y.to_translated(sx))
                .map(place)
        } else {
            None
        };

        if let Some((x, y)) = direct {
            records.push(ContactRecord::new(x as i32, y as i32, r.counts));
        }
        if let Some((x, y)) = mirror.filter(|m| direct != Some(*m)) {
            records.push(ContactRecord::new(x as i32, y as i32, r.counts));
        }
    }

    Block::new(number, records)
}

/// Virtual block store of a chromosome pair involving custom chromosomes
pub struct CustomMatrixZoomData {
    key: MatrixKey,
    identity: Arc<str>,
    x_index: Arc<SpatialRegionIndex>,
    y_index: Arc<SpatialRegionIndex>,
    sources: HashMap<(usize, usize), Arc<MatrixZoomData>>,
    cache: Arc<dyn BlockCache>,
    loader: Arc<BlockLoader>,
}

impl fmt::Debug for CustomMatrixZoomData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMatrixZoomData")
            .field("identity", &self.identity)
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl CustomMatrixZoomData {
    /// `key.chr1` is the X axis, `key.chr2` the Y axis
    pub fn new(
        dataset_id: &str,
        key: MatrixKey,
        x_index: Arc<SpatialRegionIndex>,
        y_index: Arc<SpatialRegionIndex>,
        cache: Arc<dyn BlockCache>,
        loader: Arc<BlockLoader>,
    ) -> Self {
        CustomMatrixZoomData {
            key,
            identity: Arc::from(format!("{}:custom:{}", dataset_id, key)),
            x_index,
            y_index,
            sources: HashMap::new(),
            cache,
            loader,
        }
    }

    /// Makes a source matrix available to region pairs on its chromosomes
    pub fn register_source(&mut self, store: Arc<MatrixZoomData>) {
        self.sources
            .insert((store.chr1_idx(), store.chr2_idx()), store);
    }

    pub fn key(&self) -> MatrixKey {
        self.key
    }

    pub fn zoom(&self) -> Zoom {
        self.key.zoom
    }

    pub fn is_intra(&self) -> bool {
        self.key.is_intra()
    }

    pub fn x_index(&self) -> &SpatialRegionIndex {
        &self.x_index
    }

    pub fn y_index(&self) -> &SpatialRegionIndex {
        &self.y_index
    }

    /// Stitched blocks covering the custom bin rectangle.
    ///
    /// Counts are always raw; `norm` only separates cache entries. Region
    /// pairs without a registered source matrix are skipped.
    pub fn get_blocks(
        &self,
        bin_x1: i64,
        bin_y1: i64,
        bin_x2: i64,
        bin_y2: i64,
        norm: NormalizationType,
    ) -> Result<Vec<Arc<Block>>> {
        let x_range = (bin_x1.min(bin_x2), bin_x1.max(bin_x2));
        let y_range = (bin_y1.min(bin_y2), bin_y1.max(bin_y2));
        let bs = self.key.zoom.bin_size() as i64;
        let custom_intra = self.is_intra();

        let mut scheduled = HashSet::new();
        let mut blocks = vec![];
        let mut tasks = vec![];
        for x in self.x_index.intersecting(x_range.0, x_range.1) {
            for y in self.y_index.intersecting(y_range.0, y_range.1) {
                let mut pair = RegionPair::canonical(*x, *y);
                let (range_a, range_b) = if pair.transposed {
                    (y_range, x_range)
                } else {
                    (x_range, y_range)
                };
                // the output is folded, so both orientations yield the same block
                if custom_intra {
                    pair.transposed = false;
                }

                let (chr_a, chr_b) = pair.source_chromosomes();
                let store = match self.sources.get(&(chr_a, chr_b)) {
                    Some(store) => store,
                    None => {
                        log::debug!(
                            "No source matrix {}_{} for {}",
                            chr_a,
                            chr_b,
                            self.identity
                        );
                        continue;
                    }
                };
                let (span_a, span_b) = match (
                    pair.x.source_span(range_a.0, range_a.1),
                    pair.y.source_span(range_b.0, range_b.1),
                ) {
                    (Some(a), Some(b)) => (a, b),
                    _ => continue,
                };

                let numbers = store.block_numbers_for_region([
                    span_a.0 * bs,
                    span_a.1 * bs,
                    span_b.0 * bs,
                    span_b.1 * bs,
                ]);
                for number in numbers {
                    if !scheduled.insert((chr_a, chr_b, number, pair)) {
                        continue;
                    }
                    let resigned = match resign_block_number(number, chr_a, chr_b) {
                        Some(n) => n,
                        None => {
                            log::warn!(
                                "Block {} of {}_{} is outside the stitched id range",
                                number,
                                chr_a,
                                chr_b
                            );
                            continue;
                        }
                    };

                    let key = BlockKey::new(self.identity.clone(), resigned, norm).with_region(pair);
                    if let Some(block) = self.cache.get(&key) {
                        blocks.push(block);
                        continue;
                    }

                    let store = store.clone();
                    let cache = self.cache.clone();
                    tasks.push(LoadTask::new(resigned, move || {
                        let raw = store.raw_block(number)?;
                        let block = Arc::new(remap_block(&raw, resigned, &pair, custom_intra));
                        cache.put(key, block.clone());
                        Ok(block)
                    }));
                }
            }
        }

        if !tasks.is_empty() {
            blocks.extend(self.loader.load_all(tasks).blocks);
        }
        Ok(blocks)
    }
}
