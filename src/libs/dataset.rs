//! Reader boundary and the open dataset.

use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::libs::cache::{shared_cache, BlockCache};
use crate::libs::config::StoreConfig;
use crate::libs::custom::{CustomMatrixZoomData, MotifAnchor, SpatialRegionIndex};
use crate::libs::error::{HicError, Result};
use crate::libs::matrix::{
    Block, BlockLayout, BlockLoader, Chromosome, ChromosomeHandler, MatrixKey, MatrixZoomData, Unit,
    Zoom,
};
use crate::libs::norm::{ExpectedValueFunction, NormalizationType, NormalizationVector};

/// What the core needs from the backing matrix file
pub trait DatasetReader: Send + Sync {
    /// File format version; selects the block layout
    fn version(&self) -> i32;

    /// Chromosomes in index order
    fn chromosomes(&self) -> Vec<Chromosome>;

    fn zooms(&self) -> Vec<Zoom>;

    /// Tiling of a stored matrix, `None` when the pair has no matrix at this zoom
    fn matrix_layout(&self, key: &MatrixKey) -> Option<BlockLayout>;

    /// Numbers of every stored block of a matrix
    fn block_numbers(&self, key: &MatrixKey) -> Vec<i64>;

    /// Compressed bytes of a block, `None` when the block is not stored
    fn read_raw_block(&self, key: &MatrixKey, block_number: i64) -> std::io::Result<Option<Vec<u8>>>;

    fn normalization_vector(
        &self,
        chr_idx: usize,
        zoom: Zoom,
        norm: NormalizationType,
    ) -> Option<Arc<NormalizationVector>>;

    /// Every vector currently in the footer
    fn stored_normalization_vectors(&self) -> Vec<Arc<NormalizationVector>>;

    /// Expected-value functions keyed by `UNIT_BINSIZE_NORM`
    fn expected_value_functions(&self) -> IndexMap<String, ExpectedValueFunction>;

    /// Byte offset where the normalization footer starts
    fn norm_file_position(&self) -> u64;
}

/// Stored or stitched view of one chromosome pair at one zoom
#[derive(Debug, Clone)]
pub enum ZoomData {
    Stored(Arc<MatrixZoomData>),
    Custom(Arc<CustomMatrixZoomData>),
}

impl ZoomData {
    pub fn get_blocks(
        &self,
        bin_x1: i64,
        bin_y1: i64,
        bin_x2: i64,
        bin_y2: i64,
        norm: NormalizationType,
    ) -> Result<Vec<Arc<Block>>> {
        match self {
            ZoomData::Stored(zd) => zd.get_blocks(bin_x1, bin_y1, bin_x2, bin_y2, norm),
            ZoomData::Custom(zd) => zd.get_blocks(bin_x1, bin_y1, bin_x2, bin_y2, norm),
        }
    }

    pub fn zoom(&self) -> Zoom {
        match self {
            ZoomData::Stored(zd) => zd.zoom(),
            ZoomData::Custom(zd) => zd.zoom(),
        }
    }
}

pub struct Dataset {
    id: Arc<str>,
    handler: ChromosomeHandler,
    zooms: Vec<Zoom>,
    reader: Arc<dyn DatasetReader>,
    cache: Arc<dyn BlockCache>,
    loader: Arc<BlockLoader>,
    matrices: Mutex<HashMap<MatrixKey, Arc<MatrixZoomData>>>,
    customs: Mutex<HashMap<MatrixKey, Arc<CustomMatrixZoomData>>>,
}

impl Dataset {
    pub fn open(id: &str, reader: Arc<dyn DatasetReader>, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Self::with_cache(id, reader, shared_cache(config), config)
    }

    /// Opens a dataset on a caller-provided cache, which may be shared with
    /// other datasets.
    pub fn with_cache(
        id: &str,
        reader: Arc<dyn DatasetReader>,
        cache: Arc<dyn BlockCache>,
        config: &StoreConfig,
    ) -> Result<Self> {
        let handler = ChromosomeHandler::new(reader.chromosomes())?;

        // BP resolutions first, then FRAG, each coarse to fine
        let mut zooms = reader.zooms();
        zooms.sort_by(|a, b| {
            a.unit()
                .cmp(&b.unit())
                .then(b.bin_size().cmp(&a.bin_size()))
        });
        zooms.dedup();

        log::debug!(
            "Opened {}: {} chromosomes, {} zooms",
            id,
            handler.len(),
            zooms.len()
        );
        Ok(Dataset {
            id: Arc::from(id),
            handler,
            zooms,
            reader,
            cache,
            loader: Arc::new(BlockLoader::new(config)?),
            matrices: Mutex::new(HashMap::new()),
            customs: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> i32 {
        self.reader.version()
    }

    pub fn handler(&self) -> &ChromosomeHandler {
        &self.handler
    }

    pub fn reader(&self) -> &Arc<dyn DatasetReader> {
        &self.reader
    }

    pub fn cache(&self) -> &Arc<dyn BlockCache> {
        &self.cache
    }

    pub fn zooms(&self) -> &[Zoom] {
        &self.zooms
    }

    pub fn zooms_of(&self, unit: Unit) -> impl Iterator<Item = Zoom> + '_ {
        self.zooms.iter().copied().filter(move |z| z.unit() == unit)
    }

    /// Registers a custom chromosome from base-pair regions; returns its index
    pub fn add_custom_chromosome(&mut self, name: &str, regions: Vec<MotifAnchor>) -> Result<usize> {
        self.handler.add_custom_chromosome(name, regions)
    }

    /// Store of a real chromosome pair, `None` when the file has no such matrix
    pub fn matrix_zoom_data(&self, chr1: usize, chr2: usize, zoom: Zoom) -> Option<Arc<MatrixZoomData>> {
        let key = MatrixKey::new(chr1, chr2, zoom);
        if self.handler.is_custom(key.chr1) || self.handler.is_custom(key.chr2) {
            return None;
        }

        let mut matrices = self.matrices.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(zd) = matrices.get(&key) {
            return Some(zd.clone());
        }
        let layout = self.reader.matrix_layout(&key)?;
        let zd = Arc::new(MatrixZoomData::new(
            &self.id,
            key,
            layout,
            self.reader.clone(),
            self.cache.clone(),
            self.loader.clone(),
        ));
        matrices.insert(key, zd.clone());
        Some(zd)
    }

    /// Assembler over a pair where at least one side may be a custom chromosome.
    ///
    /// Every stored matrix between the source chromosomes is registered; pairs
    /// without a matrix are left out.
    pub fn custom_zoom_data(&self, chr1: usize, chr2: usize, zoom: Zoom) -> Result<Arc<CustomMatrixZoomData>> {
        let key = MatrixKey::new(chr1, chr2, zoom);
        {
            let customs = self.customs.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(zd) = customs.get(&key) {
                return Ok(zd.clone());
            }
        }

        let x_index = Arc::new(self.region_index(key.chr1, zoom)?);
        let y_index = if key.is_intra() {
            x_index.clone()
        } else {
            Arc::new(self.region_index(key.chr2, zoom)?)
        };

        let sources: BTreeSet<usize> = x_index
            .mappings()
            .iter()
            .chain(y_index.mappings())
            .map(|m| m.source.chr)
            .collect();

        let mut zd = CustomMatrixZoomData::new(
            &self.id,
            key,
            x_index,
            y_index,
            self.cache.clone(),
            self.loader.clone(),
        );
        for &a in &sources {
            for &b in sources.range(a..) {
                if let Some(store) = self.matrix_zoom_data(a, b, zoom) {
                    zd.register_source(store);
                }
            }
        }

        let zd = Arc::new(zd);
        let mut customs = self.customs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(customs.entry(key).or_insert(zd).clone())
    }

    /// Stored view for real pairs, stitched view when a custom chromosome is involved
    pub fn zoom_data(&self, chr1: usize, chr2: usize, zoom: Zoom) -> Result<Option<ZoomData>> {
        for chr in [chr1, chr2] {
            if self.handler.get(chr).is_none() {
                return Err(HicError::invalid(format!("Unknown chromosome index {}", chr)));
            }
        }
        if self.handler.is_custom(chr1) || self.handler.is_custom(chr2) {
            Ok(Some(ZoomData::Custom(self.custom_zoom_data(chr1, chr2, zoom)?)))
        } else {
            Ok(self.matrix_zoom_data(chr1, chr2, zoom).map(ZoomData::Stored))
        }
    }

    fn region_index(&self, chr: usize, zoom: Zoom) -> Result<SpatialRegionIndex> {
        let chromosome = self
            .handler
            .get(chr)
            .ok_or_else(|| HicError::invalid(format!("Unknown chromosome index {}", chr)))?;
        match self.handler.custom_regions(chr) {
            Some(regions) => SpatialRegionIndex::from_regions(chr, regions, zoom.bin_size()),
            None => Ok(SpatialRegionIndex::identity(
                chr,
                chromosome.bin_count(zoom.bin_size()) as i64,
            )),
        }
    }

    pub fn normalization_vector(
        &self,
        chr_idx: usize,
        zoom: Zoom,
        norm: NormalizationType,
    ) -> Option<Arc<NormalizationVector>> {
        self.reader.normalization_vector(chr_idx, zoom, norm)
    }

    pub fn expected_values(&self, zoom: Zoom, norm: NormalizationType) -> Option<ExpectedValueFunction> {
        let key = ExpectedValueFunction::key_for(zoom, norm);
        self.reader.expected_value_functions().swap_remove(&key)
    }
}
