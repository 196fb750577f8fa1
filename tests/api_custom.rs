use hicmx::libs::cache::BlockCache;
use hicmx::libs::config::StoreConfig;
use hicmx::libs::custom::MotifAnchor;
use hicmx::libs::dataset::{Dataset, ZoomData};
use hicmx::libs::matrix::{Block, Chromosome, ContactRecord, Zoom};
use hicmx::libs::memory::MemoryReader;
use hicmx::libs::norm::NormalizationType;
use std::collections::BTreeMap;
use std::sync::Arc;

const BINS: i32 = 101;

fn intra_count(x: i32, y: i32) -> f32 {
    let (x, y) = (x.min(y), x.max(y));
    (x * 1000 + y + 1) as f32
}

fn inter_count(x: i32, y: i32) -> f32 {
    (200_000 + x * 1000 + y) as f32
}

/// chr1 and chr2 of 1000 bp at 10 bp bins, every cell filled with a unique count
fn dataset() -> Dataset {
    let zoom = Zoom::bp(10).unwrap();
    let mut intra = vec![];
    let mut inter = vec![];
    for x in 0..BINS {
        for y in 0..BINS {
            if x <= y {
                intra.push(ContactRecord::new(x, y, intra_count(x, y)));
            }
            inter.push(ContactRecord::new(x, y, inter_count(x, y)));
        }
    }
    let reader = MemoryReader::builder(vec![
        Chromosome::new(0, "All", 2000),
        Chromosome::new(1, "chr1", 1000),
        Chromosome::new(2, "chr2", 1000),
    ])
    .block_bin_count(16)
    .zoom(zoom)
    .records(1, 1, zoom, intra)
    .records(1, 2, zoom, inter)
    .build()
    .unwrap();
    Dataset::open("stitched", Arc::new(reader), &StoreConfig::default()).unwrap()
}

fn cells(blocks: &[Arc<Block>]) -> BTreeMap<(i32, i32), Vec<f32>> {
    let mut map: BTreeMap<(i32, i32), Vec<f32>> = BTreeMap::new();
    for r in blocks.iter().flat_map(|b| b.records()) {
        map.entry((r.bin_x, r.bin_y)).or_default().push(r.counts);
    }
    map
}

#[test]
fn straddling_query_partitions_contacts() {
    let mut ds = dataset();
    let zoom = Zoom::bp(10).unwrap();
    // widths 10 and 20 bins; the later region is declared first
    let custom = ds
        .add_custom_chromosome(
            "stitch",
            vec![MotifAnchor::new(1, 500, 700), MotifAnchor::new(1, 0, 100)],
        )
        .unwrap();

    let zd = ds.custom_zoom_data(custom, custom, zoom).unwrap();
    assert_eq!(zd.x_index().bin_count(), 30);

    let blocks = zd.get_blocks(0, 0, 29, 29, NormalizationType::None).unwrap();
    assert!(blocks.iter().all(|b| b.number() < 0));
    let found = cells(&blocks);

    let source = |t: i32| if t < 10 { t } else { 50 + (t - 10) };
    for a in 0..30 {
        for b in a..30 {
            let counts = found.get(&(a, b)).unwrap_or_else(|| panic!("missing ({}, {})", a, b));
            assert_eq!(counts, &vec![intra_count(source(a), source(b))], "cell ({}, {})", a, b);
        }
    }
    // folded onto the upper triangle, nothing else
    assert_eq!(found.len(), 30 * 31 / 2);
}

#[test]
fn custom_against_real_chromosome() {
    let mut ds = dataset();
    let zoom = Zoom::bp(10).unwrap();
    // chr2 bins [0, 5) and chr1 bins [10, 20); sorted, chr1 comes first
    let custom = ds
        .add_custom_chromosome(
            "mix",
            vec![MotifAnchor::new(2, 0, 50), MotifAnchor::new(1, 100, 200)],
        )
        .unwrap();

    let Some(ZoomData::Custom(zd)) = ds.zoom_data(1, custom, zoom).unwrap() else {
        panic!("expected a stitched view");
    };
    let blocks = zd.get_blocks(0, 0, 100, 14, NormalizationType::None).unwrap();
    let found = cells(&blocks);

    let mut expected = BTreeMap::new();
    for x in 0..BINS {
        for t in 0..15 {
            let count = if t < 10 {
                intra_count(x, 10 + t)
            } else {
                inter_count(x, t - 10)
            };
            expected.insert((x, t), vec![count]);
        }
    }
    assert_eq!(found, expected);
}

#[test]
fn missing_source_matrix_is_skipped() {
    let mut ds = dataset();
    let zoom = Zoom::bp(10).unwrap();
    // chr2 x chr2 is not stored
    let custom = ds
        .add_custom_chromosome("lonely", vec![MotifAnchor::new(2, 0, 100)])
        .unwrap();

    let zd = ds.custom_zoom_data(custom, custom, zoom).unwrap();
    let blocks = zd.get_blocks(0, 0, 9, 9, NormalizationType::None).unwrap();
    assert!(blocks.is_empty());
}

#[test]
fn stitched_blocks_are_cached_under_their_own_keys() {
    let mut ds = dataset();
    let zoom = Zoom::bp(10).unwrap();
    let custom = ds
        .add_custom_chromosome("twice", vec![MotifAnchor::new(1, 0, 160)])
        .unwrap();

    let zd = ds.custom_zoom_data(custom, custom, zoom).unwrap();
    let first = zd.get_blocks(0, 0, 15, 15, NormalizationType::None).unwrap();
    let cached = ds.cache().len();
    assert!(cached > 0);

    let again = zd.get_blocks(0, 0, 15, 15, NormalizationType::None).unwrap();
    assert_eq!(ds.cache().len(), cached);
    assert_eq!(cells(&first), cells(&again));

    // the stored chr1 view is untouched by the stitched entries
    let stored = ds.matrix_zoom_data(1, 1, zoom).unwrap();
    let raw = stored.get_blocks(0, 0, 15, 15, NormalizationType::None).unwrap();
    assert_eq!(cells(&raw), cells(&first));
}
