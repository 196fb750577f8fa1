use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::Path;

use crate::libs::config::NormUpdateConfig;
use crate::libs::dataset::Dataset;
use crate::libs::error::{HicError, Result};
use crate::libs::matrix::{Unit, Zoom};
use crate::libs::norm::footer::{update_file, NormVectorBuffer};
use crate::libs::norm::{
    compute_chromosome_vectors, compute_genome_wide_vectors, ExpectedValueFunction, NormalizationResult,
    NormalizationType,
};

/// Genome-wide vectors are never computed below this resolution
pub const MIN_GENOME_WIDE_RESOLUTION: u32 = 10_000;

/// Outcome of a batch pass; failed units never abort the others
#[derive(Debug, Clone, Default)]
pub struct NormUpdateReport {
    /// (zoom, normalization) units that produced vectors
    pub computed: Vec<(Zoom, NormalizationType)>,
    /// Pre-existing vectors written back unchanged
    pub carried_over: usize,
    pub failures: Vec<String>,
}

impl NormUpdateReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// New footer contents
#[derive(Debug, Clone)]
pub struct NormUpdate {
    pub buffer: NormVectorBuffer,
    pub expected: IndexMap<String, ExpectedValueFunction>,
    pub report: NormUpdateReport,
}

struct Collector {
    buffer: NormVectorBuffer,
    expected: IndexMap<String, ExpectedValueFunction>,
    written: HashSet<(NormalizationType, usize, Zoom)>,
    report: NormUpdateReport,
}

impl Collector {
    fn accept(&mut self, result: NormalizationResult) {
        for nv in result.vectors.values() {
            self.buffer.add(nv);
            self.written.insert((nv.norm(), nv.chr_idx(), nv.zoom()));
        }
        if result.expected.has_data() {
            let function = result.expected.compute_function();
            self.expected.insert(function.key(), function);
        }
        for chr in &result.failed {
            self.report.failures.push(format!(
                "{} at {}: chromosome {} cannot be normalized",
                result.norm, result.zoom, chr
            ));
        }
        log::info!(
            "{} at {}: {} vectors",
            result.norm,
            result.zoom,
            result.vectors.len()
        );
        self.report.computed.push((result.zoom, result.norm));
    }

    fn fail(&mut self, zoom: Zoom, norm: NormalizationType, reason: String) {
        log::warn!("{} at {} failed: {}", norm, zoom, reason);
        self.report
            .failures
            .push(format!("{} at {}: {}", norm, zoom, reason));
    }
}

fn wants_genome_wide(zoom: Zoom, config: &NormUpdateConfig) -> bool {
    config.genome_wide_resolution >= MIN_GENOME_WIDE_RESOLUTION
        && zoom.unit() == Unit::Bp
        && zoom.bin_size() >= config.genome_wide_resolution
}

/// Recomputes vectors and expected values for every zoom of `dataset`.
///
/// Expected functions of the NONE normalization are dropped. Stored vectors
/// that were not recomputed are carried over.
pub fn add_genome_wide_norms(dataset: &Dataset, config: &NormUpdateConfig) -> Result<NormUpdate> {
    config.validate()?;
    let reader = dataset.reader();

    let mut collector = Collector {
        buffer: NormVectorBuffer::new(dataset.version()),
        expected: reader
            .expected_value_functions()
            .into_iter()
            .filter(|(_, f)| f.norm != NormalizationType::None)
            .collect(),
        written: HashSet::new(),
        report: NormUpdateReport::default(),
    };

    for zoom in dataset.zooms().to_vec() {
        if wants_genome_wide(zoom, config) {
            for norm in NormalizationType::genome_wide() {
                match compute_genome_wide_vectors(dataset, zoom, norm, &config.balance, config.binning) {
                    Ok(Some(result)) => collector.accept(result),
                    Ok(None) => collector.fail(zoom, norm, "matrix cannot be balanced".to_string()),
                    Err(e @ HicError::GenomeTooLarge { .. }) => {
                        // every genome-wide type at this zoom would fail the same way
                        collector.fail(zoom, norm, e.to_string());
                        break;
                    }
                    Err(e) => collector.fail(zoom, norm, e.to_string()),
                }
            }
        }

        for &norm in &config.chromosome_norms {
            match compute_chromosome_vectors(dataset, zoom, norm, &config.balance, config.binning) {
                Ok(result) => collector.accept(result),
                Err(e) => collector.fail(zoom, norm, e.to_string()),
            }
        }
    }

    for nv in reader.stored_normalization_vectors() {
        if !collector
            .written
            .contains(&(nv.norm(), nv.chr_idx(), nv.zoom()))
        {
            collector.buffer.add(&nv);
            collector.report.carried_over += 1;
        }
    }

    Ok(NormUpdate {
        buffer: collector.buffer,
        expected: collector.expected,
        report: collector.report,
    })
}

/// Runs [`add_genome_wide_norms`] and rewrites the footer of the file at `path`
pub fn update_norm_footer(path: &Path, dataset: &Dataset, config: &NormUpdateConfig) -> anyhow::Result<NormUpdateReport> {
    let update = add_genome_wide_norms(dataset, config)?;
    let position = dataset.reader().norm_file_position();
    let written = update_file(path, position, &update.buffer, &update.expected)?;

    log::info!(
        "Wrote {} vectors and {} expected functions ({} bytes) to {}",
        update.buffer.len(),
        update.expected.len(),
        written,
        path.display()
    );
    if !update.report.is_complete() {
        log::warn!("{} units failed", update.report.failures.len());
    }
    Ok(update.report)
}
