use std::collections::HashMap;

use crate::libs::custom::MotifAnchor;
use crate::libs::error::{HicError, Result};

/// Name of the whole-genome pseudo-chromosome
pub const ALL_CHROMOSOME: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chromosome {
    pub index: usize,
    pub name: String,
    pub length: u64,
}

impl Chromosome {
    pub fn new(index: usize, name: &str, length: u64) -> Self {
        Chromosome {
            index,
            name: name.to_string(),
            length,
        }
    }

    /// `length / bin_size + 1`, the trailing partial bin included
    pub fn bin_count(&self, bin_size: u32) -> u64 {
        self.length / bin_size as u64 + 1
    }

    pub fn is_whole_genome(&self) -> bool {
        self.name.eq_ignore_ascii_case(ALL_CHROMOSOME)
    }
}

/// Chromosome registry of one dataset plus the custom chromosomes stitched on top of it
#[derive(Debug, Clone, Default)]
pub struct ChromosomeHandler {
    chromosomes: Vec<Chromosome>,
    custom: HashMap<usize, Vec<MotifAnchor>>,
}

impl ChromosomeHandler {
    /// Chromosome indices must match their position in `chromosomes`.
    pub fn new(chromosomes: Vec<Chromosome>) -> Result<Self> {
        for (i, chr) in chromosomes.iter().enumerate() {
            if chr.index != i {
                return Err(HicError::invalid(format!(
                    "Chromosome {} has index {}, expected {}",
                    chr.name, chr.index, i
                )));
            }
        }
        Ok(ChromosomeHandler {
            chromosomes,
            custom: HashMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Chromosome> {
        self.chromosomes.get(index)
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    /// Chromosomes stored in the dataset, in index order, without `All` and
    /// without custom chromosomes.
    pub fn real_chromosomes(&self) -> impl Iterator<Item = &Chromosome> {
        self.chromosomes
            .iter()
            .filter(move |c| !c.is_whole_genome() && !self.is_custom(c.index))
    }

    /// Case-insensitive lookup; a `chr` prefix on either side is ignored.
    pub fn get_by_name(&self, token: &str) -> Option<&Chromosome> {
        let token = token.to_lowercase();
        self.chromosomes.iter().find(|chr| {
            let name = chr.name.to_lowercase();
            token == name || format!("chr{}", token) == name || token == format!("chr{}", name)
        })
    }

    pub fn is_custom(&self, index: usize) -> bool {
        self.custom.contains_key(&index)
    }

    /// Base-pair regions of a custom chromosome, in declaration order
    pub fn custom_regions(&self, index: usize) -> Option<&[MotifAnchor]> {
        self.custom.get(&index).map(|v| v.as_slice())
    }

    /// Registers a synthetic chromosome made of `regions` (base pairs).
    ///
    /// Returns the new chromosome's index.
    pub fn add_custom_chromosome(&mut self, name: &str, regions: Vec<MotifAnchor>) -> Result<usize> {
        if regions.is_empty() {
            return Err(HicError::invalid(format!("Custom chromosome {} has no regions", name)));
        }
        if self.get_by_name(name).is_some() {
            return Err(HicError::invalid(format!("Chromosome {} already exists", name)));
        }
        for region in &regions {
            if region.width() <= 0 {
                return Err(HicError::invalid(format!(
                    "Empty region {}:{}-{} in {}",
                    region.chr, region.start, region.end, name
                )));
            }
            if self.get(region.chr).is_none() || self.is_custom(region.chr) {
                return Err(HicError::invalid(format!(
                    "Region of {} refers to unknown chromosome {}",
                    name, region.chr
                )));
            }
        }

        let length = regions.iter().map(|r| r.width() as u64).sum();
        let index = self.chromosomes.len();
        self.chromosomes.push(Chromosome::new(index, name, length));
        self.custom.insert(index, regions);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> ChromosomeHandler {
        ChromosomeHandler::new(vec![
            Chromosome::new(0, "All", 300),
            Chromosome::new(1, "chr1", 100),
            Chromosome::new(2, "2", 200),
        ])
        .unwrap()
    }

    #[test]
    fn test_name_matching() {
        let h = handler();
        assert_eq!(h.get_by_name("CHR1").unwrap().index, 1);
        assert_eq!(h.get_by_name("1").unwrap().index, 1);
        assert_eq!(h.get_by_name("chr2").unwrap().index, 2);
        assert_eq!(h.get_by_name("2").unwrap().index, 2);
        assert!(h.get_by_name("chr3").is_none());
    }

    #[test]
    fn test_custom_chromosome() {
        let mut h = handler();
        let idx = h
            .add_custom_chromosome(
                "stitch",
                vec![MotifAnchor::new(2, 100, 150), MotifAnchor::new(1, 0, 20)],
            )
            .unwrap();
        assert_eq!(idx, 3);
        assert_eq!(h.get(3).unwrap().length, 70);
        assert!(h.is_custom(3));
        assert_eq!(h.custom_regions(3).unwrap().len(), 2);

        let real: Vec<usize> = h.real_chromosomes().map(|c| c.index).collect();
        assert_eq!(real, vec![1, 2]);
    }

    #[test]
    fn test_custom_chromosome_rejects() {
        let mut h = handler();
        assert!(h.add_custom_chromosome("x", vec![]).is_err());
        assert!(h
            .add_custom_chromosome("x", vec![MotifAnchor::new(7, 0, 10)])
            .is_err());
        assert!(h
            .add_custom_chromosome("chr1", vec![MotifAnchor::new(1, 0, 10)])
            .is_err());
        assert!(h
            .add_custom_chromosome("x", vec![MotifAnchor::new(1, 10, 10)])
            .is_err());
    }

    #[test]
    fn test_bin_count() {
        let chr = Chromosome::new(1, "chr1", 100);
        assert_eq!(chr.bin_count(50), 3);
        assert_eq!(Chromosome::new(2, "chr2", 150).bin_count(50), 4);
    }
}
