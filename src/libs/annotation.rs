//! 2D features (loops, domains, peaks) keyed by chromosome pair.

use anyhow::anyhow;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::io::BufRead;

use crate::libs::error::HicError;
use crate::libs::matrix::ChromosomeHandler;

/// Unknown chromosome names reported per file
const MAX_REPORTED_UNKNOWN: usize = 100;

/// A rectangle in the matrix of `(chr1, chr2)`, with `chr1 <= chr2`
#[derive(Debug, Clone, PartialEq)]
pub struct Feature2D {
    pub feature_type: String,
    pub chr1: usize,
    pub start1: i64,
    pub end1: i64,
    pub chr2: usize,
    pub start2: i64,
    pub end2: i64,
    pub color: Option<String>,
    pub attributes: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct Feature2DList {
    features: BTreeMap<(usize, usize), Vec<Feature2D>>,
}

impl Feature2DList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, feature: Feature2D) {
        self.features
            .entry((feature.chr1, feature.chr2))
            .or_default()
            .push(feature);
    }

    /// Features of a chromosome pair, in either order
    pub fn get(&self, chr1: usize, chr2: usize) -> &[Feature2D] {
        self.features
            .get(&(chr1.min(chr2), chr1.max(chr2)))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.features.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.features.values().all(|v| v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature2D> {
        self.features.values().flatten()
    }
}

/// Feature type implied by the file name
pub fn feature_type(source_name: &str) -> &'static str {
    if source_name.ends_with("_blocks.txt") {
        "Contact domain"
    } else if source_name.ends_with("_peaks.txt") {
        "Peak"
    } else {
        "Feature"
    }
}

fn parse_coord(token: &str, line_no: usize) -> anyhow::Result<i64> {
    token
        .trim()
        .parse::<i64>()
        .map_err(|_| anyhow!(HicError::parse(line_no, format!("invalid coordinate {}", token))))
}

/// Reads a tab-delimited loop list:
/// `chr1 x1 x2 chr2 y1 y2 [color] [attributes...]` under a header line.
///
/// Rows naming chromosomes unknown to `handler` are skipped.
///
/// ```
/// use hicmx::libs::annotation::load_loop_list;
/// use hicmx::libs::matrix::{Chromosome, ChromosomeHandler};
///
/// let handler = ChromosomeHandler::new(vec![
///     Chromosome::new(0, "chr1", 1000),
///     Chromosome::new(1, "chr2", 1000),
/// ]).unwrap();
/// let text = "chr1\tx1\tx2\tchr2\ty1\ty2\tcolor\tscore\n\
///             2\t10\t20\t1\t30\t40\t255,0,0\t7.5\n";
/// let list = load_loop_list(text.as_bytes(), "loops.txt", &handler).unwrap();
/// let f = &list.get(0, 1)[0];
/// assert_eq!((f.chr1, f.start1, f.chr2, f.start2), (0, 30, 1, 10));
/// assert_eq!(f.attributes["score"], "7.5");
/// ```
pub fn load_loop_list<R: BufRead>(
    reader: R,
    source_name: &str,
    handler: &ChromosomeHandler,
) -> anyhow::Result<Feature2DList> {
    let kind = feature_type(source_name);
    let mut list = Feature2DList::new();
    let mut lines = reader.lines();

    let header: Vec<String> = match lines.next() {
        Some(line) => line?.split('\t').map(|s| s.trim().to_string()).collect(),
        None => return Ok(list),
    };

    let mut unknown = 0;
    for (i, line) in lines.enumerate() {
        let line_no = i + 2;
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() > header.len() {
            return Err(anyhow!(HicError::parse(
                line_no,
                format!("{} columns but the header has {}", fields.len(), header.len())
            )));
        }
        if fields.len() < 6 {
            continue;
        }

        let (Some(c1), Some(c2)) = (handler.get_by_name(fields[0].trim()), handler.get_by_name(fields[3].trim()))
        else {
            if unknown < MAX_REPORTED_UNKNOWN {
                log::debug!("Skipping line {} of {}: unknown chromosome", line_no, source_name);
            }
            unknown += 1;
            continue;
        };

        let (start1, end1) = (parse_coord(fields[1], line_no)?, parse_coord(fields[2], line_no)?);
        let (start2, end2) = (parse_coord(fields[4], line_no)?, parse_coord(fields[5], line_no)?);
        let color = fields
            .get(6)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let attributes = fields
            .iter()
            .enumerate()
            .skip(7)
            .map(|(k, v)| (header[k].clone(), v.trim().to_string()))
            .collect();

        // stored under the ascending chromosome pair
        let feature = if c1.index <= c2.index {
            Feature2D {
                feature_type: kind.to_string(),
                chr1: c1.index,
                start1,
                end1,
                chr2: c2.index,
                start2,
                end2,
                color,
                attributes,
            }
        } else {
            Feature2D {
                feature_type: kind.to_string(),
                chr1: c2.index,
                start1: start2,
                end1: end2,
                chr2: c1.index,
                start2: start1,
                end2: end1,
                color,
                attributes,
            }
        };
        list.add(feature);
    }

    if unknown > 0 {
        log::debug!("{} rows of {} name unknown chromosomes", unknown, source_name);
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::matrix::Chromosome;

    fn handler() -> ChromosomeHandler {
        ChromosomeHandler::new(vec![
            Chromosome::new(0, "All", 2000),
            Chromosome::new(1, "chr1", 1000),
            Chromosome::new(2, "chrX", 1000),
        ])
        .unwrap()
    }

    #[test]
    fn test_load() {
        let text = "chr1\tx1\tx2\tchr2\ty1\ty2\n\
                    1\t100\t200\tchr1\t300\t400\n\
                    chr7\t1\t2\tchr1\t3\t4\n\
                    short\trow\n\
                    X\t5\t6\tX\t7\t8\n";
        let list = load_loop_list(text.as_bytes(), "sample_blocks.txt", &handler()).unwrap();
        assert_eq!(list.len(), 2);
        let f = &list.get(1, 1)[0];
        assert_eq!(f.feature_type, "Contact domain");
        assert_eq!((f.start1, f.end2), (100, 400));
        assert!(f.color.is_none());
        assert_eq!(list.get(2, 2).len(), 1);
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let text = "a\tb\tc\td\te\tf\n1\t1\t2\t1\tx\t4\n";
        let err = load_loop_list(text.as_bytes(), "f.txt", &handler()).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let text = "a\tb\tc\td\te\tf\n1\t1\t2\t1\t3\t4\t0,0,0\n";
        assert!(load_loop_list(text.as_bytes(), "f.txt", &handler()).is_err());
    }

    #[test]
    fn test_feature_type() {
        assert_eq!(feature_type("a_peaks.txt"), "Peak");
        assert_eq!(feature_type("loops.bedpe"), "Feature");
    }
}
