/// A single observed contact between two bins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactRecord {
    pub bin_x: i32,
    pub bin_y: i32,
    pub counts: f32,
}

impl ContactRecord {
    pub fn new(bin_x: i32, bin_y: i32, counts: f32) -> Self {
        ContactRecord {
            bin_x,
            bin_y,
            counts,
        }
    }

    /// Mirrors the record so that `bin_x <= bin_y`
    pub fn upper_triangular(self) -> Self {
        if self.bin_y < self.bin_x {
            ContactRecord::new(self.bin_y, self.bin_x, self.counts)
        } else {
            self
        }
    }
}

/// A numbered tile of contacts of one (chromosome pair, zoom) matrix.
///
/// An absent block is an empty block, never a missing value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    number: i64,
    records: Vec<ContactRecord>,
}

impl Block {
    pub fn new(number: i64, records: Vec<ContactRecord>) -> Self {
        Block { number, records }
    }

    pub fn empty(number: i64) -> Self {
        Block {
            number,
            records: Vec::new(),
        }
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn records(&self) -> &[ContactRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ContactRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
