//! Normalization footer layout: vector index, then payloads and expected values.

use anyhow::Context;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::libs::error::{HicError, Result};
use crate::libs::matrix::{Unit, Zoom};
use crate::libs::norm::{DistanceBinning, ExpectedValueFunction, NormalizationType, NormalizationVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormVectorIndexEntry {
    pub norm: NormalizationType,
    pub chr_idx: usize,
    pub zoom: Zoom,
    pub position: i64,
    pub size: i64,
}

/// Serialized vectors waiting to be written; positions are relative to the buffer start
#[derive(Debug, Clone)]
pub struct NormVectorBuffer {
    version: i32,
    data: Vec<u8>,
    entries: Vec<NormVectorIndexEntry>,
}

impl NormVectorBuffer {
    pub fn new(version: i32) -> Self {
        NormVectorBuffer {
            version,
            data: vec![],
            entries: vec![],
        }
    }

    pub fn add(&mut self, vector: &NormalizationVector) {
        let start = self.data.len();
        let values = vector.to_floats();
        if self.version >= 9 {
            self.data.extend_from_slice(&(values.len() as i64).to_le_bytes());
        } else {
            self.data.extend_from_slice(&(values.len() as i32).to_le_bytes());
        }
        for v in values {
            self.data.extend_from_slice(&v.to_le_bytes());
        }
        self.entries.push(NormVectorIndexEntry {
            norm: vector.norm(),
            chr_idx: vector.chr_idx(),
            zoom: vector.zoom(),
            position: start as i64,
            size: (self.data.len() - start) as i64,
        });
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn entries(&self) -> &[NormVectorIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parsed footer
#[derive(Debug, Clone)]
pub struct NormFooter {
    pub entries: Vec<NormVectorIndexEntry>,
    pub vectors: Vec<NormalizationVector>,
    pub expected: IndexMap<String, ExpectedValueFunction>,
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn encode_index(entries: &[NormVectorIndexEntry], base: i64) -> Vec<u8> {
    let mut buf = vec![];
    buf.extend_from_slice(&(entries.len() as i32).to_le_bytes());
    for e in entries {
        put_str(&mut buf, e.norm.label());
        buf.extend_from_slice(&(e.chr_idx as i32).to_le_bytes());
        put_str(&mut buf, e.zoom.unit().as_str());
        buf.extend_from_slice(&(e.zoom.bin_size() as i32).to_le_bytes());
        buf.extend_from_slice(&(base + e.position).to_le_bytes());
        buf.extend_from_slice(&e.size.to_le_bytes());
    }
    buf
}

fn encode_expected(expected: &IndexMap<String, ExpectedValueFunction>) -> Vec<u8> {
    let mut buf = vec![];
    buf.extend_from_slice(&(expected.len() as i32).to_le_bytes());
    for f in expected.values() {
        put_str(&mut buf, f.norm.label());
        put_str(&mut buf, f.zoom.unit().as_str());
        buf.extend_from_slice(&(f.zoom.bin_size() as i32).to_le_bytes());
        match f.binning {
            DistanceBinning::Linear => buf.push(0),
            DistanceBinning::Log { base } => {
                buf.push(1);
                buf.extend_from_slice(&base.to_le_bytes());
            }
        }
        buf.extend_from_slice(&(f.values.len() as i64).to_le_bytes());
        for v in &f.values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(&(f.factors.len() as i32).to_le_bytes());
        for (chr, factor) in &f.factors {
            buf.extend_from_slice(&(*chr as i32).to_le_bytes());
            buf.extend_from_slice(&factor.to_le_bytes());
        }
    }
    buf
}

/// Writes the footer as if `w` were positioned at `file_position`; returns the bytes written
pub fn write_footer<W: Write>(
    w: &mut W,
    file_position: u64,
    buffer: &NormVectorBuffer,
    expected: &IndexMap<String, ExpectedValueFunction>,
) -> Result<u64> {
    // index entries have a fixed width per entry, so its length does not depend on the base
    let index_len = encode_index(&buffer.entries, 0).len();
    let index = encode_index(&buffer.entries, (file_position + index_len as u64) as i64);
    let tail = encode_expected(expected);

    w.write_all(&index)?;
    w.write_all(&buffer.data)?;
    w.write_all(&tail)?;
    Ok((index.len() + buffer.data.len() + tail.len()) as u64)
}

/// Replaces the footer of the file at `path` and truncates what followed it
pub fn update_file(
    path: &Path,
    file_position: u64,
    buffer: &NormVectorBuffer,
    expected: &IndexMap<String, ExpectedValueFunction>,
) -> anyhow::Result<u64> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("could not open {}", path.display()))?;
    file.seek(SeekFrom::Start(file_position))
        .with_context(|| format!("could not seek to {} in {}", file_position, path.display()))?;

    let mut writer = std::io::BufWriter::new(&mut file);
    let written = write_footer(&mut writer, file_position, buffer, expected)
        .with_context(|| format!("could not write the footer of {}", path.display()))?;
    writer.flush()?;
    drop(writer);

    file.set_len(file_position + written)
        .with_context(|| format!("could not truncate {}", path.display()))?;
    Ok(written)
}

fn read_bytes<R: Read, const N: usize>(r: &mut R) -> std::io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_i32<R: Read>(r: &mut R) -> std::io::Result<i32> {
    Ok(i32::from_le_bytes(read_bytes(r)?))
}

fn read_i64<R: Read>(r: &mut R) -> std::io::Result<i64> {
    Ok(i64::from_le_bytes(read_bytes(r)?))
}

fn read_f32<R: Read>(r: &mut R) -> std::io::Result<f32> {
    Ok(f32::from_le_bytes(read_bytes(r)?))
}

fn read_f64<R: Read>(r: &mut R) -> std::io::Result<f64> {
    Ok(f64::from_le_bytes(read_bytes(r)?))
}

fn read_cstring<R: Read>(r: &mut R) -> std::io::Result<String> {
    let mut bytes = vec![];
    loop {
        let [b] = read_bytes::<R, 1>(r)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn read_count<R: Read>(r: &mut R, what: &str) -> Result<usize> {
    let n = read_i32(r)?;
    usize::try_from(n).map_err(|_| HicError::invalid(format!("negative {} count {}", what, n)))
}

fn read_zoom<R: Read>(r: &mut R) -> Result<Zoom> {
    let unit: Unit = read_cstring(r)?.parse()?;
    let bin_size = read_i32(r)?;
    let bin_size = u32::try_from(bin_size)
        .map_err(|_| HicError::invalid(format!("negative bin size {}", bin_size)))?;
    Zoom::new(unit, bin_size)
}

fn read_expected<R: Read>(r: &mut R) -> Result<ExpectedValueFunction> {
    let norm: NormalizationType = read_cstring(r)?.parse()?;
    let zoom = read_zoom(r)?;
    let [kind] = read_bytes::<R, 1>(r)?;
    let binning = match kind {
        0 => DistanceBinning::Linear,
        1 => DistanceBinning::Log { base: read_f64(r)? },
        k => return Err(HicError::invalid(format!("unknown distance binning {}", k))),
    };

    let n = read_i64(r)?;
    let n = usize::try_from(n).map_err(|_| HicError::invalid(format!("negative value count {}", n)))?;
    let mut values = Vec::with_capacity(n.min(1 << 20));
    for _ in 0..n {
        values.push(read_f64(r)?);
    }

    let mut factors = BTreeMap::new();
    for _ in 0..read_count(r, "factor")? {
        let chr = read_i32(r)?;
        let chr = usize::try_from(chr).map_err(|_| HicError::invalid(format!("negative chromosome {}", chr)))?;
        factors.insert(chr, read_f64(r)?);
    }

    Ok(ExpectedValueFunction {
        zoom,
        norm,
        binning,
        values,
        factors,
    })
}

/// Parses a footer starting at `file_position`
pub fn read_footer<R: Read + Seek>(r: &mut R, file_position: u64, version: i32) -> Result<NormFooter> {
    r.seek(SeekFrom::Start(file_position))?;

    let mut entries = vec![];
    for _ in 0..read_count(r, "index")? {
        let norm: NormalizationType = read_cstring(r)?.parse()?;
        let chr_idx = read_i32(r)?;
        let chr_idx = usize::try_from(chr_idx)
            .map_err(|_| HicError::invalid(format!("negative chromosome {}", chr_idx)))?;
        let zoom = read_zoom(r)?;
        entries.push(NormVectorIndexEntry {
            norm,
            chr_idx,
            zoom,
            position: read_i64(r)?,
            size: read_i64(r)?,
        });
    }
    let mut tail = r.stream_position()?;

    let mut vectors = Vec::with_capacity(entries.len());
    for e in &entries {
        let position = u64::try_from(e.position)
            .map_err(|_| HicError::invalid(format!("negative vector position {}", e.position)))?;
        r.seek(SeekFrom::Start(position))?;
        let n = if version >= 9 {
            read_i64(r)?
        } else {
            read_i32(r)? as i64
        };
        let n = usize::try_from(n).map_err(|_| HicError::invalid(format!("negative vector length {}", n)))?;
        let mut values = Vec::with_capacity(n.min(1 << 20));
        for _ in 0..n {
            values.push(read_f32(r)?);
        }
        vectors.push(NormalizationVector::from_floats(e.norm, e.chr_idx, e.zoom, &values));
        tail = tail.max(position + e.size.max(0) as u64);
    }

    r.seek(SeekFrom::Start(tail))?;
    let mut expected = IndexMap::new();
    for _ in 0..read_count(r, "expected")? {
        let f = read_expected(r)?;
        expected.insert(f.key(), f);
    }

    Ok(NormFooter {
        entries,
        vectors,
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_expected() -> IndexMap<String, ExpectedValueFunction> {
        let f = ExpectedValueFunction {
            zoom: Zoom::bp(50000).unwrap(),
            norm: NormalizationType::Kr,
            binning: DistanceBinning::Log { base: 1.5 },
            values: vec![10.0, 4.5, 0.25],
            factors: [(1, 0.9), (2, 1.1)].into_iter().collect(),
        };
        [(f.key(), f)].into_iter().collect()
    }

    #[test]
    fn test_round_trip_bits() {
        let zoom = Zoom::bp(50000).unwrap();
        for version in [8, 9] {
            let mut buffer = NormVectorBuffer::new(version);
            buffer.add(&NormalizationVector::new(
                NormalizationType::Kr,
                1,
                zoom,
                vec![0.1, f64::NAN, 3.75e-8, 1e30],
            ));
            buffer.add(&NormalizationVector::new(NormalizationType::Vc, 2, zoom, vec![2.0]));

            // leading bytes stand in for the matrix body
            let mut bytes = vec![7u8; 13];
            let written = write_footer(&mut bytes, 13, &buffer, &sample_expected()).unwrap();
            assert_eq!(bytes.len() as u64, 13 + written);

            let footer = read_footer(&mut Cursor::new(&bytes), 13, version).unwrap();
            assert_eq!(footer.entries.len(), 2);
            assert_eq!(footer.entries[1].chr_idx, 2);

            let original: Vec<u32> = [0.1f32, f32::NAN, 3.75e-8, 1e30].iter().map(|v| v.to_bits()).collect();
            let read: Vec<u32> = footer.vectors[0].to_floats().iter().map(|v| v.to_bits()).collect();
            assert_eq!(original, read);

            assert_eq!(footer.expected, sample_expected());
        }
    }

    #[test]
    fn test_truncated_footer() {
        let mut buffer = NormVectorBuffer::new(9);
        buffer.add(&NormalizationVector::new(
            NormalizationType::Vc,
            1,
            Zoom::bp(100).unwrap(),
            vec![1.0; 8],
        ));
        let mut bytes = vec![];
        write_footer(&mut bytes, 0, &buffer, &IndexMap::new()).unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(read_footer(&mut Cursor::new(&bytes), 0, 9).is_err());
    }
}
