//! Raw block (de)serialization, little-endian inside a zlib stream.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use crate::libs::error::{HicError, Result};
use crate::libs::matrix::ContactRecord;

const DENSE_SHORT_ABSENT: i16 = i16::MIN;

/// Decodes the raw bytes of block `block_number`.
pub fn decode_block(block_number: i64, bytes: &[u8], version: i32) -> Result<Vec<ContactRecord>> {
    let mut buf = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut buf)
        .map_err(|e| HicError::decode(block_number, format!("inflate failed: {}", e)))?;

    parse_records(&mut Cursor::new(buf), version)
        .map_err(|e| HicError::decode(block_number, e.to_string()))
}

fn parse_records<R: Read>(cur: &mut R, version: i32) -> std::io::Result<Vec<ContactRecord>> {
    let n_records = read_i32(cur)?;
    if n_records < 0 {
        return Err(invalid_data(format!("negative record count {}", n_records)));
    }
    let mut out = Vec::with_capacity((n_records as usize).min(1 << 20));

    if version < 7 {
        for _ in 0..n_records {
            let bin_x = read_i32(cur)?;
            let bin_y = read_i32(cur)?;
            let counts = read_f32(cur)?;
            out.push(ContactRecord::new(bin_x, bin_y, counts));
        }
        return Ok(out);
    }

    let bin_x_offset = read_i32(cur)?;
    let bin_y_offset = read_i32(cur)?;
    let short_counts = read_u8(cur)? == 0;
    let (short_x, short_y) = if version > 8 {
        (read_u8(cur)? == 0, read_u8(cur)? == 0)
    } else {
        (true, true)
    };

    match read_u8(cur)? {
        1 => {
            let row_count = read_index(cur, short_y)?;
            for _ in 0..row_count {
                let bin_y = shift(bin_y_offset, read_index(cur, short_y)?)?;
                let col_count = read_index(cur, short_x)?;
                for _ in 0..col_count {
                    let bin_x = shift(bin_x_offset, read_index(cur, short_x)?)?;
                    let counts = read_counts(cur, short_counts)?;
                    out.push(ContactRecord::new(bin_x, bin_y, counts));
                }
            }
        }
        2 => {
            let n_pts = read_i32(cur)?;
            let width = read_i16(cur)? as i32;
            if width <= 0 {
                return Err(invalid_data(format!("dense block width {}", width)));
            }
            for i in 0..n_pts {
                let row = i / width;
                let col = i - row * width;
                let (bin_x, bin_y) = (shift(bin_x_offset, col)?, shift(bin_y_offset, row)?);
                if short_counts {
                    let c = read_i16(cur)?;
                    if c != DENSE_SHORT_ABSENT {
                        out.push(ContactRecord::new(bin_x, bin_y, c as f32));
                    }
                } else {
                    let c = read_f32(cur)?;
                    if !c.is_nan() {
                        out.push(ContactRecord::new(bin_x, bin_y, c));
                    }
                }
            }
        }
        t => return Err(invalid_data(format!("unknown block type {}", t))),
    }

    Ok(out)
}

/// Encodes records in the list layout of `version` (type 1 from version 7 on).
pub fn encode_block(records: &[ContactRecord], version: i32) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(records.len() as i32).to_le_bytes());

    if version < 7 {
        for r in records {
            payload.extend_from_slice(&r.bin_x.to_le_bytes());
            payload.extend_from_slice(&r.bin_y.to_le_bytes());
            payload.extend_from_slice(&r.counts.to_le_bytes());
        }
    } else {
        let bin_x_offset = records.iter().map(|r| r.bin_x).min().unwrap_or(0);
        let bin_y_offset = records.iter().map(|r| r.bin_y).min().unwrap_or(0);

        let mut rows: BTreeMap<i32, Vec<&ContactRecord>> = BTreeMap::new();
        for r in records {
            rows.entry(r.bin_y).or_default().push(r);
        }

        payload.extend_from_slice(&bin_x_offset.to_le_bytes());
        payload.extend_from_slice(&bin_y_offset.to_le_bytes());
        payload.push(1); // f32 counts
        if version > 8 {
            payload.push(1); // i32 x deltas
            payload.push(1); // i32 y deltas
        }
        payload.push(1);

        // version 7/8 only has i16 deltas
        let wide = version > 8;
        write_index(&mut payload, rows.len() as i32, wide)?;
        for (bin_y, cols) in &rows {
            write_index(&mut payload, bin_y - bin_y_offset, wide)?;
            write_index(&mut payload, cols.len() as i32, wide)?;
            for r in cols {
                write_index(&mut payload, r.bin_x - bin_x_offset, wide)?;
                payload.extend_from_slice(&r.counts.to_le_bytes());
            }
        }
    }

    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&payload)?;
    Ok(enc.finish()?)
}

fn write_index(buf: &mut Vec<u8>, value: i32, wide: bool) -> Result<()> {
    if wide {
        buf.extend_from_slice(&value.to_le_bytes());
    } else {
        let v = i16::try_from(value)
            .map_err(|_| HicError::invalid(format!("{} does not fit a version 7/8 block", value)))?;
        buf.extend_from_slice(&v.to_le_bytes());
    }
    Ok(())
}

/// Offset plus delta; overflow means the block is corrupt
fn shift(offset: i32, delta: i32) -> std::io::Result<i32> {
    offset
        .checked_add(delta)
        .ok_or_else(|| invalid_data(format!("bin {} + {} is out of range", offset, delta)))
}

fn invalid_data(msg: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

fn read_index<R: Read>(r: &mut R, short: bool) -> std::io::Result<i32> {
    if short {
        Ok(read_i16(r)? as i32)
    } else {
        read_i32(r)
    }
}

fn read_counts<R: Read>(r: &mut R, short: bool) -> std::io::Result<f32> {
    if short {
        Ok(read_i16(r)? as f32)
    } else {
        read_f32(r)
    }
}

fn read_u8<R: Read>(r: &mut R) -> std::io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_i16<R: Read>(r: &mut R) -> std::io::Result<i16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(i16::from_le_bytes(b))
}

fn read_i32<R: Read>(r: &mut R) -> std::io::Result<i32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

fn read_f32<R: Read>(r: &mut R) -> std::io::Result<f32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(f32::from_le_bytes(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zlib(payload: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload).unwrap();
        enc.finish().unwrap()
    }

    fn sample() -> Vec<ContactRecord> {
        vec![
            ContactRecord::new(10, 10, 5.0),
            ContactRecord::new(12, 10, 1.5),
            ContactRecord::new(11, 14, 2.0),
        ]
    }

    #[test]
    fn test_list_layout_v6() {
        let bytes = encode_block(&sample(), 6).unwrap();
        assert_eq!(decode_block(0, &bytes, 6).unwrap(), sample());
    }

    #[test]
    fn test_row_layout_v8_and_v9() {
        for version in [8, 9] {
            let bytes = encode_block(&sample(), version).unwrap();
            let mut records = decode_block(3, &bytes, version).unwrap();
            records.sort_by_key(|r| (r.bin_y, r.bin_x));
            let mut expected = sample();
            expected.sort_by_key(|r| (r.bin_y, r.bin_x));
            assert_eq!(records, expected);
        }
    }

    #[test]
    fn test_short_counts_v7() {
        // 1 row at y=5 with 2 columns, i16 counts
        let mut p = Vec::new();
        p.extend_from_slice(&2i32.to_le_bytes());
        p.extend_from_slice(&100i32.to_le_bytes()); // x offset
        p.extend_from_slice(&5i32.to_le_bytes()); // y offset
        p.push(0); // i16 counts
        p.push(1); // type
        p.extend_from_slice(&1i16.to_le_bytes());
        p.extend_from_slice(&0i16.to_le_bytes());
        p.extend_from_slice(&2i16.to_le_bytes());
        p.extend_from_slice(&0i16.to_le_bytes());
        p.extend_from_slice(&7i16.to_le_bytes());
        p.extend_from_slice(&3i16.to_le_bytes());
        p.extend_from_slice(&9i16.to_le_bytes());

        let records = decode_block(1, &zlib(&p), 7).unwrap();
        assert_eq!(
            records,
            vec![
                ContactRecord::new(100, 5, 7.0),
                ContactRecord::new(103, 5, 9.0)
            ]
        );
    }

    #[test]
    fn test_dense_layout() {
        let mut p = Vec::new();
        p.extend_from_slice(&3i32.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes());
        p.push(0); // i16 counts
        p.push(2); // dense
        p.extend_from_slice(&4i32.to_le_bytes()); // points
        p.extend_from_slice(&2i16.to_le_bytes()); // width
        for c in [4i16, i16::MIN, i16::MIN, 6] {
            p.extend_from_slice(&c.to_le_bytes());
        }

        let records = decode_block(1, &zlib(&p), 8).unwrap();
        assert_eq!(
            records,
            vec![ContactRecord::new(0, 0, 4.0), ContactRecord::new(1, 1, 6.0)]
        );
    }

    #[test]
    fn test_truncated_block() {
        let bytes = encode_block(&sample(), 9).unwrap();
        let err = decode_block(42, &bytes[..3], 9).unwrap_err();
        assert!(matches!(err, HicError::BlockDecode { block: 42, .. }));

        let mut p = Vec::new();
        p.extend_from_slice(&3i32.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes());
        let err = decode_block(7, &zlib(&p), 9).unwrap_err();
        assert!(err.to_string().contains("Block 7"));
    }

    #[test]
    fn test_bin_overflow_is_a_decode_error() {
        // one row whose x delta runs past i32::MAX
        let mut p = Vec::new();
        p.extend_from_slice(&1i32.to_le_bytes());
        p.extend_from_slice(&i32::MAX.to_le_bytes()); // x offset
        p.extend_from_slice(&0i32.to_le_bytes()); // y offset
        p.push(1); // f32 counts
        p.push(1); // i32 x deltas
        p.push(1); // i32 y deltas
        p.push(1); // type
        p.extend_from_slice(&1i32.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes());
        p.extend_from_slice(&1i32.to_le_bytes());
        p.extend_from_slice(&5i32.to_le_bytes());
        p.extend_from_slice(&1.0f32.to_le_bytes());
        let err = decode_block(0, &zlib(&p), 9).unwrap_err();
        assert!(matches!(err, HicError::BlockDecode { block: 0, .. }));

        // dense grid shifted past i32::MAX on y
        let mut p = Vec::new();
        p.extend_from_slice(&2i32.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes());
        p.extend_from_slice(&i32::MAX.to_le_bytes());
        p.push(0);
        p.push(2);
        p.extend_from_slice(&2i32.to_le_bytes());
        p.extend_from_slice(&1i16.to_le_bytes()); // width 1, second point on row 1
        p.extend_from_slice(&3i16.to_le_bytes());
        p.extend_from_slice(&4i16.to_le_bytes());
        assert!(decode_block(1, &zlib(&p), 8).is_err());
    }

    #[test]
    fn test_unknown_type() {
        let mut p = Vec::new();
        p.extend_from_slice(&0i32.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes());
        p.push(1);
        p.push(9);
        assert!(decode_block(0, &zlib(&p), 7).is_err());
    }
}
