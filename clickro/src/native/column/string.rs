use bytes::{BufMut, Bytes, BytesMut};

use super::numeric::read_fixed;
use crate::{
    ext::{BufMutExt, SliceExt},
    native::ReadError,
};

/// Read `rows` varint prefixed strings.
///
/// The whole column region is copied once, every value is a slice of it.
pub(crate) fn read(buf: &mut &[u8], rows: usize) -> Result<Vec<Bytes>, ReadError> {
    let start = *buf;
    let mut ranges = Vec::with_capacity(rows.min(buf.len()));

    for _ in 0..rows {
        let value = buf.read_string()?;
        let offset = value.as_ptr() as usize - start.as_ptr() as usize;
        ranges.push(offset..offset + value.len());
    }

    let consumed = start.len() - buf.len();
    let region = Bytes::copy_from_slice(&start[..consumed]);
    Ok(ranges.into_iter().map(|range| region.slice(range)).collect())
}

/// Read `rows` strings of exactly `width` bytes.
pub(crate) fn read_fixed_string(
    buf: &mut &[u8],
    rows: usize,
    width: usize,
) -> Result<Vec<Bytes>, ReadError> {
    let region = Bytes::copy_from_slice(read_fixed(buf, rows, width)?);
    Ok((0..rows).map(|i| region.slice(i * width..(i + 1) * width)).collect())
}

pub(crate) fn write(values: &[Bytes], buf: &mut BytesMut) {
    for value in values {
        buf.put_string(value);
    }
}

/// Values must be at most `width` long, shorter one is zero padded.
pub(crate) fn write_fixed_string(values: &[Bytes], width: usize, buf: &mut BytesMut) {
    buf.reserve(values.len() * width);
    for value in values {
        let len = value.len().min(width);
        buf.put_slice(&value[..len]);
        buf.put_bytes(0, width - len);
    }
}
