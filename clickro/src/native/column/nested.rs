//! Array and Map offsets.
use bytes::BytesMut;
use std::ops::Range;

use super::numeric;
use crate::native::{ProtocolError, ReadError};

/// Read cumulative end offsets, returns them with the flattened length.
pub(crate) fn read_offsets(buf: &mut &[u8], rows: usize) -> Result<(Vec<u64>, usize), ReadError> {
    let offsets = numeric::read::<u64>(buf, rows)?;
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        return Err(ProtocolError::Offsets.into());
    }
    let total = offsets.last().copied().unwrap_or(0);
    let total = usize::try_from(total).map_err(|_| ProtocolError::LengthOverflow(total))?;
    Ok((offsets, total))
}

pub(crate) fn write_offsets(offsets: &[u64], buf: &mut BytesMut) {
    numeric::write(offsets, buf);
}

/// Flattened range of row `row`, `offsets[-1]` is zero.
pub(crate) fn range(offsets: &[u64], row: usize) -> Range<usize> {
    let start = match row {
        0 => 0,
        _ => offsets[row - 1] as usize,
    };
    start..offsets[row] as usize
}

/// Build offsets from each row length.
pub(crate) fn offsets_from_lens(lens: impl IntoIterator<Item = usize>) -> Vec<u64> {
    lens.into_iter()
        .scan(0u64, |end, len| {
            *end += len as u64;
            Some(*end)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ranges() {
        let offsets = offsets_from_lens([2, 0, 3]);
        assert_eq!(offsets, [2, 2, 5]);
        assert_eq!(range(&offsets, 0), 0..2);
        assert_eq!(range(&offsets, 1), 2..2);
        assert_eq!(range(&offsets, 2), 2..5);
    }

    #[test]
    fn decreasing_offsets_rejected() {
        let mut buf = BytesMut::new();
        write_offsets(&[3, 1], &mut buf);
        assert!(matches!(read_offsets(&mut &buf[..], 2), Err(ReadError::Fatal(_))));
    }
}
