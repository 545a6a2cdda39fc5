use bytes::BufMut;

use crate::native::{ProtocolError, ReadError};

/// Longest LEB128 encoding of `u64`.
const MAX_VARINT_LEN: usize = 10;

/// Cursor operation on a borrowed slice.
///
/// Unlike [`bytes::Buf`], every read checks the remaining length first and
/// returns [`ReadError::Incomplete`] so that the caller can wait for more
/// bytes instead of panicking.
pub trait SliceExt<'a> {
    /// Returns [`ReadError::Incomplete`] if less than `n` bytes remain.
    fn ensure(&self, n: usize) -> Result<(), ReadError>;

    /// Split off the next `n` bytes.
    fn read_slice(&mut self, n: usize) -> Result<&'a [u8], ReadError>;

    /// Read LEB128 unsigned integer.
    fn read_varint(&mut self) -> Result<u64, ReadError>;

    /// Read varint length prefixed bytes.
    fn read_string(&mut self) -> Result<&'a [u8], ReadError>;

    /// Read little endian `u64`.
    fn read_u64_le(&mut self) -> Result<u64, ReadError>;
}

impl<'a> SliceExt<'a> for &'a [u8] {
    fn ensure(&self, n: usize) -> Result<(), ReadError> {
        match self.len() < n {
            true => Err(ReadError::Incomplete),
            false => Ok(()),
        }
    }

    fn read_slice(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        self.ensure(n)?;
        let (head, tail) = self.split_at(n);
        *self = tail;
        Ok(head)
    }

    fn read_varint(&mut self) -> Result<u64, ReadError> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let Some((&byte, tail)) = self.split_first() else {
                return Err(ReadError::Incomplete);
            };
            *self = tail;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::VarintOverflow.into())
    }

    fn read_string(&mut self) -> Result<&'a [u8], ReadError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| ProtocolError::LengthOverflow(len))?;
        self.read_slice(len)
    }

    fn read_u64_le(&mut self) -> Result<u64, ReadError> {
        let slice = self.read_slice(size_of::<u64>())?;
        let mut le = [0u8; size_of::<u64>()];
        le.copy_from_slice(slice);
        Ok(u64::from_le_bytes(le))
    }
}

/// Native format write operation in [`BufMut`].
pub trait BufMutExt {
    /// Write LEB128 unsigned integer.
    fn put_varint(&mut self, value: u64);

    /// Write varint length prefixed bytes.
    fn put_string(&mut self, bytes: &[u8]);
}

impl<B: BufMut> BufMutExt for B {
    fn put_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.put_u8((value as u8) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    fn put_string(&mut self, bytes: &[u8]) {
        self.put_varint(bytes.len() as u64);
        self.put_slice(bytes);
    }
}

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn varint() {
        for value in [0u64, 1, 127, 128, 300, 65_536, u32::MAX as u64, u64::MAX] {
            let mut buf = vec![];
            buf.put_varint(value);
            let mut read = &buf[..];
            assert_eq!(read.read_varint().unwrap(), value);
            assert!(read.is_empty());
        }
    }

    #[test]
    fn varint_incomplete() {
        let mut read = &[0x80u8, 0x80][..];
        assert!(matches!(read.read_varint(), Err(ReadError::Incomplete)));
    }

    #[test]
    fn varint_overflow() {
        let mut read = &[0xffu8; 11][..];
        assert!(matches!(read.read_varint(), Err(ReadError::Fatal(_))));
    }

    #[test]
    fn string_needs_full_payload() {
        let mut buf = vec![];
        buf.put_string(b"clickhouse");
        let mut read = &buf[..5];
        assert!(matches!(read.read_string(), Err(ReadError::Incomplete)));
        let mut read = &buf[..];
        assert_eq!(read.read_string().unwrap(), b"clickhouse");
    }

    #[test]
    fn lossy() {
        assert_eq!(b"a\x00b".lossy().to_string(), "a\\x00b");
    }
}
