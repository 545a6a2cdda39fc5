//! Fixed width little endian payload.
use bytes::{BufMut, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};
use uuid::Uuid;

use crate::{
    ext::SliceExt,
    native::{ProtocolError, ReadError},
};

/// Number stored as little endian bytes.
pub(crate) trait Primitive: Copy {
    const SIZE: usize;

    fn from_le(bytes: &[u8]) -> Self;

    fn put_le(self, buf: &mut BytesMut);
}

macro_rules! primitive {
    ($($ty:ty),*) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = size_of::<$ty>();

                fn from_le(bytes: &[u8]) -> Self {
                    let mut le = [0u8; size_of::<$ty>()];
                    le.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(le)
                }

                fn put_le(self, buf: &mut BytesMut) {
                    buf.put_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

primitive!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

/// Split `rows * width` bytes, checking the multiplication.
pub(crate) fn read_fixed<'a>(
    buf: &mut &'a [u8],
    rows: usize,
    width: usize,
) -> Result<&'a [u8], ReadError> {
    let len = rows
        .checked_mul(width)
        .ok_or(ProtocolError::LengthOverflow(rows as u64))?;
    buf.read_slice(len)
}

pub(crate) fn read<P: Primitive>(buf: &mut &[u8], rows: usize) -> Result<Vec<P>, ReadError> {
    let bytes = read_fixed(buf, rows, P::SIZE)?;
    Ok(bytes.chunks_exact(P::SIZE).map(P::from_le).collect())
}

pub(crate) fn write<P: Primitive>(values: &[P], buf: &mut BytesMut) {
    buf.reserve(values.len() * P::SIZE);
    for &value in values {
        value.put_le(buf);
    }
}

/// UUID is stored as two `u64`, high half first.
pub(crate) fn read_uuid(buf: &mut &[u8], rows: usize) -> Result<Vec<Uuid>, ReadError> {
    let bytes = read_fixed(buf, rows, 16)?;
    Ok(bytes
        .chunks_exact(16)
        .map(|b| Uuid::from_u64_pair(<u64 as Primitive>::from_le(&b[..8]), <u64 as Primitive>::from_le(&b[8..])))
        .collect())
}

pub(crate) fn write_uuid(values: &[Uuid], buf: &mut BytesMut) {
    buf.reserve(values.len() * 16);
    for value in values {
        let (high, low) = value.as_u64_pair();
        buf.put_u64_le(high);
        buf.put_u64_le(low);
    }
}

pub(crate) fn read_ipv4(buf: &mut &[u8], rows: usize) -> Result<Vec<Ipv4Addr>, ReadError> {
    Ok(read::<u32>(buf, rows)?.into_iter().map(Ipv4Addr::from).collect())
}

pub(crate) fn write_ipv4(values: &[Ipv4Addr], buf: &mut BytesMut) {
    buf.reserve(values.len() * 4);
    for &value in values {
        buf.put_u32_le(value.into());
    }
}

/// IPv6 is the only value stored in network order.
pub(crate) fn read_ipv6(buf: &mut &[u8], rows: usize) -> Result<Vec<Ipv6Addr>, ReadError> {
    let bytes = read_fixed(buf, rows, 16)?;
    Ok(bytes
        .chunks_exact(16)
        .map(|b| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(b);
            Ipv6Addr::from(octets)
        })
        .collect())
}

pub(crate) fn write_ipv6(values: &[Ipv6Addr], buf: &mut BytesMut) {
    buf.reserve(values.len() * 16);
    for value in values {
        buf.put_slice(&value.octets());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn little_endian() {
        let mut buf = BytesMut::new();
        write(&[1u32, 0x0102_0304], &mut buf);
        assert_eq!(&buf[..], &[1, 0, 0, 0, 4, 3, 2, 1]);
        let mut read_buf = &buf[..];
        assert_eq!(read::<u32>(&mut read_buf, 2).unwrap(), [1, 0x0102_0304]);
    }

    #[test]
    fn uuid_halves() {
        let uuid = Uuid::parse_str("61f0c404-5cb3-11e7-907b-a6006ad3dba0").unwrap();
        let mut buf = BytesMut::new();
        write_uuid(&[uuid], &mut buf);
        assert_eq!(&buf[..8], &0x61f0c4045cb311e7u64.to_le_bytes());
        assert_eq!(&buf[8..], &0x907ba6006ad3dba0u64.to_le_bytes());
        assert_eq!(read_uuid(&mut &buf[..], 1).unwrap(), [uuid]);
    }

    #[test]
    fn ip_byte_order() {
        let mut buf = BytesMut::new();
        write_ipv4(&[Ipv4Addr::new(127, 0, 0, 1)], &mut buf);
        assert_eq!(&buf[..], &[1, 0, 0, 127]);

        let mut buf = BytesMut::new();
        write_ipv6(&[Ipv6Addr::LOCALHOST], &mut buf);
        assert_eq!(buf[15], 1);
    }

    #[test]
    fn short_buffer_is_incomplete() {
        let mut buf = &[0u8; 7][..];
        assert!(matches!(read::<u64>(&mut buf, 1), Err(ReadError::Incomplete)));
    }
}
