//! `LowCardinality` dictionary encoding.
//!
//! ```text
//! prefix:
//!     u64  key serialization version, always 1
//! granule * {
//!     u64  flags, low byte is index width
//!     u64  dictionary size
//!     ...  dictionary column
//!     u64  index count
//!     ...  index column
//! }
//! ```
//!
//! For `LowCardinality(Nullable(T))` the dictionary is a column of `T` and
//! entry `0` stands for NULL.
use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use super::{ColumnData, convert::TypeConversionError, numeric};
use crate::{
    Value,
    ext::SliceExt,
    native::{ColumnType, ProtocolError, ReadError},
};

const KEY_VERSION: u64 = 1;

const INDEX_WIDTH_MASK: u64 = 0xff;
const NEED_GLOBAL_DICTIONARY: u64 = 1 << 8;
const HAS_ADDITIONAL_KEYS: u64 = 1 << 9;

/// Dictionary type, `Nullable` is represented by the reserved entry instead.
pub(crate) fn dictionary_type(inner: &ColumnType) -> &ColumnType {
    match inner {
        ColumnType::Nullable(inner) => inner,
        inner => inner,
    }
}

pub(crate) fn read_prefix(buf: &mut &[u8]) -> Result<(), ReadError> {
    match buf.read_u64_le()? {
        KEY_VERSION => Ok(()),
        _ => Err(ProtocolError::LowCardinality("unknown key serialization version").into()),
    }
}

pub(crate) fn write_prefix(buf: &mut BytesMut) {
    buf.put_u64_le(KEY_VERSION);
}

fn read_len(buf: &mut &[u8]) -> Result<usize, ReadError> {
    let len = buf.read_u64_le()?;
    usize::try_from(len).map_err(|_| ProtocolError::LengthOverflow(len).into())
}

/// Read granules until `rows` indexes are collected.
///
/// Dictionaries of following granules are appended to the first one, their
/// indexes are shifted accordingly. Every granule of a nullable column
/// reserves its own entry `0` for NULL, those all map to key `0`.
pub(crate) fn read(inner: &ColumnType, buf: &mut &[u8], rows: usize) -> Result<ColumnData, ReadError> {
    let nullable = inner.is_nullable();
    let dict_ty = dictionary_type(inner);
    let mut dictionary = ColumnData::empty(dict_ty);
    let mut keys = Vec::with_capacity(rows.min(buf.len()));

    while keys.len() < rows {
        let flags = buf.read_u64_le()?;
        if flags & NEED_GLOBAL_DICTIONARY != 0 {
            return Err(ProtocolError::LowCardinality("shared global dictionary").into());
        }
        if flags & HAS_ADDITIONAL_KEYS == 0 {
            return Err(ProtocolError::LowCardinality("granule without dictionary").into());
        }

        let size = read_len(buf)?;
        let granule = ColumnData::decode(dict_ty, buf, size)?;
        let count = read_len(buf)?;
        if count == 0 {
            return Err(ProtocolError::LowCardinality("empty granule").into());
        }

        let base = dictionary.len() as u64;
        let indexes = match flags & INDEX_WIDTH_MASK {
            0 => widen(numeric::read::<u8>(buf, count)?),
            1 => widen(numeric::read::<u16>(buf, count)?),
            2 => widen(numeric::read::<u32>(buf, count)?),
            3 => numeric::read::<u64>(buf, count)?,
            _ => return Err(ProtocolError::LowCardinality("unknown index width").into()),
        };

        for index in indexes {
            if index >= size as u64 {
                return Err(ProtocolError::DictionaryIndex { index, len: size }.into());
            }
            keys.push(match nullable && index == 0 {
                true => 0,
                false => base + index,
            });
        }

        if base == 0 {
            dictionary = granule;
        } else if !dictionary.append_flat(granule) {
            return Err(ProtocolError::LowCardinality("composite dictionary").into());
        }
    }

    if keys.len() != rows {
        return Err(ProtocolError::LowCardinality("index count exceeds row count").into());
    }

    Ok(ColumnData::LowCardinality { dictionary: Box::new(dictionary), keys })
}

fn widen<N: Into<u64>>(indexes: Vec<N>) -> Vec<u64> {
    indexes.into_iter().map(Into::into).collect()
}

/// Write one granule, nothing for zero rows.
pub(crate) fn write(inner: &ColumnType, dictionary: &ColumnData, keys: &[u64], buf: &mut BytesMut) {
    if keys.is_empty() {
        return;
    }

    let len = dictionary.len() as u64;
    let width = match len {
        ..=0x100 => 0,
        ..=0x1_0000 => 1,
        ..=0x1_0000_0000 => 2,
        _ => 3,
    };

    buf.put_u64_le(HAS_ADDITIONAL_KEYS | width);
    buf.put_u64_le(len);
    dictionary.encode(dictionary_type(inner), buf);
    buf.put_u64_le(keys.len() as u64);

    match width {
        0 => keys.iter().for_each(|&k| buf.put_u8(k as u8)),
        1 => keys.iter().for_each(|&k| buf.put_u16_le(k as u16)),
        2 => keys.iter().for_each(|&k| buf.put_u32_le(k as u32)),
        _ => numeric::write(keys, buf),
    }
}

/// Build dictionary with distinct values in order of first appearance.
pub(crate) fn from_values(
    ty: &ColumnType,
    inner: &ColumnType,
    values: &[&Value],
) -> Result<ColumnData, TypeConversionError> {
    let nullable = inner.is_nullable();
    let dict_ty = dictionary_type(inner);
    let placeholder = dict_ty.default_value();

    let mut distinct = Vec::new();
    let mut seen = HashMap::new();
    let mut keys = Vec::with_capacity(values.len());

    if nullable {
        distinct.push(&placeholder);
    }

    for &value in values {
        if value.is_null() {
            if !nullable {
                return Err(TypeConversionError::new(ty, value, "NULL into non Nullable column"));
            }
            keys.push(0);
            continue;
        }
        // Debug output is exact for every variant, it serves as hash key
        let key = *seen.entry(format!("{value:?}")).or_insert_with(|| {
            distinct.push(value);
            distinct.len() as u64 - 1
        });
        keys.push(key);
    }

    let dictionary = ColumnData::from_values(dict_ty, &distinct)?;
    Ok(ColumnData::LowCardinality { dictionary: Box::new(dictionary), keys })
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    fn granule(width: u64, dictionary: &[&[u8]], indexes: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u64_le(HAS_ADDITIONAL_KEYS | width);
        buf.put_u64_le(dictionary.len() as u64);
        for entry in dictionary {
            buf.put_u8(entry.len() as u8);
            buf.put_slice(entry);
        }
        buf.put_u64_le(indexes.len() as u64);
        buf.put_slice(indexes);
        buf
    }

    #[test]
    fn zero_rows_read_nothing() {
        let data = read(&ColumnType::String, &mut &[][..], 0).unwrap();
        assert_eq!(data.len(), 0);
    }

    #[test]
    fn index_out_of_dictionary() {
        let buf = granule(0, &[b"a"], &[0, 1]);
        let err = read(&ColumnType::String, &mut &buf[..], 2);
        assert!(matches!(err, Err(ReadError::Fatal(_))));
    }

    #[test]
    fn empty_granule_is_error_not_loop() {
        let buf = granule(0, &[], &[]);
        let err = read(&ColumnType::String, &mut &buf[..], 1);
        assert!(matches!(err, Err(ReadError::Fatal(_))));
    }

    #[test]
    fn multiple_granules_are_merged() {
        let mut buf = granule(0, &[b"a", b"b"], &[1, 0]);
        buf.extend_from_slice(&granule(0, &[b"c"], &[0, 0]));

        let data = read(&ColumnType::String, &mut &buf[..], 4).unwrap();
        let ColumnData::LowCardinality { dictionary, keys } = data else {
            panic!("not LowCardinality");
        };
        assert_eq!(keys, [1, 0, 2, 2]);
        assert_eq!(
            *dictionary,
            ColumnData::String(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")]),
        );
    }

    #[test]
    fn null_in_every_granule() {
        let mut buf = granule(0, &[b"", b"a"], &[1, 0]);
        buf.extend_from_slice(&granule(0, &[b"", b"b"], &[0, 1]));

        let inner = ColumnType::Nullable(Box::new(ColumnType::String));
        let data = read(&inner, &mut &buf[..], 4).unwrap();
        let ColumnData::LowCardinality { keys, .. } = &data else {
            panic!("not LowCardinality");
        };
        assert_eq!(keys, &[1, 0, 0, 3]);

        let ty = ColumnType::LowCardinality(Box::new(inner));
        let tz = crate::native::TzPolicy::default();
        let p = super::super::project::Projection { tz: &tz, use_none: true };
        let rows = (0..4).map(|row| data.value_at(&ty, row, &p)).collect::<Vec<_>>();
        assert_eq!(
            rows,
            [Value::from("a"), Value::Null, Value::Null, Value::from("b")],
        );
    }

    #[test]
    fn wide_index() {
        let values = (0..300).map(|i| Value::String(i.to_string())).collect::<Vec<_>>();
        let refs = values.iter().collect::<Vec<_>>();
        let ty = ColumnType::LowCardinality(Box::new(ColumnType::String));
        let data = from_values(&ty, &ColumnType::String, &refs).unwrap();

        let mut buf = BytesMut::new();
        data.encode(&ty, &mut buf);
        assert_eq!(buf[0], 1, "300 entries need 16 bit index");

        assert_eq!(read(&ColumnType::String, &mut &buf[..], 300).unwrap(), data);
    }

    #[test]
    fn null_into_non_nullable() {
        let ty = ColumnType::LowCardinality(Box::new(ColumnType::String));
        assert!(from_values(&ty, &ColumnType::String, &[&Value::Null]).is_err());
    }
}
