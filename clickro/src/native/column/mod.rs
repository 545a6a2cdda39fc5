//! Whole column codec.
//!
//! A column is decoded at once into a typed buffer, [`Value`]s are only
//! created when a row is projected.
use bytes::{BufMut, Bytes, BytesMut};
use std::{
    net::{Ipv4Addr, Ipv6Addr},
    sync::Arc,
};
use uuid::Uuid;

use super::{ColumnType, ReadError};
use crate::{Value, common::ByteStr, ext::SliceExt};

mod numeric;
mod string;
mod temporal;
mod nested;
mod low_cardinality;
mod convert;
mod project;

pub use convert::TypeConversionError;
pub use temporal::TzPolicy;

/// Physical column buffer.
///
/// Logical types share the physical layout, `Date` is [`ColumnData::UInt16`],
/// `DateTime64` is [`ColumnData::Int64`], `Enum8` is [`ColumnData::Int8`] and
/// so on, the [`ColumnType`] is always required to interpret it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ColumnData {
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    UInt128(Vec<u128>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Int128(Vec<i128>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Uuid(Vec<Uuid>),
    Ipv4(Vec<Ipv4Addr>),
    Ipv6(Vec<Ipv6Addr>),
    /// `String` and `FixedString`.
    String(Vec<Bytes>),
    Nothing(usize),
    Nullable {
        /// `1` is null.
        nulls: Vec<u8>,
        values: Box<ColumnData>,
    },
    Array {
        offsets: Vec<u64>,
        values: Box<ColumnData>,
    },
    Map {
        offsets: Vec<u64>,
        keys: Box<ColumnData>,
        values: Box<ColumnData>,
    },
    Tuple(Vec<ColumnData>),
    LowCardinality {
        dictionary: Box<ColumnData>,
        keys: Vec<u64>,
    },
}

impl ColumnData {
    pub(crate) fn len(&self) -> usize {
        macro_rules! len {
            ($($variant:ident),*) => {
                match self {
                    $(Self::$variant(v) => v.len(),)*
                    Self::Nothing(len) => *len,
                    Self::Nullable { nulls, .. } => nulls.len(),
                    Self::Array { offsets, .. } | Self::Map { offsets, .. } => offsets.len(),
                    Self::Tuple(elements) => elements.first().map_or(0, Self::len),
                    Self::LowCardinality { keys, .. } => keys.len(),
                }
            };
        }
        len!(
            UInt8, UInt16, UInt32, UInt64, UInt128, Int8, Int16, Int32, Int64, Int128,
            Float32, Float64, Uuid, Ipv4, Ipv6, String
        )
    }

    /// Empty buffer for the type.
    pub(crate) fn empty(ty: &ColumnType) -> Self {
        use ColumnType as T;
        match ty {
            T::UInt8 | T::Bool => Self::UInt8(vec![]),
            T::UInt16 | T::Date => Self::UInt16(vec![]),
            T::UInt32 | T::DateTime(_) => Self::UInt32(vec![]),
            T::UInt64 => Self::UInt64(vec![]),
            T::UInt128 => Self::UInt128(vec![]),
            T::Int8 | T::Enum8(_) => Self::Int8(vec![]),
            T::Int16 | T::Enum16(_) => Self::Int16(vec![]),
            T::Int32 | T::Date32 => Self::Int32(vec![]),
            T::Int64 | T::DateTime64(..) => Self::Int64(vec![]),
            T::Int128 => Self::Int128(vec![]),
            T::Decimal(p, _) => match ColumnType::decimal_width(*p) {
                4 => Self::Int32(vec![]),
                8 => Self::Int64(vec![]),
                _ => Self::Int128(vec![]),
            },
            T::Float32 => Self::Float32(vec![]),
            T::Float64 => Self::Float64(vec![]),
            T::Uuid => Self::Uuid(vec![]),
            T::IPv4 => Self::Ipv4(vec![]),
            T::IPv6 => Self::Ipv6(vec![]),
            T::String | T::FixedString(_) => Self::String(vec![]),
            T::Nothing => Self::Nothing(0),
            T::Nullable(inner) => Self::Nullable {
                nulls: vec![],
                values: Box::new(Self::empty(inner)),
            },
            T::Array(inner) => Self::Array {
                offsets: vec![],
                values: Box::new(Self::empty(inner)),
            },
            T::Map(k, v) => Self::Map {
                offsets: vec![],
                keys: Box::new(Self::empty(k)),
                values: Box::new(Self::empty(v)),
            },
            T::Tuple { elements, .. } => Self::Tuple(elements.iter().map(Self::empty).collect()),
            T::LowCardinality(inner) => Self::LowCardinality {
                dictionary: Box::new(Self::empty(low_cardinality::dictionary_type(inner))),
                keys: vec![],
            },
        }
    }

    /// Append flat buffer of the same variant.
    ///
    /// Returns `false` if the variants differ or the buffer is not flat.
    pub(crate) fn append_flat(&mut self, other: Self) -> bool {
        macro_rules! append {
            ($($variant:ident),*) => {
                match (self, other) {
                    $((Self::$variant(a), Self::$variant(b)) => a.extend(b),)*
                    _ => return false,
                }
            };
        }
        append!(
            UInt8, UInt16, UInt32, UInt64, UInt128, Int8, Int16, Int32, Int64, Int128,
            Float32, Float64, Uuid, Ipv4, Ipv6, String
        );
        true
    }

    /// Read state prefixes of the whole column tree.
    pub(crate) fn read_prefix(ty: &ColumnType, buf: &mut &[u8]) -> Result<(), ReadError> {
        match ty {
            ColumnType::LowCardinality(_) => low_cardinality::read_prefix(buf),
            ColumnType::Nullable(inner) | ColumnType::Array(inner) => Self::read_prefix(inner, buf),
            ColumnType::Map(k, v) => {
                Self::read_prefix(k, buf)?;
                Self::read_prefix(v, buf)
            }
            ColumnType::Tuple { elements, .. } => {
                elements.iter().try_for_each(|ty| Self::read_prefix(ty, buf))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn write_prefix(ty: &ColumnType, buf: &mut BytesMut) {
        match ty {
            ColumnType::LowCardinality(_) => low_cardinality::write_prefix(buf),
            ColumnType::Nullable(inner) | ColumnType::Array(inner) => Self::write_prefix(inner, buf),
            ColumnType::Map(k, v) => {
                Self::write_prefix(k, buf);
                Self::write_prefix(v, buf);
            }
            ColumnType::Tuple { elements, .. } => {
                elements.iter().for_each(|ty| Self::write_prefix(ty, buf))
            }
            _ => {}
        }
    }

    /// Decode `rows` values of column payload, prefix excluded.
    pub(crate) fn decode(ty: &ColumnType, buf: &mut &[u8], rows: usize) -> Result<Self, ReadError> {
        use ColumnType as T;
        Ok(match ty {
            T::UInt8 | T::Bool => Self::UInt8(numeric::read(buf, rows)?),
            T::UInt16 | T::Date => Self::UInt16(numeric::read(buf, rows)?),
            T::UInt32 | T::DateTime(_) => Self::UInt32(numeric::read(buf, rows)?),
            T::UInt64 => Self::UInt64(numeric::read(buf, rows)?),
            T::UInt128 => Self::UInt128(numeric::read(buf, rows)?),
            T::Int8 | T::Enum8(_) => Self::Int8(numeric::read(buf, rows)?),
            T::Int16 | T::Enum16(_) => Self::Int16(numeric::read(buf, rows)?),
            T::Int32 | T::Date32 => Self::Int32(numeric::read(buf, rows)?),
            T::Int64 | T::DateTime64(..) => Self::Int64(numeric::read(buf, rows)?),
            T::Int128 => Self::Int128(numeric::read(buf, rows)?),
            T::Decimal(p, _) => match ColumnType::decimal_width(*p) {
                4 => Self::Int32(numeric::read(buf, rows)?),
                8 => Self::Int64(numeric::read(buf, rows)?),
                _ => Self::Int128(numeric::read(buf, rows)?),
            },
            T::Float32 => Self::Float32(numeric::read(buf, rows)?),
            T::Float64 => Self::Float64(numeric::read(buf, rows)?),
            T::Uuid => Self::Uuid(numeric::read_uuid(buf, rows)?),
            T::IPv4 => Self::Ipv4(numeric::read_ipv4(buf, rows)?),
            T::IPv6 => Self::Ipv6(numeric::read_ipv6(buf, rows)?),
            T::String => Self::String(string::read(buf, rows)?),
            T::FixedString(n) => Self::String(string::read_fixed_string(buf, rows, *n)?),
            T::Nothing => {
                buf.read_slice(rows)?;
                Self::Nothing(rows)
            }
            T::Nullable(inner) => {
                let nulls = buf.read_slice(rows)?.to_vec();
                let values = Box::new(Self::decode(inner, buf, rows)?);
                Self::Nullable { nulls, values }
            }
            T::Array(inner) => {
                let (offsets, total) = nested::read_offsets(buf, rows)?;
                let values = Box::new(Self::decode(inner, buf, total)?);
                Self::Array { offsets, values }
            }
            T::Map(k, v) => {
                let (offsets, total) = nested::read_offsets(buf, rows)?;
                let keys = Box::new(Self::decode(k, buf, total)?);
                let values = Box::new(Self::decode(v, buf, total)?);
                Self::Map { offsets, keys, values }
            }
            T::Tuple { elements, .. } => Self::Tuple(
                elements
                    .iter()
                    .map(|ty| Self::decode(ty, buf, rows))
                    .collect::<Result<_, _>>()?,
            ),
            T::LowCardinality(inner) => low_cardinality::read(inner, buf, rows)?,
        })
    }

    /// Encode column payload, prefix excluded.
    pub(crate) fn encode(&self, ty: &ColumnType, buf: &mut BytesMut) {
        use ColumnType as T;
        match (ty, self) {
            (T::FixedString(n), Self::String(v)) => string::write_fixed_string(v, *n, buf),
            (_, Self::String(v)) => string::write(v, buf),
            (_, Self::Uuid(v)) => numeric::write_uuid(v, buf),
            (_, Self::Ipv4(v)) => numeric::write_ipv4(v, buf),
            (_, Self::Ipv6(v)) => numeric::write_ipv6(v, buf),
            (_, Self::Nothing(len)) => buf.put_bytes(0, *len),
            (T::Nullable(inner), Self::Nullable { nulls, values }) => {
                buf.put_slice(nulls);
                values.encode(inner, buf);
            }
            (T::Array(inner), Self::Array { offsets, values }) => {
                nested::write_offsets(offsets, buf);
                values.encode(inner, buf);
            }
            (T::Map(k, v), Self::Map { offsets, keys, values }) => {
                nested::write_offsets(offsets, buf);
                keys.encode(k, buf);
                values.encode(v, buf);
            }
            (T::Tuple { elements, .. }, Self::Tuple(columns)) => {
                for (ty, column) in elements.iter().zip(columns) {
                    column.encode(ty, buf);
                }
            }
            (T::LowCardinality(inner), Self::LowCardinality { dictionary, keys }) => {
                low_cardinality::write(inner, dictionary, keys, buf)
            }
            (_, data) => {
                macro_rules! write {
                    ($($variant:ident),*) => {
                        match data {
                            $(Self::$variant(v) => numeric::write(v, buf),)*
                            _ => debug_assert!(false, "column data does not match type `{ty}`"),
                        }
                    };
                }
                write!(
                    UInt8, UInt16, UInt32, UInt64, UInt128, Int8, Int16, Int32, Int64, Int128,
                    Float32, Float64
                )
            }
        }
    }
}

/// Decoded column of a [`Block`][super::Block].
#[derive(Debug, Clone)]
pub struct Column {
    name: ByteStr,
    ty: Arc<ColumnType>,
    data: ColumnData,
    tz: TzPolicy,
}

impl Column {
    pub(crate) fn new(name: ByteStr, ty: Arc<ColumnType>, data: ColumnData) -> Self {
        Self { name, ty, data, tz: TzPolicy::default() }
    }

    /// Build column from values, validating every one of them.
    pub fn from_values(
        name: impl Into<ByteStr>,
        ty: Arc<ColumnType>,
        values: &[&Value],
    ) -> Result<Self, TypeConversionError> {
        let data = ColumnData::from_values(&ty, values)?;
        Ok(Self::new(name.into(), ty, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: ByteStr) {
        self.name = name;
    }

    pub fn column_type(&self) -> &Arc<ColumnType> {
        &self.ty
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tz_policy(&self) -> TzPolicy {
        self.tz
    }

    pub(crate) fn set_tz_policy(&mut self, tz: TzPolicy) {
        self.tz = tz;
    }

    /// Project a value, returns `None` if `row` is out of bounds.
    ///
    /// With `use_none` off, masked rows of a `Nullable` column present as the
    /// stored placeholder, which is the default value of the nested type.
    pub fn value(&self, row: usize, use_none: bool) -> Option<Value> {
        if row >= self.len() {
            return None;
        }
        let options = project::Projection { tz: &self.tz, use_none };
        Some(self.data.value_at(&self.ty, row, &options))
    }

    pub(crate) fn decode(
        name: ByteStr,
        ty: Arc<ColumnType>,
        buf: &mut &[u8],
        rows: usize,
    ) -> Result<Self, ReadError> {
        let data = match rows {
            0 => ColumnData::empty(&ty),
            _ => {
                ColumnData::read_prefix(&ty, buf)?;
                ColumnData::decode(&ty, buf, rows)?
            }
        };
        Ok(Self::new(name, ty, data))
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        if self.data.len() == 0 {
            return;
        }
        ColumnData::write_prefix(&self.ty, buf);
        self.data.encode(&self.ty, buf);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Decimal, native::type_parser::parse};
    use chrono::{DateTime, NaiveDate};
    use chrono_tz::Tz;

    fn round_trip(type_name: &str, values: Vec<Value>) -> Vec<Value> {
        let ty = Arc::new(parse(type_name).unwrap());
        let refs = values.iter().collect::<Vec<_>>();
        let column = Column::from_values("c", ty.clone(), &refs).unwrap();

        let mut buf = BytesMut::new();
        column.encode(&mut buf);

        let mut read = &buf[..];
        let decoded = Column::decode("c".into(), ty, &mut read, values.len()).unwrap();
        assert!(read.is_empty(), "`{type_name}` left {} bytes", read.len());
        assert_eq!(decoded.len(), values.len());
        (0..decoded.len()).map(|i| decoded.value(i, true).unwrap()).collect()
    }

    fn assert_round_trip(type_name: &str, values: Vec<Value>) {
        assert_eq!(round_trip(type_name, values.clone()), values, "`{type_name}`");
    }

    #[test]
    fn scalars() {
        assert_round_trip("UInt8", vec![Value::UInt8(0), Value::UInt8(255)]);
        assert_round_trip("Int64", vec![Value::Int64(i64::MIN), Value::Int64(42)]);
        assert_round_trip("UInt128", vec![Value::UInt128(u128::MAX)]);
        assert_round_trip("Float64", vec![Value::Float64(1.5), Value::Float64(-0.25)]);
        assert_round_trip("Bool", vec![Value::Bool(true), Value::Bool(false)]);
        assert_round_trip("String", vec!["".into(), "Alice".into()]);
        assert_round_trip("FixedString(3)", vec!["abc".into()]);
        assert_round_trip("UUID", vec![Value::Uuid(Uuid::from_u128(0x1234_5678_9abc_def0_1122_3344_5566_7788))]);
        assert_round_trip("IPv4", vec![Value::Ipv4(Ipv4Addr::new(10, 0, 0, 1))]);
        assert_round_trip("IPv6", vec![Value::Ipv6(Ipv6Addr::LOCALHOST)]);
        assert_round_trip("Enum8('a' = 1, 'b' = -1)", vec!["b".into(), "a".into()]);
    }

    #[test]
    fn non_utf8_string() {
        assert_round_trip("String", vec![Value::Bytes(Bytes::from_static(b"\xff\xfe"))]);
    }

    #[test]
    fn temporal() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_round_trip("Date", vec![Value::Date(date)]);
        assert_round_trip("Date32", vec![Value::Date(NaiveDate::from_ymd_opt(1900, 1, 1).unwrap())]);

        let tokyo = chrono_tz::Asia::Tokyo;
        let dt = DateTime::from_timestamp(1_700_000_000, 0).unwrap().with_timezone(&tokyo);
        assert_round_trip("DateTime('Asia/Tokyo')", vec![Value::DateTime(dt)]);

        let dt = DateTime::from_timestamp(1_700_000_000, 123_456_000).unwrap().with_timezone(&Tz::UTC);
        assert_round_trip("DateTime64(6)", vec![Value::DateTime(dt)]);
    }

    #[test]
    fn decimals_are_exact() {
        let d: Decimal = "123456789012345.678".parse().unwrap();
        assert_round_trip("Decimal(18, 3)", vec![Value::Decimal(d)]);

        let d: Decimal = "-12345678901234567890123456789.123456789".parse().unwrap();
        assert_round_trip("Decimal(38, 9)", vec![Value::Decimal(d)]);

        assert_round_trip("Decimal(9, 2)", vec![Value::Decimal(Decimal::new(-99, 2))]);
    }

    #[test]
    fn nullable() {
        assert_round_trip("Nullable(UInt32)", vec![Value::UInt32(1), Value::Null, Value::UInt32(3)]);
        assert_round_trip("Nullable(String)", vec![Value::Null, "x".into()]);
    }

    #[test]
    fn nullable_placeholder_without_use_none() {
        let ty = Arc::new(parse("Nullable(Int32)").unwrap());
        let column = Column::from_values("c", ty, &[&Value::Null, &Value::Int32(7)]).unwrap();
        assert_eq!(column.value(0, false), Some(Value::Int32(0)));
        assert_eq!(column.value(0, true), Some(Value::Null));
        assert_eq!(column.value(1, false), Some(Value::Int32(7)));
        assert_eq!(column.value(2, false), None);
    }

    #[test]
    fn composite() {
        assert_round_trip(
            "Array(Nullable(UInt8))",
            vec![
                Value::Array(vec![Value::UInt8(1), Value::Null]),
                Value::Array(vec![]),
                Value::Array(vec![Value::UInt8(3)]),
            ],
        );
        assert_round_trip(
            "Map(String, Array(Int16))",
            vec![
                Value::Map(vec![("a".into(), Value::Array(vec![Value::Int16(-1)]))]),
                Value::Map(vec![]),
            ],
        );
        assert_round_trip(
            "Tuple(UInt8, String)",
            vec![Value::Tuple(vec![Value::UInt8(1), "one".into()])],
        );
        assert_round_trip(
            "Array(Array(String))",
            vec![Value::Array(vec![Value::Array(vec![]), Value::Array(vec!["x".into()])])],
        );
    }

    #[test]
    fn low_cardinality() {
        assert_round_trip(
            "LowCardinality(String)",
            vec!["a".into(), "b".into(), "a".into(), "a".into()],
        );
        assert_round_trip(
            "LowCardinality(Nullable(String))",
            vec!["a".into(), Value::Null, "a".into()],
        );
        assert_round_trip(
            "Array(LowCardinality(String))",
            vec![Value::Array(vec![]), Value::Array(vec!["x".into(), "y".into()])],
        );
        assert_round_trip(
            "Array(LowCardinality(String))",
            vec![Value::Array(vec![]), Value::Array(vec![])],
        );
    }

    #[test]
    fn zero_rows_have_no_payload() {
        let ty = Arc::new(parse("LowCardinality(Nullable(String))").unwrap());
        let column = Column::from_values("c", ty.clone(), &[]).unwrap();
        let mut buf = BytesMut::new();
        column.encode(&mut buf);
        assert!(buf.is_empty());

        let decoded = Column::decode("c".into(), ty, &mut &[][..], 0).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn column_decode_is_resumable() {
        let ty = Arc::new(parse("Array(String)").unwrap());
        let values = [Value::Array(vec!["foo".into(), "bar".into()])];
        let column = Column::from_values("c", ty.clone(), &values.iter().collect::<Vec<_>>()).unwrap();
        let mut buf = BytesMut::new();
        column.encode(&mut buf);

        for end in 0..buf.len() {
            let res = Column::decode("c".into(), ty.clone(), &mut &buf[..end], 1);
            assert!(matches!(res, Err(ReadError::Incomplete)), "at {end}");
        }
    }
}
