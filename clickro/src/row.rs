//! Row projection.
//!
//! - [`Row`]
//! - [`FromRow`]
//! - [`FromValue`]
//! - [`Table`]
//!
//! - [`Index`]
//! - [`DecodeError`]
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    hash::Hash,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::Utf8Error,
    string::FromUtf8Error,
    sync::Arc,
};
use uuid::Uuid;

use crate::{Decimal, Value, common::unit_error, ext::FmtExt};

/// One row of a result set.
///
/// Rows are projected from columnar blocks, values are owned.
#[derive(Clone, PartialEq)]
pub struct Row {
    names: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(names: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Iterate column name and value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Get column value.
    pub fn get<I: Index>(&self, idx: I) -> Option<&Value> {
        let i = idx.position(&self.names).ok()?;
        self.values.get(i)
    }

    /// Try get and convert column value.
    pub fn try_get<I: Index, T: FromValue>(&self, idx: I) -> Result<T, DecodeError> {
        let i = idx.position(&self.names)?;
        T::from_value(self.values[i].clone())
    }

    /// Try decode type using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(self) -> Result<D, DecodeError> {
        D::from_row(self)
    }
}

impl IntoIterator for Row {
    type Item = Value;

    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (name, value) in self.iter() {
            dbg.key(&name);
            match value {
                Value::Null => dbg.value(&format_args!("NULL")),
                Value::Bytes(b) => dbg.value(&b.lossy()),
                value => dbg.value(&format_args!("{value}")),
            };
        }
        dbg.finish()
    }
}

// ===== Traits =====

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    /// Construct self from row.
    fn from_row(row: Row) -> Result<Self, DecodeError>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row)
    }
}

impl FromRow for Vec<Value> {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row.values)
    }
}

impl FromRow for () {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:literal),*) => {
        impl<$($t),*> FromRow for ($($t),*,)
        where
            $($t: FromValue),*
        {
            fn from_row(row: Row) -> Result<Self, DecodeError> {
                let mut values = row.values.into_iter();
                Ok((
                    $($t::from_value(values.next().ok_or(DecodeError::IndexOutOfBounds($i))?)?),*,
                ))
            }
        }
    };
}

from_row_tuple!(T0 0);
from_row_tuple!(T0 0, T1 1);
from_row_tuple!(T0 0, T1 1, T2 2);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7);

/// A type that can be constructed from [`Value`].
pub trait FromValue: Sized {
    /// Try convert value into self.
    fn from_value(value: Value) -> Result<Self, DecodeError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}

pub(crate) fn mismatch<T>(expected: &'static str, value: &Value) -> Result<T, DecodeError> {
    match value {
        Value::Null => Err(DecodeError::Null),
        value => Err(DecodeError::Mismatch { expected, found: value.variant() }),
    }
}

macro_rules! integer {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, DecodeError> {
                    let int = match value {
                        Value::Bool(_) => return mismatch(stringify!($ty), &value),
                        Value::UInt128(v) => <$ty>::try_from(v).ok(),
                        ref v => match v.as_i128() {
                            Some(v) => <$ty>::try_from(v).ok(),
                            None => return mismatch(stringify!($ty), &value),
                        },
                    };
                    int.ok_or_else(|| DecodeError::OutOfRange {
                        expected: stringify!($ty),
                        value: value.to_string(),
                    })
                }
            }
        )*
    };
}

integer!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Bool(v) => Ok(v),
            Value::UInt8(v) => Ok(v != 0),
            value => mismatch("bool", &value),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Float32(v) => Ok(v.into()),
            Value::Float64(v) => Ok(v),
            value => mismatch("f64", &value),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Float32(v) => Ok(v),
            value => mismatch("f32", &value),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(s) => Ok(s),
            Value::Bytes(b) => Ok(String::from_utf8(b.into())?),
            value => mismatch("String", &value),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(s) => Ok(s.into()),
            Value::Bytes(b) => Ok(b),
            value => mismatch("Bytes", &value),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Decimal(d) => Ok(d),
            ref v => match v.as_i128() {
                Some(m) if !matches!(v, Value::Bool(_)) => Ok(Decimal::new(m, 0)),
                _ => mismatch("Decimal", &value),
            },
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Uuid(v) => Ok(v),
            value => mismatch("Uuid", &value),
        }
    }
}

impl FromValue for Ipv4Addr {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Ipv4(v) => Ok(v),
            value => mismatch("Ipv4Addr", &value),
        }
    }
}

impl FromValue for Ipv6Addr {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Ipv6(v) => Ok(v),
            Value::Ipv4(v) => Ok(v.to_ipv6_mapped()),
            value => mismatch("Ipv6Addr", &value),
        }
    }
}

impl FromValue for IpAddr {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Ipv4(v) => Ok(v.into()),
            Value::Ipv6(v) => Ok(v.into()),
            value => mismatch("IpAddr", &value),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Date(v) => Ok(v),
            value => mismatch("NaiveDate", &value),
        }
    }
}

impl FromValue for DateTime<Tz> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::DateTime(v) => Ok(v),
            value => mismatch("DateTime<Tz>", &value),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::DateTime(v) => Ok(v.with_timezone(&Utc)),
            value => mismatch("DateTime<Utc>", &value),
        }
    }
}

/// Wall clock time in the value timezone.
impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::DateTime(v) => Ok(v.naive_local()),
            value => mismatch("NaiveDateTime", &value),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Array(values) => values.into_iter().map(T::from_value).collect(),
            value => mismatch("Vec", &value),
        }
    }
}

impl<K: FromValue + Eq + Hash, V: FromValue> FromValue for HashMap<K, V> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            value => mismatch("HashMap", &value),
        }
    }
}

macro_rules! from_value_tuple {
    ($len:literal; $($t:ident),*) => {
        impl<$($t: FromValue),*> FromValue for ($($t),*,) {
            fn from_value(value: Value) -> Result<Self, DecodeError> {
                match value {
                    Value::Tuple(values) if values.len() == $len => {
                        let mut values = values.into_iter();
                        Ok(($(
                            match values.next() {
                                Some(v) => $t::from_value(v)?,
                                None => unreachable!(),
                            }
                        ),*,))
                    }
                    value => mismatch(concat!("tuple of ", $len), &value),
                }
            }
        }
    };
}

from_value_tuple!(1; T0);
from_value_tuple!(2; T0, T1);
from_value_tuple!(3; T0, T1, T2);
from_value_tuple!(4; T0, T1, T2, T3);

/// A struct that maps to a table, used for typed insert.
///
/// Usually implemented with the derive macro.
pub trait Table {
    /// Table name.
    const TABLE: &'static str;

    /// Column names, in the order of [`into_values`][Table::into_values].
    const COLUMNS: &'static [&'static str];

    /// Convert self into one row of values.
    fn into_values(self) -> Vec<Value>;
}

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns the column position.
    fn position(self, names: &[String]) -> Result<usize, DecodeError>;
}

impl Index for usize {
    fn position(self, names: &[String]) -> Result<usize, DecodeError> {
        match self < names.len() {
            true => Ok(self),
            false => Err(DecodeError::IndexOutOfBounds(self)),
        }
    }
}

impl Index for &str {
    fn position(self, names: &[String]) -> Result<usize, DecodeError> {
        names
            .iter()
            .position(|name| name == self)
            .ok_or_else(|| DecodeError::ColumnNotFound(String::from(self).into()))
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

unit_error! {
    /// An error when [`fetch_one`][crate::Query::fetch_one] does not return any row.
    pub struct RowNotFound("row not found");
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when projecting value into rust type.
pub enum DecodeError {
    /// String value is not utf8.
    Utf8(Utf8Error),
    /// Column requested not found.
    ColumnNotFound(Cow<'static, str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Value type does not match the requested type.
    Mismatch { expected: &'static str, found: &'static str },
    /// Number does not fit in the requested type.
    OutOfRange { expected: &'static str, value: String },
    /// Value is NULL.
    Null,
    /// Failed to deserialize using `serde_json`.
    Json(serde_json::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::Mismatch { expected, found } => {
                write!(f, "expected `{expected}`, found `{found}`")
            }
            Self::OutOfRange { expected, value } => {
                write!(f, "`{value}` is out of range for `{expected}`")
            }
            Self::Null => write!(f, "unexpected NULL value"),
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));
from!(<serde_json::Error>e => Self::Json(e));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn row() -> Row {
        Row::new(
            Arc::from(vec!["id".to_owned(), "name".to_owned(), "score".to_owned()]),
            vec![Value::UInt32(7), Value::from("alice"), Value::Null],
        )
    }

    #[test]
    fn get_by_index_and_name() {
        let row = row();
        assert_eq!(row.try_get::<_, u64>(0).unwrap(), 7);
        assert_eq!(row.try_get::<_, String>("name").unwrap(), "alice");
        assert_eq!(row.try_get::<_, Option<f64>>("score").unwrap(), None);
        assert!(matches!(row.try_get::<_, f64>("score"), Err(DecodeError::Null)));
        assert!(matches!(row.try_get::<_, u8>(5), Err(DecodeError::IndexOutOfBounds(5))));
        assert!(matches!(row.try_get::<_, u8>("nope"), Err(DecodeError::ColumnNotFound(_))));
    }

    #[test]
    fn integer_range() {
        assert_eq!(u8::from_value(Value::Int64(200)).unwrap(), 200);
        assert!(matches!(u8::from_value(Value::Int64(300)), Err(DecodeError::OutOfRange { .. })));
        assert!(matches!(u32::from_value(Value::Int8(-1)), Err(DecodeError::OutOfRange { .. })));
        assert!(matches!(i32::from_value(Value::from("1")), Err(DecodeError::Mismatch { .. })));
        assert_eq!(u128::from_value(Value::UInt128(u128::MAX)).unwrap(), u128::MAX);
    }

    #[test]
    fn tuple_row() {
        let (id, name, score): (u32, String, Option<i64>) = row().decode().unwrap();
        assert_eq!((id, name.as_str(), score), (7, "alice", None));
    }

    #[test]
    fn composite_values() {
        let value = Value::Array(vec![Value::UInt8(1), Value::UInt8(2)]);
        assert_eq!(Vec::<u16>::from_value(value).unwrap(), vec![1, 2]);

        let value = Value::Map(vec![(Value::from("a"), Value::Int32(1))]);
        let map = HashMap::<String, i32>::from_value(value).unwrap();
        assert_eq!(map.get("a"), Some(&1));

        let value = Value::Tuple(vec![Value::Float64(1.5), Value::from("x")]);
        assert_eq!(<(f64, String)>::from_value(value).unwrap(), (1.5, "x".to_owned()));
    }

    #[test]
    fn debug_as_map() {
        assert_eq!(format!("{:?}", row()), r#"{"id": 7, "name": alice, "score": NULL}"#);
    }
}
