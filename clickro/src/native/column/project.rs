//! Column buffer into row value.
use bytes::Bytes;

use super::{ColumnData, TzPolicy, low_cardinality, nested, temporal};
use crate::{Decimal, Value, native::ColumnType};

pub(crate) struct Projection<'a> {
    pub(crate) tz: &'a TzPolicy,
    pub(crate) use_none: bool,
}

fn string(bytes: &Bytes) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(s) => Value::String(s.to_owned()),
        Err(_) => Value::Bytes(bytes.clone()),
    }
}

fn label<N: Copy + PartialEq>(labels: &[(String, N)], code: N) -> Option<Value> {
    labels
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(label, _)| Value::String(label.clone()))
}

impl ColumnData {
    /// Project value at `row`, caller must check the bound.
    pub(crate) fn value_at(&self, ty: &ColumnType, row: usize, p: &Projection) -> Value {
        use ColumnType as T;
        match (ty, self) {
            (T::Bool, Self::UInt8(v)) => Value::Bool(v[row] != 0),
            (T::Date, Self::UInt16(v)) => Value::Date(temporal::date_from_days(v[row].into())),
            (T::Date32, Self::Int32(v)) => Value::Date(temporal::date_from_days(v[row].into())),
            (T::DateTime(tz), Self::UInt32(v)) => {
                Value::DateTime(temporal::datetime_from_ticks(v[row].into(), 0, p.tz.resolve(*tz)))
            }
            (T::DateTime64(precision, tz), Self::Int64(v)) => {
                Value::DateTime(temporal::datetime_from_ticks(v[row], *precision, p.tz.resolve(*tz)))
            }
            (T::Decimal(_, s), Self::Int32(v)) => Value::Decimal(Decimal::new(v[row].into(), *s)),
            (T::Decimal(_, s), Self::Int64(v)) => Value::Decimal(Decimal::new(v[row].into(), *s)),
            (T::Decimal(_, s), Self::Int128(v)) => Value::Decimal(Decimal::new(v[row], *s)),
            (T::Enum8(labels), Self::Int8(v)) => label(labels, v[row]).unwrap_or(Value::Int8(v[row])),
            (T::Enum16(labels), Self::Int16(v)) => label(labels, v[row]).unwrap_or(Value::Int16(v[row])),

            (_, Self::UInt8(v)) => Value::UInt8(v[row]),
            (_, Self::UInt16(v)) => Value::UInt16(v[row]),
            (_, Self::UInt32(v)) => Value::UInt32(v[row]),
            (_, Self::UInt64(v)) => Value::UInt64(v[row]),
            (_, Self::UInt128(v)) => Value::UInt128(v[row]),
            (_, Self::Int8(v)) => Value::Int8(v[row]),
            (_, Self::Int16(v)) => Value::Int16(v[row]),
            (_, Self::Int32(v)) => Value::Int32(v[row]),
            (_, Self::Int64(v)) => Value::Int64(v[row]),
            (_, Self::Int128(v)) => Value::Int128(v[row]),
            (_, Self::Float32(v)) => Value::Float32(v[row]),
            (_, Self::Float64(v)) => Value::Float64(v[row]),
            (_, Self::Uuid(v)) => Value::Uuid(v[row]),
            (_, Self::Ipv4(v)) => Value::Ipv4(v[row]),
            (_, Self::Ipv6(v)) => Value::Ipv6(v[row]),
            (_, Self::String(v)) => string(&v[row]),
            (_, Self::Nothing(_)) => Value::Null,

            (T::Nullable(inner), Self::Nullable { nulls, values }) => {
                match nulls[row] != 0 && p.use_none {
                    true => Value::Null,
                    false => values.value_at(inner, row, p),
                }
            }
            (T::Array(inner), Self::Array { offsets, values }) => Value::Array(
                nested::range(offsets, row)
                    .map(|i| values.value_at(inner, i, p))
                    .collect(),
            ),
            (T::Map(k, v), Self::Map { offsets, keys, values }) => Value::Map(
                nested::range(offsets, row)
                    .map(|i| (keys.value_at(k, i, p), values.value_at(v, i, p)))
                    .collect(),
            ),
            (T::Tuple { elements, .. }, Self::Tuple(columns)) => Value::Tuple(
                elements
                    .iter()
                    .zip(columns)
                    .map(|(ty, column)| column.value_at(ty, row, p))
                    .collect(),
            ),
            (T::LowCardinality(inner), Self::LowCardinality { dictionary, keys }) => {
                let key = keys[row] as usize;
                match inner.is_nullable() && key == 0 && p.use_none {
                    true => Value::Null,
                    false => dictionary.value_at(low_cardinality::dictionary_type(inner), key, p),
                }
            }
            _ => unreachable!("column data does not match type `{ty}`"),
        }
    }
}
