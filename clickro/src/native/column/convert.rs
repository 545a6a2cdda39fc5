//! Application value into column buffer.
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{borrow::Cow, fmt, net::Ipv4Addr};

use super::{ColumnData, low_cardinality, nested, temporal};
use crate::{
    Decimal, Value,
    native::ColumnType,
    value::pow10,
};

/// An error when a value cannot be represented in a column type.
pub struct TypeConversionError {
    type_name: String,
    value: String,
    reason: Cow<'static, str>,
}

impl TypeConversionError {
    pub(crate) fn new(ty: &ColumnType, value: &Value, reason: impl Into<Cow<'static, str>>) -> Self {
        const MAX_VALUE_LEN: usize = 64;
        let mut value = value.to_string();
        if value.len() > MAX_VALUE_LEN {
            let mut end = MAX_VALUE_LEN;
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            value.truncate(end);
            value.push_str("...");
        }
        Self { type_name: ty.to_string(), value, reason: reason.into() }
    }

    /// Row does not have one value per column.
    pub(crate) fn row_length(expected: usize, found: usize) -> Self {
        Self {
            type_name: "row".into(),
            value: format!("{found} values"),
            reason: format!("expected {expected} values, one per column").into(),
        }
    }

    /// Name of the target column type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Rejected value, shortened.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl std::error::Error for TypeConversionError { }

impl fmt::Display for TypeConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot convert `{}` into `{}`: {}", self.value, self.type_name, self.reason)
    }
}

impl fmt::Debug for TypeConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

type Result<T, E = TypeConversionError> = std::result::Result<T, E>;

fn collect<T>(
    ty: &ColumnType,
    values: &[&Value],
    f: impl Fn(&Value) -> Result<T, &'static str>,
) -> Result<Vec<T>> {
    values
        .iter()
        .map(|&v| f(v).map_err(|reason| TypeConversionError::new(ty, v, reason)))
        .collect()
}

fn signed<N: TryFrom<i128>>(v: &Value) -> Result<N, &'static str> {
    let n = v.as_i128().ok_or("expected integer")?;
    N::try_from(n).map_err(|_| "integer out of range")
}

fn unsigned<N: TryFrom<u128>>(v: &Value) -> Result<N, &'static str> {
    match v {
        Value::UInt128(n) => N::try_from(*n).map_err(|_| "integer out of range"),
        _ => {
            let n = v.as_i128().ok_or("expected integer")?;
            let n = u128::try_from(n).map_err(|_| "negative integer into unsigned column")?;
            N::try_from(n).map_err(|_| "integer out of range")
        }
    }
}

/// `2^127`, first float past `i128::MAX`.
const I128_END: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;

fn float(v: &Value) -> Result<f64, &'static str> {
    match *v {
        Value::Float32(f) => Ok(f.into()),
        Value::Float64(f) => Ok(f),
        Value::Decimal(d) => Ok(d.to_f64()),
        Value::UInt128(n) => {
            let f = n as f64;
            match f < I128_END * 2.0 && f as u128 == n {
                true => Ok(f),
                false => Err("integer is not exact as float"),
            }
        }
        _ => {
            let n = v.as_i128().ok_or("expected number")?;
            let f = n as f64;
            match f < I128_END && f as i128 == n {
                true => Ok(f),
                false => Err("integer is not exact as float"),
            }
        }
    }
}

/// Floats are rounded to nearest, integers must be exact.
fn float32(v: &Value) -> Result<f32, &'static str> {
    let f = float(v)?;
    let narrow = f as f32;
    if f.is_finite() && !narrow.is_finite() {
        return Err("float out of Float32 range");
    }
    match v {
        Value::Float32(_) | Value::Float64(_) | Value::Decimal(_) => Ok(narrow),
        _ if f64::from(narrow) == f => Ok(narrow),
        _ => Err("integer is not exact as Float32"),
    }
}

fn bytes(v: &Value) -> Result<Bytes, &'static str> {
    match v {
        Value::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        Value::Bytes(b) => Ok(b.clone()),
        _ => Err("expected string"),
    }
}

fn days(v: &Value) -> Result<i64, &'static str> {
    match v {
        Value::Date(d) => Ok(temporal::days_from_date(*d)),
        Value::DateTime(dt) => Ok(temporal::days_from_date(dt.date_naive())),
        _ => v.as_i128().and_then(|n| i64::try_from(n).ok()).ok_or("expected date"),
    }
}

fn ticks(v: &Value, precision: u8) -> Result<i64, &'static str> {
    match v {
        Value::DateTime(dt) => temporal::ticks_from_datetime(dt, precision).ok_or("datetime out of range"),
        Value::Date(d) => {
            let dt = DateTime::<Utc>::from_naive_utc_and_offset(temporal::midnight(*d), Utc);
            temporal::ticks_from_datetime(&dt, precision).ok_or("datetime out of range")
        }
        _ => v.as_i128().and_then(|n| i64::try_from(n).ok()).ok_or("expected datetime"),
    }
}

fn decimal(v: &Value, precision: u8, scale: u8) -> Result<i128, &'static str> {
    let d = match v {
        Value::Decimal(d) => *d,
        Value::String(s) => s.parse().map_err(|_| "invalid decimal literal")?,
        Value::Float32(_) | Value::Float64(_) => {
            let f = float(v)?;
            if !f.is_finite() {
                return Err("decimal cannot be infinite or NaN");
            }
            f.to_string().parse().map_err(|_| "invalid decimal literal")?
        }
        _ => Decimal::new(v.as_i128().ok_or("expected decimal")?, 0),
    };
    let d = d.rescale(scale).ok_or("decimal has more fractional digits than scale")?;
    let limit = pow10(precision).ok_or("decimal precision overflow")?;
    match d.mantissa().unsigned_abs() < limit.unsigned_abs() {
        true => Ok(d.mantissa()),
        false => Err("decimal precision overflow"),
    }
}

fn enum_code<N: Copy + Into<i128>>(labels: &[(String, N)], v: &Value) -> Result<N, &'static str> {
    let found = match v {
        Value::String(s) => labels.iter().find(|(label, _)| label == s),
        _ => {
            let n = v.as_i128().ok_or("expected enum label")?;
            labels.iter().find(|(_, code)| (*code).into() == n)
        }
    };
    found.map(|(_, code)| *code).ok_or("unknown enum label")
}

impl ColumnData {
    /// Convert application values, the first rejected one fails the whole column.
    pub(crate) fn from_values(ty: &ColumnType, values: &[&Value]) -> Result<Self> {
        use ColumnType as T;

        if !matches!(ty, T::Nullable(_) | T::LowCardinality(_) | T::Nothing) {
            if let Some(null) = values.iter().find(|v| v.is_null()) {
                return Err(TypeConversionError::new(ty, null, "NULL into non Nullable column"));
            }
        }

        Ok(match ty {
            T::UInt8 => Self::UInt8(collect(ty, values, unsigned)?),
            T::UInt16 => Self::UInt16(collect(ty, values, unsigned)?),
            T::UInt32 => Self::UInt32(collect(ty, values, unsigned)?),
            T::UInt64 => Self::UInt64(collect(ty, values, unsigned)?),
            T::UInt128 => Self::UInt128(collect(ty, values, unsigned)?),
            T::Int8 => Self::Int8(collect(ty, values, signed)?),
            T::Int16 => Self::Int16(collect(ty, values, signed)?),
            T::Int32 => Self::Int32(collect(ty, values, signed)?),
            T::Int64 => Self::Int64(collect(ty, values, signed)?),
            T::Int128 => Self::Int128(collect(ty, values, signed)?),
            T::Float32 => Self::Float32(collect(ty, values, float32)?),
            T::Float64 => Self::Float64(collect(ty, values, float)?),
            T::Bool => Self::UInt8(collect(ty, values, |v| match v {
                Value::Bool(b) => Ok(u8::from(*b)),
                _ => match v.as_i128() {
                    Some(n @ (0 | 1)) => Ok(n as u8),
                    _ => Err("expected bool"),
                },
            })?),
            T::String => Self::String(collect(ty, values, bytes)?),
            T::FixedString(n) => Self::String(collect(ty, values, |v| {
                let b = bytes(v)?;
                match b.len() <= *n {
                    true => Ok(b),
                    false => Err("value exceeds FixedString length"),
                }
            })?),
            T::Uuid => Self::Uuid(collect(ty, values, |v| match v {
                Value::Uuid(u) => Ok(*u),
                Value::String(s) => s.parse().map_err(|_| "invalid uuid"),
                _ => Err("expected uuid"),
            })?),
            T::IPv4 => Self::Ipv4(collect(ty, values, |v| match v {
                Value::Ipv4(ip) => Ok(*ip),
                Value::String(s) => s.parse().map_err(|_| "invalid IPv4 address"),
                _ => Err("expected IPv4 address"),
            })?),
            T::IPv6 => Self::Ipv6(collect(ty, values, |v| match v {
                Value::Ipv6(ip) => Ok(*ip),
                Value::Ipv4(ip) => Ok(ip.to_ipv6_mapped()),
                Value::String(s) => match s.parse::<Ipv4Addr>() {
                    Ok(ip) => Ok(ip.to_ipv6_mapped()),
                    Err(_) => s.parse().map_err(|_| "invalid IPv6 address"),
                },
                _ => Err("expected IPv6 address"),
            })?),
            T::Date => Self::UInt16(collect(ty, values, |v| {
                u16::try_from(days(v)?).map_err(|_| "date out of range")
            })?),
            T::Date32 => Self::Int32(collect(ty, values, |v| {
                i32::try_from(days(v)?).map_err(|_| "date out of range")
            })?),
            T::DateTime(_) => Self::UInt32(collect(ty, values, |v| {
                u32::try_from(ticks(v, 0)?).map_err(|_| "datetime out of range")
            })?),
            T::DateTime64(p, _) => Self::Int64(collect(ty, values, |v| ticks(v, *p))?),
            T::Decimal(p, s) => {
                let mantissas = collect(ty, values, |v| decimal(v, *p, *s))?;
                // precision check guarantees the narrowing
                match ColumnType::decimal_width(*p) {
                    4 => Self::Int32(mantissas.into_iter().map(|m| m as i32).collect()),
                    8 => Self::Int64(mantissas.into_iter().map(|m| m as i64).collect()),
                    _ => Self::Int128(mantissas),
                }
            }
            T::Enum8(labels) => Self::Int8(collect(ty, values, |v| enum_code(labels, v))?),
            T::Enum16(labels) => Self::Int16(collect(ty, values, |v| enum_code(labels, v))?),
            T::Nothing => {
                if let Some(v) = values.iter().find(|v| !v.is_null()) {
                    return Err(TypeConversionError::new(ty, v, "Nothing column only holds NULL"));
                }
                Self::Nothing(values.len())
            }
            T::Nullable(inner) => {
                let placeholder = inner.default_value();
                let nulls = values.iter().map(|v| u8::from(v.is_null())).collect();
                let inner_values = values
                    .iter()
                    .map(|&v| if v.is_null() { &placeholder } else { v })
                    .collect::<Vec<_>>();
                let values = Box::new(Self::from_values(inner, &inner_values)?);
                Self::Nullable { nulls, values }
            }
            T::Array(inner) => {
                let items = values
                    .iter()
                    .map(|&v| match v {
                        Value::Array(items) => Ok(items),
                        _ => Err(TypeConversionError::new(ty, v, "expected array")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let offsets = nested::offsets_from_lens(items.iter().map(|i| i.len()));
                let flat = items.iter().flat_map(|i| i.iter()).collect::<Vec<_>>();
                let values = Box::new(Self::from_values(inner, &flat)?);
                Self::Array { offsets, values }
            }
            T::Map(k, v) => {
                let entries = values
                    .iter()
                    .map(|&v| match v {
                        Value::Map(entries) => Ok(entries),
                        _ => Err(TypeConversionError::new(ty, v, "expected map")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let offsets = nested::offsets_from_lens(entries.iter().map(|e| e.len()));
                let keys = entries.iter().flat_map(|e| e.iter().map(|(k, _)| k)).collect::<Vec<_>>();
                let vals = entries.iter().flat_map(|e| e.iter().map(|(_, v)| v)).collect::<Vec<_>>();
                Self::Map {
                    offsets,
                    keys: Box::new(Self::from_values(k, &keys)?),
                    values: Box::new(Self::from_values(v, &vals)?),
                }
            }
            T::Tuple { elements, .. } => {
                let rows = values
                    .iter()
                    .map(|&v| match v {
                        Value::Tuple(items) | Value::Array(items) if items.len() == elements.len() => Ok(items),
                        Value::Tuple(_) | Value::Array(_) => {
                            Err(TypeConversionError::new(ty, v, "tuple arity mismatch"))
                        }
                        _ => Err(TypeConversionError::new(ty, v, "expected tuple")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let columns = elements
                    .iter()
                    .enumerate()
                    .map(|(i, element)| {
                        let column = rows.iter().map(|items| &items[i]).collect::<Vec<_>>();
                        Self::from_values(element, &column)
                    })
                    .collect::<Result<_>>()?;
                Self::Tuple(columns)
            }
            T::LowCardinality(inner) => low_cardinality::from_values(ty, inner, values)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::native::type_parser::parse;

    fn convert(type_name: &str, value: Value) -> Result<ColumnData> {
        ColumnData::from_values(&parse(type_name).unwrap(), &[&value])
    }

    #[test]
    fn integer_range() {
        assert!(convert("UInt8", Value::Int32(255)).is_ok());
        assert!(convert("UInt8", Value::Int32(256)).is_err());
        assert!(convert("UInt32", Value::Int8(-1)).is_err());
        assert!(convert("Int8", Value::UInt64(128)).is_err());
        assert!(convert("UInt128", Value::UInt128(u128::MAX)).is_ok());
        assert!(convert("Int64", "1".into()).is_err());
    }

    #[test]
    fn float_range() {
        assert_eq!(convert("Float32", Value::Float64(1.5)).unwrap(), ColumnData::Float32(vec![1.5]));
        assert!(convert("Float32", Value::Float64(1e300)).is_err());
        assert!(convert("Float32", Value::Float64(f64::INFINITY)).is_ok());

        let exact = 1i64 << 53;
        assert!(convert("Float64", Value::Int64(exact)).is_ok());
        assert!(convert("Float64", Value::Int64(exact + 1)).is_err());
        assert!(convert("Float64", Value::UInt128(u128::MAX)).is_err());
        assert!(convert("Float32", Value::Int32(16_777_216)).is_ok());
        assert!(convert("Float32", Value::Int32(16_777_217)).is_err());
    }

    #[test]
    fn null_into_non_nullable() {
        let err = convert("String", Value::Null).unwrap_err();
        assert_eq!(err.type_name(), "String");
        assert_eq!(err.value(), "NULL");
    }

    #[test]
    fn fixed_string_overflow() {
        assert!(convert("FixedString(2)", "ab".into()).is_ok());
        assert!(convert("FixedString(2)", "abc".into()).is_err());
    }

    #[test]
    fn unknown_enum_label() {
        assert!(convert("Enum8('a' = 1)", "a".into()).is_ok());
        assert!(convert("Enum8('a' = 1)", Value::Int8(1)).is_ok());
        assert!(convert("Enum8('a' = 1)", "b".into()).is_err());
        assert!(convert("Enum8('a' = 1)", Value::Int8(2)).is_err());
    }

    #[test]
    fn decimal_precision() {
        let d = |s: &str| Value::Decimal(s.parse().unwrap());
        assert_eq!(convert("Decimal(5, 2)", d("123.45")).unwrap(), ColumnData::Int32(vec![12345]));
        assert_eq!(convert("Decimal(5, 2)", d("1.5")).unwrap(), ColumnData::Int32(vec![150]));
        assert!(convert("Decimal(5, 2)", d("1234.5")).is_err());
        assert!(convert("Decimal(5, 2)", d("1.234")).is_err());
        assert_eq!(convert("Decimal(10, 0)", Value::Int64(42)).unwrap(), ColumnData::Int64(vec![42]));
        assert_eq!(convert("Decimal(10, 2)", Value::Float64(0.25)).unwrap(), ColumnData::Int64(vec![25]));
        assert!(convert("Decimal(10, 2)", Value::Float64(f64::NAN)).is_err());
    }

    #[test]
    fn date_range() {
        assert!(convert("Date", Value::Date(chrono::NaiveDate::from_ymd_opt(1969, 12, 31).unwrap())).is_err());
        assert!(convert("Date32", Value::Date(chrono::NaiveDate::from_ymd_opt(1969, 12, 31).unwrap())).is_ok());
    }

    #[test]
    fn tuple_arity() {
        let v = Value::Tuple(vec![Value::UInt8(1)]);
        assert!(convert("Tuple(UInt8, String)", v).is_err());
    }

    #[test]
    fn long_value_is_shortened() {
        let err = convert("UInt8", Value::String("x".repeat(1000))).unwrap_err();
        assert!(err.value().len() < 100);
    }
}
