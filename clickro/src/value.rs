//! Dynamically typed column value.
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
    str::FromStr,
};
use uuid::Uuid;

use crate::common::unit_error;

/// A single ClickHouse value.
///
/// Decoded columns are stored as typed buffers, a `Value` is only created when
/// a row is projected, or when application data is handed over for insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Float32(f32),
    Float64(f64),
    /// Utf8 `String`, `FixedString` or `Enum` label.
    String(String),
    /// `String` or `FixedString` which is not valid utf8.
    Bytes(Bytes),
    Uuid(Uuid),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// `Date` and `Date32`.
    Date(NaiveDate),
    /// `DateTime` and `DateTime64` with resolved timezone.
    DateTime(DateTime<Tz>),
    Decimal(Decimal),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
}

impl Value {
    /// Returns `true` if value is `NULL`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the str if value is utf8 string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns raw bytes of `String` or `Bytes` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::String(s) => Some(s.as_bytes()),
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Widen any signed, unsigned integer or bool to `i128`.
    ///
    /// Returns `None` for `UInt128` above [`i128::MAX`].
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Self::Bool(v) => v as i128,
            Self::UInt8(v) => v.into(),
            Self::UInt16(v) => v.into(),
            Self::UInt32(v) => v.into(),
            Self::UInt64(v) => v.into(),
            Self::UInt128(v) => return i128::try_from(v).ok(),
            Self::Int8(v) => v.into(),
            Self::Int16(v) => v.into(),
            Self::Int32(v) => v.into(),
            Self::Int64(v) => v.into(),
            Self::Int128(v) => v,
            _ => return None,
        })
    }

    /// Widen any non negative integer to `u128`.
    pub fn as_u128(&self) -> Option<u128> {
        match *self {
            Self::UInt128(v) => Some(v),
            _ => self.as_i128().and_then(|v| u128::try_from(v).ok()),
        }
    }

    /// Returns value as `f64` for numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float32(v) => Some(v.into()),
            Self::Float64(v) => Some(v),
            Self::Decimal(d) => Some(d.to_f64()),
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    /// Variant name, used in error message.
    pub const fn variant(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::UInt8(_) => "UInt8",
            Self::UInt16(_) => "UInt16",
            Self::UInt32(_) => "UInt32",
            Self::UInt64(_) => "UInt64",
            Self::UInt128(_) => "UInt128",
            Self::Int8(_) => "Int8",
            Self::Int16(_) => "Int16",
            Self::Int32(_) => "Int32",
            Self::Int64(_) => "Int64",
            Self::Int128(_) => "Int128",
            Self::Float32(_) => "Float32",
            Self::Float64(_) => "Float64",
            Self::String(_) => "String",
            Self::Bytes(_) => "Bytes",
            Self::Uuid(_) => "UUID",
            Self::Ipv4(_) => "IPv4",
            Self::Ipv6(_) => "IPv6",
            Self::Date(_) => "Date",
            Self::DateTime(_) => "DateTime",
            Self::Decimal(_) => "Decimal",
            Self::Array(_) => "Array",
            Self::Map(_) => "Map",
            Self::Tuple(_) => "Tuple",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::ext::FmtExt;
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => v.fmt(f),
            Self::UInt8(v) => v.fmt(f),
            Self::UInt16(v) => v.fmt(f),
            Self::UInt32(v) => v.fmt(f),
            Self::UInt64(v) => v.fmt(f),
            Self::UInt128(v) => v.fmt(f),
            Self::Int8(v) => v.fmt(f),
            Self::Int16(v) => v.fmt(f),
            Self::Int32(v) => v.fmt(f),
            Self::Int64(v) => v.fmt(f),
            Self::Int128(v) => v.fmt(f),
            Self::Float32(v) => v.fmt(f),
            Self::Float64(v) => v.fmt(f),
            Self::String(v) => v.fmt(f),
            Self::Bytes(v) => v.lossy().fmt(f),
            Self::Uuid(v) => v.fmt(f),
            Self::Ipv4(v) => v.fmt(f),
            Self::Ipv6(v) => v.fmt(f),
            Self::Date(v) => v.fmt(f),
            Self::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f %Z").fmt(f),
            Self::Decimal(v) => v.fmt(f),
            Self::Array(items) | Self::Tuple(items) => {
                let (open, close) = match self {
                    Self::Array(_) => ('[', ']'),
                    _ => ('(', ')'),
                };
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                write!(f, "{close}")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

macro_rules! from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

from! {
    bool => Bool,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    u128 => UInt128,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i128 => Int128,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Bytes => Bytes,
    Uuid => Uuid,
    Ipv4Addr => Ipv4,
    Ipv6Addr => Ipv6,
    NaiveDate => Date,
    DateTime<Tz> => DateTime,
    Decimal => Decimal,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value.with_timezone(&Tz::UTC))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Self::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

// ===== Decimal =====

/// Largest supported precision, `Decimal128`.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// Exact fixed point number, `mantissa * 10^-scale`.
///
/// Scale is applied only when presenting, so no floating point rounding ever
/// happen between the wire and the application.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    /// Create decimal from its raw parts.
    pub const fn new(mantissa: i128, scale: u8) -> Self {
        Self { mantissa, scale }
    }

    pub const fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub const fn scale(&self) -> u8 {
        self.scale
    }

    /// Change the scale without losing any digit.
    ///
    /// Returns `None` if digits would be truncated or the mantissa overflow.
    pub fn rescale(self, scale: u8) -> Option<Decimal> {
        use std::cmp::Ordering::*;
        let mantissa = match scale.cmp(&self.scale) {
            Equal => self.mantissa,
            Greater => self.mantissa.checked_mul(pow10(scale - self.scale)?)?,
            Less => {
                let div = pow10(self.scale - scale)?;
                if self.mantissa % div != 0 {
                    return None;
                }
                self.mantissa / div
            }
        };
        Some(Self { mantissa, scale })
    }

    /// Number of significant decimal digits of the mantissa.
    pub fn digits(&self) -> u8 {
        let mut n = self.mantissa.unsigned_abs();
        let mut digits = 1;
        while n >= 10 {
            n /= 10;
            digits += 1;
        }
        digits
    }

    /// Lossy conversion to `f64`.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }
}

pub(crate) fn pow10(exp: u8) -> Option<i128> {
    10i128.checked_pow(exp.into())
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = usize::from(self.scale);
        if self.mantissa < 0 {
            f.write_str("-")?;
        }
        if scale == 0 {
            return f.write_str(&digits);
        }
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{int}.{frac}")
        } else {
            write!(f, "0.{digits:0>scale$}")
        }
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({self})")
    }
}

unit_error! {
    /// An error when parsing [`Decimal`] from string.
    pub struct ParseDecimalError("invalid decimal literal");
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (int, frac) = body.split_once('.').unwrap_or((body, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(ParseDecimalError);
        }
        if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(ParseDecimalError);
        }
        let scale = u8::try_from(frac.len()).map_err(|_| ParseDecimalError)?;
        if scale > MAX_DECIMAL_PRECISION {
            return Err(ParseDecimalError);
        }
        let mut mantissa = 0i128;
        for b in int.bytes().chain(frac.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(b - b'0')))
                .ok_or(ParseDecimalError)?;
        }
        Ok(Self { mantissa: if negative { -mantissa } else { mantissa }, scale })
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self { mantissa: value.into(), scale: 0 }
    }
}
