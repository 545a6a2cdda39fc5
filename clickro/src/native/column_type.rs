use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::fmt;

use crate::Value;

/// Resolved ClickHouse column type.
///
/// Obtained from [`TypeRegistry::resolve`][super::TypeRegistry::resolve],
/// the [`Display`][fmt::Display] implementation gives the canonical type name
/// as understood by the server.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Float32,
    Float64,
    Bool,
    String,
    FixedString(usize),
    Uuid,
    IPv4,
    IPv6,
    /// Days since epoch, `u16`.
    Date,
    /// Days since epoch, `i32`.
    Date32,
    /// Seconds since epoch, with optional timezone.
    DateTime(Option<Tz>),
    /// Ticks of `10^-precision` seconds since epoch.
    DateTime64(u8, Option<Tz>),
    /// Precision and scale.
    Decimal(u8, u8),
    Enum8(Vec<(String, i8)>),
    Enum16(Vec<(String, i16)>),
    Nothing,
    Nullable(Box<ColumnType>),
    Array(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    Tuple {
        elements: Vec<ColumnType>,
        /// Element names, either all named or none.
        names: Option<Vec<String>>,
    },
    LowCardinality(Box<ColumnType>),
}

impl ColumnType {
    /// Returns `true` if the type is `Nullable`, or `LowCardinality(Nullable)`.
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Nullable(_) => true,
            Self::LowCardinality(inner) => inner.is_nullable(),
            _ => false,
        }
    }

    /// Returns the type without `Nullable` or `LowCardinality` wrapper.
    pub fn strip(&self) -> &ColumnType {
        match self {
            Self::Nullable(inner) | Self::LowCardinality(inner) => inner.strip(),
            ty => ty,
        }
    }

    /// Byte width of `Decimal` mantissa.
    pub(crate) fn decimal_width(precision: u8) -> usize {
        match precision {
            ..=9 => 4,
            10..=18 => 8,
            _ => 16,
        }
    }

    /// The value server stores for this type when none is given.
    pub fn default_value(&self) -> Value {
        match self {
            Self::UInt8 => Value::UInt8(0),
            Self::UInt16 => Value::UInt16(0),
            Self::UInt32 => Value::UInt32(0),
            Self::UInt64 => Value::UInt64(0),
            Self::UInt128 => Value::UInt128(0),
            Self::Int8 => Value::Int8(0),
            Self::Int16 => Value::Int16(0),
            Self::Int32 => Value::Int32(0),
            Self::Int64 => Value::Int64(0),
            Self::Int128 => Value::Int128(0),
            Self::Float32 => Value::Float32(0.0),
            Self::Float64 => Value::Float64(0.0),
            Self::Bool => Value::Bool(false),
            Self::String => Value::String(String::new()),
            Self::FixedString(n) => Value::String("\0".repeat(*n)),
            Self::Uuid => Value::Uuid(uuid::Uuid::nil()),
            Self::IPv4 => Value::Ipv4(std::net::Ipv4Addr::UNSPECIFIED),
            Self::IPv6 => Value::Ipv6(std::net::Ipv6Addr::UNSPECIFIED),
            Self::Date | Self::Date32 => Value::Date(NaiveDate::default()),
            Self::DateTime(tz) | Self::DateTime64(_, tz) => {
                Value::DateTime(DateTime::<Utc>::UNIX_EPOCH.with_timezone(&tz.unwrap_or(Tz::UTC)))
            }
            Self::Decimal(_, s) => Value::Decimal(crate::Decimal::new(0, *s)),
            Self::Enum8(labels) => match labels.first() {
                Some((label, _)) => Value::String(label.clone()),
                None => Value::Int8(0),
            },
            Self::Enum16(labels) => match labels.first() {
                Some((label, _)) => Value::String(label.clone()),
                None => Value::Int16(0),
            },
            Self::Nothing | Self::Nullable(_) => Value::Null,
            Self::Array(_) => Value::Array(vec![]),
            Self::Map(_, _) => Value::Map(vec![]),
            Self::Tuple { elements, .. } => {
                Value::Tuple(elements.iter().map(Self::default_value).collect())
            }
            Self::LowCardinality(inner) => inner.default_value(),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

fn write_enum<N: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    labels: &[(String, N)],
) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, (label, code)) in labels.iter().enumerate() {
        if i != 0 {
            f.write_str(", ")?;
        }
        write_quoted(f, label)?;
        write!(f, " = {code}")?;
    }
    f.write_str(")")
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UInt8 => f.write_str("UInt8"),
            Self::UInt16 => f.write_str("UInt16"),
            Self::UInt32 => f.write_str("UInt32"),
            Self::UInt64 => f.write_str("UInt64"),
            Self::UInt128 => f.write_str("UInt128"),
            Self::Int8 => f.write_str("Int8"),
            Self::Int16 => f.write_str("Int16"),
            Self::Int32 => f.write_str("Int32"),
            Self::Int64 => f.write_str("Int64"),
            Self::Int128 => f.write_str("Int128"),
            Self::Float32 => f.write_str("Float32"),
            Self::Float64 => f.write_str("Float64"),
            Self::Bool => f.write_str("Bool"),
            Self::String => f.write_str("String"),
            Self::FixedString(n) => write!(f, "FixedString({n})"),
            Self::Uuid => f.write_str("UUID"),
            Self::IPv4 => f.write_str("IPv4"),
            Self::IPv6 => f.write_str("IPv6"),
            Self::Date => f.write_str("Date"),
            Self::Date32 => f.write_str("Date32"),
            Self::DateTime(None) => f.write_str("DateTime"),
            Self::DateTime(Some(tz)) => {
                f.write_str("DateTime(")?;
                write_quoted(f, tz.name())?;
                f.write_str(")")
            }
            Self::DateTime64(p, None) => write!(f, "DateTime64({p})"),
            Self::DateTime64(p, Some(tz)) => {
                write!(f, "DateTime64({p}, ")?;
                write_quoted(f, tz.name())?;
                f.write_str(")")
            }
            Self::Decimal(p, s) => write!(f, "Decimal({p}, {s})"),
            Self::Enum8(labels) => write_enum(f, "Enum8", labels),
            Self::Enum16(labels) => write_enum(f, "Enum16", labels),
            Self::Nothing => f.write_str("Nothing"),
            Self::Nullable(inner) => write!(f, "Nullable({inner})"),
            Self::Array(inner) => write!(f, "Array({inner})"),
            Self::Map(k, v) => write!(f, "Map({k}, {v})"),
            Self::Tuple { elements, names } => {
                f.write_str("Tuple(")?;
                for (i, ty) in elements.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    match names.as_ref().and_then(|n| n.get(i)) {
                        Some(name) if name.chars().all(|c| c.is_alphanumeric() || c == '_') => {
                            write!(f, "{name} ")?
                        }
                        Some(name) => write!(f, "`{name}` ")?,
                        None => {}
                    }
                    write!(f, "{ty}")?;
                }
                f.write_str(")")
            }
            Self::LowCardinality(inner) => write!(f, "LowCardinality({inner})"),
        }
    }
}

impl fmt::Debug for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColumnType({self})")
    }
}

/// An error when type name cannot be resolved.
pub struct UnsupportedTypeError {
    name: String,
    reason: &'static str,
}

impl UnsupportedTypeError {
    pub(crate) fn new(name: impl Into<String>, reason: &'static str) -> Self {
        Self { name: name.into(), reason }
    }

    /// The type name as received.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::error::Error for UnsupportedTypeError { }

impl fmt::Display for UnsupportedTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported type `{}`: {}", self.name, self.reason)
    }
}

impl fmt::Debug for UnsupportedTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
