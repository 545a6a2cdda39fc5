//! Recursive descent parser for type names.
use chrono_tz::Tz;

use super::{ColumnType, UnsupportedTypeError};
use crate::value::MAX_DECIMAL_PRECISION;

type Result<T> = std::result::Result<T, UnsupportedTypeError>;

/// Parse a type name as sent in a block header.
pub(crate) fn parse(name: &str) -> Result<ColumnType> {
    Parser { full: name }.parse_type(name.trim())
}

struct Parser<'a> {
    /// Whole input, for error reporting.
    full: &'a str,
}

impl Parser<'_> {
    fn err(&self, reason: &'static str) -> UnsupportedTypeError {
        UnsupportedTypeError::new(self.full, reason)
    }

    fn parse_type(&self, s: &str) -> Result<ColumnType> {
        let Some(open) = s.find('(') else {
            return self.simple(s);
        };
        let Some(args) = s[open + 1..].strip_suffix(')') else {
            return Err(self.err("unbalanced parentheses"));
        };
        let base = s[..open].trim();
        let args = split_args(args).ok_or_else(|| self.err("unbalanced quote"))?;

        use ColumnType as T;
        let ty = match (base, args.as_slice()) {
            ("Nullable", [inner]) => T::Nullable(Box::new(self.parse_type(inner)?)),
            ("Array", [inner]) => T::Array(Box::new(self.parse_type(inner)?)),
            ("LowCardinality", [inner]) => T::LowCardinality(Box::new(self.parse_type(inner)?)),
            ("Map", [k, v]) => T::Map(Box::new(self.parse_type(k)?), Box::new(self.parse_type(v)?)),
            ("Tuple", elements) => self.tuple(elements)?,
            ("SimpleAggregateFunction", [_, inner]) => self.parse_type(inner)?,
            ("FixedString", [n]) => T::FixedString(self.number(n)?),
            ("DateTime", [tz]) => T::DateTime(Some(self.timezone(tz)?)),
            ("DateTime64", [p]) => T::DateTime64(self.precision(p)?, None),
            ("DateTime64", [p, tz]) => T::DateTime64(self.precision(p)?, Some(self.timezone(tz)?)),
            ("Decimal", [p, s]) => self.decimal(self.number(p)?, self.number(s)?)?,
            ("Decimal32", [s]) => self.decimal(9, self.number(s)?)?,
            ("Decimal64", [s]) => self.decimal(18, self.number(s)?)?,
            ("Decimal128", [s]) => self.decimal(38, self.number(s)?)?,
            ("Decimal256", _) => return Err(self.err("256 bit decimal is not supported")),
            ("Enum8", labels) => T::Enum8(self.labels(labels)?),
            ("Enum16", labels) => T::Enum16(self.labels(labels)?),
            ("Object" | "JSON" | "Variant" | "Dynamic", _) => {
                return Err(self.err("semi structured type is not supported"));
            }
            ("Nullable" | "Array" | "LowCardinality" | "Map" | "FixedString" | "DateTime"
                | "DateTime64" | "Decimal" | "Decimal32" | "Decimal64" | "Decimal128"
                | "SimpleAggregateFunction", _) => {
                return Err(self.err("wrong number of type arguments"));
            }
            _ => return Err(self.err("unknown type")),
        };
        Ok(ty)
    }

    fn simple(&self, s: &str) -> Result<ColumnType> {
        use ColumnType as T;
        let point = || T::Tuple { elements: vec![T::Float64, T::Float64], names: None };
        let ring = || T::Array(Box::new(point()));
        let polygon = || T::Array(Box::new(ring()));
        Ok(match s {
            "UInt8" => T::UInt8,
            "UInt16" => T::UInt16,
            "UInt32" => T::UInt32,
            "UInt64" => T::UInt64,
            "UInt128" => T::UInt128,
            "Int8" => T::Int8,
            "Int16" => T::Int16,
            "Int32" => T::Int32,
            "Int64" => T::Int64,
            "Int128" => T::Int128,
            "Float32" => T::Float32,
            "Float64" => T::Float64,
            "Bool" => T::Bool,
            "String" => T::String,
            "UUID" => T::Uuid,
            "IPv4" => T::IPv4,
            "IPv6" => T::IPv6,
            "Date" => T::Date,
            "Date32" => T::Date32,
            "DateTime" => T::DateTime(None),
            "Nothing" => T::Nothing,
            "Point" => point(),
            "Ring" => ring(),
            "Polygon" => polygon(),
            "MultiPolygon" => T::Array(Box::new(polygon())),
            "Int256" | "UInt256" => return Err(self.err("256 bit integer is not supported")),
            "JSON" | "Object" | "Dynamic" => {
                return Err(self.err("semi structured type is not supported"));
            }
            _ => return Err(self.err("unknown type")),
        })
    }

    fn tuple(&self, elements: &[&str]) -> Result<ColumnType> {
        let mut types = Vec::with_capacity(elements.len());
        let mut names = Vec::with_capacity(elements.len());

        for element in elements {
            match split_name(element) {
                Some((name, ty)) => {
                    names.push(name);
                    types.push(self.parse_type(ty)?);
                }
                None => types.push(self.parse_type(element)?),
            }
        }

        let names = match names.len() {
            0 => None,
            n if n == types.len() => Some(names),
            _ => return Err(self.err("tuple elements must be all named or all unnamed")),
        };

        Ok(ColumnType::Tuple { elements: types, names })
    }

    fn number<N: std::str::FromStr>(&self, s: &str) -> Result<N> {
        s.trim().parse().map_err(|_| self.err("invalid numeric argument"))
    }

    fn precision(&self, s: &str) -> Result<u8> {
        match self.number(s)? {
            p @ 0..=9 => Ok(p),
            _ => Err(self.err("DateTime64 precision must be at most 9")),
        }
    }

    fn decimal(&self, precision: u8, scale: u8) -> Result<ColumnType> {
        if precision == 0 || precision > MAX_DECIMAL_PRECISION {
            return Err(self.err("decimal precision must be between 1 and 38"));
        }
        if scale > precision {
            return Err(self.err("decimal scale exceeds precision"));
        }
        Ok(ColumnType::Decimal(precision, scale))
    }

    fn timezone(&self, s: &str) -> Result<Tz> {
        let name = unquote(s.trim()).ok_or_else(|| self.err("timezone must be quoted"))?;
        name.parse().map_err(|_| self.err("unknown timezone"))
    }

    fn labels<N: std::str::FromStr>(&self, labels: &[&str]) -> Result<Vec<(String, N)>> {
        labels
            .iter()
            .map(|entry| {
                let entry = entry.trim();
                let end = closing_quote(entry).ok_or_else(|| self.err("enum label must be quoted"))?;
                let label = unquote(&entry[..=end]).ok_or_else(|| self.err("invalid enum label"))?;
                let code = entry[end + 1..]
                    .trim()
                    .strip_prefix('=')
                    .ok_or_else(|| self.err("enum label without value"))?;
                Ok((label, self.number(code)?))
            })
            .collect()
    }
}

/// Split arguments at commas on nesting depth zero, outside of quotes.
fn split_args(s: &str) -> Option<Vec<&str>> {
    let mut args = vec![];
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                args.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() || depth != 0 {
        return None;
    }
    let last = s[start..].trim();
    if !last.is_empty() || !args.is_empty() {
        args.push(last);
    }
    Some(args)
}

/// Split `name Type` of a named tuple element.
fn split_name(element: &str) -> Option<(String, &str)> {
    if element.starts_with('`') {
        let end = element[1..].find('`')? + 1;
        let name = element[1..end].to_owned();
        return Some((name, element[end + 1..].trim()));
    }
    let ws = element.find(char::is_whitespace)?;
    let name = &element[..ws];
    let valid = name.chars().all(|c| c.is_alphanumeric() || c == '_');
    // `DateTime64(3, 'UTC')` is never split here, whitespace only appears inside parentheses
    match valid && !name.is_empty() {
        true => Some((name.to_owned(), element[ws..].trim())),
        false => None,
    }
}

/// Byte index of the quote closing the one at index 0.
fn closing_quote(s: &str) -> Option<usize> {
    if !s.starts_with('\'') {
        return None;
    }
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '\'' => return Some(i),
            _ => {}
        }
    }
    None
}

/// Remove single quotes and resolve backslash escapes.
fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            c => out.push(c),
        }
    }
    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use ColumnType as T;

    #[test]
    fn nested() {
        assert_eq!(
            parse("Array(Nullable(UInt32))").unwrap(),
            T::Array(Box::new(T::Nullable(Box::new(T::UInt32)))),
        );
        assert_eq!(
            parse("Map(LowCardinality(String), Array(Int64))").unwrap(),
            T::Map(
                Box::new(T::LowCardinality(Box::new(T::String))),
                Box::new(T::Array(Box::new(T::Int64))),
            ),
        );
    }

    #[test]
    fn named_tuple() {
        let ty = parse("Tuple(a UInt8, `b c` Nullable(String), d DateTime64(3, 'UTC'))").unwrap();
        let T::Tuple { elements, names } = ty else {
            panic!("not a tuple");
        };
        assert_eq!(names.unwrap(), ["a", "b c", "d"]);
        assert_eq!(elements[2], T::DateTime64(3, Some(Tz::UTC)));
    }

    #[test]
    fn enum_labels_with_quotes_and_commas() {
        let ty = parse(r"Enum8('a, b' = 1, 'it\'s' = -2, 'x(y' = 3)").unwrap();
        assert_eq!(
            ty,
            T::Enum8(vec![("a, b".into(), 1), ("it's".into(), -2), ("x(y".into(), 3)]),
        );
        assert_eq!(parse(&ty.to_string()).unwrap(), ty);
    }

    #[test]
    fn decimals() {
        assert_eq!(parse("Decimal(10, 2)").unwrap(), T::Decimal(10, 2));
        assert_eq!(parse("Decimal32(4)").unwrap(), T::Decimal(9, 4));
        assert_eq!(parse("Decimal128(10)").unwrap(), T::Decimal(38, 10));
        assert!(parse("Decimal(76, 2)").is_err());
        assert!(parse("Decimal256(2)").is_err());
        assert!(parse("Decimal(5, 6)").is_err());
    }

    #[test]
    fn datetime() {
        assert_eq!(parse("DateTime").unwrap(), T::DateTime(None));
        assert_eq!(
            parse("DateTime('Asia/Tokyo')").unwrap(),
            T::DateTime(Some(chrono_tz::Asia::Tokyo)),
        );
        assert_eq!(parse("DateTime64(6)").unwrap(), T::DateTime64(6, None));
        assert!(parse("DateTime('Mars/Olympus')").is_err());
        assert!(parse("DateTime64(10)").is_err());
    }

    #[test]
    fn aliases() {
        assert_eq!(parse("SimpleAggregateFunction(sum, UInt64)").unwrap(), T::UInt64);
        assert_eq!(
            parse("Ring").unwrap().to_string(),
            "Array(Tuple(Float64, Float64))",
        );
    }

    #[test]
    fn unsupported() {
        for name in ["Int256", "UInt256", "JSON", "Object('json')", "Variant(String, UInt8)", "Dynamic", "Foo", "Array(UInt8"] {
            assert!(parse(name).is_err(), "{name}");
        }
        assert_eq!(parse("Foo").unwrap_err().name(), "Foo");
    }

    #[test]
    fn canonical_display() {
        for name in [
            "Nullable(FixedString(16))",
            "LowCardinality(Nullable(String))",
            "Tuple(a UInt8, b String)",
            "DateTime64(3, 'Europe/Berlin')",
            "Map(String, Decimal(18, 4))",
        ] {
            assert_eq!(parse(name).unwrap().to_string(), name);
        }
    }
}
