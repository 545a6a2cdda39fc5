//! Query parameter binding.
//!
//! Two placeholder styles are supported:
//!
//! - server side, `{name:Type}`, values are sent as `param_<name>` query
//!   string fields and substituted by the server, see [`bind_server_side`]
//! - client side, `%(name)s` or `%s`, values are rendered as quoted sql
//!   literals into the query text, see [`bind_client_side`]
use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use std::fmt::{self, Write};

use crate::Value;

/// Query parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Bound by name, `{name:Type}` or `%(name)s`.
    Named(Vec<(String, Value)>),
    /// Bound by position, `%s`.
    Positional(Vec<Value>),
}

impl Default for Params {
    fn default() -> Self {
        Self::Named(Vec::new())
    }
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Named(v) => v.is_empty(),
            Self::Positional(v) => v.is_empty(),
        }
    }

    /// Add named parameter, replacing the previous value with the same name.
    pub(crate) fn push_named(&mut self, name: String, value: Value) -> Result<(), BindError> {
        let Self::Named(params) = self else {
            return Err(BindError::Mixed);
        };
        match params.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => params.push((name, value)),
        }
        Ok(())
    }

    pub(crate) fn push_positional(&mut self, value: Value) -> Result<(), BindError> {
        match self {
            Self::Positional(params) => params.push(value),
            Self::Named(params) if params.is_empty() => *self = Self::Positional(vec![value]),
            Self::Named(_) => return Err(BindError::Mixed),
        }
        Ok(())
    }

    fn named(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Named(params) => params.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            Self::Positional(_) => None,
        }
    }

    /// Bind with the style found in `query`.
    ///
    /// Named parameters use the server side style when the query contains
    /// `{name:Type}` placeholders, otherwise the client side style.
    pub(crate) fn bind(&self, query: &str) -> Result<(String, Vec<(String, String)>), BindError> {
        if self.is_empty() {
            return Ok((query.to_owned(), Vec::new()));
        }
        match self {
            Self::Named(_) if placeholders(query).next().is_some() => bind_server_side(query, self),
            _ => Ok((bind_client_side(query, self)?, Vec::new())),
        }
    }
}

/// Bind parameters for server side substitution.
///
/// The query is returned unchanged, alongside `(param_<name>, value)` pairs
/// with value in the text escaped form.
pub fn bind_server_side(
    query: &str,
    params: &Params,
) -> Result<(String, Vec<(String, String)>), BindError> {
    let Params::Named(named) = params else {
        return Err(BindError::Mixed);
    };

    let mut sidecar: Vec<(String, String)> = Vec::new();
    for name in placeholders(query) {
        let field = format!("param_{name}");
        if sidecar.iter().any(|(k, _)| *k == field) {
            continue;
        }
        let value = params.named(name).ok_or_else(|| BindError::Missing(name.to_owned()))?;
        sidecar.push((field, server_text(value)));
    }

    if let Some((name, _)) = named
        .iter()
        .find(|(name, _)| !sidecar.iter().any(|(k, _)| k[6..] == **name))
    {
        return Err(BindError::Unused(name.clone()));
    }

    Ok((query.to_owned(), sidecar))
}

/// Render parameters as sql literals into the query.
///
/// `%(name)s` takes named parameter, `%s` takes the next positional one, and
/// `%%` is a literal percent sign.
pub fn bind_client_side(query: &str, params: &Params) -> Result<String, BindError> {
    let mut out = String::with_capacity(query.len());
    let mut used = Vec::new();
    let mut position = 0;
    let mut rest = query;

    while let Some(at) = rest.find('%') {
        out.push_str(&rest[..at]);
        rest = &rest[at + 1..];

        if let Some(r) = rest.strip_prefix('%') {
            out.push('%');
            rest = r;
        } else if let Some(r) = rest.strip_prefix('s') {
            let Params::Positional(values) = params else {
                return Err(BindError::Mixed);
            };
            let value = values.get(position).ok_or(BindError::Count {
                placeholders: position + 1,
                values: values.len(),
            })?;
            literal(value, &mut out);
            position += 1;
            rest = r;
        } else if let Some((name, r)) = rest
            .strip_prefix('(')
            .and_then(|r| r.split_once(')'))
            .and_then(|(name, r)| Some((name, r.strip_prefix('s')?)))
        {
            if let Params::Positional(_) = params {
                return Err(BindError::Mixed);
            }
            let value = params.named(name).ok_or_else(|| BindError::Missing(name.to_owned()))?;
            literal(value, &mut out);
            used.push(name);
            rest = r;
        } else {
            out.push('%');
        }
    }
    out.push_str(rest);

    match params {
        Params::Positional(values) if values.len() != position => Err(BindError::Count {
            placeholders: position,
            values: values.len(),
        }),
        Params::Named(named) => match named.iter().find(|(k, _)| !used.contains(&k.as_str())) {
            Some((name, _)) => Err(BindError::Unused(name.clone())),
            None => Ok(out),
        },
        _ => Ok(out),
    }
}

/// Iterate `{name:Type}` placeholder names, skipping quoted strings.
fn placeholders(query: &str) -> impl Iterator<Item = &str> {
    let bytes = query.as_bytes();
    let mut i = 0;
    std::iter::from_fn(move || {
        while i < bytes.len() {
            match bytes[i] {
                b'\'' | b'"' | b'`' => i = skip_quoted(bytes, i),
                b'{' => {
                    let start = i + 1;
                    i += 1;
                    if let Some((name, end)) = placeholder(query, start) {
                        i = end;
                        return Some(name);
                    }
                }
                _ => i += 1,
            }
        }
        None
    })
}

/// Parse `name:Type}` at `start`, returns the name and the offset after `}`.
fn placeholder(query: &str, start: usize) -> Option<(&str, usize)> {
    let rest = &query[start..];
    let colon = rest.find(':')?;
    let name = &rest[..colon];
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return None;
    }
    let close = rest[colon..].find(['}', '{'])? + colon;
    match rest.as_bytes()[close] == b'}' && close > colon + 1 {
        true => Some((name, start + close + 1)),
        false => None,
    }
}

/// Returns offset after the closing quote.
fn skip_quoted(bytes: &[u8], open: usize) -> usize {
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

// ===== Formatting =====

/// Quote identifier with backticks, an already quoted identifier is kept.
pub fn quote_identifier(name: &str) -> String {
    if is_quoted(name) {
        return name.to_owned();
    }
    let mut out = String::with_capacity(name.len() + 2);
    out.push('`');
    for c in name.chars() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('`');
    out
}

/// Enclosed in backticks, with every inner backtick escaped.
fn is_quoted(name: &str) -> bool {
    let Some(inner) = name
        .strip_prefix('`')
        .and_then(|name| name.strip_suffix('`'))
    else {
        return false;
    };
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if chars.next().is_none() {
                    return false;
                }
            }
            '`' => return false,
            _ => {}
        }
    }
    true
}

fn escape(bytes: &[u8], quote: bool, out: &mut String) {
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\t' => out.push_str("\\t"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\0' => out.push_str("\\0"),
                '\'' if quote => out.push_str("\\'"),
                c => out.push(c),
            }
        }
        for b in chunk.invalid() {
            let _ = write!(out, "\\x{b:02X}");
        }
    }
}

fn quoted_str(bytes: &[u8], out: &mut String) {
    out.push('\'');
    escape(bytes, true, out);
    out.push('\'');
}

struct Float(f64);

impl fmt::Display for Float {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            n if n.is_nan() => f.write_str("nan"),
            n if n.is_infinite() && n > 0.0 => f.write_str("inf"),
            n if n.is_infinite() => f.write_str("-inf"),
            n => write!(f, "{n}"),
        }
    }
}

/// Seconds since epoch, with fraction when present.
fn epoch(dt: &DateTime<Tz>) -> String {
    let secs = dt.timestamp();
    match dt.nanosecond() {
        0 => secs.to_string(),
        nanos => {
            let fraction = format!("{nanos:09}");
            format!("{secs}.{}", fraction.trim_end_matches('0'))
        }
    }
}

/// Write scalar without quotes, returns `false` for composite and string
/// values.
fn plain(value: &Value, out: &mut String) -> bool {
    let _ = match value {
        Value::Bool(v) => write!(out, "{v}"),
        Value::UInt8(v) => write!(out, "{v}"),
        Value::UInt16(v) => write!(out, "{v}"),
        Value::UInt32(v) => write!(out, "{v}"),
        Value::UInt64(v) => write!(out, "{v}"),
        Value::UInt128(v) => write!(out, "{v}"),
        Value::Int8(v) => write!(out, "{v}"),
        Value::Int16(v) => write!(out, "{v}"),
        Value::Int32(v) => write!(out, "{v}"),
        Value::Int64(v) => write!(out, "{v}"),
        Value::Int128(v) => write!(out, "{v}"),
        Value::Float32(v) => write!(out, "{}", Float((*v).into())),
        Value::Float64(v) => write!(out, "{}", Float(*v)),
        Value::Decimal(v) => write!(out, "{v}"),
        Value::Uuid(v) => write!(out, "{v}"),
        Value::Ipv4(v) => write!(out, "{v}"),
        Value::Ipv6(v) => write!(out, "{v}"),
        Value::Date(v) => write!(out, "{}", v.format("%Y-%m-%d")),
        Value::DateTime(v) => write!(out, "{}", epoch(v)),
        _ => return false,
    };
    true
}

/// Value in the text escaped form used by `param_<name>` fields.
fn server_text(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Null => out.push_str("\\N"),
        Value::String(s) => escape(s.as_bytes(), false, &mut out),
        Value::Bytes(b) => escape(b, false, &mut out),
        Value::Array(_) | Value::Map(_) | Value::Tuple(_) => quoted(value, &mut out),
        scalar => {
            plain(scalar, &mut out);
        }
    }
    out
}

/// Value in the quoted form, as in `VALUES` format.
fn quoted(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::String(s) => quoted_str(s.as_bytes(), out),
        Value::Bytes(b) => quoted_str(b, out),
        Value::Uuid(_) | Value::Ipv4(_) | Value::Ipv6(_) | Value::Date(_) | Value::DateTime(_) => {
            out.push('\'');
            plain(value, out);
            out.push('\'');
        }
        Value::Array(values) => list('[', values, ']', quoted, out),
        Value::Tuple(values) => list('(', values, ')', quoted, out),
        Value::Map(entries) => {
            out.push('{');
            for (i, (k, v)) in entries.iter().enumerate() {
                if i != 0 {
                    out.push(',');
                }
                quoted(k, out);
                out.push(':');
                quoted(v, out);
            }
            out.push('}');
        }
        scalar => {
            plain(scalar, out);
        }
    }
}

/// Value as sql expression.
fn literal(value: &Value, out: &mut String) {
    match value {
        Value::DateTime(dt) => {
            let text = dt.format("%Y-%m-%d %H:%M:%S");
            let tz = dt.timezone().name();
            let _ = match dt.nanosecond() {
                0 => write!(out, "toDateTime('{text}', '{tz}')"),
                nanos => write!(out, "toDateTime64('{text}.{nanos:09}', 9, '{tz}')"),
            };
        }
        Value::Decimal(d) => {
            let _ = write!(out, "toDecimal128('{d}', {})", d.scale());
        }
        Value::Array(values) => list('[', values, ']', literal, out),
        Value::Tuple(values) if values.len() == 1 => list_fn("tuple", values, out),
        Value::Tuple(values) => list('(', values, ')', literal, out),
        Value::Map(entries) => {
            out.push_str("map(");
            for (i, (k, v)) in entries.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                literal(k, out);
                out.push_str(", ");
                literal(v, out);
            }
            out.push(')');
        }
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        value => quoted(value, out),
    }
}

fn list(open: char, values: &[Value], close: char, f: fn(&Value, &mut String), out: &mut String) {
    out.push(open);
    for (i, value) in values.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        f(value, out);
    }
    out.push(close);
}

fn list_fn(name: &str, values: &[Value], out: &mut String) {
    out.push_str(name);
    list('(', values, ')', literal, out);
}

// ===== Error =====

/// Parameter binding failed.
#[derive(Clone)]
pub enum BindError {
    /// Placeholder without value.
    Missing(String),
    /// Named value without placeholder.
    Unused(String),
    /// Positional placeholder and value count differ.
    Count { placeholders: usize, values: usize },
    /// Named and positional style mixed.
    Mixed,
}

impl std::error::Error for BindError { }

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(name) => write!(f, "no value bound for parameter `{name}`"),
            Self::Unused(name) => write!(f, "parameter `{name}` is not used in query"),
            Self::Count { placeholders, values } => write!(
                f,
                "query has {placeholders} positional placeholders, but {values} values are bound"
            ),
            Self::Mixed => f.write_str("named and positional parameters cannot be mixed"),
        }
    }
}

impl fmt::Debug for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
