//! Server response metadata.
//!
//! - [`ServerError`], exception reported by the server
//! - [`QuerySummary`], progress counters from `X-ClickHouse-Summary`
use serde::{Deserialize, Deserializer, de};
use std::{collections::HashMap, fmt};

/// Header carrying the query id assigned by the server.
pub(crate) const QUERY_ID: &str = "x-clickhouse-query-id";
/// Header carrying the json encoded progress counters.
pub(crate) const SUMMARY: &str = "x-clickhouse-summary";
/// Header carrying the server default timezone.
pub(crate) const TIMEZONE: &str = "x-clickhouse-timezone";
/// Header carrying the exception code on failed request.
pub(crate) const EXCEPTION_CODE: &str = "x-clickhouse-exception-code";

const EXCEPTION_PREFIX: &[u8] = b"Code: ";

/// Returns `true` if `bytes` starts with an exception text.
///
/// Exceptions raised after the response headers are sent are appended to
/// the body as plain text.
pub(crate) fn is_exception(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !matches!(b, b'\r' | b'\n'))
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(EXCEPTION_PREFIX)
}

/// An exception reported by the server.
pub struct ServerError {
    code: i32,
    name: Option<String>,
    message: String,
    status: u16,
}

impl ServerError {
    /// Parse exception text, e.g.
    /// `Code: 60. DB::Exception: Table default.t does not exist. (UNKNOWN_TABLE) (version 24.3.1)`.
    ///
    /// Code from the `X-ClickHouse-Exception-Code` header wins over the one
    /// in the body.
    pub(crate) fn from_body(body: &[u8], status: u16, header_code: Option<i32>) -> Self {
        let text = String::from_utf8_lossy(body);
        let text = text.trim();

        let (body_code, rest) = match text.strip_prefix("Code: ") {
            Some(rest) => {
                let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
                let rest_after = rest[end..].trim_start_matches('.').trim_start();
                (rest[..end].parse().ok(), rest_after)
            }
            None => (None, text),
        };

        let rest = match rest.find("DB::Exception: ") {
            Some(at) => &rest[at + "DB::Exception: ".len()..],
            None => rest,
        };

        let (message, name) = split_name(rest);

        Self {
            code: header_code.or(body_code).unwrap_or_default(),
            name,
            message: message.to_owned(),
            status,
        }
    }

    /// Returns the exception code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Returns the exception name, e.g. `UNKNOWN_TABLE`.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the exception message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the http status code, `200` when the exception is raised
    /// mid stream.
    pub fn status(&self) -> u16 {
        self.status
    }
}

/// Split trailing `(NAME)` and `(version ..)` from message.
fn split_name(text: &str) -> (&str, Option<String>) {
    let mut message = text;
    if let Some(at) = message.rfind(" (version ") {
        message = message[..at].trim_end();
    }

    let Some(inner) = message.strip_suffix(')') else {
        return (message, None);
    };
    let Some(open) = inner.rfind('(') else {
        return (message, None);
    };

    let name = &inner[open + 1..];
    let is_name = !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
    match is_name {
        true => (inner[..open].trim_end(), Some(name.to_owned())),
        false => (message, None),
    }
}

impl std::error::Error for ServerError { }

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server error {}", self.code)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl fmt::Debug for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

// ===== Summary =====

/// Query progress counters reported by the server.
///
/// Counters are a snapshot at the time the response headers are sent,
/// unless `wait_end_of_query` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuerySummary {
    #[serde(skip)]
    query_id: String,
    #[serde(deserialize_with = "counter")]
    read_rows: u64,
    #[serde(deserialize_with = "counter")]
    read_bytes: u64,
    #[serde(deserialize_with = "counter")]
    written_rows: u64,
    #[serde(deserialize_with = "counter")]
    written_bytes: u64,
    #[serde(deserialize_with = "counter")]
    total_rows_to_read: u64,
    #[serde(deserialize_with = "counter")]
    result_rows: u64,
    #[serde(deserialize_with = "counter")]
    result_bytes: u64,
    #[serde(deserialize_with = "counter")]
    elapsed_ns: u64,
    #[serde(skip)]
    settings: HashMap<String, String>,
}

/// Counters are json strings, older servers send numbers.
fn counter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Counter {
        Number(u64),
        Text(String),
    }

    match Counter::deserialize(deserializer)? {
        Counter::Number(n) => Ok(n),
        Counter::Text(s) => s.parse().map_err(de::Error::custom),
    }
}

impl QuerySummary {
    /// Parse `X-ClickHouse-Summary` header value, a malformed header yields
    /// empty counters.
    pub(crate) fn from_header(query_id: Option<&str>, header: Option<&str>) -> Self {
        let mut summary = match header.map(serde_json::from_str::<QuerySummary>) {
            Some(Ok(summary)) => summary,
            Some(Err(_err)) => {
                #[cfg(feature = "log")]
                log::warn!("malformed summary header: {_err}");
                Self::default()
            }
            None => Self::default(),
        };
        summary.query_id = query_id.unwrap_or_default().to_owned();
        summary
    }

    pub(crate) fn set_settings(&mut self, settings: HashMap<String, String>) {
        self.settings = settings;
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn read_rows(&self) -> u64 {
        self.read_rows
    }

    pub fn read_bytes(&self) -> u64 {
        self.read_bytes
    }

    pub fn written_rows(&self) -> u64 {
        self.written_rows
    }

    pub fn written_bytes(&self) -> u64 {
        self.written_bytes
    }

    pub fn total_rows_to_read(&self) -> u64 {
        self.total_rows_to_read
    }

    pub fn result_rows(&self) -> u64 {
        self.result_rows
    }

    pub fn result_bytes(&self) -> u64 {
        self.result_bytes
    }

    /// Server side elapsed time.
    pub fn elapsed(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.elapsed_ns)
    }

    /// Settings sent with the request, after readonly filtering.
    pub fn settings(&self) -> &HashMap<String, String> {
        &self.settings
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detect_exception() {
        assert!(is_exception(b"Code: 60. DB::Exception: nope"));
        assert!(is_exception(b"\r\nCode: 60. DB::Exception: nope"));
        assert!(!is_exception(b"Code"));
        assert!(!is_exception(b"\x01\x02Code: "));
        assert!(!is_exception(b""));
    }

    #[test]
    fn parse_exception_body() {
        let body = b"Code: 60. DB::Exception: Table default.t does not exist. (UNKNOWN_TABLE) (version 24.3.1.1)\n";
        let err = ServerError::from_body(body, 404, None);
        assert_eq!(err.code(), 60);
        assert_eq!(err.name(), Some("UNKNOWN_TABLE"));
        assert_eq!(err.message(), "Table default.t does not exist.");
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn header_code_wins() {
        let err = ServerError::from_body(b"Code: 1. DB::Exception: x", 500, Some(62));
        assert_eq!(err.code(), 62);
        assert_eq!(err.name(), None);
        assert_eq!(err.message(), "x");
    }

    #[test]
    fn unstructured_body() {
        let err = ServerError::from_body(b"Bad Gateway", 502, None);
        assert_eq!(err.code(), 0);
        assert_eq!(err.message(), "Bad Gateway");
    }

    #[test]
    fn parse_summary() {
        let header = r#"{"read_rows":"2","read_bytes":"34","written_rows":"0","written_bytes":"0","total_rows_to_read":"2","result_rows":"2","result_bytes":"96","elapsed_ns":"1500"}"#;
        let summary = QuerySummary::from_header(Some("abc"), Some(header));
        assert_eq!(summary.query_id(), "abc");
        assert_eq!(summary.read_rows(), 2);
        assert_eq!(summary.result_bytes(), 96);
        assert_eq!(summary.elapsed().as_nanos(), 1500);

        let summary = QuerySummary::from_header(None, Some(r#"{"written_rows":5}"#));
        assert_eq!(summary.written_rows(), 5);
        assert_eq!(summary.read_rows(), 0);

        let summary = QuerySummary::from_header(None, Some("not json"));
        assert_eq!(summary, QuerySummary::default());
    }
}
