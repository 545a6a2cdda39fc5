//! In-memory ClickHouse for end to end tests.
//!
//! Understands just enough sql to play the server: `INSERT INTO t FORMAT
//! Native` stores rows, `SELECT * FROM t` returns them, `DESCRIBE TABLE t`
//! returns the schema, anything else is answered by canned responses.
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use std::{
    collections::{HashMap, VecDeque},
    future::poll_fn,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};
use url::Url;

use super::{
    ConnectionError, ConnectionErrorKind, HttpRequest, HttpResponse, HttpTransport, Method,
    RequestBody,
};
use crate::{
    Value,
    native::{Block, BlockReader, Column, Format, TypeRegistry, compress_frame},
};

/// Response body is split into chunks of this size.
const CHUNK: usize = 16;

#[derive(Default)]
pub(crate) struct MockServer {
    state: Mutex<State>,
    body_dropped: Arc<AtomicBool>,
    registry: Arc<TypeRegistry>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, MockTable>,
    responses: Vec<(String, MockResponse)>,
    fail_connect: u32,
    corrupt_next: bool,
    timezone: Option<String>,
    requests: Vec<Recorded>,
}

struct MockTable {
    /// Name, type and default kind.
    columns: Vec<(String, String, String)>,
    rows: Vec<Vec<Value>>,
}

/// Canned response.
#[derive(Clone)]
pub(crate) struct MockResponse {
    status: u16,
    code: Option<i32>,
    columns: Option<Vec<(String, String, Vec<Value>)>>,
    text: Bytes,
    headers: Vec<(String, String)>,
}

/// Request as received by the server.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: Vec<(&'static str, String)>,
    pub(crate) sql: String,
}

impl Recorded {
    pub(crate) fn field(&self, key: &str) -> Option<String> {
        self.url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl MockResponse {
    /// One Native block.
    pub(crate) fn columns(columns: Vec<(&str, &str, Vec<Value>)>) -> Self {
        let columns = columns
            .into_iter()
            .map(|(name, ty, values)| (name.to_owned(), ty.to_owned(), values))
            .collect();
        Self { columns: Some(columns), ..Self::text(200, "") }
    }

    pub(crate) fn text(status: u16, text: &str) -> Self {
        Self {
            status,
            code: None,
            columns: None,
            text: Bytes::copy_from_slice(text.as_bytes()),
            headers: Vec::new(),
        }
    }

    /// Failed response with `X-ClickHouse-Exception-Code`.
    pub(crate) fn exception(status: u16, code: i32, text: &str) -> Self {
        Self { code: Some(code), ..Self::text(status, text) }
    }

    /// Append an exception after the blocks, as the server does when the
    /// query fails after the response headers are sent.
    pub(crate) fn then_exception(mut self, text: &str) -> Self {
        self.text = Bytes::copy_from_slice(text.as_bytes());
        self
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_owned()));
        self
    }
}

impl MockServer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn create_table(&self, name: &str, columns: &[(&str, &str)]) {
        let columns = columns
            .iter()
            .map(|(name, ty)| (name.to_string(), ty.to_string(), String::new()))
            .collect();
        self.lock().tables.insert(name.to_owned(), MockTable { columns, rows: Vec::new() });
    }

    /// Add a column computed by the server, never part of an insert.
    pub(crate) fn materialized(&self, table: &str, name: &str, ty: &str) {
        if let Some(table) = self.lock().tables.get_mut(table) {
            table.columns.push((name.to_owned(), ty.to_owned(), "MATERIALIZED".to_owned()));
        }
    }

    /// Answer queries starting with `prefix`.
    pub(crate) fn respond(&self, prefix: &str, response: MockResponse) {
        self.lock().responses.push((prefix.to_owned(), response));
    }

    /// Refuse the next `n` connections.
    pub(crate) fn fail_connect(&self, n: u32) {
        self.lock().fail_connect = n;
    }

    /// Corrupt the next compressed response.
    pub(crate) fn corrupt_next(&self) {
        self.lock().corrupt_next = true;
    }

    pub(crate) fn set_timezone(&self, tz: &str) {
        self.lock().timezone = Some(tz.to_owned());
    }

    pub(crate) fn requests(&self) -> Vec<Recorded> {
        self.lock().requests.clone()
    }

    pub(crate) fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        self.lock().tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Returns `true` if the last response body was dropped.
    pub(crate) fn body_dropped(&self) -> bool {
        self.body_dropped.load(Ordering::SeqCst)
    }

    async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, ConnectionError> {
        {
            let mut state = self.lock();
            if state.fail_connect > 0 {
                state.fail_connect -= 1;
                return Err(ConnectionError::new(
                    ConnectionErrorKind::Connect,
                    false,
                    "connection refused",
                ));
            }
        }

        if request.method == Method::Get && request.url.path() == "/ping" {
            return Ok(self.render(MockResponse::text(200, "Ok.\n"), false, None));
        }

        let HttpRequest { method, url, headers, body } = request;
        let body = read(body).await?;
        let field = |key: &str| {
            url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
        };

        let sql = match field("query") {
            Some(sql) => sql,
            None => String::from_utf8_lossy(&body).into_owned(),
        };
        let compress = field("compress").as_deref() == Some("1");
        let decompress = field("decompress").as_deref() == Some("1");
        let query_id = field("query_id");

        self.lock().requests.push(Recorded { method, url: url.clone(), headers, sql: sql.clone() });

        let response = self.answer(&sql, &body, decompress);
        Ok(self.render(response, compress, query_id))
    }

    fn answer(&self, sql: &str, body: &[u8], decompress: bool) -> MockResponse {
        let sql = sql.trim_start();
        let upper = sql.to_ascii_uppercase();

        let canned = self
            .lock()
            .responses
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone());
        if let Some(response) = canned {
            return response;
        }

        if upper.starts_with("INSERT INTO") {
            let (table, _) = ident(&sql["INSERT INTO".len()..]);
            return self.insert(&table, body, decompress);
        }
        if upper.starts_with("DESCRIBE TABLE") {
            let (table, _) = ident(&sql["DESCRIBE TABLE".len()..]);
            return self.describe(&table);
        }
        if upper.starts_with("SELECT * FROM") {
            let (table, _) = ident(&sql["SELECT * FROM".len()..]);
            return self.select(&table);
        }
        if ["CREATE", "DROP", "ALTER", "TRUNCATE", "OPTIMIZE", "SYSTEM"]
            .iter()
            .any(|kw| upper.starts_with(kw))
        {
            return MockResponse::text(200, "");
        }

        MockResponse::exception(
            400,
            62,
            &format!("Code: 62. DB::Exception: Syntax error: failed at position 1 ({sql}). (SYNTAX_ERROR)"),
        )
    }

    fn insert(&self, name: &str, body: &[u8], decompress: bool) -> MockResponse {
        let mut state = self.lock();
        let Some(table) = state.tables.get_mut(name) else {
            return unknown_table(name);
        };

        let mut reader = BlockReader::new(self.registry.clone(), Format::default(), decompress);
        let mut blocks = vec![];
        let decoded = reader.feed(body).and_then(|_| {
            while let Some(block) = reader.next_block()? {
                blocks.push(block);
            }
            while let Some(block) = reader.finish()? {
                blocks.push(block);
            }
            Ok(())
        });
        if let Err(err) = decoded {
            return MockResponse::exception(
                400,
                27,
                &format!("Code: 27. DB::Exception: Cannot parse input: {err}. (CANNOT_PARSE_INPUT_ASSERTION_FAILED)"),
            );
        }

        let mut written = 0;
        for block in &blocks {
            for row in 0..block.rows() {
                let values = table
                    .columns
                    .iter()
                    .map(|(name, _, _)| {
                        block
                            .position(name)
                            .and_then(|c| block.value(row, c, true))
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                table.rows.push(values);
                written += 1;
            }
        }

        MockResponse::text(200, "").header(
            "x-clickhouse-summary",
            &format!(r#"{{"read_rows":"0","written_rows":"{written}","written_bytes":"{}"}}"#, body.len()),
        )
    }

    fn describe(&self, name: &str) -> MockResponse {
        let state = self.lock();
        let Some(table) = state.tables.get(name) else {
            return unknown_table(name);
        };

        let column = |f: fn(&(String, String, String)) -> &String| {
            table.columns.iter().map(|c| Value::from(f(c).as_str())).collect::<Vec<_>>()
        };
        MockResponse::columns(vec![
            ("name", "String", column(|c| &c.0)),
            ("type", "String", column(|c| &c.1)),
            ("default_type", "String", column(|c| &c.2)),
            ("default_expression", "String", table.columns.iter().map(|_| Value::from("")).collect()),
        ])
    }

    fn select(&self, name: &str) -> MockResponse {
        let state = self.lock();
        let Some(table) = state.tables.get(name) else {
            return unknown_table(name);
        };

        let columns = table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, (_, _, kind))| kind.is_empty())
            .map(|(i, (name, ty, _))| {
                let values = table.rows.iter().map(|row| row[i].clone()).collect();
                (name.as_str(), ty.as_str(), values)
            })
            .collect();
        MockResponse::columns(columns)
            .header("x-clickhouse-summary", &format!(r#"{{"read_rows":"{0}","result_rows":"{0}"}}"#, table.rows.len()))
    }

    fn render(&self, response: MockResponse, compress: bool, query_id: Option<String>) -> HttpResponse {
        let mut body = BytesMut::new();
        if let Some(columns) = &response.columns {
            let columns = columns
                .iter()
                .map(|(name, ty, values)| {
                    let ty = self.registry.resolve(ty).expect("mock column type");
                    let refs = values.iter().collect::<Vec<_>>();
                    Column::from_values(name.clone(), ty, &refs).expect("mock column values")
                })
                .collect();

            let mut raw = BytesMut::new();
            Block::from_columns(columns).encode(&mut raw);

            match compress {
                true => {
                    compress_frame(&raw, &mut body);
                    let mut state = self.lock();
                    if std::mem::take(&mut state.corrupt_next) {
                        let last = body.len() - 1;
                        body[last] ^= 0x01;
                    }
                }
                false => body.extend_from_slice(&raw),
            }
        }
        body.extend_from_slice(&response.text);

        let mut headers = response.headers;
        headers.push((
            "x-clickhouse-query-id".into(),
            query_id.unwrap_or_else(|| "mock-query".into()),
        ));
        if let Some(code) = response.code {
            headers.push(("x-clickhouse-exception-code".into(), code.to_string()));
        }
        if let Some(tz) = &self.lock().timezone {
            headers.push(("x-clickhouse-timezone".into(), tz.clone()));
        }

        self.body_dropped.store(false, Ordering::SeqCst);
        let chunks = body.freeze().chunks(CHUNK).map(Bytes::copy_from_slice).collect();
        HttpResponse {
            status: response.status,
            headers,
            body: Box::pin(MockBody { chunks, dropped: self.body_dropped.clone() }),
        }
    }
}

impl HttpTransport for MockServer {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ConnectionError>> + Send {
        self.handle(request)
    }
}

fn unknown_table(name: &str) -> MockResponse {
    MockResponse::exception(
        404,
        60,
        &format!("Code: 60. DB::Exception: Table default.{name} does not exist. (UNKNOWN_TABLE)"),
    )
}

/// Leading identifier, backticks removed.
fn ident(sql: &str) -> (String, &str) {
    let sql = sql.trim_start();
    let end = sql
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(sql.len());
    (sql[..end].trim_matches('`').to_owned(), &sql[end..])
}

async fn read(body: RequestBody) -> Result<Bytes, ConnectionError> {
    match body {
        RequestBody::Empty => Ok(Bytes::new()),
        RequestBody::Bytes(bytes) => Ok(bytes),
        RequestBody::Stream(mut stream) => {
            let mut buf = BytesMut::new();
            while let Some(chunk) = poll_fn(|cx| stream.as_mut().poll_next(cx)).await {
                buf.extend_from_slice(&chunk?);
            }
            Ok(buf.freeze())
        }
    }
}

struct MockBody {
    chunks: VecDeque<Bytes>,
    dropped: Arc<AtomicBool>,
}

impl Stream for MockBody {
    type Item = Result<Bytes, ConnectionError>;

    fn poll_next(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().chunks.pop_front().map(Ok))
    }
}

impl Drop for MockBody {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}
