//! Insert API.
//!
//! The whole payload is converted once before the request is sent, a value
//! that does not fit its column fails the insert before anything reaches the
//! server. Blocks are then converted again and encoded as the body is
//! uploaded, one chunk per block, so only one block is held at a time.
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use crate::{
    Client, Error, Result, Value,
    client::Payload,
    common::verbose,
    context::QueryContext,
    native::{Block, Column, ColumnType, TypeConversionError, compress_frame},
    response::QuerySummary,
    row::DecodeError,
    settings::SettingValue,
    sql::quote_identifier,
    transport::{ConnectionError, ConnectionErrorKind, RequestBody},
};

/// Column kinds computed by the server, never inserted.
const COMPUTED: &[&str] = &["MATERIALIZED", "ALIAS"];

/// The insert API.
#[must_use = "inserts do nothing unless you `.await` them"]
pub struct Insert {
    client: Client,
    ctx: QueryContext,
    table: String,
    columns: Option<Vec<String>>,
    types: Option<Vec<String>>,
    data: Source,
}

/// Application data.
#[derive(Debug, Clone)]
pub enum Source {
    /// One `Vec` per row.
    Rows(Vec<Vec<Value>>),
    /// One `Vec` per column.
    Columns(Vec<Vec<Value>>),
}

impl Source {
    /// Number of rows, columns must all have the same length.
    fn rows(&self) -> Result<usize, TypeConversionError> {
        match self {
            Self::Rows(rows) => Ok(rows.len()),
            Self::Columns(columns) => {
                let len = self.len();
                match columns.iter().find(|column| column.len() != len) {
                    Some(column) => Err(TypeConversionError::row_length(len, column.len())),
                    None => Ok(len),
                }
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Columns(columns) => columns.first().map_or(0, Vec::len),
        }
    }
}

impl Insert {
    pub(crate) fn new(client: Client, table: String, ctx: QueryContext) -> Self {
        Self { client, ctx, table, columns: None, types: None, data: Source::Rows(vec![]) }
    }

    /// Target columns, all insertable columns of the table by default.
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Column type names, skip the `DESCRIBE TABLE` round trip.
    ///
    /// Requires [`columns`][Insert::columns] in the same order.
    pub fn column_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Row oriented data.
    pub fn rows(mut self, rows: impl IntoIterator<Item = Vec<Value>>) -> Self {
        self.data = Source::Rows(rows.into_iter().collect());
        self
    }

    /// Append one row.
    pub fn row<V: Into<Value>>(mut self, row: impl IntoIterator<Item = V>) -> Self {
        let row = row.into_iter().map(Into::into).collect();
        match &mut self.data {
            Source::Rows(rows) => rows.push(row),
            Source::Columns(_) => self.data = Source::Rows(vec![row]),
        }
        self
    }

    /// Column oriented data.
    pub fn column_data(mut self, columns: impl IntoIterator<Item = Vec<Value>>) -> Self {
        self.data = Source::Columns(columns.into_iter().collect());
        self
    }

    /// Set a per request setting.
    pub fn setting(mut self, key: impl Into<String>, value: impl SettingValue) -> Self {
        self.ctx.set_setting(key, value);
        self
    }

    pub fn query_id(mut self, id: impl Into<String>) -> Self {
        self.ctx.set_query_id(id);
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.ctx.set_setting("session_id", id.into());
        self
    }

    /// Send the data. Never retried.
    ///
    /// Inserting no row sends nothing.
    pub async fn execute(self) -> Result<QuerySummary> {
        let Self { client, ctx, table, columns, types, data } = self;
        let target = format!("insert into {}", quote_identifier(&table));
        if data.rows().map_err(|e| Error::from(e).context(target.as_str()))? == 0 {
            return Ok(QuerySummary::default());
        }

        let (columns, types) = match (columns, types) {
            (Some(columns), Some(types)) => {
                if columns.len() != types.len() {
                    return Err(TypeConversionError::row_length(columns.len(), types.len()).into());
                }
                let types = types
                    .iter()
                    .map(|ty| client.registry().resolve(ty))
                    .collect::<Result<Vec<_>, _>>()?;
                (columns, types)
            }
            (columns, _) => describe(&client, &table, columns)
                .await
                .map_err(|e| e.context(target.as_str()))?,
        };

        let insert = InsertContext::new(table, columns, types, data, client.config().block_rows);
        insert.validate().map_err(|e| Error::from(e).context(target.as_str()))?;

        let sql = insert.statement();
        let compressed = client.compression(&ctx);
        let body = RequestBody::Stream(Box::pin(Chunks { insert, compressed }));
        let prepared = client.prepare(&ctx, Payload::Insert { sql, body })?;
        let (summary, _) = client.round_trip(prepared).await?;
        Ok(summary)
    }
}

impl IntoFuture for Insert {
    type Output = Result<QuerySummary>;

    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

/// Resolve column types with `DESCRIBE TABLE`.
async fn describe(
    client: &Client,
    table: &str,
    columns: Option<Vec<String>>,
) -> Result<(Vec<String>, Vec<Arc<ColumnType>>)> {
    let result = client
        .query(format!("DESCRIBE TABLE {}", quote_identifier(table)))
        .execute()
        .await?;

    let mut schema = vec![];
    for row in result.named_rows() {
        let name = row.try_get::<_, String>("name")?;
        let ty = row.try_get::<_, String>("type")?;
        let kind = row.try_get::<_, String>("default_type")?;
        schema.push((name, ty, COMPUTED.contains(&kind.as_str())));
    }

    let columns = match columns {
        Some(columns) => columns,
        None => schema
            .iter()
            .filter(|(_, _, computed)| !computed)
            .map(|(name, _, _)| name.clone())
            .collect(),
    };

    let types = columns
        .iter()
        .map(|column| -> Result<Arc<ColumnType>> {
            let (_, ty, _) = schema
                .iter()
                .find(|(name, _, _)| name == column)
                .ok_or_else(|| DecodeError::ColumnNotFound(column.clone().into()))?;
            Ok(client.registry().resolve(ty)?)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((columns, types))
}

/// Table, target columns, and the data being split into blocks.
#[derive(Debug)]
pub struct InsertContext {
    table: String,
    columns: Vec<String>,
    types: Vec<Arc<ColumnType>>,
    data: Source,
    block_rows: usize,
    position: usize,
}

impl InsertContext {
    pub(crate) fn new(
        table: String,
        columns: Vec<String>,
        types: Vec<Arc<ColumnType>>,
        data: Source,
        block_rows: usize,
    ) -> Self {
        Self { table, columns, types, data, block_rows: block_rows.max(1), position: 0 }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn types(&self) -> &[Arc<ColumnType>] {
        &self.types
    }

    /// Number of rows already converted.
    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn statement(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {} ({columns}) FORMAT Native", quote_identifier(&self.table))
    }

    /// Convert every block once, nothing is kept.
    pub(crate) fn validate(&self) -> Result<(), TypeConversionError> {
        let len = self.data.rows()?;
        (0..len)
            .step_by(self.block_rows)
            .try_for_each(|start| self.convert(start, (start + self.block_rows).min(len)).map(drop))
    }

    /// Convert the next block of at most `block_rows` rows.
    pub(crate) fn next_block(&mut self) -> Option<Result<Block, TypeConversionError>> {
        let len = self.data.len();
        if self.position >= len {
            return None;
        }
        let start = self.position;
        let end = (start + self.block_rows).min(len);
        self.position = end;
        Some(self.convert(start, end))
    }

    fn convert(&self, start: usize, end: usize) -> Result<Block, TypeConversionError> {
        let ncols = self.columns.len();
        let mut columns = Vec::with_capacity(ncols);

        match &self.data {
            Source::Rows(rows) => {
                let rows = &rows[start..end];
                if let Some(row) = rows.iter().find(|row| row.len() != ncols) {
                    return Err(TypeConversionError::row_length(ncols, row.len()));
                }
                for (c, (name, ty)) in self.columns.iter().zip(&self.types).enumerate() {
                    let values = rows.iter().map(|row| &row[c]).collect::<Vec<_>>();
                    columns.push(Column::from_values(name.clone(), ty.clone(), &values)?);
                }
            }
            Source::Columns(data) => {
                if data.len() != ncols {
                    return Err(TypeConversionError::row_length(ncols, data.len()));
                }
                let len = self.data.len();
                if let Some(column) = data.iter().find(|column| column.len() != len) {
                    return Err(TypeConversionError::row_length(len, column.len()));
                }
                for ((name, ty), data) in self.columns.iter().zip(&self.types).zip(data) {
                    let values = data[start..end].iter().collect::<Vec<_>>();
                    columns.push(Column::from_values(name.clone(), ty.clone(), &values)?);
                }
            }
        }

        Ok(Block::from_columns(columns))
    }
}

/// Request body, blocks are encoded as they are polled.
struct Chunks {
    insert: InsertContext,
    compressed: bool,
}

impl Stream for Chunks {
    type Item = Result<Bytes, ConnectionError>;

    fn poll_next(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();
        let chunk = me.insert.next_block().map(|block| match block {
            Ok(block) => Ok(encode(&block, me.compressed)),
            Err(err) => Err(ConnectionError::new(ConnectionErrorKind::Request, true, err.to_string())),
        });
        Poll::Ready(chunk)
    }
}

fn encode(block: &Block, compressed: bool) -> Bytes {
    let mut raw = BytesMut::new();
    block.encode(&mut raw);
    let chunk = match compressed {
        true => {
            let mut buf = BytesMut::new();
            compress_frame(&raw, &mut buf);
            buf
        }
        false => raw,
    };
    verbose!(rows = block.rows(), bytes = chunk.len(), "insert block encoded");
    chunk.freeze()
}
