//! Query API types.
use bytes::Bytes;
use chrono_tz::Tz;
use std::{marker::PhantomData, pin::Pin, sync::Arc};

use crate::{
    Client, Result, Row, Value,
    client::Payload,
    context::{ColumnRename, Orientation, QueryContext},
    fetch::{BlockStream, RowStream},
    response::QuerySummary,
    settings::SettingValue,
    sql::Params,
};

mod fetch_all;
mod fetch_one;
mod execute;

pub use fetch_all::FetchAll;
pub use fetch_one::{FetchOne, FetchOptional};
pub use execute::Execute;

/// Setters shared by [`Query`] and [`Command`].
macro_rules! context_setters {
    () => {
        /// Bind positional parameter, for `%s` placeholder.
        pub fn bind(mut self, value: impl Into<Value>) -> Self {
            self.ctx.bind_positional(value);
            self
        }

        /// Bind named parameter, for `{name:Type}` or `%(name)s` placeholder.
        pub fn bind_named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
            self.ctx.bind_named(name, value);
            self
        }

        /// Replace all parameters.
        pub fn params(mut self, params: Params) -> Self {
            self.ctx.set_params(params);
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

        /// Use session for this request only.
        pub fn session_id(mut self, id: impl Into<String>) -> Self {
            self.ctx.set_setting("session_id", id.into());
            self
        }

        pub fn context(&self) -> &QueryContext {
            &self.ctx
        }
    };
}

/// The query API.
///
/// Awaiting the query directly is the same as [`execute`][Query::execute].
#[must_use = "queries do nothing unless you `.await` or fetch them"]
pub struct Query<R = Row> {
    client: Client,
    ctx: QueryContext,
    _p: PhantomData<fn() -> R>,
}

impl<R> Query<R> {
    pub(crate) fn new(client: Client, ctx: QueryContext) -> Self {
        Self { client, ctx, _p: PhantomData }
    }

    context_setters!();

    /// Timezone for `DateTime` columns without their own, takes precedence
    /// over the server timezone.
    pub fn timezone(mut self, tz: Tz) -> Self {
        self.ctx.set_query_tz(tz);
        self
    }

    /// Timezone for one column, takes precedence over everything else.
    pub fn column_timezone(mut self, column: impl Into<String>, tz: Tz) -> Self {
        self.ctx.set_column_tz(column, tz);
        self
    }

    /// Present null as [`Value::Null`], the default, or as the placeholder
    /// value stored in the column.
    pub fn use_none(mut self, use_none: bool) -> Self {
        self.ctx.set_use_none(use_none);
        self
    }

    /// Orientation of [`QueryResult::result_set`][crate::QueryResult::result_set].
    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.ctx.set_orientation(orientation);
        self
    }

    /// Rename result columns.
    pub fn rename(mut self, rename: impl ColumnRename) -> Self {
        self.ctx.set_rename(Arc::new(rename));
        self
    }

    /// Change the row output type.
    pub fn fetch_as<T>(self) -> Query<T> {
        Query { client: self.client, ctx: self.ctx, _p: PhantomData }
    }

    /// Fetch blocks using [`Stream`][futures_core::Stream] api.
    pub fn blocks(self) -> BlockStream {
        BlockStream::new(self.client, &self.ctx)
    }

    /// Fetch rows using [`Stream`][futures_core::Stream] api.
    ///
    /// Dropping the stream early closes the response.
    pub fn fetch(self) -> RowStream<R> {
        RowStream::new(self.blocks())
    }

    /// Fetch all rows into [`Vec`].
    pub fn fetch_all(self) -> FetchAll<R> {
        FetchAll::new(self.fetch())
    }

    /// Fetch the first row, the rest of the response is discarded.
    ///
    /// Returns [`RowNotFound`][crate::row::RowNotFound] error if the query
    /// returns no row.
    pub fn fetch_one(self) -> FetchOne<R> {
        FetchOne::new(self.fetch())
    }

    /// Optionally fetch the first row.
    pub fn fetch_optional(self) -> FetchOptional<R> {
        FetchOptional::new(self.fetch())
    }

    /// Read the whole result.
    pub fn execute(self) -> Execute {
        let orientation = self.ctx.prefs().orientation;
        Execute::new(self.blocks(), orientation)
    }
}

impl<R> IntoFuture for Query<R> {
    type Output = Result<crate::QueryResult>;

    type IntoFuture = Execute;

    fn into_future(self) -> Self::IntoFuture {
        self.execute()
    }
}

impl<R> std::fmt::Debug for Query<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}

/// Statement whose response is not decoded, such as DDL.
///
/// Never retried.
#[derive(Debug)]
#[must_use = "commands do nothing unless you `.await` them"]
pub struct Command {
    client: Client,
    ctx: QueryContext,
}

impl Command {
    pub(crate) fn new(client: Client, ctx: QueryContext) -> Self {
        Self { client, ctx }
    }

    context_setters!();

    /// Send the statement.
    pub async fn execute(self) -> Result<CommandResult> {
        let prepared = self.client.prepare(&self.ctx, Payload::Command)?;
        let (summary, body) = self.client.round_trip(prepared).await?;
        Ok(CommandResult { summary, body })
    }
}

impl IntoFuture for Command {
    type Output = Result<CommandResult>;

    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

/// Result of a [`Command`].
#[derive(Debug, Clone)]
pub struct CommandResult {
    summary: QuerySummary,
    body: Bytes,
}

impl CommandResult {
    pub fn summary(&self) -> &QuerySummary {
        &self.summary
    }

    pub fn query_id(&self) -> &str {
        self.summary.query_id()
    }

    pub fn written_rows(&self) -> u64 {
        self.summary.written_rows()
    }

    /// Raw response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Response body as text, invalid utf8 is replaced.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
