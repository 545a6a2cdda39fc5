//! Streaming query execution.
use bytes::BytesMut;
use futures_core::Stream;
use std::{
    collections::HashMap,
    marker::PhantomData,
    mem,
    pin::Pin,
    sync::Arc,
    task::{
        Context,
        Poll::{self, *},
        ready,
    },
    time::Duration,
};
use tokio::time::Sleep;

use crate::{
    Error, Result, Row, Value,
    client::{self, Client, Payload, SendFuture},
    common::{ByteStr, span, verbose},
    context::{ColumnRename, QueryContext},
    native::{Block, BlockReader},
    response::{self, QuerySummary, ServerError},
    row::FromRow,
    session::SessionGuard,
    transport::{BodyStream, ConnectionError, ConnectionErrorKind, HttpRequest, HttpResponse},
};

/// Delay before the first retry, multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Stream of [`Block`]s of one query.
///
/// Dropping the stream drops the response body, which closes the connection
/// instead of draining it, and releases the session.
#[must_use = "streams do nothing unless polled"]
pub struct BlockStream {
    client: Client,
    request: Option<HttpRequest>,
    guard: Option<SessionGuard>,
    settings: HashMap<String, String>,
    reader: Option<BlockReader>,
    query_tz: bool,
    rename: Option<Arc<dyn ColumnRename>>,
    names: Option<Vec<ByteStr>>,
    attempt: u32,
    summary: Option<QuerySummary>,
    phase: Phase,
}

enum Phase {
    Failed(Option<Error>),
    Built,
    Backoff(Pin<Box<Sleep>>),
    Sent(SendFuture),
    ErrorBody {
        status: u16,
        code: Option<i32>,
        body: BodyStream,
        buf: BytesMut,
    },
    Streaming(BodyStream),
    Finishing,
    Completed,
}

impl BlockStream {
    pub(crate) fn new(client: Client, ctx: &QueryContext) -> Self {
        let rename = ctx.prefs().rename.clone();
        let mut me = Self {
            request: None,
            guard: None,
            settings: HashMap::new(),
            reader: None,
            query_tz: false,
            rename,
            names: None,
            attempt: 0,
            summary: None,
            phase: Phase::Built,
            client,
        };

        match me.client.prepare(ctx, Payload::Query) {
            Ok(prepared) => {
                me.reader = Some(BlockReader::new(
                    me.client.registry_arc(),
                    prepared.format,
                    prepared.compressed,
                ));
                me.request = Some(prepared.request);
                me.guard = prepared.guard;
                me.settings = prepared.settings;
                me.query_tz = prepared.query_tz;
            }
            Err(err) => me.phase = Phase::Failed(Some(err)),
        }

        me
    }

    /// Response summary, available once the response headers are received.
    pub fn summary(&self) -> Option<&QuerySummary> {
        self.summary.as_ref()
    }

    pub(crate) fn take_summary(&mut self) -> QuerySummary {
        self.summary.take().unwrap_or_default()
    }

    pub(crate) fn use_none(&self) -> bool {
        self.reader.as_ref().is_none_or(BlockReader::use_none)
    }

    fn fail(&mut self, err: Error) {
        self.guard = None;
        self.phase = Phase::Failed(Some(err));
    }

    fn complete(&mut self) {
        self.guard = None;
        self.phase = Phase::Completed;
    }

    fn on_connection_error(&mut self, err: ConnectionError) {
        let retries = self.client.config().retries;
        if err.is_sent() || self.attempt >= retries {
            return self.fail(err.into());
        }

        self.attempt += 1;
        #[cfg(feature = "log")]
        log::warn!("request not sent, retrying ({}/{retries}): {err}", self.attempt);

        let delay = RETRY_BACKOFF * self.attempt;
        self.phase = Phase::Backoff(Box::pin(tokio::time::sleep(delay)));
    }

    fn on_response(&mut self, response: HttpResponse) {
        self.request = None;

        let summary = self.client.summary(&response, mem::take(&mut self.settings));
        if !self.query_tz {
            let tz = response.header(response::TIMEZONE).and_then(|tz| tz.parse().ok());
            if let (Some(tz), Some(reader)) = (tz, &mut self.reader) {
                reader.set_default_tz(tz);
            }
        }
        verbose!(query_id = summary.query_id(), status = response.status, "response received");
        self.summary = Some(summary);

        self.phase = match response.is_success() {
            true => Phase::Streaming(response.body),
            false => Phase::ErrorBody {
                status: response.status,
                code: client::exception_code(&response),
                body: response.body,
                buf: BytesMut::new(),
            },
        };
    }

    /// Apply the rename hook, names are computed once from the first block.
    fn present(&mut self, mut block: Block) -> Block {
        if let Some(rename) = &self.rename {
            let names = self.names.get_or_insert_with(|| {
                block.names().map(|name| ByteStr::from(rename.rename(name))).collect()
            });
            block.rename(names);
        }
        block
    }
}

impl Stream for BlockStream {
    type Item = Result<Block>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();
        span!("block_stream");

        loop {
            match &mut me.phase {
                Phase::Failed(err) => {
                    let err = err.take();
                    me.guard = None;
                    return Ready(err.map(Err));
                }
                Phase::Built => {
                    let Some(request) = me.request.as_ref().and_then(HttpRequest::try_clone) else {
                        let err = ConnectionError::new(
                            ConnectionErrorKind::Request,
                            false,
                            "request body cannot be resent",
                        );
                        me.fail(err.into());
                        continue;
                    };
                    me.phase = Phase::Sent(me.client.send(request));
                }
                Phase::Backoff(sleep) => {
                    ready!(sleep.as_mut().poll(cx));
                    me.phase = Phase::Built;
                }
                Phase::Sent(f) => match ready!(f.as_mut().poll(cx)) {
                    Ok(response) => me.on_response(response),
                    Err(err) => me.on_connection_error(err),
                },
                Phase::ErrorBody { status, code, body, buf } => {
                    match ready!(body.as_mut().poll_next(cx)) {
                        Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                        Some(Err(err)) => me.fail(err.into()),
                        None => {
                            let err = ServerError::from_body(buf, *status, *code);
                            #[cfg(feature = "log")]
                            log::warn!("query failed: {err}");
                            me.fail(err.into());
                        }
                    }
                }
                Phase::Streaming(body) => {
                    let Some(reader) = &mut me.reader else {
                        me.complete();
                        continue;
                    };

                    match reader.next_block() {
                        Ok(Some(block)) => return Ready(Some(Ok(me.present(block)))),
                        Ok(None) => {}
                        Err(err) => {
                            me.fail(err);
                            continue;
                        }
                    }

                    match ready!(body.as_mut().poll_next(cx)) {
                        Some(Ok(chunk)) => {
                            if let Err(err) = reader.feed(&chunk) {
                                me.fail(err);
                            }
                        }
                        Some(Err(err)) => me.fail(err.into()),
                        None => me.phase = Phase::Finishing,
                    }
                }
                Phase::Finishing => {
                    let Some(reader) = &mut me.reader else {
                        me.complete();
                        continue;
                    };
                    match reader.finish() {
                        Ok(Some(block)) => return Ready(Some(Ok(me.present(block)))),
                        Ok(None) => me.complete(),
                        Err(err) => me.fail(err),
                    }
                }
                Phase::Completed => return Ready(None),
            }
        }
    }
}

/// Stream of rows of one query.
#[must_use = "streams do nothing unless polled"]
pub struct RowStream<R = Row> {
    blocks: BlockStream,
    current: Option<(Block, usize)>,
    names: Option<Arc<[String]>>,
    _p: PhantomData<fn() -> R>,
}

impl<R> RowStream<R> {
    pub(crate) fn new(blocks: BlockStream) -> Self {
        Self { blocks, current: None, names: None, _p: PhantomData }
    }

    /// Response summary, available once the response headers are received.
    pub fn summary(&self) -> Option<&QuerySummary> {
        self.blocks.summary()
    }

    /// Column names, available once the first block is received.
    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }
}

impl<R: FromRow> Stream for RowStream<R> {
    type Item = Result<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();
        let use_none = me.blocks.use_none();

        loop {
            if let Some((block, row)) = &mut me.current {
                if *row < block.rows() {
                    let values = (0..block.columns().len())
                        .map(|c| block.value(*row, c, use_none).unwrap_or(Value::Null))
                        .collect();
                    *row += 1;

                    let names = me.names.clone().unwrap_or_else(|| Arc::from([]));
                    let row = R::from_row(Row::new(names, values)).map_err(Error::from);
                    return Ready(Some(row));
                }
                me.current = None;
            }

            match ready!(Pin::new(&mut me.blocks).poll_next(cx)?) {
                Some(block) => {
                    if me.names.is_none() {
                        me.names = Some(block.names().map(String::from).collect());
                    }
                    me.current = Some((block, 0));
                }
                None => return Ready(None),
            }
        }
    }
}
