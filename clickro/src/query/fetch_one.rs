use futures_core::Stream;
use std::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use crate::{Error, Result, fetch::RowStream, row::FromRow};

/// Returned [`fetch_one`][super::Query::fetch_one] future.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchOne<R> {
    fetch: Option<RowStream<R>>,
}

impl<R> FetchOne<R> {
    pub(crate) fn new(fetch: RowStream<R>) -> Self {
        Self { fetch: Some(fetch) }
    }
}

impl<R: FromRow> Future for FetchOne<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();
        let Some(f) = &mut me.fetch else {
            return Poll::Ready(Err(Error::row_not_found()));
        };

        let row = ready!(Pin::new(f).poll_next(cx));
        // remaining rows are discarded by closing the response
        me.fetch = None;

        match row {
            Some(row) => Poll::Ready(row),
            None => Poll::Ready(Err(Error::row_not_found())),
        }
    }
}

/// Returned [`fetch_optional`][super::Query::fetch_optional] future.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchOptional<R> {
    fetch: Option<RowStream<R>>,
}

impl<R> FetchOptional<R> {
    pub(crate) fn new(fetch: RowStream<R>) -> Self {
        Self { fetch: Some(fetch) }
    }
}

impl<R: FromRow> Future for FetchOptional<R> {
    type Output = Result<Option<R>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();
        let Some(f) = &mut me.fetch else {
            return Poll::Ready(Ok(None));
        };

        let row = ready!(Pin::new(f).poll_next(cx));
        me.fetch = None;
        Poll::Ready(row.transpose())
    }
}
