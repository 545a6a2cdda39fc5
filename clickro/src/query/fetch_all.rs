use futures_core::Stream;
use std::{
    mem,
    pin::Pin,
    task::{Context, Poll, ready},
};

use crate::{Result, fetch::RowStream, row::FromRow};

/// Returned [`fetch_all`][super::Query::fetch_all] future.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchAll<R> {
    fetch: RowStream<R>,
    output: Vec<R>,
}

impl<R> FetchAll<R> {
    pub(crate) fn new(fetch: RowStream<R>) -> Self {
        Self { fetch, output: vec![] }
    }
}

// Fields are never pin-projected; `output` is only accessed through `&mut`.
impl<R> Unpin for FetchAll<R> {}

impl<R: FromRow> Future for FetchAll<R> {
    type Output = Result<Vec<R>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();
        let f = &mut me.fetch;
        let output = &mut me.output;

        while let Some(r) = ready!(Pin::new(&mut *f).poll_next(cx)?) {
            output.push(r)
        }

        Poll::Ready(Ok(mem::take(output)))
    }
}
