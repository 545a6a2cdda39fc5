use futures_core::Stream;
use std::{
    mem,
    pin::Pin,
    task::{Context, Poll, ready},
};

use crate::{
    Result, context::Orientation, fetch::BlockStream, native::Block, result::QueryResult,
};

/// Returned [`execute`][super::Query::execute] future.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Execute {
    fetch: BlockStream,
    orientation: Orientation,
    header: Option<Block>,
    output: Vec<Block>,
}

impl Execute {
    pub(crate) fn new(fetch: BlockStream, orientation: Orientation) -> Self {
        Self { fetch, orientation, header: None, output: vec![] }
    }
}

impl Future for Execute {
    type Output = Result<QueryResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(block) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            match block.rows() {
                // header only block, still carries names and types
                0 => {
                    me.header.get_or_insert(block);
                }
                _ => me.output.push(block),
            }
        }

        Poll::Ready(Ok(QueryResult::new(
            me.header.take(),
            mem::take(&mut me.output),
            me.fetch.take_summary(),
            me.fetch.use_none(),
            me.orientation,
        )))
    }
}
