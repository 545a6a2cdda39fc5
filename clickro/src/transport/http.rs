use bytes::Bytes;
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use super::{
    ConnectionError, ConnectionErrorKind, HttpRequest, HttpResponse, HttpTransport, Method,
    RequestBody,
};
use crate::config::ClientConfig;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// [`HttpTransport`] backed by [`reqwest::Client`].
///
/// Connection pooling and tls are handled by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build client with timeouts from config.
    pub fn new(config: &ClientConfig) -> Result<Self, ConnectionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| error(e, false))?;
        Ok(Self { client })
    }

    /// Use existing client, its timeouts are kept as is.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ConnectionError>> + Send {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        async move {
            let response = builder.send().await.map_err(|e| {
                let sent = !e.is_connect();
                error(e, sent)
            })?;

            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
                .collect();

            Ok(HttpResponse {
                status: response.status().as_u16(),
                headers,
                body: Box::pin(Body { inner: response.bytes_stream() }),
            })
        }
    }
}

pin_project! {
    /// Response chunks with the error mapped.
    struct Body<S> {
        #[pin]
        inner: S,
    }
}

impl<S> Stream for Body<S>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
{
    type Item = Result<Bytes, ConnectionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project()
            .inner
            .poll_next(cx)
            .map(|chunk| chunk.map(|r| r.map_err(|e| error(e, true))))
    }
}

fn error(err: reqwest::Error, sent: bool) -> ConnectionError {
    let kind = if err.is_connect() {
        ConnectionErrorKind::Connect
    } else if err.is_timeout() {
        ConnectionErrorKind::Timeout
    } else if err.is_body() || err.is_decode() {
        ConnectionErrorKind::Body
    } else {
        ConnectionErrorKind::Request
    };
    ConnectionError::new(kind, sent, err.to_string()).with_source(err)
}
