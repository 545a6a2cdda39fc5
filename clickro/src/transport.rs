//! HTTP transport.
//!
//! The driver only needs to send one request and read the response body as
//! a stream of chunks, everything else such as connection pooling and tls is
//! left to the [`HttpTransport`] implementation.
use bytes::Bytes;
use futures_core::Stream;
use std::{fmt, pin::Pin, sync::Arc};
use url::Url;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::ReqwestTransport;

#[cfg(test)]
pub(crate) mod mock;

/// Chunked response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, ConnectionError>> + Send>>;

/// Chunked request body.
pub type UploadStream = Pin<Box<dyn Stream<Item = Result<Bytes, ConnectionError>> + Send + Sync>>;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Request body.
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Stream(UploadStream),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => write!(f, "Bytes({})", b.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A request to the server.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Clone request unless the body is a stream.
    pub(crate) fn try_clone(&self) -> Option<Self> {
        let body = match &self.body {
            RequestBody::Empty => RequestBody::Empty,
            RequestBody::Bytes(b) => RequestBody::Bytes(b.clone()),
            RequestBody::Stream(_) => return None,
        };
        Some(Self {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
        })
    }

    /// Returns the value of the query string field.
    pub fn query_field(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Response with its body not yet read.
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: Vec<(String, String)>,
    pub body: BodyStream,
}

impl HttpResponse {
    /// Returns the first header value with the given lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` for `2xx` status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// A type which can send request to ClickHouse HTTP interface.
///
/// Implementation is shared between concurrent requests.
pub trait HttpTransport: Send + Sync + 'static {
    /// Send request and resolve once response headers are received.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ConnectionError>> + Send;
}

impl<T: HttpTransport> HttpTransport for Arc<T> {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ConnectionError>> + Send {
        T::send(self, request)
    }
}

// ===== Error =====

/// Transport failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection.
    Connect,
    /// Connect or read timeout elapsed.
    Timeout,
    /// Request could not be built or written.
    Request,
    /// Reading response body failed.
    Body,
}

/// Transport level failure.
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    sent: bool,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, sent: bool, message: impl Into<String>) -> Self {
        Self { kind, sent, message: message.into(), source: None }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ConnectionErrorKind {
        self.kind
    }

    /// Returns `true` if the request may have reached the server.
    ///
    /// Only request that is never sent is safe to retry.
    pub fn is_sent(&self) -> bool {
        self.sent
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as _)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ConnectionErrorKind::Connect => "failed to connect",
            ConnectionErrorKind::Timeout => "timeout",
            ConnectionErrorKind::Request => "failed to send request",
            ConnectionErrorKind::Body => "failed to read response",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

impl fmt::Debug for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
