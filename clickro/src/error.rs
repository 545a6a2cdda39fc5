//! `clickro` error types.
use std::{backtrace::Backtrace, fmt};

use crate::{
    config::ParseError,
    native::{CompressionChecksumError, ProtocolError, TypeConversionError, UnsupportedTypeError},
    response::ServerError,
    row::{DecodeError, RowNotFound},
    session::SessionBusyError,
    sql::BindError,
    transport::ConnectionError,
};

/// A specialized [`Result`] type for `clickro` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `clickro` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns `true` if the request never reached the server, thus safe to
    /// send again.
    pub fn is_retryable(&self) -> bool {
        matches!(&self.kind, ErrorKind::Connection(e) if !e.is_sent())
    }

    /// Returns `true` if this error is [`ErrorKind::SessionBusy`].
    pub fn is_session_busy(&self) -> bool {
        matches!(self.kind, ErrorKind::SessionBusy(_))
    }

    pub(crate) fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub(crate) fn row_not_found() -> Self {
        RowNotFound.into()
    }
}

/// All possible error kind from `clickro` library.
pub enum ErrorKind {
    /// Invalid client configuration.
    Config(ParseError),
    /// Transport level failure, connection refused or timeout.
    Connection(ConnectionError),
    /// Server returns an exception.
    Server(ServerError),
    /// Application value cannot be represented in the column type.
    TypeConversion(TypeConversionError),
    /// Type name cannot be resolved.
    UnsupportedType(UnsupportedTypeError),
    /// Compressed frame is corrupted, the stream cannot be resumed.
    Checksum(CompressionChecksumError),
    /// Session is used by another in-flight request.
    SessionBusy(SessionBusyError),
    /// Malformed or truncated wire data.
    Protocol(ProtocolError),
    /// Parameter binding failed.
    Bind(BindError),
    /// Failed to project a value into a rust type.
    Decode(DecodeError),
    /// Query returns no row.
    RowNotFound(RowNotFound),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ConnectionError>e => ErrorKind::Connection(e));
from!(<ServerError>e => ErrorKind::Server(e));
from!(<TypeConversionError>e => ErrorKind::TypeConversion(e));
from!(<UnsupportedTypeError>e => ErrorKind::UnsupportedType(e));
from!(<CompressionChecksumError>e => ErrorKind::Checksum(e));
from!(<SessionBusyError>e => ErrorKind::SessionBusy(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<BindError>e => ErrorKind::Bind(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Connection(e) => std::error::Error::source(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Connection(e) => e.fmt(f),
            Self::Server(e) => e.fmt(f),
            Self::TypeConversion(e) => e.fmt(f),
            Self::UnsupportedType(e) => e.fmt(f),
            Self::Checksum(e) => e.fmt(f),
            Self::SessionBusy(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Bind(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
