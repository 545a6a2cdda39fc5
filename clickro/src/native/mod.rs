//! ClickHouse `Native` format.
//!
//! The format is columnar, a response body is a sequence of [`Block`]s, each
//! block carry its own column names and type names followed by whole column
//! payload.
//!
//! ```text
//! varint   column count
//! varint   row count
//! column * {
//!     string   name
//!     string   type name
//!     bytes    prefix, then payload (absent when row count is zero)
//! }
//! ```
use std::fmt;

use crate::Error;

mod column_type;
mod type_parser;
mod registry;
mod column;
mod block;
mod compression;

pub use column_type::{ColumnType, UnsupportedTypeError};
pub use registry::TypeRegistry;
pub use column::{Column, TypeConversionError, TzPolicy};
pub use block::Block;
pub use compression::CompressionChecksumError;

pub(crate) use block::{BlockReader, Format};
pub(crate) use registry::DEFAULT_TYPE_CACHE;
pub(crate) use compression::{Decompressor, compress_frame};

/// Error returned while decoding from a partially received buffer.
pub(crate) enum ReadError {
    /// Buffer ends before the value, more bytes required.
    Incomplete,
    /// Data is malformed, decoding cannot be resumed.
    Fatal(Error),
}

impl From<Error> for ReadError {
    fn from(value: Error) -> Self {
        Self::Fatal(value)
    }
}

impl From<ProtocolError> for ReadError {
    fn from(value: ProtocolError) -> Self {
        Self::Fatal(value.into())
    }
}

impl From<UnsupportedTypeError> for ReadError {
    fn from(value: UnsupportedTypeError) -> Self {
        Self::Fatal(value.into())
    }
}

impl From<CompressionChecksumError> for ReadError {
    fn from(value: CompressionChecksumError) -> Self {
        Self::Fatal(value.into())
    }
}

impl fmt::Debug for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => f.write_str("Incomplete"),
            Self::Fatal(err) => f.debug_tuple("Fatal").field(err).finish(),
        }
    }
}

impl ReadError {
    /// Convert into [`Error`] when no more bytes will ever arrive.
    pub(crate) fn at_eof(self) -> Error {
        match self {
            Self::Incomplete => ProtocolError::Truncated.into(),
            Self::Fatal(err) => err,
        }
    }
}

/// An error when translating bytes from server.
pub enum ProtocolError {
    /// Varint longer than 10 bytes.
    VarintOverflow,
    /// Length does not fit in memory.
    LengthOverflow(u64),
    /// Response body ends in the middle of a block or frame.
    Truncated,
    /// LowCardinality index points outside its dictionary.
    DictionaryIndex { index: u64, len: usize },
    /// LowCardinality serialization not supported by this client.
    LowCardinality(&'static str),
    /// Array or Map offsets are not monotonic.
    Offsets,
    /// Unknown compression method byte.
    CompressionMethod(u8),
    /// Column name is not valid utf8.
    NonUtf8(&'static str),
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VarintOverflow => f.write_str("varint exceeds 64 bits"),
            Self::LengthOverflow(len) => write!(f, "length `{len}` is too large"),
            Self::Truncated => f.write_str("stream ended in the middle of a block"),
            Self::DictionaryIndex { index, len } => write!(
                f,
                "LowCardinality index `{index}` out of dictionary with `{len}` entries"
            ),
            Self::LowCardinality(msg) => write!(f, "unsupported LowCardinality serialization: {msg}"),
            Self::Offsets => f.write_str("array offsets are not monotonic"),
            Self::CompressionMethod(m) => write!(f, "unknown compression method `0x{m:02x}`"),
            Self::NonUtf8(what) => write!(f, "{what} is not valid utf8"),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
