use bytes::{Buf, Bytes, BytesMut};
use chrono_tz::Tz;
use std::{collections::HashMap, sync::Arc};

use super::{Column, Decompressor, ProtocolError, ReadError, TypeRegistry, TzPolicy};
use crate::{
    Error, Result, Value,
    common::{ByteStr, verbose},
    ext::{BufMutExt, SliceExt},
    response::{self, ServerError},
};

/// A set of columns with equal row count.
#[derive(Debug, Clone)]
pub struct Block {
    rows: usize,
    columns: Vec<Column>,
}

/// How decoded values are presented.
#[derive(Debug, Clone)]
pub(crate) struct Format {
    pub(crate) use_none: bool,
    /// Query level override, server timezone, or UTC.
    pub(crate) default_tz: Tz,
    /// Per column override.
    pub(crate) column_tz: HashMap<String, Tz>,
}

impl Default for Format {
    fn default() -> Self {
        Self { use_none: true, default_tz: Tz::UTC, column_tz: HashMap::new() }
    }
}

impl Block {
    /// Build block from columns with the same length.
    pub(crate) fn from_columns(columns: Vec<Column>) -> Self {
        let rows = columns.first().map_or(0, Column::len);
        debug_assert!(columns.iter().all(|c| c.len() == rows));
        Self { rows, columns }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Find column index by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Column::name)
    }

    /// Project one value.
    pub fn value(&self, row: usize, column: usize, use_none: bool) -> Option<Value> {
        self.columns.get(column)?.value(row, use_none)
    }

    /// Replace column names, `names` must cover every column.
    pub(crate) fn rename(&mut self, names: &[ByteStr]) {
        for (column, name) in self.columns.iter_mut().zip(names) {
            column.set_name(name.clone());
        }
    }

    pub(crate) fn decode(
        buf: &mut &[u8],
        registry: &TypeRegistry,
        format: &Format,
    ) -> Result<Self, ReadError> {
        let ncols = read_len(buf)?;
        let rows = read_len(buf)?;
        let mut columns = Vec::with_capacity(ncols.min(buf.len()));

        for _ in 0..ncols {
            let name = Bytes::copy_from_slice(buf.read_string()?);
            let name = ByteStr::from_utf8(name).map_err(|_| ProtocolError::NonUtf8("column name"))?;
            let type_name = std::str::from_utf8(buf.read_string()?)
                .map_err(|_| ProtocolError::NonUtf8("type name"))?;
            let ty = registry.resolve(type_name)?;

            let tz = TzPolicy::new(format.column_tz.get(name.as_str()).copied(), format.default_tz);
            let mut column = Column::decode(name, ty, buf, rows)?;
            column.set_tz_policy(tz);
            columns.push(column);
        }

        Ok(Self { rows, columns })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_varint(self.columns.len() as u64);
        buf.put_varint(self.rows as u64);
        for column in &self.columns {
            buf.put_string(column.name().as_bytes());
            buf.put_string(column.column_type().to_string().as_bytes());
            column.encode(buf);
        }
    }
}

fn read_len(buf: &mut &[u8]) -> Result<usize, ReadError> {
    let len = buf.read_varint()?;
    usize::try_from(len).map_err(|_| ProtocolError::LengthOverflow(len).into())
}

/// Frame a chunked response body into blocks.
///
/// A block is only decoded once it is entirely buffered. A failed attempt
/// is not repeated until more bytes are fed.
pub(crate) struct BlockReader {
    pending: BytesMut,
    decompressor: Option<Decompressor>,
    stalled_at: Option<usize>,
    registry: Arc<TypeRegistry>,
    format: Format,
}

impl BlockReader {
    pub(crate) fn new(registry: Arc<TypeRegistry>, format: Format, compressed: bool) -> Self {
        Self {
            pending: BytesMut::new(),
            decompressor: compressed.then(Decompressor::default),
            stalled_at: None,
            registry,
            format,
        }
    }

    pub(crate) fn use_none(&self) -> bool {
        self.format.use_none
    }

    /// Replace the fallback timezone, must be called before the first block.
    pub(crate) fn set_default_tz(&mut self, tz: Tz) {
        self.format.default_tz = tz;
    }

    /// Buffer a body chunk.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        match &mut self.decompressor {
            Some(decompressor) => {
                decompressor.push(chunk);
                decompressor.decompress(&mut self.pending).map_err(ReadError::at_eof)
            }
            None => {
                self.pending.extend_from_slice(chunk);
                Ok(())
            }
        }
    }

    /// Decode the next block if it is completely buffered.
    pub(crate) fn next_block(&mut self) -> Result<Option<Block>> {
        if self.pending.is_empty()
            || self.stalled_at == Some(self.pending.len())
            || response::is_exception(&self.pending)
        {
            return Ok(None);
        }

        let mut buf = &self.pending[..];
        match Block::decode(&mut buf, &self.registry, &self.format) {
            Ok(block) => {
                let consumed = self.pending.len() - buf.len();
                self.pending.advance(consumed);
                self.stalled_at = None;
                verbose!(rows = block.rows(), bytes = consumed, "block decoded");
                Ok(Some(block))
            }
            Err(ReadError::Incomplete) => {
                self.stalled_at = Some(self.pending.len());
                Ok(None)
            }
            Err(ReadError::Fatal(err)) => Err(err),
        }
    }

    /// Decode remaining block after the body ended.
    ///
    /// Anything that is not a complete block is an error, either the
    /// exception the server appended or a truncated stream.
    pub(crate) fn finish(&mut self) -> Result<Option<Block>> {
        if !self.pending.is_empty() {
            if response::is_exception(&self.pending) {
                return Err(exception(&self.pending));
            }
            let mut buf = &self.pending[..];
            let block = Block::decode(&mut buf, &self.registry, &self.format)
                .map_err(ReadError::at_eof)?;
            let consumed = self.pending.len() - buf.len();
            self.pending.advance(consumed);
            return Ok(Some(block));
        }

        match self.decompressor.as_ref().map(Decompressor::remaining) {
            Some(raw) if response::is_exception(raw) => Err(exception(raw)),
            Some(raw) if !raw.is_empty() => Err(ProtocolError::Truncated.into()),
            _ => Ok(None),
        }
    }
}

fn exception(body: &[u8]) -> Error {
    ServerError::from_body(body, 200, None).into()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ErrorKind, native::compress_frame};

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::default())
    }

    fn sample() -> Block {
        let registry = registry();
        let ids = [Value::UInt32(1), Value::UInt32(2)];
        let names = [Value::from("Alice"), Value::from("Bob")];
        let tags = [Value::Array(vec!["a".into()]), Value::Array(vec![])];
        let column = |name: &'static str, ty: &str, values: &[Value]| {
            let refs = values.iter().collect::<Vec<_>>();
            Column::from_values(name, registry.resolve(ty).unwrap(), &refs).unwrap()
        };
        Block::from_columns(vec![
            column("id", "UInt32", &ids),
            column("name", "LowCardinality(String)", &names),
            column("tags", "Array(String)", &tags),
        ])
    }

    fn encoded(block: &Block) -> BytesMut {
        let mut buf = BytesMut::new();
        block.encode(&mut buf);
        buf
    }

    fn values(block: &Block) -> Vec<Vec<Value>> {
        (0..block.rows())
            .map(|r| (0..block.columns().len()).map(|c| block.value(r, c, true).unwrap()).collect())
            .collect()
    }

    #[test]
    fn block_round_trip() {
        let block = sample();
        let buf = encoded(&block);
        let mut read = &buf[..];
        let decoded = Block::decode(&mut read, &registry(), &Format::default()).unwrap();
        assert!(read.is_empty());
        assert_eq!(decoded.rows(), 2);
        assert!(decoded.columns().iter().all(|c| c.len() == decoded.rows()));
        assert_eq!(decoded.names().collect::<Vec<_>>(), ["id", "name", "tags"]);
        assert_eq!(values(&decoded), values(&block));
    }

    #[test]
    fn zero_row_block_has_header_only() {
        let registry = registry();
        let column = Column::from_values("c", registry.resolve("LowCardinality(String)").unwrap(), &[]).unwrap();
        let block = Block::from_columns(vec![column]);
        let buf = encoded(&block);
        assert_eq!(&buf[..], b"\x01\x00\x01c\x16LowCardinality(String)");
    }

    #[test]
    fn reader_over_small_chunks() {
        let block = sample();
        let mut body = encoded(&block);
        body.extend_from_slice(&encoded(&block));

        let mut reader = BlockReader::new(registry(), Format::default(), false);
        let mut blocks = vec![];
        for chunk in body.chunks(3) {
            reader.feed(chunk).unwrap();
            while let Some(block) = reader.next_block().unwrap() {
                blocks.push(block);
            }
        }
        while let Some(block) = reader.finish().unwrap() {
            blocks.push(block);
        }

        assert_eq!(blocks.len(), 2);
        assert_eq!(values(&blocks[1]), values(&block));
    }

    #[test]
    fn block_ready_once_last_bytes_arrive() {
        let block = sample();
        let body = encoded(&block);
        let (head, tail) = body.split_at(body.len() - 10);

        let mut reader = BlockReader::new(registry(), Format::default(), false);
        reader.feed(head).unwrap();
        assert!(reader.next_block().unwrap().is_none());
        assert!(reader.next_block().unwrap().is_none());

        reader.feed(tail).unwrap();
        let decoded = reader.next_block().unwrap().expect("block is complete");
        assert_eq!(values(&decoded), values(&block));
        assert!(reader.finish().unwrap().is_none());
    }

    #[test]
    fn compressed_reader() {
        let block = sample();
        let mut body = BytesMut::new();
        compress_frame(&encoded(&block), &mut body);

        let mut reader = BlockReader::new(registry(), Format::default(), true);
        reader.feed(&body).unwrap();
        let decoded = reader.next_block().unwrap().unwrap();
        assert_eq!(values(&decoded), values(&block));
        assert!(reader.finish().unwrap().is_none());
    }

    #[test]
    fn truncated_stream() {
        let buf = encoded(&sample());
        let mut reader = BlockReader::new(registry(), Format::default(), false);
        reader.feed(&buf[..buf.len() - 1]).unwrap();
        assert!(reader.next_block().unwrap().is_none());
        let err = reader.finish().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(ProtocolError::Truncated)));
    }

    #[test]
    fn exception_after_block() {
        let mut body = encoded(&sample());
        body.extend_from_slice(b"Code: 395. DB::Exception: Value passed to 'throwIf' function is non-zero. (FUNCTION_THROW_IF_VALUE_IS_NON_ZERO)");

        let mut reader = BlockReader::new(registry(), Format::default(), false);
        reader.feed(&body).unwrap();
        assert!(reader.next_block().unwrap().is_some());
        assert!(reader.next_block().unwrap().is_none());
        let err = reader.finish().unwrap_err();
        let ErrorKind::Server(err) = err.kind() else {
            panic!("expected server error, found {err}");
        };
        assert_eq!(err.code(), 395);
        assert_eq!(err.name(), Some("FUNCTION_THROW_IF_VALUE_IS_NON_ZERO"));
    }

    #[test]
    fn corrupted_frame() {
        let mut body = BytesMut::new();
        compress_frame(&encoded(&sample()), &mut body);
        let last = body.len() - 1;
        body[last] ^= 0x01;

        let mut reader = BlockReader::new(registry(), Format::default(), true);
        let err = reader.feed(&body).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Checksum(_)));
    }

    #[test]
    fn unsupported_type_in_header() {
        let mut buf = BytesMut::new();
        buf.put_varint(1);
        buf.put_varint(1);
        buf.put_string(b"x");
        buf.put_string(b"Int256");
        buf.extend_from_slice(&[0; 32]);

        let err = Block::decode(&mut &buf[..], &registry(), &Format::default());
        let Err(ReadError::Fatal(err)) = err else {
            panic!("expected fatal error");
        };
        assert!(matches!(err.kind(), ErrorKind::UnsupportedType(_)));
    }

    #[test]
    fn column_timezone_override() {
        let registry = registry();
        let dt = chrono::DateTime::from_timestamp(0, 0).unwrap().with_timezone(&Tz::UTC);
        let column = Column::from_values("t", registry.resolve("DateTime").unwrap(), &[&Value::DateTime(dt)]).unwrap();
        let buf = encoded(&Block::from_columns(vec![column]));

        let mut format = Format { default_tz: chrono_tz::Europe::Berlin, ..Format::default() };
        let block = Block::decode(&mut &buf[..], &registry, &format).unwrap();
        let Some(Value::DateTime(v)) = block.value(0, 0, true) else { panic!() };
        assert_eq!(v.timezone(), chrono_tz::Europe::Berlin);

        format.column_tz.insert("t".into(), chrono_tz::Asia::Tokyo);
        let block = Block::decode(&mut &buf[..], &registry, &format).unwrap();
        let Some(Value::DateTime(v)) = block.value(0, 0, true) else { panic!() };
        assert_eq!(v.timezone(), chrono_tz::Asia::Tokyo);
        assert_eq!(v.timestamp(), 0);
    }
}
