//! Checksummed block compression.
//!
//! ```text
//! u128  CityHash128 of the rest of the frame
//! u8    method, 0x82 is LZ4, 0x02 is none
//! u32   compressed size, including this 9 bytes header
//! u32   decompressed size
//! ...   payload
//! ```
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

use super::{ProtocolError, ReadError};
use crate::response;

const CHECKSUM_LEN: usize = 16;
const HEADER_LEN: usize = 9;

const METHOD_NONE: u8 = 0x02;
const METHOD_LZ4: u8 = 0x82;

/// Server refuses larger frame.
const MAX_FRAME_SIZE: usize = 0x4000_0000;

fn checksum(frame: &[u8]) -> u128 {
    cityhash_rs::cityhash_102_128(frame).rotate_right(64)
}

/// Compress `data` into one LZ4 frame.
pub(crate) fn compress_frame(data: &[u8], buf: &mut BytesMut) {
    let compressed = lz4_flex::block::compress(data);
    let start = buf.len();

    buf.reserve(CHECKSUM_LEN + HEADER_LEN + compressed.len());
    buf.put_bytes(0, CHECKSUM_LEN);
    buf.put_u8(METHOD_LZ4);
    buf.put_u32_le((HEADER_LEN + compressed.len()) as u32);
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(&compressed);

    let sum = checksum(&buf[start + CHECKSUM_LEN..]);
    buf[start..start + CHECKSUM_LEN].copy_from_slice(&sum.to_le_bytes());
}

/// Incremental frame decoder over a chunked body.
#[derive(Debug, Default)]
pub(crate) struct Decompressor {
    raw: BytesMut,
}

impl Decompressor {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.raw.extend_from_slice(chunk);
    }

    /// Bytes that does not form a complete frame yet.
    pub(crate) fn remaining(&self) -> &[u8] {
        &self.raw
    }

    /// Decompress every complete frame into `out`.
    ///
    /// Stops at a plain text exception appended by the server, which is left
    /// in [`remaining`][Decompressor::remaining].
    pub(crate) fn decompress(&mut self, out: &mut BytesMut) -> Result<(), ReadError> {
        loop {
            if response::is_exception(&self.raw) {
                return Ok(());
            }
            match self.frame(out) {
                Ok(()) => {}
                Err(ReadError::Incomplete) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    fn frame(&mut self, out: &mut BytesMut) -> Result<(), ReadError> {
        if self.raw.len() < CHECKSUM_LEN + HEADER_LEN {
            return Err(ReadError::Incomplete);
        }

        let mut header = &self.raw[CHECKSUM_LEN..];
        let method = header.get_u8();
        let size = header.get_u32_le() as usize;
        let decompressed = header.get_u32_le() as usize;

        if !(HEADER_LEN..=MAX_FRAME_SIZE).contains(&size) {
            return Err(ProtocolError::LengthOverflow(size as u64).into());
        }
        if decompressed > MAX_FRAME_SIZE {
            return Err(ProtocolError::LengthOverflow(decompressed as u64).into());
        }
        if self.raw.len() < CHECKSUM_LEN + size {
            return Err(ReadError::Incomplete);
        }

        let expected = (&self.raw[..CHECKSUM_LEN]).get_u128_le();
        let frame = &self.raw[CHECKSUM_LEN..CHECKSUM_LEN + size];
        let found = checksum(frame);
        if expected != found {
            return Err(CompressionChecksumError(Mismatch::Checksum { expected, found }).into());
        }

        let payload = &frame[HEADER_LEN..];
        let start = out.len();
        match method {
            METHOD_LZ4 => {
                out.resize(start + decompressed, 0);
                let written = lz4_flex::block::decompress_into(payload, &mut out[start..])
                    .map_err(|_| CompressionChecksumError(Mismatch::Corrupted))?;
                if written != decompressed {
                    out.truncate(start);
                    let size = Mismatch::Size { expected: decompressed, found: written };
                    return Err(CompressionChecksumError(size).into());
                }
            }
            METHOD_NONE => {
                if payload.len() != decompressed {
                    let size = Mismatch::Size { expected: decompressed, found: payload.len() };
                    return Err(CompressionChecksumError(size).into());
                }
                out.extend_from_slice(payload);
            }
            method => return Err(ProtocolError::CompressionMethod(method).into()),
        }

        self.raw.advance(CHECKSUM_LEN + size);
        Ok(())
    }
}

enum Mismatch {
    Checksum { expected: u128, found: u128 },
    Size { expected: usize, found: usize },
    Corrupted,
}

/// Compressed frame does not match its checksum or declared size.
///
/// The response cannot be resumed after this error.
pub struct CompressionChecksumError(Mismatch);

impl std::error::Error for CompressionChecksumError { }

impl fmt::Display for CompressionChecksumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Mismatch::Checksum { expected, found } => write!(
                f,
                "compressed frame checksum mismatch, expected `{expected:032x}` found `{found:032x}`"
            ),
            Mismatch::Size { expected, found } => write!(
                f,
                "decompressed size mismatch, expected `{expected}` found `{found}`"
            ),
            Mismatch::Corrupted => f.write_str("corrupted LZ4 payload"),
        }
    }
}

impl fmt::Debug for CompressionChecksumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frames(data: &[&[u8]]) -> BytesMut {
        let mut buf = BytesMut::new();
        for d in data {
            compress_frame(d, &mut buf);
        }
        buf
    }

    #[test]
    fn round_trip_in_chunks() {
        let payload = b"clickhouse native block ".repeat(100);
        let buf = frames(&[&payload, b"second"]);

        let mut decompressor = Decompressor::default();
        let mut out = BytesMut::new();
        for chunk in buf.chunks(7) {
            decompressor.push(chunk);
            decompressor.decompress(&mut out).unwrap();
        }

        assert!(decompressor.remaining().is_empty());
        assert_eq!(&out[..payload.len()], &payload[..]);
        assert_eq!(&out[payload.len()..], b"second");
    }

    #[test]
    fn checksum_mismatch() {
        let mut buf = frames(&[b"some data"]);
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let mut decompressor = Decompressor::default();
        decompressor.push(&buf);
        let err = decompressor.decompress(&mut BytesMut::new()).unwrap_err();
        let ReadError::Fatal(err) = err else {
            panic!("expected fatal error");
        };
        assert!(matches!(err.kind(), crate::ErrorKind::Checksum(_)));
    }

    #[test]
    fn uncompressed_method() {
        let mut frame = BytesMut::new();
        frame.put_u8(METHOD_NONE);
        frame.put_u32_le((HEADER_LEN + 3) as u32);
        frame.put_u32_le(3);
        frame.put_slice(b"abc");

        let mut buf = BytesMut::new();
        buf.put_u128_le(checksum(&frame));
        buf.extend_from_slice(&frame);

        let mut decompressor = Decompressor::default();
        decompressor.push(&buf);
        let mut out = BytesMut::new();
        decompressor.decompress(&mut out).unwrap();
        assert_eq!(&out[..], b"abc");
    }

    #[test]
    fn exception_after_frames() {
        let mut buf = frames(&[b"data"]);
        buf.extend_from_slice(b"Code: 241. DB::Exception: Memory limit exceeded. (MEMORY_LIMIT_EXCEEDED)");

        let mut decompressor = Decompressor::default();
        decompressor.push(&buf);
        let mut out = BytesMut::new();
        decompressor.decompress(&mut out).unwrap();
        assert_eq!(&out[..], b"data");
        assert!(decompressor.remaining().starts_with(b"Code: 241."));
    }
}
