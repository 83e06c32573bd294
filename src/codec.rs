// CMPP wire codec - positional, fixed-width field encoding shared by every PDU.
//
// CMPP fields are fixed-width, big-endian and NUL-padded, so the codec is a
// pair of small cursor types with exact width contracts rather than a
// schema-driven serializer. Both carry a sticky error: after the first
// failure every later operation is a no-op and the failure surfaces once,
// at `into_bytes()` / `finish()`. That keeps the per-PDU pack/unpack code
// straight-line.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Every CMPP packet starts with a 12-byte header:
/// `total_length: u32`, `command_id: u32`, `sequence_id: u32`.
pub const CMPP_HEADER_LEN: u32 = 12;

/// Origin errors produced by the packet writer and reader.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// A value does not fit its declared fixed width.
    #[error("params passed to method is invalid")]
    InvalidParams,

    /// The input slice ended before the declared field width was read.
    #[error("unexpected end of packet data")]
    UnexpectedEof,
}

/// A codec failure annotated with the operation that caused it.
///
/// The operation tag is free-form diagnostic text and usually includes a
/// truncated rendering of the offending value.
#[derive(Debug, Error)]
#[error("{op} error: {source}")]
pub struct OpError {
    op: String,
    source: CodecError,
}

impl OpError {
    pub fn new(source: CodecError, op: impl Into<String>) -> Self {
        OpError {
            op: op.into(),
            source,
        }
    }

    /// The operation which caused the error.
    pub fn op(&self) -> &str {
        &self.op
    }

    /// The origin error.
    pub fn cause(&self) -> CodecError {
        self.source
    }
}

/// A PDU that can be serialized to its wire form.
///
/// `pack` writes the full packet including the 12-byte header and records
/// `seq_id` on the record so a later response can echo it.
pub trait Packable: Send {
    fn pack(&mut self, seq_id: u32) -> Result<Bytes, OpError>;
}

/// A PDU that can be rebuilt from its wire form.
///
/// The input starts at the header's sequence id: the framer has already
/// consumed `total_length` and `command_id`.
pub trait Unpackable: Sized {
    fn unpack(data: &[u8]) -> Result<Self, OpError>;
}

// Operation tags embed the value being written; long values are cut so a
// bad submit body does not flood the log line.
fn clip(s: &str) -> &str {
    let end = s
        .char_indices()
        .nth(10)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

/// Growable byte buffer with fixed-width write operations and a sticky
/// error, preallocated to the known packet length.
pub struct PacketWriter {
    buf: BytesMut,
    err: Option<OpError>,
}

impl PacketWriter {
    pub fn new(pkt_len: u32) -> Self {
        PacketWriter {
            buf: BytesMut::with_capacity(pkt_len as usize),
            err: None,
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        if self.err.is_none() {
            self.buf.put_u8(v);
        }
    }

    pub fn write_u32(&mut self, v: u32) {
        if self.err.is_none() {
            self.buf.put_u32(v);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        if self.err.is_none() {
            self.buf.put_u64(v);
        }
    }

    /// Appends a raw octet run as-is.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.err.is_none() {
            self.buf.put_slice(data);
        }
    }

    /// Writes `s` as a C-string of exactly `size` octets: shorter input is
    /// NUL-padded on the right, longer input fails with `InvalidParams`.
    pub fn write_fixed_string(&mut self, s: &str, size: usize) {
        if self.err.is_some() {
            return;
        }
        if s.len() > size {
            self.err = Some(OpError::new(
                CodecError::InvalidParams,
                format!("PacketWriter::write_fixed_string writes: {}", clip(s)),
            ));
            return;
        }
        self.buf.put_slice(s.as_bytes());
        self.buf.put_bytes(0, size - s.len());
    }

    /// Returns the packed bytes, or the first failure captured by any
    /// write since construction.
    pub fn into_bytes(self) -> Result<Bytes, OpError> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(self.buf.freeze()),
        }
    }
}

/// Cursor over a packet body with fixed-width read operations and a
/// sticky error.
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
    err: Option<OpError>,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PacketReader {
            data,
            pos: 0,
            err: None,
        }
    }

    fn take(&mut self, n: usize, op: &str) -> Option<&'a [u8]> {
        if self.err.is_some() {
            return None;
        }
        if self.data.len() - self.pos < n {
            self.err = Some(OpError::new(CodecError::UnexpectedEof, op));
            return None;
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(s)
    }

    pub fn read_u8(&mut self) -> u8 {
        self.take(1, "PacketReader::read_u8")
            .map(|s| s[0])
            .unwrap_or(0)
    }

    pub fn read_u32(&mut self) -> u32 {
        self.take(4, "PacketReader::read_u32")
            .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
            .unwrap_or(0)
    }

    pub fn read_u64(&mut self) -> u64 {
        self.take(8, "PacketReader::read_u64")
            .map(|s| u64::from_be_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]))
            .unwrap_or(0)
    }

    /// Reads exactly `n` raw octets.
    pub fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        self.take(n, "PacketReader::read_bytes")
            .map(|s| s.to_vec())
            .unwrap_or_default()
    }

    /// Reads exactly `N` raw octets into a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(s) = self.take(N, "PacketReader::read_array") {
            out.copy_from_slice(s);
        }
        out
    }

    /// Reads a C-string of exactly `size` octets, truncated at the first
    /// NUL if any.
    pub fn read_cstring(&mut self, size: usize) -> String {
        match self.take(size, "PacketReader::read_cstring") {
            Some(s) => {
                let end = s.iter().position(|&b| b == 0).unwrap_or(s.len());
                String::from_utf8_lossy(&s[..end]).into_owned()
            }
            None => String::new(),
        }
    }

    /// Surfaces the first failure captured by any read since construction.
    pub fn finish(self) -> Result<(), OpError> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
