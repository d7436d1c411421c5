//! Byte-level codec helpers for the wire formats.
//!
//! All integers on the wire are big-endian. Variable-length fields carry a
//! length prefix as documented per type.

use thiserror::Error;

/// Codec failures surfaced by `decode` implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before the expected field.
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    /// A length prefix exceeds the remaining input.
    #[error("length prefix {len} exceeds remaining {remaining} bytes")]
    BadLength { len: u64, remaining: usize },

    /// A fixed-size field had the wrong size.
    #[error("invalid field size: expected {expected}, got {got}")]
    InvalidSize { expected: usize, got: usize },

    /// A tag or discriminant byte was out of range.
    #[error("invalid tag byte {0:#04x}")]
    InvalidTag(u8),
}

/// Append-only byte writer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// `u64 len ‖ bytes`.
    pub fn put_len_prefixed(&mut self, bytes: &[u8]) {
        self.put_u64(bytes.len() as u64);
        self.put_bytes(bytes);
    }

    /// `u32 len ‖ bytes`.
    pub fn put_len_prefixed_u32(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.put_bytes(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor-based byte reader.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof(self.pos));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4 bytes")))
    }

    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("8 bytes")))
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.take(N)?;
        Ok(bytes.try_into().expect("fixed-size slice"))
    }

    /// `u64 len ‖ bytes`.
    pub fn get_len_prefixed(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.get_u64()?;
        if len as usize > self.remaining() {
            return Err(CodecError::BadLength {
                len,
                remaining: self.remaining(),
            });
        }
        self.take(len as usize)
    }

    /// `u32 len ‖ bytes`.
    pub fn get_len_prefixed_u32(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.get_u32()?;
        if len as usize > self.remaining() {
            return Err(CodecError::BadLength {
                len: len as u64,
                remaining: self.remaining(),
            });
        }
        self.take(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_scalars() {
        let mut w = Writer::new();
        w.put_u8(0xab);
        w.put_u32(0xdeadbeef);
        w.put_u64(u64::MAX - 1);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_u8().unwrap(), 0xab);
        assert_eq!(r.get_u32().unwrap(), 0xdeadbeef);
        assert_eq!(r.get_u64().unwrap(), u64::MAX - 1);
        assert!(r.is_empty());
    }

    #[test]
    fn length_prefix_round_trip() {
        let mut w = Writer::new();
        w.put_len_prefixed(b"payload");
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_len_prefixed().unwrap(), b"payload");
    }

    #[test]
    fn truncated_input_errors() {
        let mut r = Reader::new(&[0x00, 0x01]);
        assert!(matches!(r.get_u64(), Err(CodecError::UnexpectedEof(_))));
    }

    #[test]
    fn oversized_length_prefix_errors() {
        let mut w = Writer::new();
        w.put_u64(1_000_000);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(matches!(
            r.get_len_prefixed(),
            Err(CodecError::BadLength { .. })
        ));
    }
}
