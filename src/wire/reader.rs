//! Byte-level primitives shared by every message parser.
//!
//! All multi-byte integers in the inchain message set are little-endian,
//! with one deliberate exception: ports inside address records travel in
//! network byte order (big-endian). Variable-length counts use the
//! Bitcoin-family `CompactSize` encoding:
//! https://developer.bitcoin.org/reference/transactions.html#compactsize-unsigned-integers

use crate::error::ProtocolError;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};

/// A payload slice plus the cursor advanced by each read.
///
/// Parsers thread one of these through their field reads; after a
/// successful parse the distance the cursor travelled is the message's
/// wire length. Every read is bounds-checked and fails with
/// [`ProtocolError::Truncated`] naming the field, never panicking on
/// malformed input.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8], offset: usize) -> Self {
        Self {
            buf,
            cursor: offset,
        }
    }

    /// Current read position within the underlying buffer.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.cursor)
    }

    pub fn read_u32_le(&mut self, context: &'static str) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_u64_le(&mut self, context: &'static str) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_i64_le(&mut self, context: &'static str) -> Result<i64, ProtocolError> {
        Ok(i64::from_le_bytes(self.read_array(context)?))
    }

    /// Two bytes in network byte order. Used only for ports.
    pub fn read_u16_be(&mut self, context: &'static str) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.read_array(context)?))
    }

    /// A copy of the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<Vec<u8>, ProtocolError> {
        let bytes = self
            .buf
            .get(self.cursor..self.cursor + n)
            .ok_or(ProtocolError::Truncated(context))?
            .to_vec();
        self.cursor += n;
        Ok(bytes)
    }

    /// The next `N` bytes as a fixed-size array.
    pub fn read_array<const N: usize>(
        &mut self,
        context: &'static str,
    ) -> Result<[u8; N], ProtocolError> {
        let bytes: [u8; N] = self
            .buf
            .get(self.cursor..self.cursor + N)
            .ok_or(ProtocolError::Truncated(context))?
            .try_into()
            .unwrap();
        self.cursor += N;
        Ok(bytes)
    }

    /// Reads a `CompactSize` varint.
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, ProtocolError> {
        let first = *self
            .buf
            .get(self.cursor)
            .ok_or(ProtocolError::Truncated(context))?;
        self.cursor += 1;
        match first {
            0xFD => Ok(u16::from_le_bytes(self.read_array(context)?) as u64),
            0xFE => Ok(u32::from_le_bytes(self.read_array(context)?) as u64),
            0xFF => Ok(u64::from_le_bytes(self.read_array(context)?)),
            n => Ok(n as u64),
        }
    }
}

/// Writes a `CompactSize` varint.
pub fn write_varint<W: Write>(value: u64, sink: &mut W) -> io::Result<()> {
    match value {
        0..=0xFC => sink.write_u8(value as u8),
        0xFD..=0xFFFF => {
            sink.write_u8(0xFD)?;
            sink.write_u16::<LittleEndian>(value as u16)
        }
        0x1_0000..=0xFFFF_FFFF => {
            sink.write_u8(0xFE)?;
            sink.write_u32::<LittleEndian>(value as u32)
        }
        _ => {
            sink.write_u8(0xFF)?;
            sink.write_u64::<LittleEndian>(value)
        }
    }
}

/// Encoded size of a `CompactSize` varint, for length precomputation.
pub fn varint_size(value: u64) -> usize {
    match value {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}
