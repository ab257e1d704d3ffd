//! Fixed-width scalar codec for the request and answer streams.
//!
//! [`WireWriter`] accumulates one outbound round in a `BytesMut`; [`WireReader`]
//! walks an inbound round held in `Bytes`. Both agree on a [`ByteOrder`] chosen at
//! session setup. Reads never panic: running out of bytes mid-message is reported as
//! [`SyncError::Truncated`], which is fatal for the session.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, SyncError};
use crate::protocol::MessageTag;

/// Byte order agreed with the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

/// Outbound message buffer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
    order: ByteOrder,
}

impl WireWriter {
    /// Create an empty writer using `order`.
    pub fn new(order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::new(),
            order,
        }
    }

    /// Byte order this writer encodes with.
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a message tag.
    pub fn write_tag(&mut self, tag: MessageTag) {
        self.write_u8(tag.as_u8());
    }

    /// Write one unsigned byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Write an unsigned 16-bit integer.
    pub fn write_u16(&mut self, value: u16) {
        match self.order {
            ByteOrder::Little => self.buf.put_u16_le(value),
            ByteOrder::Big => self.buf.put_u16(value),
        }
    }

    /// Write a signed 32-bit integer.
    pub fn write_i32(&mut self, value: i32) {
        match self.order {
            ByteOrder::Little => self.buf.put_i32_le(value),
            ByteOrder::Big => self.buf.put_i32(value),
        }
    }

    /// Write a 64-bit float, bit for bit.
    pub fn write_f64(&mut self, value: f64) {
        match self.order {
            ByteOrder::Little => self.buf.put_f64_le(value),
            ByteOrder::Big => self.buf.put_f64(value),
        }
    }

    /// Append raw bytes produced by another writer.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Hand the accumulated bytes over, leaving the writer empty.
    pub fn split(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Consume the writer and return its bytes.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Inbound message cursor.
#[derive(Debug, Clone)]
pub struct WireReader {
    buf: Bytes,
    order: ByteOrder,
}

impl WireReader {
    /// Wrap `buf` for reading with `order`.
    pub fn new(buf: impl Into<Bytes>, order: ByteOrder) -> Self {
        Self {
            buf: buf.into(),
            order,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// True once every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn ensure(&self, needed: usize) -> AppResult<()> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(SyncError::Truncated { needed, remaining });
        }
        Ok(())
    }

    /// Read one unsigned byte.
    pub fn read_u8(&mut self) -> AppResult<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read an unsigned 16-bit integer.
    pub fn read_u16(&mut self) -> AppResult<u16> {
        self.ensure(2)?;
        Ok(match self.order {
            ByteOrder::Little => self.buf.get_u16_le(),
            ByteOrder::Big => self.buf.get_u16(),
        })
    }

    /// Read a signed 32-bit integer.
    pub fn read_i32(&mut self) -> AppResult<i32> {
        self.ensure(4)?;
        Ok(match self.order {
            ByteOrder::Little => self.buf.get_i32_le(),
            ByteOrder::Big => self.buf.get_i32(),
        })
    }

    /// Read a 64-bit float, bit for bit.
    pub fn read_f64(&mut self) -> AppResult<f64> {
        self.ensure(8)?;
        Ok(match self.order {
            ByteOrder::Little => self.buf.get_f64_le(),
            ByteOrder::Big => self.buf.get_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut writer = WireWriter::new(ByteOrder::Little);
        writer.write_tag(MessageTag::SetSamplingPeriod);
        writer.write_u16(0x0102);
        assert_eq!(&writer.freeze()[..], &[1, 0x02, 0x01]);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut writer = WireWriter::new(ByteOrder::Big);
        writer.write_i32(-2);
        assert_eq!(&writer.freeze()[..], &[0xff, 0xff, 0xff, 0xfe]);
    }

    #[test]
    fn test_floats_keep_their_bits() {
        let odd = f64::from_bits(0x7ff8_0000_dead_beef);
        let mut writer = WireWriter::new(ByteOrder::Big);
        writer.write_f64(odd);
        writer.write_f64(f64::NEG_INFINITY);

        let mut reader = WireReader::new(writer.freeze(), ByteOrder::Big);
        assert_eq!(reader.read_f64().unwrap().to_bits(), odd.to_bits());
        assert_eq!(reader.read_f64().unwrap(), f64::NEG_INFINITY);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_short_read_reports_truncation() {
        let mut reader = WireReader::new(vec![1u8, 2, 3], ByteOrder::Little);
        match reader.read_f64() {
            Err(SyncError::Truncated { needed, remaining }) => {
                assert_eq!(needed, 8);
                assert_eq!(remaining, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // Nothing was consumed by the failed read.
        assert_eq!(reader.remaining(), 3);
    }

    #[test]
    fn test_split_leaves_writer_empty() {
        let mut writer = WireWriter::new(ByteOrder::Little);
        writer.write_u8(9);
        let first = writer.split();
        assert_eq!(&first[..], &[9]);
        assert!(writer.is_empty());
    }
}
