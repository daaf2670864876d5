//! Record type and its on-disk codec.
//!
//! A record is an opaque byte value plus the 64-bit offset the engine stamped
//! on it at append time. The serialised form is self-delimiting (the store's
//! outer length prefix is not needed to decode it) and checksummed:
//!
//! ```text
//! [offset: u64 LE][value_len: u32 LE][value bytes][crc32: u32 LE]
//! ```
//!
//! The CRC covers everything before it.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Bytes before the value: offset (8) + value length (4).
const HEADER_LEN: usize = 12;
/// Trailing checksum width.
const CRC_LEN: usize = 4;

/// Failure to marshal or unmarshal a record.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The data ended before a complete record (torn write).
    #[error("record truncated")]
    Truncated,

    /// Checksum mismatch or inconsistent framing.
    #[error("record corrupt")]
    Corrupt,

    /// The value does not fit the 32-bit length field.
    #[error("record value too large (exceeds u32::MAX bytes)")]
    ValueTooLarge,
}

/// A single log record: an opaque value and the offset stamped on append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Absolute position in the log's logical sequence. Assigned by the
    /// engine; never supplied by callers.
    pub offset: u64,
    /// The opaque payload.
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(offset: u64, value: Vec<u8>) -> Self {
        Self { offset, value }
    }

    /// Serialises the record.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ValueTooLarge`] when the value cannot be
    /// represented in the 32-bit length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let value_len: u32 = self
            .value
            .len()
            .try_into()
            .map_err(|_| CodecError::ValueTooLarge)?;

        let mut buf = Vec::with_capacity(HEADER_LEN + self.value.len() + CRC_LEN);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&value_len.to_le_bytes());
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Deserialises a record from exactly one serialised frame body.
    ///
    /// # Errors
    ///
    /// - [`CodecError::Truncated`] if `data` is shorter than the declared
    ///   record.
    /// - [`CodecError::Corrupt`] if `data` is longer than the declared record
    ///   or the checksum does not match.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_LEN + CRC_LEN {
            return Err(CodecError::Truncated);
        }

        let offset = LittleEndian::read_u64(&data[0..8]);
        let value_len = LittleEndian::read_u32(&data[8..HEADER_LEN]) as usize;

        let total = HEADER_LEN + value_len + CRC_LEN;
        if data.len() < total {
            return Err(CodecError::Truncated);
        }
        if data.len() > total {
            return Err(CodecError::Corrupt);
        }

        let body_end = HEADER_LEN + value_len;
        let stored_crc = LittleEndian::read_u32(&data[body_end..total]);
        if crc32fast::hash(&data[..body_end]) != stored_crc {
            return Err(CodecError::Corrupt);
        }

        Ok(Self {
            offset,
            value: data[HEADER_LEN..body_end].to_vec(),
        })
    }
}
