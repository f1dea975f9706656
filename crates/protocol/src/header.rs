//! Fixed 8-byte SMP header.
//!
//! # Wire format
//!
//! ```text
//! [1 byte: res(3) | version(2) | op(3)]
//! [1 byte: flags]
//! [2 bytes BE: body length]
//! [2 bytes BE: group]
//! [1 byte: sequence number]
//! [1 byte: command]
//! ```

use crate::constants::{HEADER_LEN, Operation};
use crate::error::CodecError;

/// A decoded SMP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McuMgrHeader {
    pub version: u8,
    pub op: Operation,
    pub flags: u8,
    pub len: u16,
    pub group: u16,
    pub seq: u8,
    pub command: u8,
}

impl McuMgrHeader {
    /// Serializes the header.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let len = self.len.to_be_bytes();
        let group = self.group.to_be_bytes();
        [
            ((self.version & 0b11) << 3) | (self.op as u8 & 0b111),
            self.flags,
            len[0],
            len[1],
            group[0],
            group[1],
            self.seq,
            self.command,
        ]
    }

    /// Parses a header from the first [`HEADER_LEN`] bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::TooShort {
                expected: HEADER_LEN,
                got: bytes.len(),
            });
        }

        let op_bits = bytes[0] & 0b111;
        let op = Operation::from_u8(op_bits).ok_or(CodecError::InvalidOperation(op_bits))?;

        Ok(Self {
            version: (bytes[0] >> 3) & 0b11,
            op,
            flags: bytes[1],
            len: u16::from_be_bytes([bytes[2], bytes[3]]),
            group: u16::from_be_bytes([bytes[4], bytes[5]]),
            seq: bytes[6],
            command: bytes[7],
        })
    }

    /// Builds the response header for this request header.
    pub fn response(&self, len: u16) -> Self {
        Self {
            op: self.op.response(),
            len,
            ..*self
        }
    }
}
