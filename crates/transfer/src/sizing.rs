//! How many data bytes fit in one upload request.
//!
//! An upload request is an indefinite map holding `"off"`, `"len"` (offset 0
//! only), any target-specific fields and `"data"`. Everything except the
//! payload of `"data"` is overhead; the data byte string itself pays a length
//! prefix that grows with the payload, so the largest payload is found per
//! prefix class rather than by subtracting a single prefix length.

use mcumgr_protocol::Scheme;
use mcumgr_protocol::cbor::{MAP_OVERHEAD, text_len, uint_len};
use mcumgr_protocol::constants::field;

use crate::TransferError;

/// `(prefix length, largest payload using it)` for CBOR byte strings.
const PREFIX_CLASSES: [(usize, u64); 5] = [
    (1, 23),
    (2, 0xFF),
    (3, 0xFFFF),
    (5, 0xFFFF_FFFF),
    (9, u64::MAX),
];

/// Largest `n` such that a byte string of `n` bytes encodes in `available`
/// bytes.
pub fn max_payload(available: usize) -> usize {
    PREFIX_CLASSES
        .iter()
        .filter(|(prefix, _)| available > *prefix)
        .map(|&(prefix, limit)| {
            let fits = (available - prefix) as u64;
            fits.min(limit) as usize
        })
        .max()
        .unwrap_or(0)
}

/// Computes chunk boundaries for one upload session.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSizer {
    mtu: usize,
    scheme: Scheme,
    alignment: usize,
}

impl ChunkSizer {
    pub fn new(mtu: usize, scheme: Scheme, alignment: usize) -> Self {
        Self {
            mtu,
            scheme,
            alignment: alignment.max(1),
        }
    }

    /// Bytes spent on everything except the data payload at `offset`.
    ///
    /// `extra` is the encoded size of the target-specific fields.
    pub fn overhead(&self, offset: u64, total: u64, extra: usize) -> usize {
        let mut overhead = self.scheme.header_overhead()
            + MAP_OVERHEAD
            + text_len(field::OFF)
            + uint_len(offset)
            + extra
            + text_len(field::DATA);
        if offset == 0 {
            overhead += text_len(field::LEN) + uint_len(total);
        }
        overhead
    }

    /// Largest payload that fits at `offset`, before clamping or alignment.
    pub fn max_chunk(&self, offset: u64, total: u64, extra: usize) -> usize {
        self.mtu
            .checked_sub(self.overhead(offset, total, extra))
            .map_or(0, max_payload)
    }

    /// Size of the chunk starting at `offset`.
    ///
    /// Clamped to the remaining bytes. Every chunk but the last is rounded
    /// down to the memory alignment.
    pub fn chunk_size(&self, offset: u64, total: u64, extra: usize) -> Result<usize, TransferError> {
        let remaining = total.saturating_sub(offset);
        let max = self.max_chunk(offset, total, extra) as u64;

        let size = if max >= remaining {
            remaining
        } else {
            max - max % self.alignment as u64
        };

        if size == 0 {
            return Err(TransferError::MtuTooSmall {
                mtu: self.mtu,
                offset,
            });
        }
        Ok(size as usize)
    }
}
