use serde::{Deserialize, Serialize};

/// Length of the fixed SMP header in bytes.
pub const HEADER_LEN: usize = 8;

/// Key under which the CoAP-wrapped scheme nests the SMP header.
pub const COAP_HEADER_KEY: &str = "_h";

/// SMP protocol version sent in requests (bits 3-4 of the op byte).
pub const SMP_VERSION: u8 = 1;

/// Default transport MTU (Zephyr's usual L2CAP TX MTU).
pub const DEFAULT_MTU: usize = 252;

/// Length of the truncated SHA-256 sent with the first image chunk.
pub const TRUNCATED_HASH_LEN: usize = 3;

/// Request/response field names used by the transfer commands.
pub mod field {
    pub const RC: &str = "rc";
    pub const ERR: &str = "err";
    pub const GROUP: &str = "group";
    pub const OFF: &str = "off";
    pub const LEN: &str = "len";
    pub const DATA: &str = "data";
    pub const SHA: &str = "sha";
    pub const IMAGE: &str = "image";
    pub const UPGRADE: &str = "upgrade";
    pub const NAME: &str = "name";
    pub const MATCH: &str = "match";
    pub const TARGET_ID: &str = "target_id";
    pub const STREAM_SESSION_ID: &str = "stream_session_id";
    pub const DEFER_INSTALL: &str = "defer_install";
}

/// Management group identifiers.
pub mod group {
    pub const IMAGE: u16 = 1;
    pub const FS: u16 = 8;
    pub const SUIT: u16 = 66;
}

/// Image group commands.
pub mod image_cmd {
    pub const UPLOAD: u8 = 1;
    pub const CORE_LOAD: u8 = 4;
}

/// File system group commands.
pub mod fs_cmd {
    pub const FILE: u8 = 0;
}

/// SUIT group commands.
pub mod suit_cmd {
    pub const ENVELOPE_UPLOAD: u8 = 2;
    pub const RESOURCE_UPLOAD: u8 = 4;
    pub const CACHE_RAW_UPLOAD: u8 = 5;
}

/// SMP operation code (low three bits of the first header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read = 0,
    ReadResponse = 1,
    Write = 2,
    WriteResponse = 3,
}

impl Operation {
    /// Parses an operation code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Read),
            1 => Some(Self::ReadResponse),
            2 => Some(Self::Write),
            3 => Some(Self::WriteResponse),
            _ => None,
        }
    }

    /// Returns the response operation matching a request operation.
    pub fn response(self) -> Self {
        match self {
            Self::Read | Self::ReadResponse => Self::ReadResponse,
            Self::Write | Self::WriteResponse => Self::WriteResponse,
        }
    }

    /// Returns `true` for `ReadResponse` and `WriteResponse`.
    pub fn is_response(self) -> bool {
        matches!(self, Self::ReadResponse | Self::WriteResponse)
    }
}

/// Framing scheme used by a transport.
///
/// The standard scheme (BLE, serial, UDP) prefixes the CBOR body with the
/// 8-byte binary header. The CoAP-wrapped scheme carries the header as a
/// byte string under [`COAP_HEADER_KEY`] inside the CBOR map itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    #[default]
    Standard,
    CoapWrapped,
}

impl Scheme {
    /// Fixed bytes spent on the header for this scheme.
    ///
    /// CoAP-wrapped frames spend `"_h"` (3 bytes) plus a 1-byte byte-string
    /// prefix on top of the 8 header bytes.
    pub fn header_overhead(self) -> usize {
        match self {
            Self::Standard => HEADER_LEN,
            Self::CoapWrapped => HEADER_LEN + 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor;

    #[test]
    fn operation_roundtrip() {
        for op in [
            Operation::Read,
            Operation::ReadResponse,
            Operation::Write,
            Operation::WriteResponse,
        ] {
            assert_eq!(Operation::from_u8(op as u8), Some(op));
        }
        assert_eq!(Operation::from_u8(4), None);
    }

    #[test]
    fn response_ops() {
        assert_eq!(Operation::Read.response(), Operation::ReadResponse);
        assert_eq!(Operation::Write.response(), Operation::WriteResponse);
        assert!(Operation::WriteResponse.is_response());
        assert!(!Operation::Write.is_response());
    }

    #[test]
    fn coap_overhead_matches_encoded_header_field() {
        let encoded = cbor::text_len(COAP_HEADER_KEY) + cbor::bytes_len(HEADER_LEN);
        assert_eq!(Scheme::CoapWrapped.header_overhead(), encoded);
        assert_eq!(Scheme::Standard.header_overhead(), 8);
    }
}
